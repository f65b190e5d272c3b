//! Tiered recommendation candidates and the ranked daily list.
//!
//! Each tier builder is pure: it takes figures the agent already fetched
//! and returns at most its cap. [`rank`] merges the tiers.

use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;

use crate::models::{Recommendation, RecommendationCategory};
use crate::scoring::health::ComplianceFlags;
use crate::scoring::reorder::StockItem;
use crate::scoring::{ratio_or, round2};

pub const URGENT_CAP: usize = 5;
pub const FINANCIAL_CAP: usize = 3;
pub const OPERATIONAL_CAP: usize = 3;
/// Length of the daily list.
pub const TOP_N: usize = 10;

/// Expense share of sales above which expenses are flagged.
const EXPENSE_RATIO_LIMIT: f64 = 0.30;
const EXPENSE_RATIO_TARGET: f64 = 0.25;
/// Potential funding quoted for the program check.
const PROGRAM_FUNDING: f64 = 100_000.0;

/// A customer with credit outstanding.
#[derive(Debug, Clone, PartialEq)]
pub struct Debtor {
    pub id: String,
    pub name: String,
    pub outstanding: f64,
    pub average_payment_days: f64,
}

/// Month-to-date totals behind the financial tier.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonthFigures {
    pub sales: f64,
    pub purchases: f64,
    pub expenses: f64,
}

/// Slow payers first, then stock at half its reorder point or less.
pub fn urgent(debtors: &[Debtor], items: &[StockItem]) -> Vec<Recommendation> {
    let credit = debtors
        .iter()
        .filter(|d| d.outstanding > 1000.0 && d.average_payment_days > 45.0)
        .map(|d| {
            Recommendation::new(
                format!("urgent_credit_{}", d.id),
                RecommendationCategory::Urgent,
                90.0,
                "credit_risk",
            )
            .with_title(
                format!("Collect from {}", d.name),
                format!("تحصيل من {}", d.name),
            )
            .with_description(format!(
                "AED {:.0} outstanding, {:.0} days to pay on average",
                d.outstanding, d.average_payment_days
            ))
            .with_action("Call customer for payment", "اتصل بالعميل للدفع")
            .with_potential(d.outstanding)
        });

    let stock = items
        .iter()
        .filter(|i| i.current_stock <= i.reorder_point * 0.5)
        .map(|i| {
            Recommendation::new(
                format!("urgent_stock_{}", i.id),
                RecommendationCategory::Urgent,
                85.0,
                "reorder",
            )
            .with_title(
                format!("Reorder {} immediately", i.name),
                format!("اطلب {} فوراً", i.name),
            )
            .with_description(format!(
                "Only {} units left (below 50% of reorder point)",
                i.current_stock
            ))
            .with_action("Place order with supplier", "اطلب من المورد")
        });

    credit.chain(stock).take(URGENT_CAP).collect()
}

/// Margin and expense-ratio checks for the current month.
///
/// `target_margin` is a fraction (0.08 for 8%). Nothing is produced without sales.
pub fn financial(figures: MonthFigures, target_margin: f64, month_key: &str) -> Vec<Recommendation> {
    let MonthFigures {
        sales,
        purchases,
        expenses,
    } = figures;
    if sales <= 0.0 {
        return Vec::new();
    }

    let mut recs = Vec::new();
    let net_margin = (sales - purchases - expenses) / sales;
    if net_margin < target_margin {
        recs.push(
            Recommendation::new(
                format!("financial_margin_{}", month_key),
                RecommendationCategory::Financial,
                75.0,
                "profit",
            )
            .with_title("Improve profit margins", "حسّن هوامش الربح")
            .with_description(format!(
                "Net margin {:.1}% is below industry average {:.0}%",
                net_margin * 100.0,
                target_margin * 100.0
            ))
            .with_action("Review pricing and reduce expenses", "راجع الأسعار وقلل المصاريف")
            .with_potential(round2((target_margin - net_margin) * sales)),
        );
    }

    let expense_ratio = expenses / sales;
    if expense_ratio > EXPENSE_RATIO_LIMIT {
        recs.push(
            Recommendation::new(
                format!("financial_expenses_{}", month_key),
                RecommendationCategory::Financial,
                70.0,
                "profit",
            )
            .with_title("Reduce operating expenses", "قلل مصاريف التشغيل")
            .with_description(format!(
                "Operating expenses are {:.0}% of sales (target: <30%)",
                expense_ratio * 100.0
            ))
            .with_action("Audit and negotiate costs", "راجع وفاوض على التكاليف")
            .with_potential(round2((expense_ratio - EXPENSE_RATIO_TARGET) * sales)),
        );
    }

    recs.truncate(FINANCIAL_CAP);
    recs
}

/// Slow movers: over 90 days of stock tying up more than AED 1,000.
pub fn operational(items: &[StockItem]) -> Vec<Recommendation> {
    items
        .iter()
        .filter(|i| i.average_daily_sales > 0.0)
        .filter_map(|i| {
            let days_of_stock = ratio_or(i.current_stock, i.average_daily_sales, 0.0);
            let tied_capital = i.current_stock * i.unit_cost;
            (days_of_stock > 90.0 && tied_capital > 1000.0).then(|| {
                Recommendation::new(
                    format!("ops_slowmove_{}", i.id),
                    RecommendationCategory::Operational,
                    50.0,
                    "reorder",
                )
                .with_title(
                    format!("Clear slow-moving: {}", i.name),
                    format!("صفّي البضاعة البطيئة: {}", i.name),
                )
                .with_description(format!(
                    "{} days of stock (AED {:.0} tied up)",
                    days_of_stock as i64, tied_capital
                ))
                .with_action("Discount or bundle to clear", "خصم أو حزمة للتصفية")
                .with_potential(round2(tied_capital * 0.3))
            })
        })
        .take(OPERATIONAL_CAP)
        .collect()
}

/// TRN and license checks. Without a profile there is nothing to check.
pub fn compliance(flags: Option<&ComplianceFlags>) -> Vec<Recommendation> {
    let Some(flags) = flags else {
        return Vec::new();
    };

    let mut recs = Vec::new();
    if !flags.has_trn {
        recs.push(
            Recommendation::new("compliance_trn", RecommendationCategory::Compliance, 80.0, "vat")
                .with_title("Register for VAT", "سجّل في ضريبة القيمة المضافة")
                .with_description(
                    "VAT registration may be required if revenue exceeds AED 375,000",
                )
                .with_action(
                    "Check eligibility on FTA website",
                    "تحقق من الأهلية على موقع الهيئة الاتحادية للضرائب",
                ),
        );
    }
    if let Some(days) = flags.license_days_remaining.filter(|d| *d <= 30) {
        recs.push(
            Recommendation::new(
                "compliance_license",
                RecommendationCategory::Compliance,
                95.0,
                "business_health",
            )
            .with_title("Renew trade license", "جدد الرخصة التجارية")
            .with_description(format!("License expires in {} days", days))
            .with_action(
                "Apply for renewal at DED",
                "قدم طلب التجديد في دائرة التنمية الاقتصادية",
            ),
        );
    }
    recs
}

pub fn growth() -> Vec<Recommendation> {
    vec![
        Recommendation::new("growth_programs", RecommendationCategory::Growth, 60.0, "uae_programs")
            .with_title("Explore UAE SME programs", "استكشف برامج المشاريع الصغيرة")
            .with_description(
                "You may qualify for Dubai SME, Khalifa Fund, or other support programs",
            )
            .with_action("Check program eligibility", "تحقق من أهلية البرامج")
            .with_potential(PROGRAM_FUNDING),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRecommendations {
    pub date: NaiveDate,
    /// Size of the pool before truncation.
    pub total_recommendations: usize,
    pub top_recommendations: usize,
    pub urgent_items: usize,
    pub potential_monthly_impact: f64,
    pub recommendations: Vec<Recommendation>,
}

/// Category priority first, then higher impact. Equal keys keep their input order.
pub fn sort(recs: &mut [Recommendation]) {
    recs.sort_by(|a, b| {
        a.priority.cmp(&b.priority).then_with(|| {
            b.impact_score
                .partial_cmp(&a.impact_score)
                .unwrap_or(Ordering::Equal)
        })
    });
}

/// Merge the tiers into the daily list; the summary counts only what is kept.
pub fn rank(mut pool: Vec<Recommendation>, date: NaiveDate) -> DailyRecommendations {
    let total = pool.len();
    sort(&mut pool);
    pool.truncate(TOP_N);

    DailyRecommendations {
        date,
        total_recommendations: total,
        top_recommendations: pool.len(),
        urgent_items: pool
            .iter()
            .filter(|r| r.category == RecommendationCategory::Urgent)
            .count(),
        potential_monthly_impact: round2(pool.iter().map(|r| r.potential_aed).sum()),
        recommendations: pool,
    }
}
