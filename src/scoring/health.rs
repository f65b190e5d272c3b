//! Business-health dimensions and the weighted report.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::tables::HealthWeights;
use super::{ratio_or, round1};
use crate::models::{
    Dimension, DimensionScore, HealthLevel, HealthRecommendation, HealthReport, HealthTrend,
    TrendDirection, TrendPoint,
};

const MAX_RECOMMENDATIONS: usize = 5;
const WEAK_DIMENSION: f64 = 50.0;

/// Net-margin score against a business-type benchmark.
pub fn profitability(sales: f64, cogs: f64, expenses: f64, benchmark_margin: f64) -> DimensionScore {
    if sales == 0.0 {
        return DimensionScore::new(0.0, "No sales recorded", "لا توجد مبيعات مسجلة");
    }

    let net_margin = (sales - cogs - expenses) / sales;
    let relative = ratio_or(net_margin, benchmark_margin, 0.0);
    let score = if net_margin >= benchmark_margin {
        (70.0 + relative * 30.0).min(100.0)
    } else if net_margin > 0.0 {
        30.0 + relative * 40.0
    } else {
        (30.0 + net_margin * 100.0).max(0.0)
    };

    DimensionScore::new(
        round1(score),
        format!(
            "Net margin: {:.1}% (benchmark: {:.1}%)",
            net_margin * 100.0,
            benchmark_margin * 100.0
        ),
        format!(
            "هامش الربح الصافي: {:.1}% (المعيار: {:.1}%)",
            net_margin * 100.0,
            benchmark_margin * 100.0
        ),
    )
    .with_metric("net_margin", net_margin)
    .with_metric("benchmark", benchmark_margin)
}

/// Months of runway from cash plus receivables.
pub fn liquidity(balance: f64, credit_outstanding: f64, monthly_expenses: f64) -> DimensionScore {
    let runway = ratio_or(balance + credit_outstanding, monthly_expenses, 12.0);

    let score = if runway >= 3.0 {
        (70.0 + runway * 5.0).min(100.0)
    } else if runway >= 1.0 {
        40.0 + runway * 15.0
    } else {
        (runway * 40.0).max(0.0)
    };

    DimensionScore::new(
        round1(score.min(100.0)),
        format!("{:.1} months runway available", runway),
        format!("السيولة تكفي {:.1} شهر", runway),
    )
    .with_metric("runway_months", runway)
    .with_metric("current_balance", balance)
    .with_metric("credit_outstanding", credit_outstanding)
}

/// Collection and overdue rates on extended credit.
///
/// The composite is scaled by 100 before clamping, so it saturates for
/// most healthy books. Kept as-is until product confirms the intent.
pub fn credit_health(given: f64, collected: f64, overdue: f64) -> DimensionScore {
    if given == 0.0 {
        return DimensionScore::new(100.0, "No credit extended", "لا يوجد ائتمان ممنوح");
    }

    let collection_rate = collected / given;
    let overdue_rate = overdue / given;
    let composite = collection_rate * 60.0 + (1.0 - overdue_rate) * 40.0;
    let score = (composite * 100.0).clamp(0.0, 100.0);

    DimensionScore::new(
        round1(score),
        format!(
            "Collection rate: {:.0}%, Overdue: {:.0}%",
            collection_rate * 100.0,
            overdue_rate * 100.0
        ),
        format!(
            "معدل التحصيل: {:.0}%، متأخر: {:.0}%",
            collection_rate * 100.0,
            overdue_rate * 100.0
        ),
    )
    .with_metric("collection_rate", collection_rate)
    .with_metric("overdue_rate", overdue_rate)
}

/// Combined expenses and COGS as a share of sales.
pub fn expense_control(sales: f64, costs: f64, benchmark_ratio: f64) -> DimensionScore {
    if sales == 0.0 {
        return DimensionScore::new(50.0, "No sales to measure against", "لا توجد مبيعات للمقارنة");
    }

    let ratio = costs / sales;
    let score = if ratio <= benchmark_ratio {
        70.0 + ratio_or(benchmark_ratio - ratio, benchmark_ratio, 0.0) * 30.0
    } else {
        (70.0 - ratio_or(ratio - benchmark_ratio, benchmark_ratio, 1.0) * 100.0).max(0.0)
    };

    DimensionScore::new(
        round1(score),
        format!(
            "Expense ratio: {:.0}% (target: <{:.0}%)",
            ratio * 100.0,
            benchmark_ratio * 100.0
        ),
        format!(
            "نسبة المصاريف: {:.0}% (الهدف: <{:.0}%)",
            ratio * 100.0,
            benchmark_ratio * 100.0
        ),
    )
    .with_metric("expense_ratio", ratio)
    .with_metric("benchmark", benchmark_ratio)
}

/// Quarter-over-quarter sales growth.
pub fn growth(current: f64, previous: f64) -> DimensionScore {
    if previous == 0.0 {
        return DimensionScore::new(
            50.0,
            "Not enough history to measure growth",
            "لا توجد بيانات كافية لقياس النمو",
        );
    }

    let rate = (current - previous) / previous;
    let score = if rate >= 0.20 {
        90.0 + (rate * 20.0).min(10.0)
    } else if rate >= 0.10 {
        75.0 + rate * 50.0
    } else if rate >= 0.0 {
        50.0 + rate * 250.0
    } else {
        (50.0 + rate * 100.0).max(0.0)
    };

    DimensionScore::new(
        round1(score.min(100.0)),
        format!("Quarter-over-quarter growth: {:+.1}%", rate * 100.0),
        format!("النمو ربع السنوي: {:+.1}%", rate * 100.0),
    )
    .with_metric("growth_rate", rate)
    .with_metric("current_quarter", current)
    .with_metric("previous_quarter", previous)
}

/// Fixed monthly obligations against monthly income.
pub fn debt_burden(monthly_income: f64, obligations: f64) -> DimensionScore {
    let ratio = if monthly_income == 0.0 {
        if obligations > 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        obligations / monthly_income
    };

    let score = if ratio <= 0.3 {
        90.0 + (0.3 - ratio) * 33.0
    } else if ratio <= 0.5 {
        70.0 + (0.5 - ratio) * 100.0
    } else if ratio <= 0.7 {
        40.0 + (0.7 - ratio) * 150.0
    } else {
        (40.0 - (ratio - 0.7) * 100.0).max(0.0)
    };

    DimensionScore::new(
        round1(score),
        format!("Debt-to-income: {:.0}%", ratio * 100.0),
        format!("نسبة الدين للدخل: {:.0}%", ratio * 100.0),
    )
    .with_metric("debt_to_income", ratio)
    .with_metric("monthly_obligations", obligations)
}

/// Regulatory state of the business profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplianceFlags {
    pub has_trn: bool,
    /// Days until the trade license expires; negative once expired.
    pub license_days_remaining: Option<i64>,
    pub visa_expired: bool,
}

pub fn compliance(flags: &ComplianceFlags) -> DimensionScore {
    let mut score: f64 = 100.0;
    let mut issues = Vec::new();

    if !flags.has_trn {
        score -= 30.0;
        issues.push("No VAT registration");
    }

    match flags.license_days_remaining {
        Some(days) if days < 0 => {
            score -= 50.0;
            issues.push("License expired");
        }
        Some(days) if days < 30 => {
            score -= 20.0;
            issues.push("License expiring soon");
        }
        _ => {}
    }

    if flags.visa_expired {
        score -= 30.0;
        issues.push("Visa expired");
    }

    let (insight, localized) = if issues.is_empty() {
        ("All compliant".to_string(), "متوافق")
    } else {
        (issues.join(", "), "يوجد مشاكل امتثال")
    };

    DimensionScore::new(score.max(0.0), insight, localized).with_metric("issues", issues.len() as f64)
}

/// Weighted mean of the dimension scores, rounded to one decimal.
///
/// Missing dimensions contribute zero.
pub fn overall_score(dimensions: &BTreeMap<Dimension, DimensionScore>, weights: &HealthWeights) -> f64 {
    let total: f64 = Dimension::ALL
        .iter()
        .filter_map(|d| dimensions.get(d).map(|s| s.score * weights.weight(*d) / 100.0))
        .sum();
    round1(total)
}

fn recommendation_text(dimension: Dimension) -> (u8, &'static str, &'static str) {
    match dimension {
        Dimension::Profitability => (
            1,
            "Review pricing strategy and reduce cost of goods",
            "راجع استراتيجية التسعير وقلل تكلفة البضائع",
        ),
        Dimension::Liquidity => (
            2,
            "Accelerate credit collection and build cash reserves",
            "سرّع تحصيل الديون وابني احتياطي نقدي",
        ),
        Dimension::CreditHealth => (
            2,
            "Follow up on overdue payments and tighten credit terms",
            "تابع المدفوعات المتأخرة وشدد شروط الائتمان",
        ),
        Dimension::ExpenseControl => (
            3,
            "Audit expenses and negotiate better supplier terms",
            "راجع المصاريف وفاوض على شروط أفضل مع الموردين",
        ),
        Dimension::Growth => (
            3,
            "Invest in marketing and explore new customer segments",
            "استثمر في التسويق واستكشف شرائح عملاء جديدة",
        ),
        Dimension::DebtBurden => (
            2,
            "Prioritize paying down high-interest obligations",
            "أولوية سداد الالتزامات ذات الفائدة العالية",
        ),
        Dimension::Compliance => (
            1,
            "Update licenses and complete VAT registration",
            "جدد الرخص وأكمل تسجيل ضريبة القيمة المضافة",
        ),
    }
}

/// Static advice for every dimension scoring under 50, most important first.
pub fn dimension_recommendations(
    dimensions: &BTreeMap<Dimension, DimensionScore>,
) -> Vec<HealthRecommendation> {
    let mut recommendations: Vec<HealthRecommendation> = dimensions
        .iter()
        .filter(|(_, s)| s.score < WEAK_DIMENSION)
        .map(|(dimension, s)| {
            let (priority, message, localized) = recommendation_text(*dimension);
            HealthRecommendation {
                dimension: *dimension,
                priority,
                message: message.to_string(),
                message_localized: localized.to_string(),
                score: s.score,
            }
        })
        .collect();

    recommendations.sort_by_key(|r| r.priority);
    recommendations.truncate(MAX_RECOMMENDATIONS);
    recommendations
}

/// Assemble the full report from computed dimensions.
pub fn health_report(
    dimensions: BTreeMap<Dimension, DimensionScore>,
    weights: &HealthWeights,
    business_type: &str,
    calculated_at: DateTime<Utc>,
) -> HealthReport {
    let overall = overall_score(&dimensions, weights);
    let level = HealthLevel::from_score(overall);

    let mut ranked: Vec<(Dimension, f64)> = dimensions.iter().map(|(d, s)| (*d, s.score)).collect();
    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    let top_issues = ranked.iter().take(2).map(|(d, _)| *d).collect();
    let strengths = ranked.iter().rev().take(2).map(|(d, _)| *d).collect();

    let recommendations = dimension_recommendations(&dimensions);

    HealthReport {
        overall_score: overall,
        level,
        color: level.color().to_string(),
        emoji: level.emoji().to_string(),
        dimensions,
        top_issues,
        strengths,
        recommendations,
        business_type: business_type.to_string(),
        calculated_at,
    }
}

/// Direction of stored scores, given newest first.
pub fn health_trend(points: Vec<TrendPoint>) -> HealthTrend {
    if points.len() < 2 {
        return HealthTrend {
            points,
            trend: 0.0,
            direction: TrendDirection::InsufficientData,
        };
    }

    let newest = points.first().map(|p| p.score).unwrap_or(0.0);
    let oldest = points.last().map(|p| p.score).unwrap_or(0.0);
    let trend = round1(newest - oldest);
    let direction = if trend > 0.0 {
        TrendDirection::Improving
    } else if trend < 0.0 {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    HealthTrend {
        points,
        trend,
        direction,
    }
}
