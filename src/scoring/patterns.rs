//! Sales distributions, peak slots and the weekday sales forecast.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::season::seasonal_factor_for;
use super::tables::ScoringTables;
use super::{ratio_or, round1, round2};

/// Minimum number of sales needed before a forecast is produced.
pub const MIN_FORECAST_SALES: usize = 30;

/// One sale as the pattern analysis needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    pub at: NaiveDateTime,
    pub amount: f64,
    pub category: String,
    pub payment_method: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotTotals {
    pub count: usize,
    pub revenue: f64,
}

impl SlotTotals {
    fn add(&mut self, amount: f64) {
        self.count += 1;
        self.revenue += amount;
    }
}

/// English and Arabic day names, Monday first.
pub fn day_names(day: Weekday) -> (&'static str, &'static str) {
    match day {
        Weekday::Mon => ("Monday", "الإثنين"),
        Weekday::Tue => ("Tuesday", "الثلاثاء"),
        Weekday::Wed => ("Wednesday", "الأربعاء"),
        Weekday::Thu => ("Thursday", "الخميس"),
        Weekday::Fri => ("Friday", "الجمعة"),
        Weekday::Sat => ("Saturday", "السبت"),
        Weekday::Sun => ("Sunday", "الأحد"),
    }
}

fn by_revenue(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPattern {
    pub distribution: BTreeMap<u32, SlotTotals>,
    pub peak_hour: u32,
    pub peak_revenue: f64,
}

pub fn hourly_pattern(sales: &[SaleRecord]) -> HourlyPattern {
    let mut distribution: BTreeMap<u32, SlotTotals> = BTreeMap::new();
    for sale in sales {
        distribution.entry(sale.at.hour()).or_default().add(sale.amount);
    }

    let (peak_hour, peak_revenue) = distribution
        .iter()
        .max_by(|a, b| by_revenue(a.1.revenue, b.1.revenue))
        .map(|(hour, totals)| (*hour, totals.revenue))
        .unwrap_or((12, 0.0));

    HourlyPattern {
        distribution,
        peak_hour,
        peak_revenue: round2(peak_revenue),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayTotals {
    pub day: String,
    pub day_localized: String,
    pub count: usize,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPattern {
    pub distribution: Vec<DayTotals>,
    pub peak_day: String,
    pub peak_day_localized: String,
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Totals for all seven weekdays, Monday first. Ties on the peak go to the earlier day.
pub fn daily_pattern(sales: &[SaleRecord]) -> DailyPattern {
    let mut totals = [SlotTotals::default(); 7];
    for sale in sales {
        totals[sale.at.weekday().num_days_from_monday() as usize].add(sale.amount);
    }

    let mut peak = 0;
    for (index, slot) in totals.iter().enumerate() {
        if slot.revenue > totals[peak].revenue {
            peak = index;
        }
    }

    let distribution = WEEK
        .iter()
        .zip(totals.iter())
        .map(|(day, slot)| {
            let (name, localized) = day_names(*day);
            DayTotals {
                day: name.to_string(),
                day_localized: localized.to_string(),
                count: slot.count,
                revenue: round2(slot.revenue),
            }
        })
        .collect();

    let (peak_day, peak_day_localized) = day_names(WEEK[peak]);
    DailyPattern {
        distribution,
        peak_day: peak_day.to_string(),
        peak_day_localized: peak_day_localized.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekTrend {
    Up,
    Down,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyPattern {
    pub weeks: BTreeMap<String, SlotTotals>,
    /// Revenue of the latest week minus the one before.
    pub trend: f64,
    pub direction: WeekTrend,
}

pub fn weekly_pattern(sales: &[SaleRecord]) -> WeeklyPattern {
    let mut weeks: BTreeMap<String, SlotTotals> = BTreeMap::new();
    for sale in sales {
        let iso = sale.at.date().iso_week();
        let key = format!("{}-W{:02}", iso.year(), iso.week());
        weeks.entry(key).or_default().add(sale.amount);
    }

    let mut latest = weeks.values().rev();
    let (trend, direction) = match (latest.next(), latest.next()) {
        (Some(last), Some(previous)) => {
            let trend = round2(last.revenue - previous.revenue);
            let direction = if trend > 0.0 {
                WeekTrend::Up
            } else if trend < 0.0 {
                WeekTrend::Down
            } else {
                WeekTrend::Stable
            };
            (trend, direction)
        }
        _ => (0.0, WeekTrend::InsufficientData),
    };

    WeeklyPattern {
        weeks,
        trend,
        direction,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryCyclePattern {
    pub distribution: BTreeMap<u32, SlotTotals>,
    /// Share of revenue on days 25-31 and 1-5, 0-1.
    pub salary_share: f64,
    pub impact: String,
}

fn is_salary_day(day: u32) -> bool {
    day >= 25 || day <= 5
}

pub fn salary_cycle_pattern(sales: &[SaleRecord]) -> SalaryCyclePattern {
    let mut distribution: BTreeMap<u32, SlotTotals> = BTreeMap::new();
    for sale in sales {
        distribution.entry(sale.at.day()).or_default().add(sale.amount);
    }

    let total: f64 = distribution.values().map(|t| t.revenue).sum();
    let salary: f64 = distribution
        .iter()
        .filter(|(day, _)| is_salary_day(**day))
        .map(|(_, t)| t.revenue)
        .sum();
    let salary_share = ratio_or(salary, total, 0.0);

    SalaryCyclePattern {
        distribution,
        salary_share: round2(salary_share),
        impact: format!("{:.0}% of sales near salary days", salary_share * 100.0),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPattern {
    pub distribution: BTreeMap<String, SlotTotals>,
    pub top_category: Option<String>,
    pub top_category_revenue: f64,
}

pub fn category_pattern(sales: &[SaleRecord]) -> CategoryPattern {
    let mut distribution: BTreeMap<String, SlotTotals> = BTreeMap::new();
    for sale in sales {
        distribution
            .entry(sale.category.clone())
            .or_default()
            .add(sale.amount);
    }

    let top = distribution
        .iter()
        .max_by(|a, b| by_revenue(a.1.revenue, b.1.revenue))
        .map(|(name, totals)| (name.clone(), totals.revenue));

    CategoryPattern {
        top_category_revenue: top.as_ref().map(|t| round2(t.1)).unwrap_or(0.0),
        top_category: top.map(|t| t.0),
        distribution,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaymentShare {
    pub count: usize,
    pub revenue: f64,
    pub percentage: f64,
}

pub fn payment_pattern(sales: &[SaleRecord]) -> BTreeMap<String, PaymentShare> {
    let mut methods: BTreeMap<String, SlotTotals> = BTreeMap::new();
    for sale in sales {
        methods
            .entry(sale.payment_method.clone())
            .or_default()
            .add(sale.amount);
    }

    let total: f64 = methods.values().map(|t| t.revenue).sum();
    methods
        .into_iter()
        .map(|(method, totals)| {
            let share = PaymentShare {
                count: totals.count,
                revenue: round2(totals.revenue),
                percentage: round1(ratio_or(totals.revenue, total, 0.0) * 100.0),
            };
            (method, share)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInsight {
    pub kind: String,
    pub insight: String,
    pub insight_localized: String,
    pub priority: String,
}

fn insight(kind: &str, text: String, localized: String, priority: &str) -> PatternInsight {
    PatternInsight {
        kind: kind.to_string(),
        insight: text,
        insight_localized: localized,
        priority: priority.to_string(),
    }
}

pub fn pattern_insights(
    hourly: &HourlyPattern,
    daily: &DailyPattern,
    weekly: &WeeklyPattern,
) -> Vec<PatternInsight> {
    let mut insights = vec![
        insight(
            "timing",
            format!(
                "Peak sales hour is {:02}:00 - consider extra staff",
                hourly.peak_hour
            ),
            format!(
                "ساعة الذروة هي {:02}:00 - فكر في موظفين إضافيين",
                hourly.peak_hour
            ),
            "medium",
        ),
        insight(
            "timing",
            format!("{} is your best day - ensure full stock", daily.peak_day),
            format!(
                "{} هو أفضل يوم - تأكد من توفر المخزون",
                daily.peak_day_localized
            ),
            "high",
        ),
    ];

    match weekly.direction {
        WeekTrend::Down => insights.push(insight(
            "alert",
            format!(
                "Sales declining - down AED {:.0} vs last week",
                weekly.trend.abs()
            ),
            format!(
                "المبيعات تنخفض - أقل {:.0} درهم من الأسبوع الماضي",
                weekly.trend.abs()
            ),
            "high",
        )),
        WeekTrend::Up => insights.push(insight(
            "positive",
            format!("Sales growing - up AED {:.0} vs last week", weekly.trend),
            format!(
                "المبيعات تنمو - أعلى {:.0} درهم من الأسبوع الماضي",
                weekly.trend
            ),
            "low",
        )),
        WeekTrend::Stable | WeekTrend::InsufficientData => {}
    }

    insights
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub day: String,
    pub day_localized: String,
    pub hour: u32,
    pub time_range: String,
    pub transaction_count: usize,
    pub revenue: f64,
    pub avg_transaction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffingAdvice {
    pub kind: String,
    pub recommendation: String,
    pub recommendation_localized: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakTimes {
    pub peak: Vec<TimeSlot>,
    pub slow: Vec<TimeSlot>,
    pub recommendations: Vec<StaffingAdvice>,
}

/// Top 10 and bottom 5 (weekday, hour) slots by revenue.
pub fn peak_times(sales: &[SaleRecord]) -> PeakTimes {
    let mut slots: BTreeMap<(u32, u32), SlotTotals> = BTreeMap::new();
    for sale in sales {
        let key = (sale.at.weekday().num_days_from_monday(), sale.at.hour());
        slots.entry(key).or_default().add(sale.amount);
    }

    let mut all: Vec<TimeSlot> = slots
        .into_iter()
        .map(|((day, hour), totals)| {
            let (name, localized) = day_names(WEEK[day as usize]);
            TimeSlot {
                day: name.to_string(),
                day_localized: localized.to_string(),
                hour,
                time_range: format!("{:02}:00 - {:02}:00", hour, hour + 1),
                transaction_count: totals.count,
                revenue: round2(totals.revenue),
                avg_transaction: round2(ratio_or(totals.revenue, totals.count as f64, 0.0)),
            }
        })
        .collect();

    all.sort_by(|a, b| by_revenue(b.revenue, a.revenue));
    let peak: Vec<TimeSlot> = all.iter().take(10).cloned().collect();
    let slow: Vec<TimeSlot> = all.iter().rev().take(5).cloned().collect();

    let mut recommendations = Vec::new();
    if let Some(top) = peak.first() {
        recommendations.push(StaffingAdvice {
            kind: "staffing".to_string(),
            recommendation: format!("Add staff {} on {}s", top.time_range, top.day),
            recommendation_localized: format!(
                "أضف موظفين {} أيام {}",
                top.time_range, top.day_localized
            ),
            reason: format!("Highest revenue slot: AED {:.0}", top.revenue),
        });
    }
    if let Some(low) = slow.first() {
        recommendations.push(StaffingAdvice {
            kind: "efficiency".to_string(),
            recommendation: format!(
                "Consider reducing staff {} on {}s",
                low.time_range, low.day
            ),
            recommendation_localized: format!(
                "فكر في تقليل الموظفين {} أيام {}",
                low.time_range, low.day_localized
            ),
            reason: format!("Lowest revenue slot: AED {:.0}", low.revenue),
        });
    }

    PeakTimes {
        peak,
        slow,
        recommendations,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesPatterns {
    pub total_transactions: usize,
    pub total_revenue: f64,
    pub hourly: HourlyPattern,
    pub daily: DailyPattern,
    pub weekly: WeeklyPattern,
    pub salary_cycle: SalaryCyclePattern,
    pub category: CategoryPattern,
    pub payment_method: BTreeMap<String, PaymentShare>,
    pub peak_times: PeakTimes,
    pub insights: Vec<PatternInsight>,
}

/// Every distribution for a set of sales. Returns `None` when there are no sales.
pub fn sales_patterns(sales: &[SaleRecord]) -> Option<SalesPatterns> {
    if sales.is_empty() {
        return None;
    }

    let hourly = hourly_pattern(sales);
    let daily = daily_pattern(sales);
    let weekly = weekly_pattern(sales);
    let insights = pattern_insights(&hourly, &daily, &weekly);

    Some(SalesPatterns {
        total_transactions: sales.len(),
        total_revenue: round2(sales.iter().map(|s| s.amount).sum()),
        hourly,
        daily,
        weekly,
        salary_cycle: salary_cycle_pattern(sales),
        category: category_pattern(sales),
        payment_method: payment_pattern(sales),
        peak_times: peak_times(sales),
        insights,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub day: String,
    pub day_localized: String,
    pub predicted_sales: f64,
    pub season: String,
    pub seasonal_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesForecast {
    pub days_ahead: u32,
    pub total_predicted: f64,
    pub daily_average_predicted: f64,
    pub confidence_percent: f64,
    pub forecasts: Vec<ForecastDay>,
}

/// Forecast revenue for the `days_ahead` days after `today`.
///
/// Each day uses the average revenue of past days with the same weekday,
/// falling back to the overall daily average, times the season factor.
/// Returns `None` with fewer than [`MIN_FORECAST_SALES`] sales.
pub fn sales_forecast(
    sales: &[SaleRecord],
    days_ahead: u32,
    today: NaiveDate,
    tables: &ScoringTables,
) -> Option<SalesForecast> {
    if sales.len() < MIN_FORECAST_SALES {
        return None;
    }

    let mut per_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for sale in sales {
        *per_day.entry(sale.at.date()).or_default() += sale.amount;
    }

    let mut per_weekday: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for (date, total) in &per_day {
        per_weekday
            .entry(date.weekday().num_days_from_monday())
            .or_default()
            .push(*total);
    }
    let weekday_average: BTreeMap<u32, f64> = per_weekday
        .into_iter()
        .map(|(day, totals)| (day, ratio_or(totals.iter().sum(), totals.len() as f64, 0.0)))
        .collect();

    let days = per_day.len() as f64;
    let overall = ratio_or(per_day.values().sum(), days, 0.0);

    let mut forecasts = Vec::new();
    let mut total = 0.0;
    for offset in 1..=days_ahead {
        let date = today + Duration::days(offset as i64);
        let weekday = date.weekday();
        let base = weekday_average
            .get(&weekday.num_days_from_monday())
            .copied()
            .unwrap_or(overall);
        let (season, factor) = seasonal_factor_for(date, tables);
        let predicted = base * factor;
        total += predicted;

        let (name, localized) = day_names(weekday);
        forecasts.push(ForecastDay {
            date,
            day: name.to_string(),
            day_localized: localized.to_string(),
            predicted_sales: round2(predicted),
            season,
            seasonal_factor: factor,
        });
    }

    let variance = ratio_or(
        per_day.values().map(|v| (v - overall).powi(2)).sum(),
        days,
        0.0,
    );
    let cv = if overall > 0.0 {
        variance.sqrt() / overall
    } else {
        1.0
    };
    let confidence = (80.0 - cv * 30.0).clamp(0.0, 95.0);

    Some(SalesForecast {
        days_ahead,
        total_predicted: round2(total),
        daily_average_predicted: round2(ratio_or(total, days_ahead as f64, 0.0)),
        confidence_percent: confidence.round(),
        forecasts,
    })
}

/// Customers kept per segment, highest revenue first.
pub const SEGMENT_LIMIT: usize = 10;

/// Days since last purchase for a customer with no dated sale.
pub const NEVER_PURCHASED_DAYS: i64 = 999;

/// One sale attributed to a customer.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerSale {
    pub customer_id: String,
    pub customer_name: String,
    pub amount: f64,
    pub at: Option<NaiveDateTime>,
}

/// Purchase history of one customer, summed from their sales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerActivity {
    pub customer_id: String,
    pub customer_name: String,
    pub total_revenue: f64,
    pub transaction_count: usize,
    pub avg_transaction: f64,
    pub days_since_last: i64,
}

/// Sum sales per customer, ordered by customer id.
pub fn customer_activity(sales: &[CustomerSale], now: NaiveDateTime) -> Vec<CustomerActivity> {
    struct Totals<'a> {
        name: &'a str,
        revenue: f64,
        count: usize,
        last: Option<NaiveDateTime>,
    }

    let mut per_customer: BTreeMap<&str, Totals<'_>> = BTreeMap::new();
    for sale in sales {
        let totals = per_customer
            .entry(sale.customer_id.as_str())
            .or_insert(Totals {
                name: "",
                revenue: 0.0,
                count: 0,
                last: None,
            });
        totals.revenue += sale.amount;
        totals.count += 1;
        if !sale.customer_name.is_empty() {
            totals.name = &sale.customer_name;
        }
        if sale.at > totals.last {
            totals.last = sale.at;
        }
    }

    per_customer
        .into_iter()
        .map(|(id, totals)| CustomerActivity {
            customer_id: id.to_string(),
            customer_name: if totals.name.is_empty() {
                "Unknown".to_string()
            } else {
                totals.name.to_string()
            },
            total_revenue: totals.revenue,
            transaction_count: totals.count,
            avg_transaction: round2(ratio_or(totals.revenue, totals.count as f64, 0.0)),
            days_since_last: totals
                .last
                .map(|last| (now - last).num_days())
                .unwrap_or(NEVER_PURCHASED_DAYS),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    HighValue,
    Regular,
    AtRisk,
    Occasional,
}

impl SegmentKind {
    /// First matching rule wins: high value, then regular, then at risk.
    pub fn classify(customer: &CustomerActivity) -> Self {
        let average = ratio_or(
            customer.total_revenue,
            customer.transaction_count as f64,
            0.0,
        );
        if average >= 500.0 && customer.transaction_count >= 5 {
            SegmentKind::HighValue
        } else if customer.transaction_count >= 10 {
            SegmentKind::Regular
        } else if customer.days_since_last > 60 && customer.total_revenue > 1000.0 {
            SegmentKind::AtRisk
        } else {
            SegmentKind::Occasional
        }
    }

    fn labels(self) -> (&'static str, &'static str, &'static str) {
        match self {
            SegmentKind::HighValue => (
                "High Value Customers",
                "عملاء ذوي قيمة عالية",
                "Frequent buyers with high transaction values",
            ),
            SegmentKind::Regular => (
                "Regular Customers",
                "عملاء منتظمون",
                "Consistent repeat buyers",
            ),
            SegmentKind::AtRisk => (
                "At-Risk Customers",
                "عملاء معرضون للخسارة",
                "Previously active but haven't purchased recently",
            ),
            SegmentKind::Occasional => (
                "Occasional Customers",
                "عملاء عرضيون",
                "Infrequent buyers",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSegment {
    pub label: String,
    pub label_localized: String,
    pub description: String,
    /// Customers listed, at most [`SEGMENT_LIMIT`].
    pub count: usize,
    pub customers: Vec<CustomerActivity>,
}

impl CustomerSegment {
    fn new(kind: SegmentKind, mut customers: Vec<CustomerActivity>) -> Self {
        customers.sort_by(|a, b| by_revenue(b.total_revenue, a.total_revenue));
        customers.truncate(SEGMENT_LIMIT);
        let (label, localized, description) = kind.labels();
        Self {
            label: label.to_string(),
            label_localized: localized.to_string(),
            description: description.to_string(),
            count: customers.len(),
            customers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSegments {
    pub high_value: CustomerSegment,
    pub regular: CustomerSegment,
    pub at_risk: CustomerSegment,
    pub occasional: CustomerSegment,
}

/// RFM-style buckets of customers. Returns `None` when there are no customers.
pub fn customer_segments(customers: Vec<CustomerActivity>) -> Option<CustomerSegments> {
    if customers.is_empty() {
        return None;
    }

    let mut buckets: BTreeMap<SegmentKind, Vec<CustomerActivity>> = BTreeMap::new();
    for customer in customers {
        buckets
            .entry(SegmentKind::classify(&customer))
            .or_default()
            .push(customer);
    }
    let mut take = |kind: SegmentKind| CustomerSegment::new(kind, buckets.remove(&kind).unwrap_or_default());

    Some(CustomerSegments {
        high_value: take(SegmentKind::HighValue),
        regular: take(SegmentKind::Regular),
        at_risk: take(SegmentKind::AtRisk),
        occasional: take(SegmentKind::Occasional),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(date: (i32, u32, u32), hour: u32, amount: f64, category: &str, method: &str) -> SaleRecord {
        SaleRecord {
            at: NaiveDate::from_ymd_opt(date.0, date.1, date.2)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            amount,
            category: category.to_string(),
            payment_method: method.to_string(),
        }
    }

    fn sample() -> Vec<SaleRecord> {
        vec![
            // 2026-10-05 is a Monday
            sale((2026, 10, 5), 10, 100.0, "grocery", "cash"),
            sale((2026, 10, 5), 19, 300.0, "grocery", "card"),
            sale((2026, 10, 9), 19, 500.0, "snacks", "card"),
            sale((2026, 10, 12), 11, 200.0, "grocery", "cash"),
            sale((2026, 10, 16), 19, 100.0, "grocery", "cash"),
        ]
    }

    #[test]
    fn test_hourly_peak() {
        let hourly = hourly_pattern(&sample());
        assert_eq!(hourly.peak_hour, 19);
        assert_eq!(hourly.peak_revenue, 900.0);
        assert_eq!(hourly.distribution[&10].count, 1);
    }

    #[test]
    fn test_hourly_defaults_to_noon_when_empty() {
        let hourly = hourly_pattern(&[]);
        assert_eq!(hourly.peak_hour, 12);
        assert_eq!(hourly.peak_revenue, 0.0);
    }

    #[test]
    fn test_daily_pattern() {
        let daily = daily_pattern(&sample());
        assert_eq!(daily.distribution.len(), 7);
        assert_eq!(daily.distribution[0].revenue, 600.0);
        assert_eq!(daily.peak_day, "Monday");
        assert_eq!(daily.peak_day_localized, "الإثنين");
    }

    #[test]
    fn test_weekly_trend() {
        let weekly = weekly_pattern(&sample());
        assert_eq!(weekly.weeks.len(), 2);
        // week 41: 900, week 42: 300
        assert_eq!(weekly.trend, -600.0);
        assert_eq!(weekly.direction, WeekTrend::Down);

        let single = weekly_pattern(&sample()[..2]);
        assert_eq!(single.direction, WeekTrend::InsufficientData);
    }

    #[test]
    fn test_salary_cycle_share() {
        let sales = vec![
            sale((2026, 9, 28), 10, 300.0, "a", "cash"),
            sale((2026, 10, 2), 10, 100.0, "a", "cash"),
            sale((2026, 10, 15), 10, 400.0, "a", "cash"),
        ];
        let cycle = salary_cycle_pattern(&sales);
        assert_eq!(cycle.salary_share, 0.5);
        assert_eq!(cycle.impact, "50% of sales near salary days");
    }

    #[test]
    fn test_category_and_payment() {
        let category = category_pattern(&sample());
        assert_eq!(category.top_category.as_deref(), Some("grocery"));
        assert_eq!(category.top_category_revenue, 700.0);

        let payment = payment_pattern(&sample());
        assert_eq!(payment["card"].percentage, 66.7);
        assert_eq!(payment["cash"].count, 3);
    }

    #[test]
    fn test_insights_include_trend() {
        let patterns = sales_patterns(&sample()).unwrap();
        assert_eq!(patterns.insights.len(), 3);
        assert_eq!(patterns.insights[2].kind, "alert");
        assert_eq!(
            patterns.insights[2].insight,
            "Sales declining - down AED 600 vs last week"
        );
        assert_eq!(patterns.total_revenue, 1_200.0);
    }

    #[test]
    fn test_no_sales_no_patterns() {
        assert!(sales_patterns(&[]).is_none());
    }

    #[test]
    fn test_peak_times() {
        let peaks = peak_times(&sample());
        assert_eq!(peaks.peak[0].day, "Friday");
        assert_eq!(peaks.peak[0].time_range, "19:00 - 20:00");
        assert_eq!(peaks.slow.len(), 4);
        assert_eq!(peaks.slow[0].revenue, 100.0);
        assert_eq!(peaks.recommendations.len(), 2);
        assert_eq!(peaks.recommendations[0].recommendation, "Add staff 19:00 - 20:00 on Fridays");
    }

    #[test]
    fn test_forecast_requires_history() {
        let tables = ScoringTables::default();
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        assert!(sales_forecast(&sample(), 7, today, &tables).is_none());
    }

    #[test]
    fn test_forecast_uses_weekday_averages() {
        let tables = ScoringTables::default();
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        let start = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let sales: Vec<SaleRecord> = (0..35)
            .map(|i| {
                let day = start + Duration::days(i);
                SaleRecord {
                    at: day.and_hms_opt(12, 0, 0).unwrap(),
                    amount: 100.0,
                    category: "grocery".to_string(),
                    payment_method: "cash".to_string(),
                }
            })
            .collect();

        let forecast = sales_forecast(&sales, 7, today, &tables).unwrap();
        assert_eq!(forecast.forecasts.len(), 7);
        assert_eq!(forecast.forecasts[0].date, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
        assert_eq!(forecast.forecasts[0].predicted_sales, 100.0);
        assert_eq!(forecast.total_predicted, 700.0);
        // perfectly flat history: cv = 0
        assert_eq!(forecast.confidence_percent, 80.0);
    }

    fn activity(id: &str, revenue: f64, count: usize, days_since_last: i64) -> CustomerActivity {
        CustomerActivity {
            customer_id: id.to_string(),
            customer_name: id.to_uppercase(),
            total_revenue: revenue,
            transaction_count: count,
            avg_transaction: round2(revenue / count as f64),
            days_since_last,
        }
    }

    #[test]
    fn test_segment_boundaries() {
        let kind = |revenue, count, days| SegmentKind::classify(&activity("c", revenue, count, days));

        assert_eq!(kind(2_500.0, 5, 3), SegmentKind::HighValue);
        assert_eq!(kind(2_499.5, 5, 3), SegmentKind::Occasional);
        assert_eq!(kind(2_400.0, 4, 3), SegmentKind::Occasional);

        assert_eq!(kind(1_000.0, 10, 3), SegmentKind::Regular);
        assert_eq!(kind(900.0, 9, 3), SegmentKind::Occasional);
        // high value is checked before regular
        assert_eq!(kind(6_000.0, 12, 3), SegmentKind::HighValue);

        assert_eq!(kind(1_000.5, 2, 61), SegmentKind::AtRisk);
        assert_eq!(kind(1_000.5, 2, 60), SegmentKind::Occasional);
        assert_eq!(kind(1_000.0, 2, 90), SegmentKind::Occasional);
        // frequent buyers stay regular however long ago they bought
        assert_eq!(kind(2_000.0, 10, 200), SegmentKind::Regular);
    }

    #[test]
    fn test_segments_keep_top_ten_by_revenue() {
        let customers: Vec<CustomerActivity> = (1..=15)
            .map(|i| activity(&format!("c{:02}", i), i as f64 * 10.0, 1, 5))
            .collect();

        let segments = customer_segments(customers).unwrap();
        let occasional = &segments.occasional;
        assert_eq!(occasional.count, SEGMENT_LIMIT);
        assert_eq!(occasional.customers.len(), SEGMENT_LIMIT);
        assert_eq!(occasional.customers[0].customer_id, "c15");
        assert_eq!(occasional.customers[9].customer_id, "c06");
        assert_eq!(occasional.label, "Occasional Customers");

        assert_eq!(segments.high_value.count, 0);
        assert!(segments.at_risk.customers.is_empty());
    }

    #[test]
    fn test_segments_empty() {
        assert!(customer_segments(Vec::new()).is_none());
    }

    #[test]
    fn test_customer_activity_totals() {
        let now = NaiveDate::from_ymd_opt(2026, 10, 15)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let at = |m, d| NaiveDate::from_ymd_opt(2026, m, d).unwrap().and_hms_opt(9, 0, 0);
        let sale = |id: &str, name: &str, amount, at| CustomerSale {
            customer_id: id.to_string(),
            customer_name: name.to_string(),
            amount,
            at,
        };

        let activity = customer_activity(
            &[
                sale("c1", "Karama Cafeteria", 300.0, at(10, 1)),
                sale("c1", "", 100.0, at(10, 12)),
                sale("c2", "", 50.0, None),
            ],
            now,
        );

        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].customer_name, "Karama Cafeteria");
        assert_eq!(activity[0].total_revenue, 400.0);
        assert_eq!(activity[0].transaction_count, 2);
        assert_eq!(activity[0].avg_transaction, 200.0);
        assert_eq!(activity[0].days_since_last, 3);

        assert_eq!(activity[1].customer_name, "Unknown");
        assert_eq!(activity[1].days_since_last, NEVER_PURCHASED_DAYS);
    }
}
