//! Data models for merchant scoring.
//!
//! This module contains the core data structures shared between the
//! scoring library, the agents, the orchestrator and report rendering.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// An inclusive date window used for every aggregate query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FinancialPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Resolve a period token relative to `today`.
    ///
    /// Unknown tokens fall back to the month-to-date window.
    pub fn from_token(token: &str, today: NaiveDate) -> Self {
        let start = match token {
            "daily" => today,
            "weekly" => today - Duration::days(today.weekday().num_days_from_monday() as i64),
            "quarterly" => quarter_start(today.year(), quarter_of(today)).unwrap_or(today),
            "yearly" => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
            _ => today.with_day(1).unwrap_or(today),
        };
        Self { start, end: today }
    }

    /// Parse a `"YYYY-Qn"` token into a quarter window.
    ///
    /// The window runs 91 days from the first day of the quarter.
    pub fn from_quarter(token: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput(format!("Invalid quarter '{}', expected YYYY-Qn", token));

        let (year, quarter) = token.trim().split_once("-Q").ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let quarter: u32 = quarter.parse().map_err(|_| invalid())?;
        if !(1..=4).contains(&quarter) {
            return Err(invalid());
        }

        let start = quarter_start(year, quarter).ok_or_else(invalid)?;
        Ok(Self {
            start,
            end: start + Duration::days(91),
        })
    }

    /// The quarter containing `today`, as a `"YYYY-Qn"` token.
    pub fn current_quarter_token(today: NaiveDate) -> String {
        format!("{}-Q{}", today.year(), quarter_of(today))
    }

    /// Rolling window covering the last `days` days up to `today`.
    pub fn last_days(days: i64, today: NaiveDate) -> Self {
        Self {
            start: today - Duration::days(days),
            end: today,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Exclusive upper bound, for filtering timestamp columns.
    pub fn end_exclusive(&self) -> NaiveDate {
        self.end + Duration::days(1)
    }
}

impl fmt::Display for FinancialPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

pub fn quarter_of(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

fn quarter_start(year: i32, quarter: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1)
}

/// Summed figures for one user over one period. Never cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateFigures {
    pub sales: f64,
    pub cogs: f64,
    pub expenses: f64,
    pub vat_collected: f64,
    pub vat_paid: f64,
    pub credit_outstanding: f64,
    pub credit_collected: f64,
    pub credit_overdue: f64,
}

/// Score for a single health dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    /// Score in the range 0-100.
    pub score: f64,
    pub insight: String,
    /// Arabic rendering of the insight.
    pub insight_localized: String,
    /// Supporting figures that produced the score.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl DimensionScore {
    pub fn new(score: f64, insight: impl Into<String>, insight_localized: impl Into<String>) -> Self {
        Self {
            score,
            insight: insight.into(),
            insight_localized: insight_localized.into(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }
}

/// The seven weighted health dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Profitability,
    Liquidity,
    CreditHealth,
    ExpenseControl,
    Growth,
    DebtBurden,
    Compliance,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Profitability,
        Dimension::Liquidity,
        Dimension::CreditHealth,
        Dimension::ExpenseControl,
        Dimension::Growth,
        Dimension::DebtBurden,
        Dimension::Compliance,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Dimension::Profitability => "profitability",
            Dimension::Liquidity => "liquidity",
            Dimension::CreditHealth => "credit_health",
            Dimension::ExpenseControl => "expense_control",
            Dimension::Growth => "growth",
            Dimension::DebtBurden => "debt_burden",
            Dimension::Compliance => "compliance",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Overall health level, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthLevel {
    Critical,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl HealthLevel {
    /// Thresholds in descending order; the first match wins.
    const THRESHOLDS: [(f64, HealthLevel); 5] = [
        (80.0, HealthLevel::Excellent),
        (60.0, HealthLevel::Good),
        (40.0, HealthLevel::Fair),
        (20.0, HealthLevel::Poor),
        (0.0, HealthLevel::Critical),
    ];

    pub fn from_score(score: f64) -> Self {
        Self::THRESHOLDS
            .iter()
            .find(|(min, _)| score >= *min)
            .map(|(_, level)| *level)
            .unwrap_or(HealthLevel::Critical)
    }

    pub fn color(&self) -> &'static str {
        match self {
            HealthLevel::Excellent => "green",
            HealthLevel::Good => "blue",
            HealthLevel::Fair => "yellow",
            HealthLevel::Poor => "orange",
            HealthLevel::Critical => "red",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            HealthLevel::Excellent => "🟢",
            HealthLevel::Good => "🔵",
            HealthLevel::Fair => "🟡",
            HealthLevel::Poor => "🟠",
            HealthLevel::Critical => "🔴",
        }
    }
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthLevel::Excellent => write!(f, "EXCELLENT"),
            HealthLevel::Good => write!(f, "GOOD"),
            HealthLevel::Fair => write!(f, "FAIR"),
            HealthLevel::Poor => write!(f, "POOR"),
            HealthLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A fix suggested for a weak health dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecommendation {
    pub dimension: Dimension,
    pub priority: u8,
    pub message: String,
    pub message_localized: String,
    pub score: f64,
}

/// Weighted business-health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_score: f64,
    pub level: HealthLevel,
    pub color: String,
    pub emoji: String,
    pub dimensions: BTreeMap<Dimension, DimensionScore>,
    pub top_issues: Vec<Dimension>,
    pub strengths: Vec<Dimension>,
    pub recommendations: Vec<HealthRecommendation>,
    pub business_type: String,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub score: f64,
    pub calculated_at: String,
}

/// Movement of historic health scores, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthTrend {
    pub points: Vec<TrendPoint>,
    pub trend: f64,
    pub direction: TrendDirection,
}

/// Customer credit risk bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub fn from_trust(score: f64) -> Self {
        if score >= 80.0 {
            RiskLevel::Low
        } else if score >= 60.0 {
            RiskLevel::Medium
        } else if score >= 40.0 {
            RiskLevel::High
        } else {
            RiskLevel::VeryHigh
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::VeryHigh => write!(f, "VERY_HIGH"),
        }
    }
}

/// Individual adjustments that make up a trust score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustBreakdown {
    pub base: f64,
    pub punctuality: f64,
    pub speed: f64,
    pub bounced_cheques: f64,
    pub relationship: f64,
    pub volume: f64,
}

/// Per-customer credit assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditProfile {
    pub customer_id: String,
    pub customer_name: String,
    pub trust_score: f64,
    pub risk_level: RiskLevel,
    /// Recommended credit limit in AED; zero means cash only.
    pub recommended_limit: f64,
    pub current_outstanding: f64,
    pub factors: TrustBreakdown,
}

/// Collection urgency, ordered most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CollectionUrgency {
    Immediate,
    Urgent,
    Normal,
    Low,
}

impl CollectionUrgency {
    pub fn from_days_overdue(days: i64) -> Self {
        if days >= 60 {
            CollectionUrgency::Immediate
        } else if days >= 30 {
            CollectionUrgency::Urgent
        } else if days >= 7 {
            CollectionUrgency::Normal
        } else {
            CollectionUrgency::Low
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            CollectionUrgency::Immediate => "Personal visit or legal notice",
            CollectionUrgency::Urgent => "Phone call and formal reminder",
            CollectionUrgency::Normal => "Send WhatsApp/SMS reminder",
            CollectionUrgency::Low => "Monitor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub customer_id: String,
    pub customer_name: String,
    pub outstanding: f64,
    pub days_overdue: i64,
    pub urgency: CollectionUrgency,
    pub action: String,
    pub trust_score: f64,
    pub risk_weighted_amount: f64,
}

/// Reorder urgency, ordered most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReorderUrgency {
    Critical,
    High,
    Medium,
    Low,
}

impl ReorderUrgency {
    pub fn color(&self) -> &'static str {
        match self {
            ReorderUrgency::Critical => "red",
            ReorderUrgency::High => "orange",
            ReorderUrgency::Medium => "yellow",
            ReorderUrgency::Low => "blue",
        }
    }
}

impl fmt::Display for ReorderUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReorderUrgency::Critical => write!(f, "CRITICAL"),
            ReorderUrgency::High => write!(f, "HIGH"),
            ReorderUrgency::Medium => write!(f, "MEDIUM"),
            ReorderUrgency::Low => write!(f, "LOW"),
        }
    }
}

/// Reorder signal for one inventory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderAlert {
    pub item_id: String,
    pub item_name: String,
    pub category: String,
    pub current_stock: f64,
    pub reorder_point: f64,
    pub dynamic_reorder_point: f64,
    pub recommended_quantity: u64,
    pub days_until_stockout: f64,
    pub lead_time_days: u32,
    pub urgency: ReorderUrgency,
    pub color: String,
    pub season: String,
    pub seasonal_factor: f64,
    pub unit_cost: f64,
    pub estimated_order_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
    pub supplier_name: String,
}

/// Recommendation category with a fixed ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationCategory {
    Urgent,
    Financial,
    Operational,
    Growth,
    Compliance,
    Opportunity,
}

impl RecommendationCategory {
    pub fn priority(&self) -> u8 {
        match self {
            RecommendationCategory::Urgent => 1,
            RecommendationCategory::Financial => 2,
            RecommendationCategory::Operational => 3,
            RecommendationCategory::Growth => 4,
            RecommendationCategory::Compliance => 5,
            RecommendationCategory::Opportunity => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationCategory::Urgent => "urgent",
            RecommendationCategory::Financial => "financial",
            RecommendationCategory::Operational => "operational",
            RecommendationCategory::Growth => "growth",
            RecommendationCategory::Compliance => "compliance",
            RecommendationCategory::Opportunity => "opportunity",
        }
    }
}

impl std::str::FromStr for RecommendationCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "urgent" => Ok(RecommendationCategory::Urgent),
            "financial" => Ok(RecommendationCategory::Financial),
            "operational" => Ok(RecommendationCategory::Operational),
            "growth" => Ok(RecommendationCategory::Growth),
            "compliance" => Ok(RecommendationCategory::Compliance),
            "opportunity" => Ok(RecommendationCategory::Opportunity),
            other => Err(Error::InvalidInput(format!("Invalid category: {}", other))),
        }
    }
}

impl fmt::Display for RecommendationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ranked action item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Stable per source, e.g. `urgent_credit_<customer>`.
    pub id: String,
    pub category: RecommendationCategory,
    pub priority: u8,
    pub impact_score: f64,
    /// Potential monthly value in AED.
    pub potential_aed: f64,
    pub title: String,
    pub title_localized: String,
    pub description: String,
    pub action: String,
    pub action_localized: String,
    /// Agent whose figures produced the item.
    pub source: String,
}

impl Recommendation {
    pub fn new(
        id: impl Into<String>,
        category: RecommendationCategory,
        impact_score: f64,
        source: &str,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            priority: category.priority(),
            impact_score,
            potential_aed: 0.0,
            title: String::new(),
            title_localized: String::new(),
            description: String::new(),
            action: String::new(),
            action_localized: String::new(),
            source: source.to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>, localized: impl Into<String>) -> Self {
        self.title = title.into();
        self.title_localized = localized.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>, localized: impl Into<String>) -> Self {
        self.action = action.into();
        self.action_localized = localized.into();
        self
    }

    pub fn with_potential(mut self, potential_aed: f64) -> Self {
        self.potential_aed = potential_aed;
        self
    }
}

/// Status a merchant can set on a stored recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Completed,
    Dismissed,
    Snoozed,
}

impl std::str::FromStr for ActionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "completed" => Ok(ActionStatus::Completed),
            "dismissed" => Ok(ActionStatus::Dismissed),
            "snoozed" => Ok(ActionStatus::Snoozed),
            other => Err(Error::InvalidInput(format!("Invalid action: {}", other))),
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Completed => write!(f, "completed"),
            ActionStatus::Dismissed => write!(f, "dismissed"),
            ActionStatus::Snoozed => write!(f, "snoozed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
}

/// Progress of an orchestration run for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStatus {
    pub status: RunStatus,
    pub agents_completed: usize,
    pub total_agents: usize,
    pub last_updated: DateTime<Utc>,
}

impl AnalysisStatus {
    pub fn started(total_agents: usize) -> Self {
        Self {
            status: RunStatus::InProgress,
            agents_completed: 0,
            total_agents,
            last_updated: Utc::now(),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == RunStatus::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_from_token() {
        let today = date(2026, 10, 15); // Thursday

        assert_eq!(FinancialPeriod::from_token("daily", today).start, today);
        assert_eq!(FinancialPeriod::from_token("weekly", today).start, date(2026, 10, 12));
        assert_eq!(FinancialPeriod::from_token("monthly", today).start, date(2026, 10, 1));
        assert_eq!(FinancialPeriod::from_token("quarterly", today).start, date(2026, 10, 1));
        assert_eq!(FinancialPeriod::from_token("yearly", today).start, date(2026, 1, 1));
        assert_eq!(FinancialPeriod::from_token("fortnightly", today).start, date(2026, 10, 1));
        assert_eq!(FinancialPeriod::from_token("monthly", today).end, today);
    }

    #[test]
    fn test_period_from_quarter() {
        let period = FinancialPeriod::from_quarter("2026-Q2").unwrap();
        assert_eq!(period.start, date(2026, 4, 1));
        assert_eq!(period.end, date(2026, 7, 1));

        assert!(FinancialPeriod::from_quarter("2026-Q5").is_err());
        assert!(FinancialPeriod::from_quarter("2026Q1").is_err());
        assert!(FinancialPeriod::from_quarter("abcd-Q1").is_err());
    }

    #[test]
    fn test_current_quarter_token() {
        assert_eq!(FinancialPeriod::current_quarter_token(date(2026, 2, 10)), "2026-Q1");
        assert_eq!(FinancialPeriod::current_quarter_token(date(2026, 12, 31)), "2026-Q4");
    }

    #[test]
    fn test_health_level_thresholds() {
        assert_eq!(HealthLevel::from_score(100.0), HealthLevel::Excellent);
        assert_eq!(HealthLevel::from_score(80.0), HealthLevel::Excellent);
        assert_eq!(HealthLevel::from_score(79.9), HealthLevel::Good);
        assert_eq!(HealthLevel::from_score(40.0), HealthLevel::Fair);
        assert_eq!(HealthLevel::from_score(20.0), HealthLevel::Poor);
        assert_eq!(HealthLevel::from_score(0.0), HealthLevel::Critical);
    }

    #[test]
    fn test_health_level_total_and_exclusive() {
        let mut score = 0.0;
        while score <= 100.0 {
            let matching = HealthLevel::THRESHOLDS
                .iter()
                .filter(|(min, level)| score >= *min && HealthLevel::from_score(score) == *level)
                .count();
            assert_eq!(matching, 1, "score {}", score);
            score += 0.5;
        }
    }

    #[test]
    fn test_collection_urgency_ordering() {
        assert!(CollectionUrgency::Immediate < CollectionUrgency::Urgent);
        assert_eq!(CollectionUrgency::from_days_overdue(60), CollectionUrgency::Immediate);
        assert_eq!(CollectionUrgency::from_days_overdue(30), CollectionUrgency::Urgent);
        assert_eq!(CollectionUrgency::from_days_overdue(7), CollectionUrgency::Normal);
        assert_eq!(CollectionUrgency::from_days_overdue(0), CollectionUrgency::Low);
    }

    #[test]
    fn test_recommendation_category_parse() {
        assert_eq!(
            "Financial".parse::<RecommendationCategory>().unwrap(),
            RecommendationCategory::Financial
        );
        assert!("marketing".parse::<RecommendationCategory>().is_err());
        assert_eq!(RecommendationCategory::Opportunity.priority(), 6);
    }
}
