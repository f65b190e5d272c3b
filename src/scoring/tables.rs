//! Lookup tables consumed by the scoring functions.
//!
//! Every table has a built-in default and can be overridden from the
//! `[scoring]` section of the configuration file.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::Dimension;

/// Weights of the seven health dimensions, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthWeights {
    pub profitability: f64,
    pub liquidity: f64,
    pub credit_health: f64,
    pub expense_control: f64,
    pub growth: f64,
    pub debt_burden: f64,
    pub compliance: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            profitability: 30.0,
            liquidity: 20.0,
            credit_health: 15.0,
            expense_control: 10.0,
            growth: 10.0,
            debt_burden: 10.0,
            compliance: 5.0,
        }
    }
}

impl HealthWeights {
    pub fn weight(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Profitability => self.profitability,
            Dimension::Liquidity => self.liquidity,
            Dimension::CreditHealth => self.credit_health,
            Dimension::ExpenseControl => self.expense_control,
            Dimension::Growth => self.growth,
            Dimension::DebtBurden => self.debt_burden,
            Dimension::Compliance => self.compliance,
        }
    }

    pub fn total(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.weight(*d)).sum()
    }
}

/// Target profit margin and expense ratio for a business type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthBenchmark {
    pub profit_margin: f64,
    pub expense_ratio: f64,
}

/// Sector margins in percent, used by the profit statement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginBenchmark {
    pub gross_margin: f64,
    pub net_margin: f64,
}

/// A dated window for a calendar event the Gregorian rules cannot place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonWindow {
    pub season: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// VAT rates per product category and the registration thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatTables {
    #[serde(default = "default_standard_rate")]
    pub standard_rate: f64,

    /// Category to treatment: `standard`, `zero_rated` or `exempt`.
    #[serde(default = "default_category_treatment")]
    pub categories: BTreeMap<String, String>,

    #[serde(default = "default_mandatory_threshold")]
    pub mandatory_threshold: f64,

    #[serde(default = "default_voluntary_threshold")]
    pub voluntary_threshold: f64,
}

impl Default for VatTables {
    fn default() -> Self {
        Self {
            standard_rate: default_standard_rate(),
            categories: default_category_treatment(),
            mandatory_threshold: default_mandatory_threshold(),
            voluntary_threshold: default_voluntary_threshold(),
        }
    }
}

fn default_standard_rate() -> f64 {
    0.05
}

fn default_mandatory_threshold() -> f64 {
    375_000.0
}

fn default_voluntary_threshold() -> f64 {
    187_500.0
}

fn default_category_treatment() -> BTreeMap<String, String> {
    [
        ("general_goods", "standard"),
        ("electronics", "standard"),
        ("grocery", "standard"),
        ("pharmacy_general", "standard"),
        ("textiles", "standard"),
        ("auto_parts", "standard"),
        ("food_beverage", "standard"),
        ("pharmacy_healthcare", "zero_rated"),
        ("exports", "zero_rated"),
        ("education", "zero_rated"),
        ("residential_rent", "exempt"),
        ("life_insurance", "exempt"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// All lookup tables, passed by reference into the scoring functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTables {
    #[serde(default)]
    pub health_weights: HealthWeights,

    #[serde(default = "default_health_benchmarks")]
    pub health_benchmarks: BTreeMap<String, HealthBenchmark>,

    #[serde(default = "default_margin_benchmarks")]
    pub margin_benchmarks: BTreeMap<String, MarginBenchmark>,

    /// Multiplier applied to average daily sales per season.
    #[serde(default = "default_seasonal_factors")]
    pub seasonal_factors: BTreeMap<String, f64>,

    /// Dated windows checked before the month/day rules.
    #[serde(default = "default_season_windows")]
    pub season_windows: Vec<SeasonWindow>,

    #[serde(default = "default_lead_times")]
    pub lead_times: BTreeMap<String, u32>,

    #[serde(default = "default_safety_stock")]
    pub safety_stock: BTreeMap<String, f64>,

    #[serde(default = "default_target_stock_days")]
    pub target_stock_days: BTreeMap<String, u32>,

    #[serde(default)]
    pub vat: VatTables,
}

impl Default for ScoringTables {
    fn default() -> Self {
        Self {
            health_weights: HealthWeights::default(),
            health_benchmarks: default_health_benchmarks(),
            margin_benchmarks: default_margin_benchmarks(),
            seasonal_factors: default_seasonal_factors(),
            season_windows: default_season_windows(),
            lead_times: default_lead_times(),
            safety_stock: default_safety_stock(),
            target_stock_days: default_target_stock_days(),
            vat: VatTables::default(),
        }
    }
}

const FALLBACK: &str = "general";

impl ScoringTables {
    pub fn health_benchmark(&self, business_type: &str) -> HealthBenchmark {
        self.health_benchmarks
            .get(business_type)
            .or_else(|| self.health_benchmarks.get(FALLBACK))
            .copied()
            .unwrap_or(HealthBenchmark {
                profit_margin: 0.08,
                expense_ratio: 0.85,
            })
    }

    pub fn margin_benchmark(&self, sector: &str) -> MarginBenchmark {
        self.margin_benchmarks
            .get(sector)
            .or_else(|| self.margin_benchmarks.get("general_trading"))
            .copied()
            .unwrap_or(MarginBenchmark {
                gross_margin: 25.0,
                net_margin: 8.0,
            })
    }

    pub fn seasonal_factor(&self, season: &str) -> f64 {
        self.seasonal_factors.get(season).copied().unwrap_or(1.0)
    }

    pub fn lead_time(&self, category: &str) -> u32 {
        lookup(&self.lead_times, category).unwrap_or(5)
    }

    pub fn safety_multiplier(&self, category: &str) -> f64 {
        lookup(&self.safety_stock, category).unwrap_or(1.5)
    }

    pub fn target_days(&self, category: &str) -> u32 {
        lookup(&self.target_stock_days, category).unwrap_or(21)
    }
}

fn lookup<T: Copy>(table: &BTreeMap<String, T>, key: &str) -> Option<T> {
    table.get(key).or_else(|| table.get(FALLBACK)).copied()
}

fn default_health_benchmarks() -> BTreeMap<String, HealthBenchmark> {
    [
        ("grocery", 0.08, 0.85),
        ("electronics", 0.05, 0.88),
        ("pharmacy", 0.10, 0.82),
        ("cafeteria", 0.15, 0.75),
        ("textile", 0.12, 0.80),
        ("auto_parts", 0.10, 0.82),
        ("general", 0.08, 0.85),
    ]
    .into_iter()
    .map(|(name, profit_margin, expense_ratio)| {
        (
            name.to_string(),
            HealthBenchmark {
                profit_margin,
                expense_ratio,
            },
        )
    })
    .collect()
}

fn default_margin_benchmarks() -> BTreeMap<String, MarginBenchmark> {
    [
        ("grocery", 20.0, 8.0),
        ("electronics", 15.0, 5.0),
        ("pharmacy", 25.0, 10.0),
        ("cafeteria", 60.0, 15.0),
        ("textile", 40.0, 12.0),
        ("auto_parts", 30.0, 10.0),
        ("general_trading", 25.0, 8.0),
    ]
    .into_iter()
    .map(|(name, gross_margin, net_margin)| {
        (
            name.to_string(),
            MarginBenchmark {
                gross_margin,
                net_margin,
            },
        )
    })
    .collect()
}

fn default_seasonal_factors() -> BTreeMap<String, f64> {
    [
        ("ramadan", 1.40),
        ("eid_al_fitr", 1.50),
        ("eid_al_adha", 1.30),
        ("summer", 0.70),
        ("dsf", 1.20),
        ("national_day", 1.15),
        ("normal", 1.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Approximate Hijri event dates for 2025-2027 (moon sighting shifts them by a day or two).
fn default_season_windows() -> Vec<SeasonWindow> {
    [
        ("ramadan", (2025, 3, 1), (2025, 3, 29)),
        ("eid_al_fitr", (2025, 3, 30), (2025, 4, 2)),
        ("eid_al_adha", (2025, 6, 6), (2025, 6, 9)),
        ("ramadan", (2026, 2, 18), (2026, 3, 19)),
        ("eid_al_fitr", (2026, 3, 20), (2026, 3, 22)),
        ("eid_al_adha", (2026, 5, 26), (2026, 5, 29)),
        ("ramadan", (2027, 2, 8), (2027, 3, 9)),
        ("eid_al_fitr", (2027, 3, 10), (2027, 3, 12)),
        ("eid_al_adha", (2027, 5, 16), (2027, 5, 19)),
    ]
    .into_iter()
    .filter_map(|(season, (sy, sm, sd), (ey, em, ed))| {
        Some(SeasonWindow {
            season: season.to_string(),
            start: NaiveDate::from_ymd_opt(sy, sm, sd)?,
            end: NaiveDate::from_ymd_opt(ey, em, ed)?,
        })
    })
    .collect()
}

fn default_lead_times() -> BTreeMap<String, u32> {
    [
        ("perishable", 1),
        ("grocery", 3),
        ("electronics", 7),
        ("pharmacy", 5),
        ("textile", 14),
        ("auto_parts", 7),
        ("general", 5),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_safety_stock() -> BTreeMap<String, f64> {
    [
        ("perishable", 1.2),
        ("grocery", 1.5),
        ("electronics", 1.3),
        ("pharmacy", 2.0),
        ("textile", 1.5),
        ("auto_parts", 1.5),
        ("general", 1.5),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_target_stock_days() -> BTreeMap<String, u32> {
    [("perishable", 7), ("pharmacy", 30), ("general", 21)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_100() {
        assert_eq!(HealthWeights::default().total(), 100.0);
    }

    #[test]
    fn test_benchmark_fallback() {
        let tables = ScoringTables::default();
        assert_eq!(tables.health_benchmark("pharmacy").profit_margin, 0.10);
        assert_eq!(tables.health_benchmark("florist").profit_margin, 0.08);
        assert_eq!(tables.margin_benchmark("florist").gross_margin, 25.0);
    }

    #[test]
    fn test_category_lookups() {
        let tables = ScoringTables::default();
        assert_eq!(tables.lead_time("textile"), 14);
        assert_eq!(tables.lead_time("toys"), 5);
        assert_eq!(tables.safety_multiplier("pharmacy"), 2.0);
        assert_eq!(tables.target_days("perishable"), 7);
        assert_eq!(tables.target_days("electronics"), 21);
        assert_eq!(tables.seasonal_factor("unknown"), 1.0);
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let tables: ScoringTables = toml::from_str(
            r#"
[seasonal_factors]
summer = 0.5
"#,
        )
        .unwrap();
        assert_eq!(tables.seasonal_factor("summer"), 0.5);
        assert_eq!(tables.lead_time("grocery"), 3);
        assert_eq!(tables.health_weights.total(), 100.0);
    }
}
