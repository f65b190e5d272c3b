//! Retail season resolution for a calendar date.

use chrono::{Datelike, NaiveDate};

use super::tables::ScoringTables;

pub const NORMAL: &str = "normal";

/// Resolve the season name for `date`.
///
/// Configured event windows take precedence over the month/day rules:
/// summer (Jun-Aug), Dubai Shopping Festival (Dec 15 - Jan 29) and
/// National Day (Dec 1-3).
pub fn season_for(date: NaiveDate, tables: &ScoringTables) -> String {
    if let Some(window) = tables
        .season_windows
        .iter()
        .find(|w| date >= w.start && date <= w.end)
    {
        return window.season.clone();
    }

    let (month, day) = (date.month(), date.day());
    let season = match (month, day) {
        (6..=8, _) => "summer",
        (12, 15..=31) | (1, 1..=29) => "dsf",
        (12, 1..=3) => "national_day",
        _ => NORMAL,
    };
    season.to_string()
}

/// Season name and multiplier for `date`.
pub fn seasonal_factor_for(date: NaiveDate, tables: &ScoringTables) -> (String, f64) {
    let season = season_for(date, tables);
    let factor = tables.seasonal_factor(&season);
    (season, factor)
}
