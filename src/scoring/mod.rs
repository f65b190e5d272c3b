//! Pure scoring functions.
//!
//! Nothing in this module performs I/O. Every function takes already
//! aggregated figures plus the lookup tables it needs, and every division
//! is guarded by an explicit zero check.

pub mod credit;
pub mod health;
pub mod patterns;
pub mod profit;
pub mod programs;
pub mod reorder;
pub mod season;
pub mod tables;
pub mod vat;

pub use tables::ScoringTables;

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to two decimal places (currency).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `numerator / denominator`, or `fallback` when the denominator is zero.
pub fn ratio_or(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if denominator == 0.0 {
        fallback
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        assert_eq!(round1(12.345), 12.3);
        assert_eq!(round2(12.345), 12.35);
        assert_eq!(round2(-0.004), -0.0);
    }

    #[test]
    fn test_ratio_or() {
        assert_eq!(ratio_or(10.0, 0.0, 7.0), 7.0);
        assert_eq!(ratio_or(10.0, 4.0, 7.0), 2.5);
    }
}
