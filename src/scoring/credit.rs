//! Customer trust scores, collection priority and credit aging.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::{ratio_or, round1, round2};
use crate::models::{CollectionItem, CollectionUrgency, RiskLevel, TrustBreakdown};

/// Trust score assumed for customers without a stored score.
pub const DEFAULT_TRUST: f64 = 50.0;

/// Payment behaviour of one customer.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustFactors {
    /// Share of payments made on time, 0-1.
    pub on_time_ratio: f64,
    pub average_payment_days: f64,
    pub bounced_cheques: u32,
    pub relationship_days: i64,
    /// Credit given plus payments received, in AED.
    pub total_business: f64,
}

impl Default for TrustFactors {
    fn default() -> Self {
        Self {
            on_time_ratio: 0.0,
            average_payment_days: 30.0,
            bounced_cheques: 0,
            relationship_days: 0,
            total_business: 0.0,
        }
    }
}

/// Score in [0, 100] with the per-factor breakdown.
pub fn trust_score(factors: &TrustFactors) -> (f64, TrustBreakdown) {
    let punctuality = if factors.on_time_ratio >= 0.9 {
        25.0
    } else if factors.on_time_ratio >= 0.7 {
        15.0
    } else if factors.on_time_ratio >= 0.5 {
        5.0
    } else {
        -15.0
    };

    let speed = if factors.average_payment_days <= 7.0 {
        15.0
    } else if factors.average_payment_days <= 15.0 {
        10.0
    } else if factors.average_payment_days <= 30.0 {
        0.0
    } else {
        -10.0
    };

    let bounced = (-20.0 * factors.bounced_cheques as f64).max(-40.0);

    let months = factors.relationship_days.max(0) / 30;
    let relationship = ((months / 6) as f64).min(10.0);

    let volume = if factors.total_business > 50_000.0 { 5.0 } else { 0.0 };

    let breakdown = TrustBreakdown {
        base: DEFAULT_TRUST,
        punctuality,
        speed,
        bounced_cheques: bounced,
        relationship,
        volume,
    };
    let raw = DEFAULT_TRUST + punctuality + speed + bounced + relationship + volume;

    (raw.clamp(0.0, 100.0), breakdown)
}

/// Suggested credit ceiling in AED; zero means cash only.
pub fn recommended_limit(trust: f64, total_business: f64) -> f64 {
    if RiskLevel::from_trust(trust) == RiskLevel::VeryHigh {
        return 0.0;
    }

    let base = if trust >= 80.0 {
        10_000.0
    } else if trust >= 60.0 {
        5_000.0
    } else {
        1_000.0
    };
    let multiplier = (1.0 + total_business / 100_000.0).min(2.0);
    round2(base * multiplier)
}

/// A customer with money owed, before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionCandidate {
    pub customer_id: String,
    pub customer_name: String,
    pub outstanding: f64,
    pub oldest_days_overdue: i64,
    pub trust_score: f64,
}

/// Rank customers for collection.
///
/// Customers with nothing outstanding are dropped. Ordering is by urgency
/// tier then risk-weighted amount descending; the sort is stable.
pub fn collection_priority(candidates: Vec<CollectionCandidate>) -> Vec<CollectionItem> {
    let mut items: Vec<CollectionItem> = candidates
        .into_iter()
        .filter(|c| c.outstanding > 0.0)
        .map(|c| {
            let urgency = CollectionUrgency::from_days_overdue(c.oldest_days_overdue);
            CollectionItem {
                risk_weighted_amount: round2(c.outstanding * (1.0 + (100.0 - c.trust_score) / 100.0)),
                customer_id: c.customer_id,
                customer_name: c.customer_name,
                outstanding: c.outstanding,
                days_overdue: c.oldest_days_overdue,
                urgency,
                action: urgency.action().to_string(),
                trust_score: c.trust_score,
            }
        })
        .collect();

    items.sort_by(|a, b| {
        a.urgency.cmp(&b.urgency).then_with(|| {
            b.risk_weighted_amount
                .partial_cmp(&a.risk_weighted_amount)
                .unwrap_or(Ordering::Equal)
        })
    });
    items
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub total_outstanding: f64,
    pub customer_count: usize,
    pub immediate_action_count: usize,
    pub urgent_count: usize,
}

pub fn collection_summary(items: &[CollectionItem]) -> CollectionSummary {
    CollectionSummary {
        total_outstanding: round2(items.iter().map(|i| i.outstanding).sum()),
        customer_count: items.len(),
        immediate_action_count: items
            .iter()
            .filter(|i| i.urgency == CollectionUrgency::Immediate)
            .count(),
        urgent_count: items
            .iter()
            .filter(|i| i.urgency == CollectionUrgency::Urgent)
            .count(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgingBucket {
    pub amount: f64,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgingHealth {
    Good,
    AtRisk,
}

/// Outstanding credit grouped by days overdue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingReport {
    pub current: AgingBucket,
    pub overdue_30: AgingBucket,
    pub overdue_60: AgingBucket,
    pub overdue_90: AgingBucket,
    pub total: f64,
    pub health_status: AgingHealth,
}

/// Bucket `(amount, days_overdue)` pairs into 0-30, 31-60, 61-90 and 90+.
pub fn credit_aging(entries: &[(f64, i64)]) -> AgingReport {
    let mut buckets: [AgingBucket; 4] = Default::default();

    for (amount, days) in entries {
        let index = match *days {
            d if d <= 30 => 0,
            d if d <= 60 => 1,
            d if d <= 90 => 2,
            _ => 3,
        };
        buckets[index].amount += amount;
        buckets[index].count += 1;
    }

    let total: f64 = buckets.iter().map(|b| b.amount).sum();
    for bucket in buckets.iter_mut() {
        bucket.percentage = round1(ratio_or(bucket.amount, total, 0.0) * 100.0);
        bucket.amount = round2(bucket.amount);
    }

    // Judged on the rounded percentage shown to the user.
    let health_status = if buckets[3].percentage < 10.0 {
        AgingHealth::Good
    } else {
        AgingHealth::AtRisk
    };

    let [current, overdue_30, overdue_60, overdue_90] = buckets;
    AgingReport {
        current,
        overdue_30,
        overdue_60,
        overdue_90,
        total: round2(total),
        health_status,
    }
}
