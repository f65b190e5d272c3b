//! Customer credit: trust scores, collection priority and aging.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use super::{envelope, Agent, AgentContext};
use crate::error::{Error, Result};
use crate::models::{CollectionItem, CreditProfile, RiskLevel};
use crate::scoring::credit::{
    collection_priority, collection_summary, credit_aging, recommended_limit, trust_score,
    AgingReport, CollectionCandidate, CollectionSummary, TrustFactors, DEFAULT_TRUST,
};
use crate::store::{Row, RowExt};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionPlan {
    pub summary: CollectionSummary,
    pub customers: Vec<CollectionItem>,
}

/// Combined output of the pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditOverview {
    pub collections: CollectionPlan,
    pub aging: AgingReport,
}

pub struct CreditRiskAgent {
    ctx: AgentContext,
}

/// Payment behaviour read from a customer record.
fn trust_factors(customer: &Row, today: NaiveDate) -> TrustFactors {
    let relationship_days = customer
        .date("created_at")
        .map(|since| (today - since).num_days())
        .unwrap_or(0);

    TrustFactors {
        on_time_ratio: customer.num("on_time_payment_ratio"),
        average_payment_days: customer.opt_num("average_payment_days").unwrap_or(30.0),
        bounced_cheques: customer.num("bounced_cheques").max(0.0) as u32,
        relationship_days,
        total_business: customer.num("total_credit_given") + customer.num("total_payments_received"),
    }
}

impl CreditRiskAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    pub async fn trust_score(&self, user_id: &str, customer_id: &str) -> Result<CreditProfile> {
        let customer = self
            .ctx
            .aggregator
            .customer(user_id, customer_id)
            .await?
            .ok_or_else(|| Error::not_found("customer", customer_id))?;

        let factors = trust_factors(&customer, self.ctx.today());
        let (score, breakdown) = trust_score(&factors);
        debug!("Trust score for {}: {} ({:?})", customer_id, score, breakdown);

        Ok(CreditProfile {
            customer_id: customer_id.to_string(),
            customer_name: customer.text("name").to_string(),
            trust_score: score,
            risk_level: RiskLevel::from_trust(score),
            recommended_limit: recommended_limit(score, factors.total_business),
            current_outstanding: customer.num("total_credit_outstanding"),
            factors: breakdown,
        })
    }

    /// Oldest overdue day count per customer, from credit given.
    async fn oldest_overdue(&self, user_id: &str) -> Result<HashMap<String, i64>> {
        let mut oldest: HashMap<String, i64> = HashMap::new();
        for row in self.ctx.aggregator.credit_transactions(user_id).await? {
            let days = row.num("days_overdue") as i64;
            if days <= 0 {
                continue;
            }
            let entry = oldest.entry(row.text("customer_id").to_string()).or_insert(0);
            *entry = (*entry).max(days);
        }
        Ok(oldest)
    }

    /// Customers with credit outstanding, paired with their oldest overdue days.
    async fn debtors(&self, user_id: &str) -> Result<Vec<(Row, i64)>> {
        let oldest = self.oldest_overdue(user_id).await?;
        let customers = self.ctx.aggregator.customers(user_id).await?;
        Ok(customers
            .into_iter()
            .filter(|c| c.num("total_credit_outstanding") > 0.0)
            .map(|c| {
                let days = oldest.get(c.text("id")).copied().unwrap_or(0);
                (c, days)
            })
            .collect())
    }

    pub async fn collection_priority(&self, user_id: &str) -> Result<CollectionPlan> {
        let candidates = self
            .debtors(user_id)
            .await?
            .into_iter()
            .map(|(c, days)| CollectionCandidate {
                customer_id: c.text("id").to_string(),
                customer_name: c.text("name").to_string(),
                outstanding: c.num("total_credit_outstanding"),
                oldest_days_overdue: days,
                trust_score: c.opt_num("trust_score").unwrap_or(DEFAULT_TRUST),
            })
            .collect();

        let customers = collection_priority(candidates);
        let summary = collection_summary(&customers);
        info!(
            "{} customers owe {:.2} AED ({} need immediate action)",
            summary.customer_count, summary.total_outstanding, summary.immediate_action_count
        );
        Ok(CollectionPlan { summary, customers })
    }

    pub async fn credit_aging(&self, user_id: &str) -> Result<AgingReport> {
        let entries: Vec<(f64, i64)> = self
            .debtors(user_id)
            .await?
            .iter()
            .map(|(c, days)| (c.num("total_credit_outstanding"), *days))
            .collect();
        Ok(credit_aging(&entries))
    }
}

#[async_trait]
impl Agent for CreditRiskAgent {
    fn name(&self) -> &str {
        "credit_risk"
    }

    async fn analyze(&self, user_id: &str) -> Result<Value> {
        let overview = CreditOverview {
            collections: self.collection_priority(user_id).await?,
            aging: self.credit_aging(user_id).await?,
        };
        envelope::success(&overview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{context, store};
    use crate::models::CollectionUrgency;
    use crate::scoring::credit::AgingHealth;
    use serde_json::json;

    fn agent() -> CreditRiskAgent {
        CreditRiskAgent::new(context(store(json!({
            "customers": [
                {
                    "id": "c1", "user_id": "u1", "name": "Ahmed Trading",
                    "on_time_payment_ratio": 0.95, "average_payment_days": 5,
                    "bounced_cheques": 0, "created_at": "2024-10-15T08:00:00Z",
                    "total_credit_given": 40000.0, "total_payments_received": 20000.0,
                    "total_credit_outstanding": 2000.0, "trust_score": 90
                },
                {
                    "id": "c2", "user_id": "u1", "name": "Late Payer",
                    "on_time_payment_ratio": 0.3, "average_payment_days": 60,
                    "bounced_cheques": 3, "total_credit_outstanding": 5000.0
                },
                {
                    "id": "c3", "user_id": "u1", "name": "Settled",
                    "total_credit_outstanding": 0.0
                }
            ],
            "credit_transactions": [
                {"user_id": "u1", "customer_id": "c1", "credit_type": "credit_given", "amount_aed": 2000.0, "days_overdue": 10},
                {"user_id": "u1", "customer_id": "c2", "credit_type": "credit_given", "amount_aed": 3000.0, "days_overdue": 95},
                {"user_id": "u1", "customer_id": "c2", "credit_type": "credit_given", "amount_aed": 2000.0, "days_overdue": 20},
                {"user_id": "u1", "customer_id": "c2", "credit_type": "payment_received", "amount_aed": 500.0, "days_overdue": 200}
            ]
        }))))
    }

    #[tokio::test]
    async fn test_trust_score_for_reliable_customer() {
        let profile = agent().trust_score("u1", "c1").await.unwrap();
        // 50 + 25 punctuality + 15 speed + 4 relationship (24 months) + 5 volume.
        assert_eq!(profile.trust_score, 99.0);
        assert_eq!(profile.risk_level, RiskLevel::Low);
        assert_eq!(profile.recommended_limit, 16_000.0);
        assert_eq!(profile.customer_name, "Ahmed Trading");
    }

    #[tokio::test]
    async fn test_trust_score_clamps_and_cuts_credit() {
        let profile = agent().trust_score("u1", "c2").await.unwrap();
        // 50 - 15 - 10 - 40 is clamped at zero.
        assert_eq!(profile.trust_score, 0.0);
        assert_eq!(profile.risk_level, RiskLevel::VeryHigh);
        assert_eq!(profile.recommended_limit, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_customer_is_not_found() {
        let err = agent().trust_score("u1", "nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "customer", .. }));
    }

    #[tokio::test]
    async fn test_collection_priority() {
        let plan = agent().collection_priority("u1").await.unwrap();
        assert_eq!(plan.customers.len(), 2);
        assert_eq!(plan.customers[0].customer_id, "c2");
        assert_eq!(plan.customers[0].urgency, CollectionUrgency::Immediate);
        assert_eq!(plan.customers[1].urgency, CollectionUrgency::Normal);
        assert_eq!(plan.summary.total_outstanding, 7000.0);
        assert_eq!(plan.summary.immediate_action_count, 1);
    }

    #[tokio::test]
    async fn test_credit_aging() {
        let aging = agent().credit_aging("u1").await.unwrap();
        assert_eq!(aging.total, 7000.0);
        assert_eq!(aging.current.amount, 2000.0);
        assert_eq!(aging.overdue_90.amount, 5000.0);
        assert_eq!(aging.health_status, AgingHealth::AtRisk);
    }
}
