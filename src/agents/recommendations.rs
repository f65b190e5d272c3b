//! Daily prioritized recommendations and their follow-up status.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use super::health::compliance_flags;
use super::reorder::stock_item;
use super::{envelope, Agent, AgentContext};
use crate::aggregator::TransactionKind;
use crate::error::{Error, Result};
use crate::models::{ActionStatus, FinancialPeriod, Recommendation, RecommendationCategory};
use crate::recommend::{self, DailyRecommendations, Debtor, MonthFigures};
use crate::scoring::reorder::StockItem;
use crate::store::{Query, RowExt};

const RECOMMENDATIONS_TABLE: &str = "recommendations";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRecommendations {
    pub category: RecommendationCategory,
    pub total: usize,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecorded {
    pub recommendation_id: String,
    pub action: ActionStatus,
}

pub struct RecommendationAgent {
    ctx: AgentContext,
}

impl RecommendationAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    async fn stock(&self, user_id: &str) -> Result<Vec<StockItem>> {
        let rows = self.ctx.aggregator.inventory_items(user_id).await?;
        Ok(rows.iter().map(stock_item).collect())
    }

    async fn urgent(&self, user_id: &str) -> Result<Vec<Recommendation>> {
        let debtors: Vec<Debtor> = self
            .ctx
            .aggregator
            .customers(user_id)
            .await?
            .iter()
            .map(|c| Debtor {
                id: c.text("id").to_string(),
                name: c.text("name").to_string(),
                outstanding: c.num("total_credit_outstanding"),
                average_payment_days: c.num("average_payment_days"),
            })
            .collect();
        let items = self.stock(user_id).await?;
        Ok(recommend::urgent(&debtors, &items))
    }

    async fn financial(&self, user_id: &str) -> Result<Vec<Recommendation>> {
        let agg = &self.ctx.aggregator;
        let today = self.ctx.today();
        let month = FinancialPeriod::from_token("monthly", today);

        let figures = MonthFigures {
            sales: agg.sum_transactions(user_id, &month, TransactionKind::Sale).await?,
            purchases: agg
                .sum_transactions(user_id, &month, TransactionKind::Purchase)
                .await?,
            expenses: agg
                .sum_transactions(user_id, &month, TransactionKind::Expense)
                .await?,
        };
        let business_type = agg
            .business_profile(user_id)
            .await?
            .and_then(|p| p.opt_text("business_type").map(str::to_string))
            .unwrap_or_else(|| "general".to_string());
        let target = self.ctx.tables.health_benchmark(&business_type).profit_margin;

        Ok(recommend::financial(
            figures,
            target,
            &today.format("%Y%m").to_string(),
        ))
    }

    async fn operational(&self, user_id: &str) -> Result<Vec<Recommendation>> {
        Ok(recommend::operational(&self.stock(user_id).await?))
    }

    async fn compliance(&self, user_id: &str) -> Result<Vec<Recommendation>> {
        let flags = self
            .ctx
            .aggregator
            .business_profile(user_id)
            .await?
            .map(|profile| compliance_flags(&profile, self.ctx.today()));
        Ok(recommend::compliance(flags.as_ref()))
    }

    async fn tier(
        &self,
        user_id: &str,
        category: RecommendationCategory,
    ) -> Result<Vec<Recommendation>> {
        match category {
            RecommendationCategory::Urgent => self.urgent(user_id).await,
            RecommendationCategory::Financial => self.financial(user_id).await,
            RecommendationCategory::Operational => self.operational(user_id).await,
            RecommendationCategory::Compliance => self.compliance(user_id).await,
            RecommendationCategory::Growth => Ok(recommend::growth()),
            RecommendationCategory::Opportunity => Ok(Vec::new()),
        }
    }

    pub async fn daily_recommendations(&self, user_id: &str) -> Result<DailyRecommendations> {
        let mut pool = Vec::new();
        for category in [
            RecommendationCategory::Urgent,
            RecommendationCategory::Financial,
            RecommendationCategory::Operational,
            RecommendationCategory::Compliance,
            RecommendationCategory::Growth,
        ] {
            pool.extend(self.tier(user_id, category).await?);
        }

        let daily = recommend::rank(pool, self.ctx.today());
        info!(
            "{} recommendations for {} ({} urgent, AED {:.2} potential)",
            daily.top_recommendations, user_id, daily.urgent_items, daily.potential_monthly_impact
        );
        Ok(daily)
    }

    /// One tier, uncut by the daily limit. Unknown categories are `InvalidInput`.
    pub async fn recommendations_by_category(
        &self,
        user_id: &str,
        category: &str,
    ) -> Result<CategoryRecommendations> {
        let category: RecommendationCategory = category.parse()?;
        let recommendations = self.tier(user_id, category).await?;
        Ok(CategoryRecommendations {
            category,
            total: recommendations.len(),
            recommendations,
        })
    }

    /// Set the merchant's response on a stored recommendation.
    pub async fn mark_action(&self, recommendation_id: &str, action: &str) -> Result<ActionRecorded> {
        let action: ActionStatus = action.parse()?;
        let patch = json!({
            "status": action.to_string(),
            "actioned_at": self.ctx.now().naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string(),
        });
        let Value::Object(patch) = patch else {
            return Err(Error::Serialization("patch is not an object".to_string()));
        };

        let updated = self
            .ctx
            .aggregator
            .store()
            .update(
                Query::new(RECOMMENDATIONS_TABLE).eq("id", recommendation_id),
                patch,
            )
            .await?;
        if updated == 0 {
            return Err(Error::not_found("recommendation", recommendation_id));
        }

        info!("Recommendation {} marked {}", recommendation_id, action);
        Ok(ActionRecorded {
            recommendation_id: recommendation_id.to_string(),
            action,
        })
    }
}

#[async_trait]
impl Agent for RecommendationAgent {
    fn name(&self) -> &str {
        "recommendation"
    }

    async fn analyze(&self, user_id: &str) -> Result<Value> {
        let daily = self.daily_recommendations(user_id).await?;
        envelope::success(&daily)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{context, store};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn fixtures() -> Arc<MemoryStore> {
        store(json!({
            "customers": [
                {"id": "c1", "user_id": "u1", "name": "Slow Payer", "total_credit_outstanding": 8000.0, "average_payment_days": 70.0},
                {"id": "c2", "user_id": "u1", "name": "Good Payer", "total_credit_outstanding": 3000.0, "average_payment_days": 12.0}
            ],
            "inventory_items": [
                {"id": "i1", "user_id": "u1", "name": "Milk", "current_stock": 2.0, "reorder_point": 20.0, "average_daily_sales": 10.0, "unit_cost": 4.0},
                {"id": "i2", "user_id": "u1", "name": "Carpets", "current_stock": 400.0, "reorder_point": 5.0, "average_daily_sales": 1.0, "unit_cost": 80.0}
            ],
            "transactions": [
                {"user_id": "u1", "transaction_type": "sale", "date": "2026-10-05", "amount_aed": 20000.0},
                {"user_id": "u1", "transaction_type": "purchase", "date": "2026-10-06", "amount_aed": 15000.0},
                {"user_id": "u1", "transaction_type": "expense", "date": "2026-10-07", "amount_aed": 7000.0}
            ],
            "business_profiles": [
                {"user_id": "u1", "business_type": "grocery", "license_expiry": "2026-10-30"}
            ],
            "recommendations": [
                {"id": "r1", "user_id": "u1", "status": "pending"}
            ]
        }))
    }

    #[tokio::test]
    async fn test_daily_recommendations() {
        let agent = RecommendationAgent::new(context(fixtures()));
        let daily = agent.daily_recommendations("u1").await.unwrap();

        let ids: Vec<&str> = daily.recommendations.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "urgent_credit_c1",
                "urgent_stock_i1",
                "financial_margin_202610",
                "financial_expenses_202610",
                "ops_slowmove_i2",
                "growth_programs",
                "compliance_license",
                "compliance_trn",
            ]
        );
        assert_eq!(daily.urgent_items, 2);
        assert_eq!(daily.total_recommendations, 8);
    }

    #[tokio::test]
    async fn test_by_category() {
        let agent = RecommendationAgent::new(context(fixtures()));
        let urgent = agent.recommendations_by_category("u1", "URGENT").await.unwrap();
        assert_eq!(urgent.category, RecommendationCategory::Urgent);
        assert_eq!(urgent.total, 2);

        let opportunity = agent.recommendations_by_category("u1", "opportunity").await.unwrap();
        assert_eq!(opportunity.total, 0);

        let err = agent.recommendations_by_category("u1", "luck").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_mark_action() {
        let store = fixtures();
        let agent = RecommendationAgent::new(context(store.clone()));

        let recorded = agent.mark_action("r1", "completed").await.unwrap();
        assert_eq!(recorded.action, ActionStatus::Completed);
        let rows = store.rows(RECOMMENDATIONS_TABLE).await;
        assert_eq!(rows[0]["status"], "completed");
        assert_eq!(rows[0]["actioned_at"], "2026-10-15T10:00:00");

        assert!(matches!(
            agent.mark_action("r1", "ignored").await.unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(matches!(
            agent.mark_action("missing", "dismissed").await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }
}
