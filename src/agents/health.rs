//! Seven-dimension business-health score and its history.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::{envelope, Agent, AgentContext};
use crate::aggregator::{DataAggregator, TransactionKind};
use crate::error::Result;
use crate::models::{Dimension, DimensionScore, FinancialPeriod, HealthReport, HealthTrend, TrendPoint};
use crate::scoring::health::{self, ComplianceFlags};
use crate::store::{Query, Row, RowExt, SortOrder};

/// Table holding one row per computed score.
const SCORES_TABLE: &str = "business_health_scores";

pub struct BusinessHealthAgent {
    ctx: AgentContext,
}

impl BusinessHealthAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    pub async fn health_score(&self, user_id: &str) -> Result<HealthReport> {
        let agg = &self.ctx.aggregator;
        let today = self.ctx.today();
        let profile = agg.business_profile(user_id).await?.unwrap_or_default();
        let business_type = profile
            .opt_text("business_type")
            .unwrap_or("general")
            .to_string();
        let benchmark = self.ctx.tables.health_benchmark(&business_type);

        let quarter = FinancialPeriod::last_days(90, today);
        let figures = agg.aggregate_figures(user_id, &quarter).await?;
        let (sales, cogs, expenses) = (figures.sales, figures.cogs, figures.expenses);

        let previous = DataAggregator::previous_period(&quarter);
        let previous_sales = agg
            .sum_transactions(user_id, &previous, TransactionKind::Sale)
            .await?;

        let monthly_expenses = agg.monthly_expense_average(user_id, today).await?;

        let month = FinancialPeriod::last_days(30, today);
        let monthly_income = agg.sum_transactions(user_id, &month, TransactionKind::Sale).await?;
        let obligations = profile.num("monthly_rent") + profile.num("monthly_obligations");

        let mut dimensions: BTreeMap<Dimension, DimensionScore> = BTreeMap::new();
        dimensions.insert(
            Dimension::Profitability,
            health::profitability(sales, cogs, expenses, benchmark.profit_margin),
        );
        dimensions.insert(
            Dimension::Liquidity,
            health::liquidity(
                profile.num("current_balance"),
                figures.credit_outstanding,
                monthly_expenses,
            ),
        );
        dimensions.insert(
            Dimension::CreditHealth,
            health::credit_health(
                figures.credit_outstanding,
                figures.credit_collected,
                figures.credit_overdue,
            ),
        );
        dimensions.insert(
            Dimension::ExpenseControl,
            health::expense_control(sales, expenses + cogs, benchmark.expense_ratio),
        );
        dimensions.insert(Dimension::Growth, health::growth(sales, previous_sales));
        dimensions.insert(
            Dimension::DebtBurden,
            health::debt_burden(monthly_income, obligations),
        );
        dimensions.insert(
            Dimension::Compliance,
            health::compliance(&compliance_flags(&profile, today)),
        );

        let report = health::health_report(
            dimensions,
            &self.ctx.tables.health_weights,
            &business_type,
            self.ctx.now(),
        );
        info!(
            "Health score for {}: {} ({})",
            user_id, report.overall_score, report.level
        );
        Ok(report)
    }

    /// The last `months` stored scores, newest first, with their direction.
    pub async fn health_trend(&self, user_id: &str, months: usize) -> Result<HealthTrend> {
        let rows = self
            .ctx
            .aggregator
            .store()
            .select(
                Query::new(SCORES_TABLE)
                    .eq("user_id", user_id)
                    .select(&["overall_score", "calculated_at"])
                    .order("calculated_at", SortOrder::Desc)
                    .limit(months),
            )
            .await?;

        let points = rows
            .iter()
            .map(|r| TrendPoint {
                score: r.num("overall_score"),
                calculated_at: r.text("calculated_at").to_string(),
            })
            .collect();
        Ok(health::health_trend(points))
    }

    /// Store the score so later trend queries can see it. Failures are logged only.
    async fn record(&self, user_id: &str, report: &HealthReport) {
        let row = json!({
            "user_id": user_id,
            "overall_score": report.overall_score,
            "health_level": report.level.to_string(),
            "calculated_at": report.calculated_at.to_rfc3339(),
        });
        let Value::Object(row) = row else { return };
        if let Err(e) = self
            .ctx
            .aggregator
            .store()
            .insert(SCORES_TABLE, vec![row])
            .await
        {
            warn!("Failed to record health score for {}: {}", user_id, e);
        }
    }
}

pub(crate) fn compliance_flags(profile: &Row, today: chrono::NaiveDate) -> ComplianceFlags {
    ComplianceFlags {
        has_trn: profile.opt_text("trn").is_some_and(|t| !t.is_empty()),
        license_days_remaining: profile
            .date("license_expiry")
            .map(|expiry| (expiry - today).num_days()),
        visa_expired: profile.text("visa_status") == "expired",
    }
}

#[async_trait]
impl Agent for BusinessHealthAgent {
    fn name(&self) -> &str {
        "business_health"
    }

    async fn analyze(&self, user_id: &str) -> Result<Value> {
        let report = self.health_score(user_id).await?;
        self.record(user_id, &report).await;
        envelope::success(&report)
    }
}
