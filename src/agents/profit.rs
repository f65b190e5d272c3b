//! True-profit analysis over a reporting period.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use super::{envelope, Agent, AgentContext};
use crate::aggregator::TransactionKind;
use crate::error::Result;
use crate::models::FinancialPeriod;
use crate::scoring::profit::{normalize_category, profit_statement, ProfitInputs, ProfitStatement};
use crate::scoring::round2;
use crate::store::RowExt;

/// Sector used when the profile names none.
const DEFAULT_SECTOR: &str = "general_trading";

/// How sales were paid, in AED.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentMix {
    pub cash: f64,
    pub card: f64,
    pub bank_transfer: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitAnalysis {
    pub period: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub sector: String,
    pub sales_count: usize,
    pub payment_mix: PaymentMix,
    #[serde(flatten)]
    pub statement: ProfitStatement,
}

pub struct ProfitAgent {
    ctx: AgentContext,
}

impl ProfitAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    pub async fn analyze_profit(&self, user_id: &str, period_token: &str) -> Result<ProfitAnalysis> {
        let agg = &self.ctx.aggregator;
        let period = FinancialPeriod::from_token(period_token, self.ctx.today());

        let sales = agg
            .transactions(
                user_id,
                &period,
                Some(TransactionKind::Sale),
                &["amount_aed", "vat_amount", "total_amount", "payment_method"],
            )
            .await?;
        let purchases = agg
            .transactions(
                user_id,
                &period,
                Some(TransactionKind::Purchase),
                &["amount_aed", "vat_amount"],
            )
            .await?;
        let expense_rows = agg
            .transactions(
                user_id,
                &period,
                Some(TransactionKind::Expense),
                &["amount_aed", "category_name"],
            )
            .await?;

        let mut expenses: BTreeMap<String, f64> = BTreeMap::new();
        for row in &expense_rows {
            let category = normalize_category(row.opt_text("category_name").unwrap_or("other"));
            *expenses.entry(category).or_insert(0.0) += row.num("amount_aed");
        }

        let mut payment_mix = PaymentMix::default();
        for row in &sales {
            let amount = row.num("total_amount");
            match row.text("payment_method") {
                "cash" => payment_mix.cash += amount,
                "card" | "apple_pay" | "samsung_pay" => payment_mix.card += amount,
                "bank_transfer" => payment_mix.bank_transfer += amount,
                _ => {}
            }
        }
        payment_mix.cash = round2(payment_mix.cash);
        payment_mix.card = round2(payment_mix.card);
        payment_mix.bank_transfer = round2(payment_mix.bank_transfer);

        let inputs = ProfitInputs {
            revenue: sales.iter().map(|r| r.num("amount_aed")).sum(),
            cogs: purchases.iter().map(|r| r.num("amount_aed")).sum(),
            expenses,
            output_vat: sales.iter().map(|r| r.num("vat_amount")).sum(),
            input_vat: purchases.iter().map(|r| r.num("vat_amount")).sum(),
        };

        let sector = agg
            .business_profile(user_id)
            .await?
            .and_then(|p| p.opt_text("business_sector").map(str::to_string))
            .unwrap_or_else(|| DEFAULT_SECTOR.to_string());

        let statement = profit_statement(&inputs, self.ctx.tables.margin_benchmark(&sector));
        info!(
            "Profit for {} ({}): net {:.2} AED on revenue {:.2}",
            user_id, period, statement.net_profit, statement.revenue
        );

        Ok(ProfitAnalysis {
            period: period_token.to_string(),
            start: period.start,
            end: period.end,
            sector,
            sales_count: sales.len(),
            payment_mix,
            statement,
        })
    }
}

#[async_trait]
impl Agent for ProfitAgent {
    fn name(&self) -> &str {
        "profit"
    }

    async fn analyze(&self, user_id: &str) -> Result<Value> {
        let analysis = self.analyze_profit(user_id, "monthly").await?;
        envelope::success(&analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{context, store};
    use serde_json::json;

    fn agent() -> ProfitAgent {
        ProfitAgent::new(context(store(json!({
            "transactions": [
                {"user_id": "u1", "transaction_type": "sale", "date": "2026-10-03", "amount_aed": 40000.0, "vat_amount": 2000.0, "total_amount": 42000.0, "payment_method": "cash"},
                {"user_id": "u1", "transaction_type": "sale", "date": "2026-10-10", "amount_aed": 10000.0, "vat_amount": 500.0, "total_amount": 10500.0, "payment_method": "apple_pay"},
                {"user_id": "u1", "transaction_type": "purchase", "date": "2026-10-04", "amount_aed": 30000.0, "vat_amount": 1500.0},
                {"user_id": "u1", "transaction_type": "expense", "date": "2026-10-01", "amount_aed": 8000.0, "category_name": "Rent"},
                {"user_id": "u1", "transaction_type": "expense", "date": "2026-10-05", "amount_aed": 1500.0, "category_name": "POS Fees"},
                {"user_id": "u1", "transaction_type": "sale", "date": "2026-09-20", "amount_aed": 99999.0}
            ],
            "business_profiles": [
                {"user_id": "u1", "business_sector": "grocery"}
            ]
        }))))
    }

    #[tokio::test]
    async fn test_analyze_profit_month_to_date() {
        let analysis = agent().analyze_profit("u1", "monthly").await.unwrap();

        assert_eq!(analysis.start, NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
        assert_eq!(analysis.sales_count, 2);
        assert_eq!(analysis.sector, "grocery");
        assert_eq!(analysis.statement.revenue, 50000.0);
        assert_eq!(analysis.statement.gross_profit, 20000.0);
        assert_eq!(analysis.payment_mix.cash, 42000.0);
        assert_eq!(analysis.payment_mix.card, 10500.0);

        // Rent at 16% of revenue and POS fees at 3% both leak.
        let categories: Vec<&str> = analysis
            .statement
            .leaks
            .iter()
            .map(|l| l.category.as_str())
            .collect();
        assert_eq!(categories, vec!["Rent", "POS/Card Fees"]);
    }

    #[tokio::test]
    async fn test_empty_period_has_zero_revenue() {
        let analysis = agent().analyze_profit("nobody", "daily").await.unwrap();
        assert_eq!(analysis.statement.revenue, 0.0);
        assert_eq!(analysis.sector, DEFAULT_SECTOR);
    }

    #[tokio::test]
    async fn test_envelope() {
        let value = agent().analyze("u1").await.unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["period"], "monthly");
        assert!(value["net_profit"].is_number());
    }
}
