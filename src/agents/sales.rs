//! Sales timing patterns and the short-range revenue forecast.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{envelope, Agent, AgentContext};
use crate::aggregator::TransactionKind;
use crate::error::Result;
use crate::models::FinancialPeriod;
use crate::scoring::patterns::{
    customer_activity, customer_segments, sales_forecast, sales_patterns, CustomerSale,
    CustomerSegments, SaleRecord, SalesForecast, SalesPatterns,
};
use crate::store::{Row, RowExt};

/// History window behind the forecast.
const FORECAST_HISTORY_DAYS: i64 = 90;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisWindow {
    pub days: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternReport {
    pub analysis_period: AnalysisWindow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub patterns: Option<SalesPatterns>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub forecast: Option<SalesForecast>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<CustomerSegments>,
    pub currency: &'static str,
}

pub struct SalesPatternAgent {
    ctx: AgentContext,
}

fn sale_record(row: &Row) -> Option<SaleRecord> {
    Some(SaleRecord {
        at: row.datetime("date")?,
        amount: row.num("amount_aed"),
        category: row
            .opt_text("category")
            .unwrap_or("uncategorized")
            .to_string(),
        payment_method: row.opt_text("payment_method").unwrap_or("cash").to_string(),
    })
}

/// Sales without a customer are skipped. Ids may be text or numeric.
fn customer_sale(row: &Row) -> Option<CustomerSale> {
    let customer_id = match row.get("customer_id")? {
        Value::String(id) if !id.is_empty() => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    Some(CustomerSale {
        customer_id,
        customer_name: row
            .nested_text("customers", "name")
            .unwrap_or_default()
            .to_string(),
        amount: row.num("amount_aed"),
        at: row.datetime("date"),
    })
}

impl SalesPatternAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    async fn sales(&self, user_id: &str, period: &FinancialPeriod) -> Result<Vec<SaleRecord>> {
        let rows = self
            .ctx
            .aggregator
            .transactions(
                user_id,
                period,
                Some(TransactionKind::Sale),
                &["date", "amount_aed", "category", "payment_method"],
            )
            .await?;
        let records: Vec<SaleRecord> = rows.iter().filter_map(sale_record).collect();
        if records.len() < rows.len() {
            debug!("Skipped {} sales without a usable date", rows.len() - records.len());
        }
        Ok(records)
    }

    pub async fn analyze_patterns(&self, user_id: &str, days: i64) -> Result<PatternReport> {
        let period = FinancialPeriod::last_days(days, self.ctx.today());
        let sales = self.sales(user_id, &period).await?;
        let patterns = sales_patterns(&sales);

        if let Some(p) = &patterns {
            info!(
                "Analyzed {} sales for {} over {} days",
                p.total_transactions, user_id, days
            );
        }

        Ok(PatternReport {
            analysis_period: AnalysisWindow {
                days,
                start_date: period.start,
                end_date: period.end,
            },
            message: patterns
                .is_none()
                .then(|| "No sales data available for analysis".to_string()),
            patterns,
        })
    }

    /// Customers bucketed by spend, frequency and recency.
    pub async fn customer_segments(&self, user_id: &str) -> Result<SegmentReport> {
        let rows = self.ctx.aggregator.customer_sales(user_id).await?;
        let sales: Vec<CustomerSale> = rows.iter().filter_map(customer_sale).collect();
        let customers = customer_activity(&sales, self.ctx.now().naive_utc());
        debug!("Segmenting {} customers for {}", customers.len(), user_id);

        let segments = customer_segments(customers);
        Ok(SegmentReport {
            message: segments.is_none().then(|| "No customer data".to_string()),
            segments,
            currency: "AED",
        })
    }

    pub async fn forecast_sales(&self, user_id: &str, days_ahead: u32) -> Result<ForecastReport> {
        let today = self.ctx.today();
        let period = FinancialPeriod::last_days(FORECAST_HISTORY_DAYS, today);
        let sales = self.sales(user_id, &period).await?;
        let forecast = sales_forecast(&sales, days_ahead, today, &self.ctx.tables);

        Ok(ForecastReport {
            message: forecast
                .is_none()
                .then(|| "Insufficient data for forecast".to_string()),
            forecast,
        })
    }
}

#[async_trait]
impl Agent for SalesPatternAgent {
    fn name(&self) -> &str {
        "sales_pattern"
    }

    async fn analyze(&self, user_id: &str) -> Result<Value> {
        let report = self.analyze_patterns(user_id, 90).await?;
        envelope::success(&report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{context, store};
    use chrono::Duration;
    use serde_json::json;

    /// One evening cash sale per day for `days` days before the fixed date.
    fn agent_with_daily_sales(days: i64) -> SalesPatternAgent {
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        let sales: Vec<Value> = (1..=days)
            .map(|offset| {
                let date = today - Duration::days(offset);
                json!({
                    "user_id": "u1",
                    "transaction_type": "sale",
                    "date": format!("{}T19:30:00", date),
                    "amount_aed": 1000.0,
                    "category": "grocery",
                    "payment_method": "cash"
                })
            })
            .collect();
        SalesPatternAgent::new(context(store(json!({ "transactions": sales }))))
    }

    #[tokio::test]
    async fn test_patterns_find_evening_peak() {
        let report = agent_with_daily_sales(20).analyze_patterns("u1", 30).await.unwrap();
        let patterns = report.patterns.unwrap();
        assert_eq!(patterns.total_transactions, 20);
        assert_eq!(patterns.total_revenue, 20000.0);
        assert_eq!(patterns.hourly.peak_hour, 19);
        assert!(report.message.is_none());
    }

    #[tokio::test]
    async fn test_patterns_without_sales() {
        let report = agent_with_daily_sales(0).analyze_patterns("u1", 30).await.unwrap();
        assert!(report.patterns.is_none());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["message"], "No sales data available for analysis");
        assert_eq!(value["analysis_period"]["days"], 30);
    }

    #[tokio::test]
    async fn test_customer_segments_from_sales() {
        let mut sales = Vec::new();
        for day in 1..=6 {
            sales.push(json!({
                "user_id": "u1", "transaction_type": "sale",
                "date": format!("2026-10-{:02}T12:00:00", day),
                "amount_aed": 800.0, "customer_id": "c1",
                "customers": {"name": "Karama Cafeteria"}
            }));
        }
        sales.push(json!({
            "user_id": "u1", "transaction_type": "sale", "date": "2026-07-01",
            "amount_aed": 1500.0, "customer_id": 7, "customers": {"name": "Deira Bakery"}
        }));
        sales.push(json!({
            "user_id": "u1", "transaction_type": "sale", "date": "2026-10-10",
            "amount_aed": 40.0, "customer_id": null
        }));
        let agent = SalesPatternAgent::new(context(store(json!({ "transactions": sales }))));

        let report = agent.customer_segments("u1").await.unwrap();
        let segments = report.segments.unwrap();
        assert_eq!(segments.high_value.count, 1);
        assert_eq!(segments.high_value.customers[0].customer_name, "Karama Cafeteria");
        assert_eq!(segments.high_value.customers[0].avg_transaction, 800.0);
        assert_eq!(segments.at_risk.count, 1);
        assert_eq!(segments.at_risk.customers[0].customer_id, "7");
        assert_eq!(segments.regular.count + segments.occasional.count, 0);
    }

    #[tokio::test]
    async fn test_customer_segments_without_customers() {
        let report = agent_with_daily_sales(5).customer_segments("u1").await.unwrap();
        assert!(report.segments.is_none());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["message"], "No customer data");
        assert_eq!(value["currency"], "AED");
    }

    #[tokio::test]
    async fn test_forecast_needs_history() {
        let report = agent_with_daily_sales(10).forecast_sales("u1", 7).await.unwrap();
        assert!(report.forecast.is_none());
        assert_eq!(report.message.as_deref(), Some("Insufficient data for forecast"));
    }

    #[tokio::test]
    async fn test_forecast_uses_weekday_averages() {
        let report = agent_with_daily_sales(60).forecast_sales("u1", 7).await.unwrap();
        let forecast = report.forecast.unwrap();
        assert_eq!(forecast.forecasts.len(), 7);
        assert_eq!(forecast.forecasts[0].day, "Friday");
        assert_eq!(forecast.forecasts[0].predicted_sales, 1000.0);
    }
}
