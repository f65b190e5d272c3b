//! Stock reorder alerts, supplier orders and per-item demand forecasts.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use super::{envelope, Agent, AgentContext};
use crate::error::{Error, Result};
use crate::models::{FinancialPeriod, ReorderAlert};
use crate::scoring::reorder::{
    self, DemandForecast, ReorderSummary, StockItem, SupplierOrder,
};
use crate::store::{Row, RowExt};

/// Days of item sales used for demand forecasting.
const HISTORY_DAYS: i64 = 90;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReorderReport {
    pub summary: ReorderSummary,
    pub alerts: Vec<ReorderAlert>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemForecast {
    pub item_id: String,
    pub item_name: String,
    pub days_ahead: u32,
    #[serde(flatten)]
    pub forecast: DemandForecast,
}

pub struct ReorderAgent {
    ctx: AgentContext,
}

pub(crate) fn stock_item(row: &Row) -> StockItem {
    StockItem {
        id: row.text("id").to_string(),
        name: row.text("name").to_string(),
        category: row.opt_text("category").unwrap_or("general").to_string(),
        current_stock: row.num("current_stock"),
        average_daily_sales: row.num("average_daily_sales"),
        reorder_point: row.num("reorder_point"),
        min_order_quantity: row.opt_num("min_order_quantity").unwrap_or(1.0).max(0.0) as u64,
        pack_size: row.opt_num("pack_size").unwrap_or(1.0).max(1.0) as u64,
        unit_cost: row.num("unit_cost"),
        supplier_id: row
            .opt_text("supplier_id")
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        supplier_name: row
            .nested_text("suppliers", "name")
            .unwrap_or_default()
            .to_string(),
    }
}

/// Units sold per calendar day, oldest first.
fn daily_units(sales: &[Row]) -> Vec<f64> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for sale in sales {
        if let Some(date) = sale.date("date") {
            *days.entry(date).or_insert(0.0) += sale.opt_num("quantity").unwrap_or(1.0);
        }
    }
    days.into_values().collect()
}

impl ReorderAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    async fn stock(&self, user_id: &str) -> Result<Vec<StockItem>> {
        let rows = self.ctx.aggregator.inventory_items(user_id).await?;
        Ok(rows.iter().map(stock_item).collect())
    }

    pub async fn reorder_alerts(&self, user_id: &str) -> Result<ReorderReport> {
        let items = self.stock(user_id).await?;
        let alerts = reorder::reorder_alerts(&items, self.ctx.today(), &self.ctx.tables);
        let summary = reorder::reorder_summary(&alerts);
        info!(
            "{} of {} items need reordering for {} ({} critical)",
            summary.total_alerts,
            items.len(),
            user_id,
            summary.critical_items
        );
        Ok(ReorderReport { summary, alerts })
    }

    pub async fn predict_demand(
        &self,
        user_id: &str,
        item_id: &str,
        days_ahead: u32,
    ) -> Result<ItemForecast> {
        let item = self
            .stock(user_id)
            .await?
            .into_iter()
            .find(|i| i.id == item_id)
            .ok_or_else(|| Error::not_found("item", item_id))?;

        let today = self.ctx.today();
        let period = FinancialPeriod::last_days(HISTORY_DAYS, today);
        let sales = self
            .ctx
            .aggregator
            .item_sales(user_id, item_id, &period)
            .await?;
        let history = daily_units(&sales);

        let fallback = if item.average_daily_sales > 0.0 {
            item.average_daily_sales
        } else {
            1.0
        };
        let forecast = reorder::predict_demand(
            &history,
            fallback,
            item.current_stock,
            days_ahead,
            today,
            &self.ctx.tables,
        );

        Ok(ItemForecast {
            item_id: item.id,
            item_name: item.name,
            days_ahead,
            forecast,
        })
    }

    pub async fn supplier_orders(&self, user_id: &str) -> Result<Vec<SupplierOrder>> {
        let report = self.reorder_alerts(user_id).await?;
        Ok(reorder::supplier_orders(&report.alerts))
    }
}

#[async_trait]
impl Agent for ReorderAgent {
    fn name(&self) -> &str {
        "reorder"
    }

    async fn analyze(&self, user_id: &str) -> Result<Value> {
        let report = self.reorder_alerts(user_id).await?;
        envelope::success(&report)
    }
}
