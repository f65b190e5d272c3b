//! Reorder urgency, order sizing and demand forecasting.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::season::seasonal_factor_for;
use super::tables::ScoringTables;
use super::{ratio_or, round1, round2};
use crate::models::{ReorderAlert, ReorderUrgency};

/// Days-until-stockout reported for items that are not selling.
pub const NO_SALES_DAYS: f64 = 999.0;

/// Stock figures for one inventory item.
#[derive(Debug, Clone, PartialEq)]
pub struct StockItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub current_stock: f64,
    pub average_daily_sales: f64,
    pub reorder_point: f64,
    pub min_order_quantity: u64,
    pub pack_size: u64,
    pub unit_cost: f64,
    pub supplier_id: Option<String>,
    pub supplier_name: String,
}

/// Urgency from days until stockout relative to the supplier lead time.
///
/// Fewer days never yields a less urgent tier.
pub fn urgency(days_until_stockout: f64, lead_time_days: u32) -> ReorderUrgency {
    let lead = lead_time_days as f64;
    if days_until_stockout <= lead {
        ReorderUrgency::Critical
    } else if days_until_stockout <= lead * 1.5 {
        ReorderUrgency::High
    } else if days_until_stockout <= lead * 2.0 {
        ReorderUrgency::Medium
    } else {
        ReorderUrgency::Low
    }
}

/// Units to order: target days of demand, rounded up to whole packs,
/// never below the supplier minimum.
pub fn order_quantity(daily_demand: f64, target_days: u32, pack_size: u64, min_order: u64) -> u64 {
    let base = (daily_demand * target_days as f64).max(0.0);
    let quantity = if pack_size > 1 {
        let packs = (base / pack_size as f64).floor() as u64;
        (packs + 1) * pack_size
    } else {
        base as u64
    };
    quantity.max(min_order)
}

/// Evaluate one item on `today`; `None` when stock is above both reorder points.
pub fn evaluate(item: &StockItem, today: NaiveDate, tables: &ScoringTables) -> Option<ReorderAlert> {
    let (season, factor) = seasonal_factor_for(today, tables);
    let adjusted_sales = item.average_daily_sales * factor;
    let lead_time = tables.lead_time(&item.category);
    let safety = tables.safety_multiplier(&item.category);
    let dynamic_point = adjusted_sales * lead_time as f64 * safety;

    if item.current_stock > dynamic_point && item.current_stock > item.reorder_point {
        return None;
    }

    let days_until_stockout = if adjusted_sales > 0.0 {
        item.current_stock / adjusted_sales
    } else {
        NO_SALES_DAYS
    };
    let urgency = urgency(days_until_stockout, lead_time);
    let quantity = order_quantity(
        adjusted_sales,
        tables.target_days(&item.category),
        item.pack_size,
        item.min_order_quantity,
    );

    Some(ReorderAlert {
        item_id: item.id.clone(),
        item_name: item.name.clone(),
        category: item.category.clone(),
        current_stock: item.current_stock,
        reorder_point: item.reorder_point,
        dynamic_reorder_point: round1(dynamic_point),
        recommended_quantity: quantity,
        days_until_stockout: round1(days_until_stockout),
        lead_time_days: lead_time,
        urgency,
        color: urgency.color().to_string(),
        season,
        seasonal_factor: factor,
        unit_cost: item.unit_cost,
        estimated_order_value: round2(quantity as f64 * item.unit_cost),
        supplier_id: item.supplier_id.clone(),
        supplier_name: item.supplier_name.clone(),
    })
}

/// Alerts for every item that needs ordering, most urgent first.
pub fn reorder_alerts(items: &[StockItem], today: NaiveDate, tables: &ScoringTables) -> Vec<ReorderAlert> {
    let mut alerts: Vec<ReorderAlert> = items
        .iter()
        .filter_map(|item| evaluate(item, today, tables))
        .collect();
    alerts.sort_by(|a, b| {
        a.urgency.cmp(&b.urgency).then_with(|| {
            a.days_until_stockout
                .partial_cmp(&b.days_until_stockout)
                .unwrap_or(Ordering::Equal)
        })
    });
    alerts
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReorderSummary {
    pub total_alerts: usize,
    pub critical_items: usize,
    pub total_estimated_order_value: f64,
}

pub fn reorder_summary(alerts: &[ReorderAlert]) -> ReorderSummary {
    ReorderSummary {
        total_alerts: alerts.len(),
        critical_items: alerts
            .iter()
            .filter(|a| a.urgency == ReorderUrgency::Critical)
            .count(),
        total_estimated_order_value: round2(alerts.iter().map(|a| a.estimated_order_value).sum()),
    }
}

/// Alerts grouped for one purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierOrder {
    pub supplier_id: String,
    pub supplier_name: String,
    pub item_count: usize,
    pub critical_items: usize,
    pub total_value: f64,
    pub items: Vec<ReorderAlert>,
}

/// Group alerts by supplier, most critical and most valuable first.
pub fn supplier_orders(alerts: &[ReorderAlert]) -> Vec<SupplierOrder> {
    let mut grouped: BTreeMap<String, SupplierOrder> = BTreeMap::new();

    for alert in alerts {
        let supplier_id = alert.supplier_id.clone().unwrap_or_else(|| "unknown".to_string());
        let order = grouped.entry(supplier_id.clone()).or_insert_with(|| SupplierOrder {
            supplier_id,
            supplier_name: if alert.supplier_name.is_empty() {
                "Unknown Supplier".to_string()
            } else {
                alert.supplier_name.clone()
            },
            item_count: 0,
            critical_items: 0,
            total_value: 0.0,
            items: Vec::new(),
        });
        order.item_count += 1;
        if alert.urgency == ReorderUrgency::Critical {
            order.critical_items += 1;
        }
        order.total_value = round2(order.total_value + alert.estimated_order_value);
        order.items.push(alert.clone());
    }

    let mut orders: Vec<SupplierOrder> = grouped.into_values().collect();
    orders.sort_by(|a, b| {
        b.critical_items.cmp(&a.critical_items).then_with(|| {
            b.total_value
                .partial_cmp(&a.total_value)
                .unwrap_or(Ordering::Equal)
        })
    });
    orders
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockAction {
    NoAction,
    Monitor,
    ReorderSoon,
    ReorderNow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyDemand {
    pub date: NaiveDate,
    pub weekday: String,
    pub predicted_units: f64,
    pub day_factor: f64,
    pub seasonal_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandForecast {
    pub daily: Vec<DailyDemand>,
    pub total_predicted_demand: f64,
    pub current_stock: f64,
    pub confidence: f64,
    pub action: StockAction,
    pub message: String,
}

/// Thursday and Friday trade above the week, Saturday and Sunday below.
pub fn day_of_week_factor(weekday: Weekday) -> f64 {
    match weekday {
        Weekday::Thu => 1.1,
        Weekday::Fri => 1.2,
        Weekday::Sat => 0.8,
        Weekday::Sun => 0.9,
        _ => 1.0,
    }
}

/// Forecast daily units for `days` days starting tomorrow.
///
/// `history` holds daily unit sales, oldest first. With a week or more of
/// history the recent week is weighted 70/30 against the full mean;
/// otherwise `fallback_daily` is used.
pub fn predict_demand(
    history: &[f64],
    fallback_daily: f64,
    current_stock: f64,
    days: u32,
    today: NaiveDate,
    tables: &ScoringTables,
) -> DemandForecast {
    let base = if history.len() >= 7 {
        let recent = &history[history.len() - 7..];
        let recent_avg = recent.iter().sum::<f64>() / 7.0;
        let overall_avg = history.iter().sum::<f64>() / history.len() as f64;
        recent_avg * 0.7 + overall_avg * 0.3
    } else {
        fallback_daily
    };

    let daily: Vec<DailyDemand> = (1..=days as i64)
        .map(|offset| {
            let date = today + Duration::days(offset);
            let day_factor = day_of_week_factor(date.weekday());
            let (_, seasonal_factor) = seasonal_factor_for(date, tables);
            DailyDemand {
                date,
                weekday: date.weekday().to_string(),
                predicted_units: round1(base * day_factor * seasonal_factor),
                day_factor,
                seasonal_factor,
            }
        })
        .collect();

    let total = round1(daily.iter().map(|d| d.predicted_units).sum());
    let confidence = (50.0 + history.len() as f64 * 0.5).min(95.0);
    let (action, message) = stock_action(current_stock, total, days);

    DemandForecast {
        daily,
        total_predicted_demand: total,
        current_stock,
        confidence,
        action,
        message,
    }
}

fn stock_action(stock: f64, demand: f64, days: u32) -> (StockAction, String) {
    let cover = ratio_or(stock, demand, f64::INFINITY);
    if cover >= 1.2 {
        (StockAction::NoAction, "Stock sufficient for forecast period".to_string())
    } else if cover >= 1.0 {
        (StockAction::Monitor, "Stock just covers forecast demand".to_string())
    } else if cover >= 0.5 {
        (
            StockAction::ReorderSoon,
            format!("Reorder within {:.0} days", days as f64 * 0.5),
        )
    } else {
        (StockAction::ReorderNow, "Reorder immediately".to_string())
    }
}
