//! Query contract for the external record store.
//!
//! A [`Query`] names a resource, a projection, filters, an ordering and a
//! limit. Implementations translate it to their backend: [`rest::RestStore`]
//! speaks PostgREST over HTTP, [`memory::MemoryStore`] evaluates it over
//! in-process rows loaded from fixtures.

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::fmt;

use crate::error::Result;

pub use memory::MemoryStore;
pub use rest::RestStore;

/// A single record as returned by the store.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Builder for a read (or the row selection of an update).
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub resource: String,
    pub select: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            select: Vec::new(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Restrict the returned fields. Embedded relations use `name(field)`.
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Gt, value)
    }

    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Gte, value)
    }

    pub fn lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Lt, value)
    }

    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Lte, value)
    }

    pub fn order(mut self, field: &str, order: SortOrder) -> Self {
        self.order = Some((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// PostgREST query parameters, e.g. `user_id=eq.u1`, `order=date.desc`.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|f| {
                (
                    f.field.clone(),
                    format!("{}.{}", f.op.as_str(), param_value(&f.value)),
                )
            })
            .collect();

        if !self.select.is_empty() {
            params.push(("select".to_string(), self.select.join(",")));
        }
        if let Some((field, order)) = &self.order {
            let direction = match order {
                SortOrder::Asc => "asc",
                SortOrder::Desc => "desc",
            };
            params.push(("order".to_string(), format!("{}.{}", field, direction)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        for filter in &self.filters {
            write!(
                f,
                " {}={}.{}",
                filter.field,
                filter.op.as_str(),
                param_value(&filter.value)
            )?;
        }
        Ok(())
    }
}

fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// The external record store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn select(&self, query: Query) -> Result<Vec<Row>>;

    async fn insert(&self, resource: &str, rows: Vec<Row>) -> Result<()>;

    /// Apply `patch` to every row the query's filters match; returns the count.
    async fn update(&self, query: Query, patch: Row) -> Result<usize>;
}

/// Lenient typed accessors over loosely typed store rows.
pub trait RowExt {
    /// Numeric field; numeric strings are parsed, anything else is 0.
    fn num(&self, field: &str) -> f64;

    fn opt_num(&self, field: &str) -> Option<f64>;

    /// String field, or "" when absent.
    fn text(&self, field: &str) -> &str;

    fn opt_text(&self, field: &str) -> Option<&str>;

    fn flag(&self, field: &str) -> bool;

    /// Calendar date from a `YYYY-MM-DD` prefix (timestamps included).
    fn date(&self, field: &str) -> Option<NaiveDate>;

    fn datetime(&self, field: &str) -> Option<NaiveDateTime>;

    /// Field of an embedded relation such as `suppliers(name)`.
    fn nested_text(&self, relation: &str, field: &str) -> Option<&str>;
}

impl RowExt for Row {
    fn num(&self, field: &str) -> f64 {
        self.opt_num(field).unwrap_or(0.0)
    }

    fn opt_num(&self, field: &str) -> Option<f64> {
        match self.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn text(&self, field: &str) -> &str {
        self.opt_text(field).unwrap_or("")
    }

    fn opt_text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    fn flag(&self, field: &str) -> bool {
        self.get(field).and_then(Value::as_bool).unwrap_or(false)
    }

    fn date(&self, field: &str) -> Option<NaiveDate> {
        let raw = self.opt_text(field)?;
        let prefix = raw.get(..10)?;
        NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
    }

    fn datetime(&self, field: &str) -> Option<NaiveDateTime> {
        let raw = self.opt_text(field)?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.naive_local());
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(dt);
            }
        }
        self.date(field).and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    fn nested_text(&self, relation: &str, field: &str) -> Option<&str> {
        self.get(relation)?.get(field)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_query_params() {
        let query = Query::new("transactions")
            .select(&["amount_aed", "vat_amount"])
            .eq("user_id", "u1")
            .eq("transaction_type", "sale")
            .gte("date", "2026-10-01")
            .lt("date", "2026-10-16")
            .order("date", SortOrder::Desc)
            .limit(50);

        let params = query.to_params();
        assert_eq!(
            params,
            vec![
                ("user_id".to_string(), "eq.u1".to_string()),
                ("transaction_type".to_string(), "eq.sale".to_string()),
                ("date".to_string(), "gte.2026-10-01".to_string()),
                ("date".to_string(), "lt.2026-10-16".to_string()),
                ("select".to_string(), "amount_aed,vat_amount".to_string()),
                ("order".to_string(), "date.desc".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn test_numeric_filter_param() {
        let params = Query::new("customers").gt("total_credit_outstanding", 0).to_params();
        assert_eq!(params[0].1, "gt.0");
    }

    #[test]
    fn test_query_display() {
        let query = Query::new("customers").eq("id", "c1");
        assert_eq!(query.to_string(), "customers id=eq.c1");
    }

    #[test]
    fn test_row_accessors() {
        let r = row(json!({
            "amount": 12.5,
            "text_amount": "7.25",
            "name": "Al Noor",
            "active": true,
            "date": "2026-10-15T09:30:00+04:00",
            "plain": "2026-10-14",
            "suppliers": {"name": "Gulf Foods"}
        }));

        assert_eq!(r.num("amount"), 12.5);
        assert_eq!(r.num("text_amount"), 7.25);
        assert_eq!(r.num("missing"), 0.0);
        assert_eq!(r.text("name"), "Al Noor");
        assert_eq!(r.text("missing"), "");
        assert!(r.flag("active"));
        assert_eq!(r.date("date"), NaiveDate::from_ymd_opt(2026, 10, 15));
        assert_eq!(
            r.datetime("date").map(|d| d.to_string()),
            Some("2026-10-15 09:30:00".to_string())
        );
        assert_eq!(
            r.datetime("plain").map(|d| d.to_string()),
            Some("2026-10-14 00:00:00".to_string())
        );
        assert_eq!(r.nested_text("suppliers", "name"), Some("Gulf Foods"));
    }
}
