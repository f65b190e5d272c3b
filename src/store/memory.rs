//! In-process store evaluating queries over rows held in memory.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::RwLock;
use tracing::debug;

use super::{Filter, FilterOp, Query, Row, SortOrder, Store};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    /// Resources whose calls fail, with the HTTP status to report.
    failing: RwLock<HashMap<String, Option<u16>>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object mapping resource names to arrays of rows.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(resources) = value else {
            return Err(Error::InvalidInput(
                "fixtures must be a JSON object of resource arrays".to_string(),
            ));
        };

        let mut tables = HashMap::new();
        for (resource, rows) in resources {
            let Value::Array(items) = rows else {
                return Err(Error::InvalidInput(format!(
                    "fixture resource '{}' is not an array",
                    resource
                )));
            };
            let rows = items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    _ => Err(Error::InvalidInput(format!(
                        "fixture resource '{}' contains a non-object row",
                        resource
                    ))),
                })
                .collect::<Result<Vec<Row>>>()?;
            tables.insert(resource, rows);
        }

        Ok(Self {
            tables: RwLock::new(tables),
            ..Self::default()
        })
    }

    /// Every row currently stored under `resource`.
    #[cfg(test)]
    pub async fn rows(&self, resource: &str) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(resource)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every call on `resource` fail; `None` simulates a connectivity failure.
    #[cfg(test)]
    pub async fn fail_resource(&self, resource: &str, status: Option<u16>) {
        self.failing
            .write()
            .await
            .insert(resource.to_string(), status);
    }

    async fn check_available(&self, resource: &str) -> Result<()> {
        match self.failing.read().await.get(resource) {
            Some(status) => Err(Error::UpstreamUnavailable {
                service: "store",
                status: *status,
                message: format!("{} is unavailable", resource),
            }),
            None => Ok(()),
        }
    }
}

/// Compare two JSON scalars: numbers numerically, strings lexicographically.
/// ISO dates and timestamps therefore order correctly.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.parse::<f64>().ok()?),
        (Value::String(x), Value::Number(y)) => x.parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn matches(row: &Row, filter: &Filter) -> bool {
    let Some(value) = row.get(&filter.field) else {
        return false;
    };
    let Some(ordering) = compare(value, &filter.value) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => ordering == Ordering::Equal,
        FilterOp::Gt => ordering == Ordering::Greater,
        FilterOp::Gte => ordering != Ordering::Less,
        FilterOp::Lt => ordering == Ordering::Less,
        FilterOp::Lte => ordering != Ordering::Greater,
    }
}

fn project(row: &Row, select: &[String]) -> Row {
    if select.is_empty() || select.iter().any(|f| f == "*") {
        return row.clone();
    }
    select
        .iter()
        .filter_map(|field| {
            let key = field.split('(').next().unwrap_or(field).trim();
            row.get(key).map(|v| (key.to_string(), v.clone()))
        })
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn select(&self, query: Query) -> Result<Vec<Row>> {
        self.check_available(&query.resource).await?;

        let tables = self.tables.read().await;
        let mut rows: Vec<&Row> = tables
            .get(&query.resource)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|f| matches(row, f)))
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, order)) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = match (a.get(field), b.get(field)) {
                    (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        let result: Vec<Row> = rows
            .into_iter()
            .take(limit)
            .map(|row| project(row, &query.select))
            .collect();
        debug!("memory select {} -> {} rows", query, result.len());
        Ok(result)
    }

    async fn insert(&self, resource: &str, rows: Vec<Row>) -> Result<()> {
        self.check_available(resource).await?;

        let mut tables = self.tables.write().await;
        let table = tables.entry(resource.to_string()).or_default();
        for mut row in rows {
            if !row.contains_key("id") {
                let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed) + 1;
                row.insert("id".to_string(), Value::String(format!("{}-{}", resource, id)));
            }
            table.push(row);
        }
        Ok(())
    }

    async fn update(&self, query: Query, patch: Row) -> Result<usize> {
        self.check_available(&query.resource).await?;

        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(&query.resource) else {
            return Ok(0);
        };

        let mut updated = 0;
        for row in rows
            .iter_mut()
            .filter(|row| query.filters.iter().all(|f| matches(row, f)))
        {
            for (key, value) in &patch {
                row.insert(key.clone(), value.clone());
            }
            updated += 1;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RowExt;
    use serde_json::json;
    use tokio_test::assert_err;

    fn store() -> MemoryStore {
        MemoryStore::from_json(json!({
            "transactions": [
                {"user_id": "u1", "transaction_type": "sale", "date": "2026-10-01T10:00:00", "amount_aed": 100.0},
                {"user_id": "u1", "transaction_type": "sale", "date": "2026-10-15T18:30:00", "amount_aed": 250.0},
                {"user_id": "u1", "transaction_type": "expense", "date": "2026-10-05", "amount_aed": 40.0},
                {"user_id": "u2", "transaction_type": "sale", "date": "2026-10-03", "amount_aed": 999.0}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_select_filters_and_orders() {
        let rows = store()
            .select(
                Query::new("transactions")
                    .eq("user_id", "u1")
                    .eq("transaction_type", "sale")
                    .gte("date", "2026-10-01")
                    .lt("date", "2026-10-16")
                    .order("amount_aed", SortOrder::Desc),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].num("amount_aed"), 250.0);
    }

    #[tokio::test]
    async fn test_exclusive_end_keeps_timestamps_on_last_day() {
        let rows = store()
            .select(
                Query::new("transactions")
                    .eq("user_id", "u1")
                    .lt("date", "2026-10-15"),
            )
            .await
            .unwrap();
        // The 2026-10-15T18:30 sale sorts after "2026-10-15".
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_projection_and_limit() {
        let rows = store()
            .select(
                Query::new("transactions")
                    .select(&["amount_aed", "suppliers(name)"])
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 1);
        assert!(rows[0].contains_key("amount_aed"));
    }

    #[tokio::test]
    async fn test_unknown_resource_is_empty() {
        let rows = store().select(Query::new("nothing")).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_update_patches() {
        let store = MemoryStore::new();
        let row = json!({"user_id": "u1", "status": "pending"})
            .as_object()
            .cloned()
            .unwrap();
        store.insert("recommendations", vec![row]).await.unwrap();

        let rows = store.rows("recommendations").await;
        assert_eq!(rows[0].text("id"), "recommendations-1");

        let mut patch = Row::new();
        patch.insert("status".to_string(), json!("completed"));
        let updated = store
            .update(Query::new("recommendations").eq("id", "recommendations-1"), patch)
            .await
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(store.rows("recommendations").await[0].text("status"), "completed");
    }

    #[tokio::test]
    async fn test_failing_resource() {
        let store = store();
        store.fail_resource("transactions", Some(503)).await;
        let result = store.select(Query::new("transactions")).await;
        assert_err!(&result);
        assert!(result.unwrap_err().is_upstream_status());
    }

    #[test]
    fn test_from_json_rejects_bad_shapes() {
        assert!(MemoryStore::from_json(json!([])).is_err());
        assert!(MemoryStore::from_json(json!({"a": {}})).is_err());
        assert!(MemoryStore::from_json(json!({"a": [1]})).is_err());
    }
}
