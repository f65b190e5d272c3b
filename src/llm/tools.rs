//! Tool declarations offered to the model, and their executor.
//!
//! The model gets one read-only tool, `query_store`, which runs a
//! [`Query`] scoped to the user being analyzed. Filters use the
//! PostgREST `op.value` notation (`{"date": "gte.2026-10-01"}`).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::store::{FilterOp, Query, SortOrder, Store};

/// Rows returned to the model from one call.
const MAX_TOOL_ROWS: usize = 200;

/// Tool definition for Ollama's tool-calling API.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool call made by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message),
        }
    }
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        tool_type: "function".to_string(),
        function: FunctionDefinition {
            name: "query_store".to_string(),
            description: "Read rows from a table of the user's financial records. \
                          Results are limited to the current user."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "table": {
                        "type": "string",
                        "description": "Table to read, e.g. transactions, budgets, bills"
                    },
                    "filters": {
                        "type": "object",
                        "description": "Field to PostgREST condition, e.g. {\"date\": \"gte.2026-10-01\"}"
                    },
                    "select": {
                        "type": "string",
                        "description": "Comma-separated fields to return (default: all)"
                    },
                    "order": {
                        "type": "string",
                        "description": "Sort as field.asc or field.desc"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum rows to return"
                    }
                },
                "required": ["table"]
            }),
        },
    }]
}

/// Runs tool calls for one user against the store.
pub struct ToolExecutor {
    store: Arc<dyn Store>,
    user_id: String,
}

impl ToolExecutor {
    pub fn new(store: Arc<dyn Store>, user_id: &str) -> Self {
        Self {
            store,
            user_id: user_id.to_string(),
        }
    }

    pub async fn execute(&self, tool_call: &ToolCall) -> ToolResult {
        let name = &tool_call.function.name;
        let args = &tool_call.function.arguments;

        debug!("Executing tool: {} with args: {:?}", name, args);

        match name.as_str() {
            "query_store" => self.query_store(args).await,
            _ => ToolResult::error(format!("Unknown tool: {}", name)),
        }
    }

    async fn query_store(&self, args: &Value) -> ToolResult {
        let query = match self.build_query(args) {
            Ok(query) => query,
            Err(message) => return ToolResult::error(message),
        };

        match self.store.select(query).await {
            Ok(rows) => match serde_json::to_string(&rows) {
                Ok(output) => ToolResult::success(output),
                Err(e) => ToolResult::error(format!("Failed to encode rows: {}", e)),
            },
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    fn build_query(&self, args: &Value) -> Result<Query, String> {
        let table = args["table"]
            .as_str()
            .filter(|t| !t.is_empty())
            .ok_or("Missing required parameter: table")?;

        let mut query = Query::new(table).eq("user_id", self.user_id.as_str());

        if let Some(filters) = args["filters"].as_object() {
            for (field, condition) in filters {
                if field == "user_id" {
                    continue;
                }
                let condition = condition
                    .as_str()
                    .ok_or_else(|| format!("Filter for '{}' must be a string", field))?;
                let (op, value) = parse_condition(condition)
                    .ok_or_else(|| format!("Unsupported filter '{}' on '{}'", condition, field))?;
                query = query.filter(field, op, value);
            }
        }

        if let Some(select) = args["select"].as_str() {
            let fields: Vec<&str> = select.split(',').map(str::trim).collect();
            query = query.select(&fields);
        }

        if let Some(order) = args["order"].as_str() {
            let (field, direction) = order.split_once('.').unwrap_or((order, "asc"));
            let direction = if direction == "desc" {
                SortOrder::Desc
            } else {
                SortOrder::Asc
            };
            query = query.order(field, direction);
        }

        let limit = args["limit"]
            .as_u64()
            .map(|l| l as usize)
            .unwrap_or(MAX_TOOL_ROWS)
            .min(MAX_TOOL_ROWS);
        Ok(query.limit(limit))
    }
}

/// Parse `op.value`; numeric values stay numeric.
fn parse_condition(condition: &str) -> Option<(FilterOp, Value)> {
    let (op, raw) = condition.split_once('.')?;
    let op = match op {
        "eq" => FilterOp::Eq,
        "gt" => FilterOp::Gt,
        "gte" => FilterOp::Gte,
        "lt" => FilterOp::Lt,
        "lte" => FilterOp::Lte,
        _ => return None,
    };
    let value = match raw.parse::<f64>() {
        Ok(n) => json!(n),
        Err(_) => Value::String(raw.to_string()),
    };
    Some((op, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn executor() -> ToolExecutor {
        let store = MemoryStore::from_json(json!({
            "bills": [
                {"user_id": "u1", "bill_name": "DEWA", "amount": 650.0, "due_date": "2026-10-20"},
                {"user_id": "u1", "bill_name": "Etisalat", "amount": 299.0, "due_date": "2026-11-02"},
                {"user_id": "u2", "bill_name": "Rent", "amount": 9000.0, "due_date": "2026-10-25"}
            ]
        }))
        .unwrap();
        ToolExecutor::new(Arc::new(store), "u1")
    }

    fn call(arguments: Value) -> ToolCall {
        ToolCall {
            function: FunctionCall {
                name: "query_store".to_string(),
                arguments,
            },
        }
    }

    #[test]
    fn test_tool_definitions() {
        let tools = tool_definitions();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function.name, "query_store");
    }

    #[tokio::test]
    async fn test_query_is_scoped_to_user() {
        let result = executor()
            .execute(&call(json!({"table": "bills", "filters": {"user_id": "eq.u2"}})))
            .await;
        assert!(result.success);
        let rows: Vec<Value> = serde_json::from_str(&result.output).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_query_filters_and_order() {
        let result = executor()
            .execute(&call(json!({
                "table": "bills",
                "filters": {"amount": "gt.300"},
                "order": "due_date.desc",
                "select": "bill_name"
            })))
            .await;
        let rows: Vec<Value> = serde_json::from_str(&result.output).unwrap();
        assert_eq!(rows, vec![json!({"bill_name": "DEWA"})]);
    }

    #[tokio::test]
    async fn test_bad_calls_are_reported() {
        let exec = executor();
        assert!(!exec.execute(&call(json!({}))).await.success);
        assert!(
            !exec
                .execute(&call(json!({"table": "bills", "filters": {"amount": "like.%x"}})))
                .await
                .success
        );

        let unknown = ToolCall {
            function: FunctionCall {
                name: "drop_table".to_string(),
                arguments: json!({}),
            },
        };
        let result = exec.execute(&unknown).await;
        assert_eq!(result.error.as_deref(), Some("Unknown tool: drop_table"));
    }
}
