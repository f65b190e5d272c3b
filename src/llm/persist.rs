//! Writes structured companion replies into their designated tables.
//!
//! Only agents named in [`RULES`] persist anything. A rule locates a unit
//! (or a list of units) in the parsed reply, shapes each unit into a row
//! and inserts the rows. Every row carries `user_id` and `created_at`.

use chrono::{Duration, NaiveDateTime};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::parse_payload;
use crate::error::Result;
use crate::store::{Row, Store};

/// Per-write values shared by every row.
pub struct Stamp<'a> {
    pub user_id: &'a str,
    pub now: NaiveDateTime,
}

impl Stamp<'_> {
    fn timestamp(&self) -> String {
        iso(self.now)
    }

    fn days_ahead(&self, days: i64) -> String {
        iso(self.now + Duration::days(days))
    }
}

fn iso(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Shapes one unit of the reply; `parent` is the object holding it.
type Shape = fn(Row, &Row, &Stamp) -> Row;

pub struct Rule {
    pub agent: &'static str,
    /// Keys leading to the unit, from the reply root.
    pub path: &'static [&'static str],
    /// True when the path ends at an array of units.
    pub many: bool,
    pub table: &'static str,
    shape: Shape,
}

pub const RULES: &[Rule] = &[
    Rule {
        agent: "budget",
        path: &["budgets"],
        many: true,
        table: "budgets",
        shape: |row, _, stamp| {
            with_fields(row, stamp, [("is_active", json!(true))])
        },
    },
    Rule {
        agent: "recommendation",
        path: &["recommendations"],
        many: true,
        table: "recommendations",
        shape: |row, _, stamp| {
            with_fields(
                row,
                stamp,
                [
                    ("status", json!("pending")),
                    ("delivered_at", Value::Null),
                    ("actioned_at", Value::Null),
                    ("completed_at", Value::Null),
                    ("user_feedback", Value::Null),
                    ("actual_outcome", Value::Null),
                ],
            )
        },
    },
    Rule {
        agent: "pattern",
        path: &["income_patterns"],
        many: false,
        table: "income_patterns",
        shape: |row, _, stamp| {
            with_fields(
                row,
                stamp,
                [
                    ("last_calculated", json!(stamp.timestamp())),
                    ("valid_until", json!(stamp.days_ahead(120))),
                ],
            )
        },
    },
    Rule {
        agent: "risk",
        path: &["risk_assessment"],
        many: false,
        table: "risk_assessments",
        shape: |row, _, stamp| {
            with_fields(row, stamp, [("assessment_date", json!(stamp.timestamp()))])
        },
    },
    Rule {
        agent: "tax",
        path: &["tax_record"],
        many: false,
        table: "tax_records",
        shape: |row, _, stamp| with_fields(row, stamp, []),
    },
    Rule {
        agent: "volatility",
        path: &["income_forecast"],
        many: false,
        table: "income_forecasts",
        shape: |row, _, stamp| {
            with_fields(
                row,
                stamp,
                [
                    ("forecast_date", json!(stamp.timestamp())),
                    ("valid_until", json!(stamp.days_ahead(30))),
                ],
            )
        },
    },
    Rule {
        agent: "financial",
        path: &["financial_health"],
        many: false,
        table: "financial_health",
        shape: |row, _, stamp| {
            with_fields(row, stamp, [("assessment_date", json!(stamp.timestamp()))])
        },
    },
    Rule {
        agent: "action",
        path: &["action_plan", "actions"],
        many: true,
        table: "executed_actions",
        shape: |action, plan, stamp| {
            let description = action
                .get("description")
                .or_else(|| action.get("action_id"))
                .cloned()
                .unwrap_or(Value::Null);
            let mut row = stamped(stamp);
            row.insert(
                "action_type".to_string(),
                plan.get("plan_type").cloned().unwrap_or(json!("automation")),
            );
            row.insert("action_description".to_string(), description);
            row.insert("status".to_string(), json!("pending"));
            row.insert("amount".to_string(), field_or(&action, "target_amount", json!(0)));
            row.insert("schedule".to_string(), field_or(&action, "frequency", json!("one_time")));
            row.insert("user_approved".to_string(), json!(false));
            row
        },
    },
    Rule {
        agent: "savings",
        path: &["savings_plan", "emergency_fund"],
        many: false,
        table: "savings_goals",
        shape: |fund, _, stamp| {
            let mut row = picked(
                &fund,
                stamp,
                &[
                    ("target_amount", json!(0)),
                    ("current_amount", json!(0)),
                    ("monthly_contribution", json!(0)),
                    ("priority", json!("high")),
                    ("status", json!("in_progress")),
                    ("reasoning", json!("")),
                ],
            );
            row.insert("goal_type".to_string(), json!("emergency_fund"));
            row.insert("goal_name".to_string(), json!("Emergency Fund"));
            row
        },
    },
    Rule {
        agent: "savings",
        path: &["savings_plan", "investment_recommendations"],
        many: true,
        table: "investment_recommendations",
        shape: |investment, _, stamp| {
            picked(
                &investment,
                stamp,
                &[
                    ("investment_type", json!("")),
                    ("provider", json!("")),
                    ("recommended_amount", json!(0)),
                    ("frequency", json!("monthly")),
                    ("expected_return", json!(0)),
                    ("risk_level", json!("low")),
                    ("reasoning", json!("")),
                ],
            )
        },
    },
    Rule {
        agent: "bills",
        path: &["bill_analysis", "bills"],
        many: true,
        table: "bills",
        shape: |bill, _, stamp| {
            picked(
                &bill,
                stamp,
                &[
                    ("bill_name", json!("")),
                    ("bill_type", json!("utility")),
                    ("amount", json!(0)),
                    ("due_date", json!("")),
                    ("frequency", json!("monthly")),
                    ("priority", json!("medium")),
                    ("auto_pay_recommended", json!(false)),
                    ("payment_method", json!("bank_transfer")),
                    ("status", json!("pending")),
                ],
            )
        },
    },
    Rule {
        agent: "goals",
        path: &["goals_plan", "goals"],
        many: true,
        table: "financial_goals",
        shape: |goal, _, stamp| {
            picked(
                &goal,
                stamp,
                &[
                    ("goal_name", json!("")),
                    ("goal_type", json!("savings")),
                    ("description", json!("")),
                    ("target_amount", json!(0)),
                    ("current_amount", json!(0)),
                    ("target_date", json!("")),
                    ("priority", json!(1)),
                    ("status", json!("not_started")),
                    ("monthly_target", json!(0)),
                    ("progress_percentage", json!(0)),
                    ("explanation", json!({})),
                    ("milestones", json!([])),
                    ("action_steps", json!([])),
                ],
            )
        },
    },
];

fn stamped(stamp: &Stamp) -> Row {
    let mut row = Row::new();
    row.insert("user_id".to_string(), json!(stamp.user_id));
    row.insert("created_at".to_string(), json!(stamp.timestamp()));
    row
}

/// The unit as-is, stamped, plus `extra` fields (which win over the reply).
fn with_fields<const N: usize>(mut row: Row, stamp: &Stamp, extra: [(&str, Value); N]) -> Row {
    row.extend(stamped(stamp));
    for (key, value) in extra {
        row.insert(key.to_string(), value);
    }
    row
}

/// Only the listed fields, each falling back to its default.
fn picked(unit: &Row, stamp: &Stamp, fields: &[(&str, Value)]) -> Row {
    let mut row = stamped(stamp);
    for (key, default) in fields {
        row.insert(key.to_string(), field_or(unit, key, default.clone()));
    }
    row
}

fn field_or(unit: &Row, key: &str, default: Value) -> Value {
    match unit.get(key) {
        Some(Value::Null) | None => default,
        Some(value) => value.clone(),
    }
}

pub fn is_persisting(agent: &str) -> bool {
    RULES.iter().any(|rule| rule.agent == agent)
}

/// Rows per table that `payload` yields for `agent`.
pub fn rows_for(agent: &str, payload: &Value, stamp: &Stamp) -> Vec<(&'static str, Vec<Row>)> {
    let empty = Row::new();
    RULES
        .iter()
        .filter(|rule| rule.agent == agent)
        .filter_map(|rule| {
            let (parent_path, last) = rule.path.split_at(rule.path.len() - 1);
            let mut parent = payload;
            for key in parent_path {
                parent = parent.get(key)?;
            }
            let parent_row = parent.as_object().unwrap_or(&empty);
            let target = parent.get(last[0])?;

            let units: Vec<Row> = if rule.many {
                target
                    .as_array()?
                    .iter()
                    .filter_map(|unit| unit.as_object().cloned())
                    .collect()
            } else {
                vec![target.as_object()?.clone()]
            };

            let rows: Vec<Row> = units
                .into_iter()
                .map(|unit| (rule.shape)(unit, parent_row, stamp))
                .collect();
            (!rows.is_empty()).then_some((rule.table, rows))
        })
        .collect()
}

/// Parse `reply` and write whatever `agent` is allowed to persist.
///
/// Returns the number of rows written. A malformed reply is an error for the
/// caller to log; a failed insert is logged here and the remaining tables
/// are still attempted.
pub async fn persist(store: &dyn Store, agent: &str, reply: &str, stamp: &Stamp<'_>) -> Result<usize> {
    if !is_persisting(agent) {
        debug!("{} output is not persisted", agent);
        return Ok(0);
    }

    let payload = parse_payload(reply)?;

    let mut written = 0;
    for (table, rows) in rows_for(agent, &payload, stamp) {
        let count = rows.len();
        match store.insert(table, rows).await {
            Ok(()) => {
                info!("Wrote {} {} row(s) for {}", count, table, stamp.user_id);
                written += count;
            }
            Err(e) => warn!("Failed to write {} for {}: {}", table, stamp.user_id, e),
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::{MemoryStore, RowExt};
    use chrono::NaiveDate;

    fn stamp() -> Stamp<'static> {
        Stamp {
            user_id: "u1",
            now: NaiveDate::from_ymd_opt(2026, 10, 15)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_budget_rows_are_stamped_and_active() {
        let store = MemoryStore::new();
        let reply = r#"```json
{"budgets": [{"category": "groceries", "amount": 1200}, {"category": "transport", "amount": 400}]}
```"#;
        let written = persist(&store, "budget", reply, &stamp()).await.unwrap();
        assert_eq!(written, 2);

        let rows = store.rows("budgets").await;
        assert_eq!(rows[0].text("user_id"), "u1");
        assert_eq!(rows[0].text("created_at"), "2026-10-15T09:00:00");
        assert!(rows[1].flag("is_active"));
        assert_eq!(rows[1].text("category"), "transport");
    }

    #[tokio::test]
    async fn test_single_unit_rules_add_validity() {
        let store = MemoryStore::new();
        let reply = r#"{"income_patterns": {"pattern_type": "weekly", "average_income": 5200}}"#;
        persist(&store, "pattern", reply, &stamp()).await.unwrap();

        let rows = store.rows("income_patterns").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("valid_until"), "2027-02-12T09:00:00");
    }

    #[tokio::test]
    async fn test_action_plan_maps_fields() {
        let store = MemoryStore::new();
        let reply = r#"{"action_plan": {"plan_type": "savings_transfer", "actions": [
            {"action_id": "a-1", "target_amount": 500, "frequency": "weekly"},
            {"description": "Pay DEWA early"}
        ]}}"#;
        persist(&store, "action", reply, &stamp()).await.unwrap();

        let rows = store.rows("executed_actions").await;
        assert_eq!(rows[0].text("action_type"), "savings_transfer");
        assert_eq!(rows[0].text("action_description"), "a-1");
        assert_eq!(rows[0].num("amount"), 500.0);
        assert_eq!(rows[1].text("schedule"), "one_time");
        assert_eq!(rows[1].text("status"), "pending");
        assert!(!rows[1].flag("user_approved"));
    }

    #[tokio::test]
    async fn test_savings_writes_two_tables() {
        let store = MemoryStore::new();
        let reply = r#"{"savings_plan": {
            "emergency_fund": {"target_amount": 30000, "monthly_contribution": 1500},
            "investment_recommendations": [{"investment_type": "sukuk", "recommended_amount": 1000}]
        }}"#;
        let written = persist(&store, "savings", reply, &stamp()).await.unwrap();
        assert_eq!(written, 2);

        let goals = store.rows("savings_goals").await;
        assert_eq!(goals[0].text("goal_type"), "emergency_fund");
        assert_eq!(goals[0].text("priority"), "high");

        let investments = store.rows("investment_recommendations").await;
        assert_eq!(investments[0].text("frequency"), "monthly");
    }

    #[tokio::test]
    async fn test_unlisted_agent_writes_nothing() {
        let store = MemoryStore::new();
        let written = persist(&store, "cashflow", "not even json", &stamp()).await.unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_an_error() {
        let store = MemoryStore::new();
        let result = persist(&store, "budget", "Sure! Here is a budget.", &stamp()).await;
        assert!(matches!(result, Err(Error::MalformedModelOutput(_))));
        assert!(store.rows("budgets").await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_section_writes_nothing() {
        let store = MemoryStore::new();
        let written = persist(&store, "goals", r#"{"summary": "ok"}"#, &stamp()).await.unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_failed_insert_is_not_fatal() {
        let store = MemoryStore::new();
        store.fail_resource("budgets", Some(500)).await;
        let written = persist(&store, "budget", r#"{"budgets": [{"amount": 1}]}"#, &stamp())
            .await
            .unwrap();
        assert_eq!(written, 0);
    }
}
