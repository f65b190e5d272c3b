//! Model-backed companion agents.
//!
//! Each kind sends one request to the model: a role-specific system prompt,
//! a task carrying today's calendar figures and the `query_store` tool.
//! Tool calls in the reply are executed once against the store; there is
//! no second round trip. Structured replies from persisting kinds are
//! written back through [`crate::llm::persist`].

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{envelope, Agent, AgentContext};
use crate::error::{Error, Result};
use crate::llm::persist::{self, Stamp};
use crate::llm::tools::{tool_definitions, ToolExecutor, ToolResult};
use crate::llm::{parse_payload, ChatReply, ChatRequest, ModelClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanionKind {
    Pattern,
    Volatility,
    Budget,
    Cashflow,
    Risk,
    Knowledge,
    Tax,
    Bills,
    Savings,
    Goals,
    Financial,
    Action,
    Recommendation,
}

impl CompanionKind {
    /// The full companion pipeline, in run order.
    pub const FULL: [CompanionKind; 10] = [
        CompanionKind::Pattern,
        CompanionKind::Volatility,
        CompanionKind::Budget,
        CompanionKind::Cashflow,
        CompanionKind::Risk,
        CompanionKind::Knowledge,
        CompanionKind::Tax,
        CompanionKind::Bills,
        CompanionKind::Savings,
        CompanionKind::Goals,
    ];

    /// Every kind, including those only run on request.
    pub const ALL: [CompanionKind; 13] = [
        CompanionKind::Pattern,
        CompanionKind::Volatility,
        CompanionKind::Budget,
        CompanionKind::Cashflow,
        CompanionKind::Risk,
        CompanionKind::Knowledge,
        CompanionKind::Tax,
        CompanionKind::Bills,
        CompanionKind::Savings,
        CompanionKind::Goals,
        CompanionKind::Financial,
        CompanionKind::Action,
        CompanionKind::Recommendation,
    ];

    pub const QUICK: [CompanionKind; 3] = [
        CompanionKind::Budget,
        CompanionKind::Risk,
        CompanionKind::Cashflow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompanionKind::Pattern => "pattern",
            CompanionKind::Volatility => "volatility",
            CompanionKind::Budget => "budget",
            CompanionKind::Cashflow => "cashflow",
            CompanionKind::Risk => "risk",
            CompanionKind::Knowledge => "knowledge",
            CompanionKind::Tax => "tax",
            CompanionKind::Bills => "bills",
            CompanionKind::Savings => "savings",
            CompanionKind::Goals => "goals",
            CompanionKind::Financial => "financial",
            CompanionKind::Action => "action",
            CompanionKind::Recommendation => "recommendation",
        }
    }

    fn brief(&self) -> Brief {
        match self {
            CompanionKind::Pattern => Brief {
                role: "a Pattern Recognition Agent specializing in income pattern analysis. \
                       Identify weekly income cycles, seasonal variations, income stability and trend.",
                steps: "1. Query the transactions table for this user (last 60 days)\n\
                        2. Calculate income statistics\n\
                        3. Identify weekday patterns\n\
                        4. Detect trends",
                output: r#"{"income_patterns": {"average_weekly_income": number, "income_volatility": number, "seasonal_factors": {}, "weekday_pattern": {}, "trend": "rising|stable|falling", "confidence_score": 0.0-1.0}}"#,
            },
            CompanionKind::Volatility => Brief {
                role: "a Volatility Forecaster. Forecast next month's income with a confidence band \
                       and flag the weeks most likely to fall short.",
                steps: "1. Query income transactions for the last 90 days\n\
                        2. Query income_patterns for the latest stored pattern\n\
                        3. Estimate expected, low and high income for the next 30 days",
                output: r#"{"income_forecast": {"forecast_period": "next_30_days", "expected_income": number, "lower_bound": number, "upper_bound": number, "volatility_score": number, "risk_weeks": [], "confidence_score": 0.0-1.0}}"#,
            },
            CompanionKind::Budget => Brief {
                role: "a Budget Analysis Agent. Build a realistic monthly budget per spending \
                       category from actual income and spending.",
                steps: "1. Query income and expense transactions since the month start\n\
                        2. Query the last three months of expenses by category\n\
                        3. Propose one budget per category that fits expected income",
                output: r#"{"budgets": [{"category": "string", "amount": number, "period": "monthly", "spent_so_far": number, "reasoning": "string"}]}"#,
            },
            CompanionKind::Cashflow => Brief {
                role: "a Cash Flow Monitor. Answer one question: is the owner on track to meet \
                       this month's expenses? Be direct and focused on what to do TODAY.",
                steps: "1. Query transactions for this user from the month start to today\n\
                        2. Query the bills table for bills due before the month ends\n\
                        3. Projected gap = month-to-date net minus upcoming bills\n\
                        4. Status: on_track if the gap exceeds 20% of upcoming bills, \
                        at_risk between 0 and 20%, critical below 0",
                output: r#"{"status": "on_track|at_risk|critical", "days_remaining_in_month": number, "month_to_date": {"income": number, "expenses": number, "net": number}, "upcoming_bills": {"total_due": number, "count": number}, "projected_gap": number, "daily_earning_target": number, "message": "string", "recommendations": [], "confidence_score": 0.0-1.0}"#,
            },
            CompanionKind::Risk => Brief {
                role: "a Risk Assessment Agent. Score income, debt and liquidity risk and name \
                       the single biggest exposure.",
                steps: "1. Query transactions for the last 90 days\n\
                        2. Query bills and financial_goals\n\
                        3. Score each risk from 0 (none) to 100 (severe)",
                output: r#"{"risk_assessment": {"overall_risk_score": number, "income_risk": number, "debt_risk": number, "liquidity_risk": number, "risk_level": "low|medium|high", "top_risks": [], "mitigation_steps": []}}"#,
            },
            CompanionKind::Knowledge => Brief {
                role: "a Knowledge Integration Agent. Explain the owner's current financial \
                       position in plain language, drawing on every stored analysis.",
                steps: "1. Query income_patterns, income_forecasts, budgets and risk_assessments\n\
                        2. Reconcile them with the month's transactions\n\
                        3. Summarize the three facts the owner most needs to know",
                output: r#"{"summary": "string", "key_facts": [], "open_questions": []}"#,
            },
            CompanionKind::Tax => Brief {
                role: "a Tax Compliance Agent for UAE businesses. Estimate VAT due for the \
                       current quarter and flag missing records.",
                steps: "1. Query sales and purchase transactions for the current quarter\n\
                        2. Sum output and input VAT at 5%\n\
                        3. List transactions lacking VAT details",
                output: r#"{"tax_record": {"tax_period": "string", "taxable_income": number, "output_vat": number, "input_vat": number, "estimated_tax": number, "filing_deadline": "date", "missing_records": number}}"#,
            },
            CompanionKind::Bills => Brief {
                role: "a Bill Payment Agent. Find recurring bills, rank them by urgency and say \
                       which should be paid automatically.",
                steps: "1. Query expense transactions for the last 90 days\n\
                        2. Query the bills table\n\
                        3. Detect recurring payments not yet tracked as bills",
                output: r#"{"bill_analysis": {"total_monthly_bills": number, "bills": [{"bill_name": "string", "bill_type": "string", "amount": number, "due_date": "date", "frequency": "monthly", "priority": "high|medium|low", "auto_pay_recommended": bool, "payment_method": "string"}]}}"#,
            },
            CompanionKind::Savings => Brief {
                role: "a Savings and Investment Agent. Size an emergency fund and suggest \
                       low-risk ways to grow surplus cash.",
                steps: "1. Query the last 90 days of income and expenses\n\
                        2. Emergency fund target = three months of expenses\n\
                        3. Suggest investments only from genuine monthly surplus",
                output: r#"{"savings_plan": {"emergency_fund": {"target_amount": number, "current_amount": number, "monthly_contribution": number, "priority": "high", "reasoning": "string"}, "investment_recommendations": [{"investment_type": "string", "provider": "string", "recommended_amount": number, "frequency": "monthly", "expected_return": number, "risk_level": "low|medium|high", "reasoning": "string"}]}}"#,
            },
            CompanionKind::Goals => Brief {
                role: "a Financial Goals Agent. Turn the owner's situation into a few concrete, \
                       dated goals with monthly targets.",
                steps: "1. Query financial_goals for existing goals\n\
                        2. Query income and expenses for the last 90 days\n\
                        3. Update progress on existing goals and propose new ones",
                output: r#"{"goals_plan": {"goals": [{"goal_name": "string", "goal_type": "string", "description": "string", "target_amount": number, "current_amount": number, "target_date": "date", "priority": number, "monthly_target": number, "progress_percentage": number, "milestones": [], "action_steps": []}]}}"#,
            },
            CompanionKind::Financial => Brief {
                role: "a Financial Health Agent. Grade the owner's overall financial health.",
                steps: "1. Query the month's transactions, bills and savings_goals\n\
                        2. Score savings rate, debt load and bill coverage",
                output: r#"{"financial_health": {"overall_score": number, "savings_rate": number, "debt_to_income": number, "bill_coverage": number, "grade": "A|B|C|D|F", "summary": "string"}}"#,
            },
            CompanionKind::Action => Brief {
                role: "an Action Planning Agent. Propose automations the owner can approve, \
                       such as scheduled transfers to savings.",
                steps: "1. Query budgets, bills and savings_goals\n\
                        2. Propose at most five actions with amounts and frequency",
                output: r#"{"action_plan": {"plan_type": "automation", "actions": [{"action_id": "string", "description": "string", "target_amount": number, "frequency": "one_time|weekly|monthly"}]}}"#,
            },
            CompanionKind::Recommendation => Brief {
                role: "a Recommendation Agent. Give the owner short, specific advice they can act \
                       on this week.",
                steps: "1. Query the month's transactions and budgets\n\
                        2. Query risk_assessments and financial_goals\n\
                        3. Write at most five recommendations",
                output: r#"{"recommendations": [{"title": "string", "description": "string", "category": "string", "priority": "high|medium|low", "expected_impact": number}]}"#,
            },
        }
    }
}

impl std::str::FromStr for CompanionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.to_lowercase();
        CompanionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown companion agent: {}", s)))
    }
}

impl fmt::Display for CompanionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a kind asks of the model.
struct Brief {
    role: &'static str,
    steps: &'static str,
    output: &'static str,
}

/// First day of `today`'s month and the days left after today.
fn month_calendar(today: NaiveDate) -> (NaiveDate, i64) {
    let month_start = today.with_day(1).unwrap_or(today);
    let next_month = if today.month() == 12 {
        NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
    };
    let days_in_month = next_month
        .map(|next| (next - month_start).num_days())
        .unwrap_or(30);
    (month_start, days_in_month - today.day() as i64)
}

pub struct CompanionAgent {
    kind: CompanionKind,
    model: Arc<dyn ModelClient>,
    ctx: AgentContext,
}

impl CompanionAgent {
    pub fn new(kind: CompanionKind, model: Arc<dyn ModelClient>, ctx: AgentContext) -> Self {
        Self { kind, model, ctx }
    }

    fn system_prompt(&self) -> String {
        let brief = self.kind.brief();
        format!(
            "You are {}\n\n\
             You work for the owner of a small retail business in the UAE. Amounts are in AED.\n\
             Use the query_store tool to read the owner's data; never invent figures.\n\n\
             Reply with a single JSON object in this format and nothing else:\n{}",
            brief.role, brief.output
        )
    }

    fn task_prompt(&self, user_id: &str) -> String {
        let today = self.ctx.today();
        let (month_start, days_remaining) = month_calendar(today);
        format!(
            "Run the {} analysis for user {}.\n\n\
             TODAY: {}\n\
             DAYS REMAINING IN MONTH: {}\n\
             MONTH START: {}\n\n\
             STEPS:\n{}\n\n\
             User ID: {}",
            self.kind,
            user_id,
            today.format("%Y-%m-%d"),
            days_remaining,
            month_start.format("%Y-%m-%d"),
            self.kind.brief().steps,
            user_id
        )
    }

    /// Run requested tools once. Results are not sent back to the model.
    async fn run_tools(&self, user_id: &str, reply: &ChatReply) -> Vec<ToolResult> {
        if reply.tool_calls.is_empty() {
            return Vec::new();
        }
        let executor = ToolExecutor::new(self.ctx.aggregator.store().clone(), user_id);
        let mut results = Vec::with_capacity(reply.tool_calls.len());
        for call in &reply.tool_calls {
            let result = executor.execute(call).await;
            if let Some(error) = &result.error {
                warn!("{} tool call {} failed: {}", self.kind, call.function.name, error);
            }
            results.push(result);
        }
        results
    }

    /// Store whatever this kind persists. Bad replies are logged, not fatal.
    async fn write_back(&self, user_id: &str, content: &str) {
        let stamp = Stamp {
            user_id,
            now: self.ctx.now().naive_utc(),
        };
        match persist::persist(self.ctx.aggregator.store().as_ref(), self.kind.as_str(), content, &stamp).await {
            Ok(0) => debug!("{} wrote nothing for {}", self.kind, user_id),
            Ok(rows) => debug!("{} wrote {} rows for {}", self.kind, rows, user_id),
            Err(e) => warn!("{} reply for {} was not stored: {}", self.kind, user_id, e),
        }
    }

    /// One round trip, rendered as a companion envelope. Never fails.
    pub async fn run(&self, user_id: &str) -> Value {
        info!("[{}] Starting analysis for user {}", self.kind, user_id);

        let request = ChatRequest::new(self.system_prompt(), self.task_prompt(user_id))
            .with_tools(tool_definitions());
        let reply = match self.model.complete(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("[{}] Model call failed for {}: {}", self.kind, user_id, e);
                return envelope::companion_error(user_id, self.kind.as_str(), e, self.ctx.now());
            }
        };

        let tool_results = self.run_tools(user_id, &reply).await;
        let content = reply.content.trim();

        let result = if content.is_empty() {
            json!({ "tool_results": tool_results })
        } else {
            self.write_back(user_id, content).await;
            parse_payload(content).unwrap_or_else(|_| Value::String(content.to_string()))
        };

        info!("[{}] Analysis complete for user {}", self.kind, user_id);
        envelope::companion_success(user_id, self.kind.as_str(), result, self.ctx.now())
    }
}

#[async_trait]
impl Agent for CompanionAgent {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn analyze(&self, user_id: &str) -> Result<Value> {
        Ok(self.run(user_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{context, store};
    use crate::llm::scripted::ScriptedModel;
    use crate::llm::tools::{FunctionCall, ToolCall};
    use crate::store::MemoryStore;

    fn agent(kind: CompanionKind, model: Arc<ScriptedModel>, store: Arc<MemoryStore>) -> CompanionAgent {
        CompanionAgent::new(kind, model, context(store))
    }

    fn empty_store() -> Arc<MemoryStore> {
        store(json!({
            "transactions": [
                {"user_id": "u1", "transaction_type": "income", "date": "2026-10-02", "amount_aed": 4000.0},
                {"user_id": "u2", "transaction_type": "income", "date": "2026-10-03", "amount_aed": 9000.0}
            ]
        }))
    }

    #[test]
    fn test_month_calendar() {
        let (start, remaining) = month_calendar(NaiveDate::from_ymd_opt(2026, 10, 15).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
        assert_eq!(remaining, 16);

        let (_, remaining) = month_calendar(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());
        assert_eq!(remaining, 0);
        let (_, remaining) = month_calendar(NaiveDate::from_ymd_opt(2028, 2, 1).unwrap());
        assert_eq!(remaining, 28);
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in CompanionKind::FULL {
            assert_eq!(kind.as_str().parse::<CompanionKind>().unwrap(), kind);
        }
        assert_eq!("Action".parse::<CompanionKind>().unwrap(), CompanionKind::Action);
        assert!("astrology".parse::<CompanionKind>().is_err());
    }

    #[tokio::test]
    async fn test_single_round_trip_with_dates_and_tool() {
        let model = Arc::new(ScriptedModel::new(vec![r#"{"status": "on_track"}"#]));
        let cashflow = agent(CompanionKind::Cashflow, model.clone(), empty_store());

        let value = cashflow.run("u1").await;
        assert_eq!(value["success"], true);
        assert_eq!(value["agent"], "cashflow");
        assert_eq!(value["result"]["status"], "on_track");
        assert_eq!(value["timestamp"], "2026-10-15T10:00:00+00:00");

        assert_eq!(model.request_count(), 1);
        let requests = model.requests.lock().unwrap();
        let task = &requests[0].task;
        assert!(task.contains("TODAY: 2026-10-15"));
        assert!(task.contains("DAYS REMAINING IN MONTH: 16"));
        assert!(task.contains("MONTH START: 2026-10-01"));
        assert!(requests[0].system.contains("on_track|at_risk|critical"));
        assert_eq!(requests[0].tools[0].function.name, "query_store");
    }

    #[tokio::test]
    async fn test_budget_reply_is_persisted() {
        let store = empty_store();
        let model = Arc::new(ScriptedModel::new(vec![
            "```json\n{\"budgets\": [{\"category\": \"stock\", \"amount\": 12000}]}\n```",
        ]));
        let value = agent(CompanionKind::Budget, model, store.clone()).run("u1").await;

        assert_eq!(value["success"], true);
        assert_eq!(value["result"]["budgets"][0]["amount"], 12000);
        let rows = store.rows("budgets").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["is_active"], true);
        assert_eq!(rows[0]["created_at"], "2026-10-15T10:00:00");
    }

    #[tokio::test]
    async fn test_malformed_reply_still_succeeds() {
        let store = empty_store();
        let model = Arc::new(ScriptedModel::new(vec!["Budgets look fine this month."]));
        let value = agent(CompanionKind::Budget, model, store.clone()).run("u1").await;

        assert_eq!(value["success"], true);
        assert_eq!(value["result"], "Budgets look fine this month.");
        assert!(store.rows("budgets").await.is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_is_error_envelope() {
        let model = Arc::new(ScriptedModel::failing());
        let value = agent(CompanionKind::Risk, model, empty_store())
            .analyze("u1")
            .await
            .unwrap();
        assert_eq!(value["success"], false);
        assert!(value["error"].as_str().unwrap().contains("scripted failure"));
    }

    #[tokio::test]
    async fn test_tool_calls_run_scoped_to_user() {
        let model = Arc::new(ScriptedModel::default());
        model.push(ChatReply {
            content: String::new(),
            tool_calls: vec![ToolCall {
                function: FunctionCall {
                    name: "query_store".to_string(),
                    arguments: json!({"table": "transactions", "filters": {"user_id": "eq.u2"}}),
                },
            }],
        });
        let value = agent(CompanionKind::Pattern, model.clone(), empty_store()).run("u1").await;

        assert_eq!(model.request_count(), 1);
        let result = &value["result"]["tool_results"][0];
        assert_eq!(result["success"], true);
        let rows: Vec<Value> = serde_json::from_str(result["output"].as_str().unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["amount_aed"], 4000.0);
    }
}
