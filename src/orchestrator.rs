//! Sequential pipeline runner.
//!
//! A run walks its pipeline step by step, pausing between steps. A step that
//! fails is recorded in the results and the run moves on; the run always
//! ends `completed`. Progress is published to the [`StatusTracker`] after
//! every step so callers can poll it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::agents::{
    envelope, Agent, AgentContext, BusinessHealthAgent, CompanionAgent, CompanionKind, CreditRiskAgent,
    ProfitAgent, ProgramsAgent, RecommendationAgent, ReorderAgent, SalesPatternAgent, VatAgent,
};
use crate::error::Result;
use crate::llm::ModelClient;
use crate::status::StatusTracker;

/// Which family of agents a pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    /// Deterministic merchant scoring agents
    #[default]
    Merchant,
    /// Model-backed companion agents
    Companion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Full,
    Quick,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Full => write!(f, "full"),
            Mode::Quick => write!(f, "quick"),
        }
    }
}

struct Step {
    name: String,
    agent: Arc<dyn Agent>,
}

pub struct Pipeline {
    mode: Mode,
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            steps: Vec::new(),
        }
    }

    /// Append a step named after its agent.
    pub fn step(mut self, agent: Arc<dyn Agent>) -> Self {
        self.steps.push(Step {
            name: agent.name().to_string(),
            agent,
        });
        self
    }

    pub fn merchant(ctx: &AgentContext, mode: Mode) -> Self {
        let profit: Arc<dyn Agent> = Arc::new(ProfitAgent::new(ctx.clone()));
        let credit: Arc<dyn Agent> = Arc::new(CreditRiskAgent::new(ctx.clone()));
        let recommendation: Arc<dyn Agent> = Arc::new(RecommendationAgent::new(ctx.clone()));

        match mode {
            Mode::Quick => Self::new(mode)
                .step(profit)
                .step(credit)
                .step(recommendation),
            Mode::Full => Self::new(mode)
                .step(profit)
                .step(Arc::new(SalesPatternAgent::new(ctx.clone())))
                .step(credit)
                .step(Arc::new(VatAgent::new(ctx.clone())))
                .step(Arc::new(BusinessHealthAgent::new(ctx.clone())))
                .step(Arc::new(ReorderAgent::new(ctx.clone())))
                .step(Arc::new(ProgramsAgent::new(ctx.clone())))
                .step(recommendation),
        }
    }

    pub fn companion(ctx: &AgentContext, model: Arc<dyn ModelClient>, mode: Mode) -> Self {
        let kinds: &[CompanionKind] = match mode {
            Mode::Full => &CompanionKind::FULL,
            Mode::Quick => &CompanionKind::QUICK,
        };
        kinds.iter().fold(Self::new(mode), |pipeline, kind| {
            pipeline.step(Arc::new(CompanionAgent::new(
                *kind,
                model.clone(),
                ctx.clone(),
            )))
        })
    }

    pub fn build(kind: PipelineKind, ctx: &AgentContext, model: Arc<dyn ModelClient>, mode: Mode) -> Self {
        match kind {
            PipelineKind::Merchant => Self::merchant(ctx, mode),
            PipelineKind::Companion => Self::companion(ctx, model, mode),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub agent: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// An agent that answered with an error envelope counts as failed but
    /// keeps its envelope.
    fn completed(agent: &str, result: Value) -> Self {
        let success = envelope::is_success(&result);
        let error = (!success).then(|| {
            result
                .get("error")
                .or_else(|| result.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("agent reported an error")
                .to_string()
        });
        Self {
            agent: agent.to_string(),
            success,
            result: Some(result),
            error,
        }
    }

    fn failed(agent: &str, error: String) -> Self {
        Self {
            agent: agent.to_string(),
            success: false,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub user_id: String,
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
    /// In pipeline order.
    pub results: Vec<StepResult>,
}

impl RunResult {
    pub fn failed_steps(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    tracker: StatusTracker,
    full_delay: Duration,
    quick_delay: Duration,
}

impl Orchestrator {
    pub fn new(tracker: StatusTracker) -> Self {
        Self {
            tracker,
            full_delay: Duration::from_millis(500),
            quick_delay: Duration::from_millis(300),
        }
    }

    pub fn with_delays(mut self, full: Duration, quick: Duration) -> Self {
        self.full_delay = full;
        self.quick_delay = quick;
        self
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    fn delay(&self, mode: Mode) -> Duration {
        match mode {
            Mode::Full => self.full_delay,
            Mode::Quick => self.quick_delay,
        }
    }

    /// Run every step for `user_id`. Fails only with `Conflict` when the
    /// user already has a run in progress.
    pub async fn run(&self, user_id: &str, pipeline: &Pipeline) -> Result<RunResult> {
        self.tracker.evict_expired().await;
        self.tracker.start(user_id, pipeline.len()).await?;

        let started_at = Utc::now();
        let clock = Instant::now();
        let delay = self.delay(pipeline.mode);
        info!(
            "Starting {} analysis for {} ({} agents)",
            pipeline.mode,
            user_id,
            pipeline.len()
        );

        let mut results = Vec::with_capacity(pipeline.len());
        for (index, step) in pipeline.steps.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            debug!("Running agent {} for {}", step.name, user_id);
            let outcome = match step.agent.analyze(user_id).await {
                Ok(value) => StepResult::completed(&step.name, value),
                Err(e) => {
                    warn!("Agent {} failed for {}: {}", step.name, user_id, e);
                    StepResult::failed(&step.name, e.to_string())
                }
            };
            results.push(outcome);
            self.tracker.advance(user_id, index + 1).await;
        }

        self.tracker.complete(user_id).await;

        let run = RunResult {
            user_id: user_id.to_string(),
            mode: pipeline.mode,
            started_at,
            finished_at: Utc::now(),
            duration_seconds: clock.elapsed().as_secs_f64(),
            results,
        };
        info!(
            "Analysis for {} completed in {:.1}s ({} failed steps)",
            user_id,
            run.duration_seconds,
            run.failed_steps()
        );
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{context, store};
    use crate::error::Error;
    use crate::llm::scripted::ScriptedModel;
    use crate::models::RunStatus;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    enum Outcome {
        Success,
        ErrorEnvelope,
        Fails,
    }

    struct Fixed {
        name: &'static str,
        outcome: Outcome,
    }

    #[async_trait]
    impl Agent for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn analyze(&self, _user_id: &str) -> Result<Value> {
            match self.outcome {
                Outcome::Success => Ok(json!({"status": "success"})),
                Outcome::ErrorEnvelope => Ok(envelope::error("no transactions")),
                Outcome::Fails => Err(Error::not_found("customer", "c9")),
            }
        }
    }

    /// Blocks until released, keeping the run in progress.
    struct Gate {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Agent for Gate {
        fn name(&self) -> &str {
            "gate"
        }

        async fn analyze(&self, _user_id: &str) -> Result<Value> {
            self.release.notified().await;
            Ok(json!({"status": "success"}))
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(StatusTracker::default()).with_delays(Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_failed_step_is_isolated() {
        let orchestrator = orchestrator();
        let pipeline = Pipeline::new(Mode::Quick)
            .step(Arc::new(Fixed { name: "first", outcome: Outcome::Success }))
            .step(Arc::new(Fixed { name: "broken", outcome: Outcome::Fails }))
            .step(Arc::new(Fixed { name: "empty", outcome: Outcome::ErrorEnvelope }))
            .step(Arc::new(Fixed { name: "last", outcome: Outcome::Success }));

        let run = orchestrator.run("u1", &pipeline).await.unwrap();
        let names: Vec<&str> = run.results.iter().map(|r| r.agent.as_str()).collect();
        assert_eq!(names, vec!["first", "broken", "empty", "last"]);
        assert!(!run.results[1].success);
        assert_eq!(run.results[1].error.as_deref(), Some("customer not found: c9"));
        assert!(!run.results[2].success);
        assert_eq!(run.results[2].error.as_deref(), Some("no transactions"));
        assert!(run.results[2].result.is_some());
        assert!(run.results[3].success);
        assert_eq!(run.failed_steps(), 2);

        let status = orchestrator.tracker().status("u1").await.unwrap();
        assert_eq!(status.status, RunStatus::Completed);
        assert_eq!(status.agents_completed, 4);
    }

    #[tokio::test]
    async fn test_conflict_then_completion_then_new_run() {
        let orchestrator = orchestrator();
        let release = Arc::new(Notify::new());
        let pipeline = Arc::new(Pipeline::new(Mode::Full).step(Arc::new(Gate {
            release: release.clone(),
        })));

        let first = {
            let orchestrator = orchestrator.clone();
            let pipeline = pipeline.clone();
            tokio::spawn(async move { orchestrator.run("u1", &pipeline).await })
        };
        while orchestrator.tracker().status("u1").await.is_err() {
            tokio::task::yield_now().await;
        }

        let err = orchestrator.run("u1", &pipeline).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        release.notify_one();
        let run = first.await.unwrap().unwrap();
        assert!(run.results[0].success);
        assert_eq!(
            orchestrator.tracker().status("u1").await.unwrap().status,
            RunStatus::Completed
        );

        release.notify_one();
        assert!(orchestrator.run("u1", &pipeline).await.is_ok());
    }

    #[test]
    fn test_pipeline_shapes() {
        let ctx = context(store(json!({})));
        let model: Arc<dyn ModelClient> = Arc::new(ScriptedModel::default());

        assert_eq!(
            Pipeline::merchant(&ctx, Mode::Full).names(),
            vec![
                "profit",
                "sales_pattern",
                "credit_risk",
                "vat",
                "business_health",
                "reorder",
                "uae_programs",
                "recommendation"
            ]
        );
        assert_eq!(
            Pipeline::merchant(&ctx, Mode::Quick).names(),
            vec!["profit", "credit_risk", "recommendation"]
        );
        assert_eq!(Pipeline::companion(&ctx, model.clone(), Mode::Full).len(), 10);
        assert_eq!(
            Pipeline::build(PipelineKind::Companion, &ctx, model, Mode::Quick).names(),
            vec!["budget", "risk", "cashflow"]
        );
    }

    #[tokio::test]
    async fn test_quick_merchant_run_on_empty_store() {
        let ctx = context(store(json!({})));
        let pipeline = Pipeline::merchant(&ctx, Mode::Quick);
        let run = orchestrator().run("u1", &pipeline).await.unwrap();

        assert_eq!(run.mode, Mode::Quick);
        assert_eq!(run.results.len(), 3);
        assert!(run.finished_at >= run.started_at);
    }
}
