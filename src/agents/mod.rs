//! Agent facade.
//!
//! Every domain agent offers typed operations (`analyze_profit`,
//! `collection_priority`, ...) and implements [`Agent`], the uniform
//! `analyze(user_id)` contract the orchestrator drives.

pub mod companion;
pub mod credit;
pub mod envelope;
pub mod health;
pub mod profit;
pub mod programs;
pub mod recommendations;
pub mod reorder;
pub mod sales;
pub mod vat;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::aggregator::DataAggregator;
use crate::error::Result;
use crate::scoring::ScoringTables;

pub use companion::{CompanionAgent, CompanionKind};
pub use credit::CreditRiskAgent;
pub use health::BusinessHealthAgent;
pub use profit::ProfitAgent;
pub use programs::ProgramsAgent;
pub use recommendations::RecommendationAgent;
pub use reorder::ReorderAgent;
pub use sales::SalesPatternAgent;
pub use vat::VatAgent;

/// One named step of an analysis pipeline.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Run the agent's default analysis and return its result envelope.
    async fn analyze(&self, user_id: &str) -> Result<Value>;
}

/// What every agent needs: data access, lookup tables and a clock.
#[derive(Clone)]
pub struct AgentContext {
    pub aggregator: DataAggregator,
    pub tables: Arc<ScoringTables>,
    clock: Option<DateTime<Utc>>,
}

impl AgentContext {
    pub fn new(aggregator: DataAggregator, tables: Arc<ScoringTables>) -> Self {
        Self {
            aggregator,
            tables,
            clock: None,
        }
    }

    /// Pin "now" to a fixed instant.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}
