//! UAE SME program matching and applications.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::info;

use super::{envelope, Agent, AgentContext};
use crate::error::{Error, Result};
use crate::scoring::programs::{
    self, application_checklist, check_eligibility, find_program, next_steps, BusinessFacts,
    ChecklistItem, NextStep, Program, ProgramMatches,
};
use crate::store::{Query, Row, RowExt};

const MATCHES_TABLE: &str = "user_matched_programs";

/// Headcount assumed when the profile does not say.
const DEFAULT_EMPLOYEES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessSummary {
    pub emirate: String,
    pub nationality: String,
    pub business_type: String,
    pub employees: u32,
    pub annual_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramReport {
    #[serde(flatten)]
    pub matches: ProgramMatches,
    pub business_summary: BusinessSummary,
}

/// Catalogue entry plus whatever the program table adds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramDetails {
    #[serde(flatten)]
    pub program: &'static Program,
    pub application_process: Vec<Value>,
    pub required_documents: Vec<Value>,
    pub success_stories: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Application {
    #[serde(rename = "success")]
    Applied {
        program_id: String,
        program_name: String,
        website: String,
        application_checklist: Vec<ChecklistItem>,
        next_steps: Vec<NextStep>,
    },
    NotEligible {
        message: String,
        reasons: Vec<String>,
    },
}

pub struct ProgramsAgent {
    ctx: AgentContext,
}

/// Annualized sales: total over the months that have any sale, times twelve.
fn annual_revenue(sales: &[Row]) -> f64 {
    let months: BTreeSet<(i32, u32)> = sales
        .iter()
        .filter_map(|s| s.date("date"))
        .map(|d| (d.year(), d.month()))
        .collect();
    if months.is_empty() {
        return 0.0;
    }
    let total: f64 = sales.iter().map(|s| s.num("amount_aed")).sum();
    total / months.len() as f64 * 12.0
}

fn business_facts(profile: &Row, annual_revenue: f64, today: NaiveDate) -> BusinessFacts {
    BusinessFacts {
        emirate: profile.text("emirate").to_string(),
        owner_nationality: profile.text("owner_nationality").to_string(),
        business_type: profile.text("business_type").to_string(),
        employee_count: profile
            .opt_num("employee_count")
            .map(|n| n.max(0.0) as u32)
            .unwrap_or(DEFAULT_EMPLOYEES),
        annual_revenue,
        business_age_years: profile
            .date("license_issue_date")
            .map(|issued| (today - issued).num_days() as f64 / 365.0),
        has_trade_license: profile
            .opt_text("trade_license_number")
            .is_some_and(|n| !n.is_empty()),
    }
}

fn list(row: Option<&Row>, field: &str) -> Vec<Value> {
    row.and_then(|r| r.get(field))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

impl ProgramsAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    async fn facts(&self, user_id: &str) -> Result<BusinessFacts> {
        let agg = &self.ctx.aggregator;
        let profile = agg
            .business_profile(user_id)
            .await?
            .ok_or_else(|| Error::not_found("business profile", user_id))?;
        let sales = agg.all_sales(user_id).await?;
        Ok(business_facts(
            &profile,
            annual_revenue(&sales),
            self.ctx.today(),
        ))
    }

    pub async fn matching_programs(&self, user_id: &str) -> Result<ProgramReport> {
        let facts = self.facts(user_id).await?;
        let matches = programs::matching_programs(&facts);
        info!(
            "{} programs match {} ({} with funding)",
            matches.total_matches, user_id, matches.funding_programs
        );

        Ok(ProgramReport {
            matches,
            business_summary: BusinessSummary {
                emirate: facts.emirate,
                nationality: facts.owner_nationality,
                business_type: facts.business_type,
                employees: facts.employee_count,
                annual_revenue: facts.annual_revenue,
            },
        })
    }

    pub async fn program_details(&self, program_id: &str) -> Result<ProgramDetails> {
        let program =
            find_program(program_id).ok_or_else(|| Error::not_found("program", program_id))?;
        let rows = self
            .ctx
            .aggregator
            .store()
            .select(Query::new("uae_sme_programs").eq("program_code", program_id))
            .await?;
        let extra = rows.first();

        Ok(ProgramDetails {
            program,
            application_process: list(extra, "application_process"),
            required_documents: list(extra, "required_documents"),
            success_stories: extra.map(|r| r.num("success_stories") as u64).unwrap_or(0),
        })
    }

    /// Record interest in a program and return what to prepare.
    pub async fn apply(&self, user_id: &str, program_id: &str) -> Result<Application> {
        let program =
            find_program(program_id).ok_or_else(|| Error::not_found("program", program_id))?;
        let facts = self.facts(user_id).await?;

        let eligibility = check_eligibility(program, &facts);
        if !eligibility.eligible {
            return Ok(Application::NotEligible {
                message: "You are not eligible for this program".to_string(),
                reasons: eligibility.missing,
            });
        }

        let row = json!({
            "user_id": user_id,
            "program_id": program_id,
            "status": "applied",
            "matched_at": self.ctx.now().naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string(),
        });
        if let Value::Object(row) = row {
            self.ctx
                .aggregator
                .store()
                .insert(MATCHES_TABLE, vec![row])
                .await?;
        }
        info!("{} applied to {}", user_id, program_id);

        Ok(Application::Applied {
            program_id: program.id.to_string(),
            program_name: program.name.to_string(),
            website: program.website.to_string(),
            application_checklist: application_checklist(program, &facts),
            next_steps: next_steps(program),
        })
    }
}

#[async_trait]
impl Agent for ProgramsAgent {
    fn name(&self) -> &str {
        "uae_programs"
    }

    async fn analyze(&self, user_id: &str) -> Result<Value> {
        let report = self.matching_programs(user_id).await?;
        envelope::success(&report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{context, store};
    use crate::scoring::programs::DocumentStatus;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn fixtures() -> Arc<MemoryStore> {
        store(json!({
            "business_profiles": [
                {
                    "user_id": "u1", "emirate": "Dubai", "owner_nationality": "Indian",
                    "business_type": "grocery", "employee_count": 4,
                    "license_issue_date": "2022-01-10", "trade_license_number": "DED-12345"
                }
            ],
            "transactions": [
                {"user_id": "u1", "transaction_type": "sale", "date": "2026-09-03", "amount_aed": 50000.0},
                {"user_id": "u1", "transaction_type": "sale", "date": "2026-09-20", "amount_aed": 10000.0},
                {"user_id": "u1", "transaction_type": "sale", "date": "2026-10-02", "amount_aed": 40000.0}
            ],
            "uae_sme_programs": [
                {"program_code": "dubai_sme", "application_process": ["Register", "Submit"], "success_stories": 120}
            ]
        }))
    }

    #[test]
    fn test_annual_revenue_from_active_months() {
        let sales: Vec<Row> = [
            json!({"date": "2026-09-03", "amount_aed": 50000.0}),
            json!({"date": "2026-10-02", "amount_aed": 10000.0}),
        ]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect();
        assert_eq!(annual_revenue(&sales), 360_000.0);
        assert_eq!(annual_revenue(&[]), 0.0);
    }

    #[tokio::test]
    async fn test_matching_programs() {
        let agent = ProgramsAgent::new(context(fixtures()));
        let report = agent.matching_programs("u1").await.unwrap();

        assert_eq!(report.business_summary.annual_revenue, 600_000.0);
        assert_eq!(report.business_summary.employees, 4);
        let ids: Vec<&str> = report.matches.matches.iter().map(|m| m.program_id.as_str()).collect();
        assert!(ids.contains(&"dubai_sme"));
        assert!(!ids.contains(&"khalifa_fund"));
        assert_eq!(report.matches.total_matches, ids.len());
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_found() {
        let agent = ProgramsAgent::new(context(fixtures()));
        let err = agent.matching_programs("nobody").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "business profile", .. }));
    }

    #[tokio::test]
    async fn test_program_details_merges_table_row() {
        let agent = ProgramsAgent::new(context(fixtures()));
        let details = agent.program_details("dubai_sme").await.unwrap();
        assert_eq!(details.program.id, "dubai_sme");
        assert_eq!(details.application_process.len(), 2);
        assert_eq!(details.success_stories, 120);

        let err = agent.program_details("unknown").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "program", .. }));
    }

    #[tokio::test]
    async fn test_apply_records_match() {
        let store = fixtures();
        let agent = ProgramsAgent::new(context(store.clone()));

        let application = agent.apply("u1", "dubai_sme").await.unwrap();
        let Application::Applied { application_checklist, next_steps, .. } = application else {
            panic!("expected an application");
        };
        assert_eq!(application_checklist[0].status, DocumentStatus::Ready);
        assert_eq!(next_steps.len(), 4);

        let rows = store.rows(MATCHES_TABLE).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["status"], "applied");
        assert_eq!(rows[0]["matched_at"], "2026-10-15T10:00:00");
    }

    #[tokio::test]
    async fn test_apply_not_eligible() {
        let store = fixtures();
        let agent = ProgramsAgent::new(context(store.clone()));

        let application = agent.apply("u1", "khalifa_fund").await.unwrap();
        let value = serde_json::to_value(&application).unwrap();
        assert_eq!(value["status"], "not_eligible");
        assert!(!value["reasons"].as_array().unwrap().is_empty());
        assert!(store.rows(MATCHES_TABLE).await.is_empty());
    }
}
