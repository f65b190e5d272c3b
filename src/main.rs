//! Merchant Pulse - business health and credit scoring for UAE merchants
//!
//! A CLI that runs deterministic scoring agents and model-backed companion
//! agents against a PostgREST store and writes analysis reports.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, store or model failure, unknown entity, etc.)
//!   2 - Health score below --fail-below

mod agents;
mod aggregator;
mod cli;
mod config;
mod error;
mod llm;
mod models;
mod orchestrator;
mod recommend;
mod report;
mod scoring;
mod status;
mod store;

use anyhow::{Context, Result};
use cli::{Args, Command, OutputFormat};
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use agents::{
    AgentContext, BusinessHealthAgent, CompanionAgent, CompanionKind, CreditRiskAgent,
    ProfitAgent, ProgramsAgent, RecommendationAgent, ReorderAgent, SalesPatternAgent, VatAgent,
};
use aggregator::DataAggregator;
use llm::{ModelClient, OllamaClient};
use orchestrator::{Mode, Orchestrator, Pipeline, PipelineKind};
use scoring::vat::TrnStatus;
use status::StatusTracker;
use store::{MemoryStore, RestStore, Store};

/// How often the progress bar polls the status tracker.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Merchant Pulse v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .merchant-pulse.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the store, model, pipeline and scoring tables.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

/// The in-memory fixture store when `--fixtures` is given, the REST store otherwise.
fn build_store(args: &Args, config: &Config) -> Result<Arc<dyn Store>> {
    if let Some(ref path) = args.fixtures {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixtures: {}", path.display()))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixtures: {}", path.display()))?;
        info!("Serving data from fixtures: {}", path.display());
        return Ok(Arc::new(MemoryStore::from_json(value)?));
    }

    info!("Using store at {}", config.store.url);
    Ok(Arc::new(RestStore::new(
        &config.store.url,
        &config.store.api_key,
        config.store.timeout_seconds,
    )?))
}

fn build_model(config: &Config) -> Result<Arc<dyn ModelClient>> {
    Ok(Arc::new(OllamaClient::new(config.model.clone())?))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render result")?;
    println!("{}", rendered);
    Ok(())
}

/// Dispatch the subcommand. Returns the process exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    let Some(command) = args.command.clone() else {
        return Ok(0);
    };

    let store = build_store(&args, &config)?;
    let ctx = AgentContext::new(DataAggregator::new(store), Arc::new(config.scoring.clone()));

    match command {
        Command::Analyze {
            user,
            quick,
            pipeline,
        } => {
            let kind = pipeline.unwrap_or(config.orchestrator.pipeline);
            let mode = if quick { Mode::Quick } else { Mode::Full };
            run_analysis(&args, &config, &ctx, &user, kind, mode).await
        }
        Command::Companion { user, agent } => {
            let kind: CompanionKind = agent.parse()?;
            let companion = CompanionAgent::new(kind, build_model(&config)?, ctx);
            print_json(&companion.run(&user).await)?;
            Ok(0)
        }
        Command::Profit { user, period } => {
            print_json(&ProfitAgent::new(ctx).analyze_profit(&user, &period).await?)?;
            Ok(0)
        }
        Command::Trust { user, customer } => {
            print_json(&CreditRiskAgent::new(ctx).trust_score(&user, &customer).await?)?;
            Ok(0)
        }
        Command::Collections { user } => {
            print_json(&CreditRiskAgent::new(ctx).collection_priority(&user).await?)?;
            Ok(0)
        }
        Command::Aging { user } => {
            print_json(&CreditRiskAgent::new(ctx).credit_aging(&user).await?)?;
            Ok(0)
        }
        Command::Vat { user, quarter } => {
            let position = VatAgent::new(ctx)
                .vat_position(&user, quarter.as_deref())
                .await?;
            print_json(&position)?;
            Ok(0)
        }
        Command::VatReturn { user, quarter } => {
            let filing = VatAgent::new(ctx)
                .vat_return(&user, quarter.as_deref())
                .await?;
            print_json(&filing)?;
            Ok(0)
        }
        Command::VatSummary { user, months } => {
            print_json(&VatAgent::new(ctx).vat_summary(&user, months).await?)?;
            Ok(0)
        }
        Command::VatRegistration { user } => {
            print_json(&VatAgent::new(ctx).registration_status(&user).await?)?;
            Ok(0)
        }
        Command::ValidateTrn { trn } => {
            let validation = VatAgent::new(ctx).validate_trn(&trn);
            print_json(&validation)?;
            Ok(if validation.status == TrnStatus::Valid { 0 } else { 1 })
        }
        Command::VatCalc {
            amount,
            category,
            inclusive,
        } => {
            print_json(&VatAgent::new(ctx).transaction_vat(amount, &category, inclusive))?;
            Ok(0)
        }
        Command::Health { user, fail_below } => {
            let report = BusinessHealthAgent::new(ctx).health_score(&user).await?;
            print_json(&report)?;

            if let Some(threshold) = fail_below {
                if report.overall_score < threshold {
                    eprintln!(
                        "\n⛔ Health score {:.1} ({}) is below {:.1}. Failing (exit code 2).",
                        report.overall_score, report.level, threshold
                    );
                    return Ok(2);
                }
            }
            Ok(0)
        }
        Command::HealthTrend { user, months } => {
            print_json(&BusinessHealthAgent::new(ctx).health_trend(&user, months).await?)?;
            Ok(0)
        }
        Command::Reorder { user } => {
            print_json(&ReorderAgent::new(ctx).reorder_alerts(&user).await?)?;
            Ok(0)
        }
        Command::PredictDemand { user, item, days } => {
            let forecast = ReorderAgent::new(ctx)
                .predict_demand(&user, &item, days)
                .await?;
            print_json(&forecast)?;
            Ok(0)
        }
        Command::SupplierOrders { user } => {
            print_json(&ReorderAgent::new(ctx).supplier_orders(&user).await?)?;
            Ok(0)
        }
        Command::Programs { user } => {
            print_json(&ProgramsAgent::new(ctx).matching_programs(&user).await?)?;
            Ok(0)
        }
        Command::Program { program_id } => {
            print_json(&ProgramsAgent::new(ctx).program_details(&program_id).await?)?;
            Ok(0)
        }
        Command::ApplyProgram { user, program } => {
            print_json(&ProgramsAgent::new(ctx).apply(&user, &program).await?)?;
            Ok(0)
        }
        Command::Recommendations { user, category } => {
            let agent = RecommendationAgent::new(ctx);
            match category {
                Some(category) => {
                    print_json(&agent.recommendations_by_category(&user, &category).await?)?
                }
                None => print_json(&agent.daily_recommendations(&user).await?)?,
            }
            Ok(0)
        }
        Command::MarkRecommendation { id, action } => {
            print_json(&RecommendationAgent::new(ctx).mark_action(&id, &action).await?)?;
            Ok(0)
        }
        Command::Patterns { user, days } => {
            print_json(&SalesPatternAgent::new(ctx).analyze_patterns(&user, days).await?)?;
            Ok(0)
        }
        Command::Segments { user } => {
            print_json(&SalesPatternAgent::new(ctx).customer_segments(&user).await?)?;
            Ok(0)
        }
        Command::Forecast { user, days } => {
            print_json(&SalesPatternAgent::new(ctx).forecast_sales(&user, days).await?)?;
            Ok(0)
        }
    }
}

/// Run a pipeline on a spawned task, drive the progress bar from the
/// status tracker and write the report.
async fn run_analysis(
    args: &Args,
    config: &Config,
    ctx: &AgentContext,
    user_id: &str,
    kind: PipelineKind,
    mode: Mode,
) -> Result<i32> {
    let tracker = StatusTracker::new(config.orchestrator.status_ttl());
    let orchestrator = Orchestrator::new(tracker.clone()).with_delays(
        config.orchestrator.full_delay(),
        config.orchestrator.quick_delay(),
    );

    let model = build_model(config)?;
    let pipeline = Arc::new(Pipeline::build(kind, ctx, model, mode));

    println!(
        "🔬 Running {} {:?} analysis for user {}",
        mode, kind, user_id
    );
    println!("   Agents: {}", pipeline.names().join(", "));
    if kind == PipelineKind::Companion {
        println!("   Model: {} at {}", config.model.name, config.model.url);
    }

    let handle = {
        let orchestrator = orchestrator.clone();
        let pipeline = pipeline.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move { orchestrator.run(&user_id, &pipeline).await })
    };

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(pipeline.len() as u64)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} agents")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    while !handle.is_finished() {
        if let Ok(status) = tracker.status(user_id).await {
            progress.set_position(status.agents_completed as u64);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    progress.finish_and_clear();

    let run = handle.await.context("Analysis task failed")??;

    let output = match config.general.format {
        OutputFormat::Json => report::generate_json_report(&run)?,
        OutputFormat::Markdown => report::generate_markdown_report(&run),
    };
    std::fs::write(&config.general.output, &output)
        .with_context(|| format!("Failed to write report to {}", config.general.output))?;

    println!("\n📊 Analysis Summary:");
    for step in &run.results {
        match step.error {
            None => println!("   ✅ {}", step.agent),
            Some(ref e) => println!("   ❌ {}: {}", step.agent, e),
        }
    }
    println!("   Duration: {:.1}s", run.duration_seconds);
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        config.general.output
    );

    Ok(0)
}
