//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::orchestrator::PipelineKind;

/// Longest horizon accepted by `forecast` and `predict-demand`.
pub const MAX_FORECAST_DAYS: u32 = 365;

/// Longest window accepted by `vat-summary`.
pub const MAX_SUMMARY_MONTHS: u32 = 60;

/// Merchant Pulse - business health and credit scoring for UAE merchants
///
/// Runs scoring agents against a PostgREST store (or a local JSON fixture)
/// and writes Markdown/JSON reports.
///
/// Examples:
///   merchant-pulse analyze --user 42
///   merchant-pulse --fixtures fixtures/demo_store.json analyze --user demo --quick
///   merchant-pulse health --user 42 --fail-below 40
///   merchant-pulse validate-trn 100123456700003
///   merchant-pulse --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .merchant-pulse.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    pub format: Option<OutputFormat>,

    /// Output file path for the analysis report
    #[arg(short, long, value_name = "FILE", global = true)]
    pub output: Option<PathBuf>,

    /// Serve data from a JSON fixture `{resource: [rows]}` instead of the store
    #[arg(long, value_name = "FILE", global = true)]
    pub fixtures: Option<PathBuf>,

    /// Store base URL
    #[arg(long, value_name = "URL", env = "MERCHANT_PULSE_STORE_URL", global = true)]
    pub store_url: Option<String>,

    /// Store API key
    #[arg(long, value_name = "KEY", env = "MERCHANT_PULSE_STORE_KEY", hide_env_values = true, global = true)]
    pub store_key: Option<String>,

    /// Model used by the companion agents
    #[arg(short, long, env = "MERCHANT_PULSE_MODEL", global = true)]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, value_name = "URL", env = "MERCHANT_PULSE_MODEL_URL", global = true)]
    pub model_url: Option<String>,

    /// Generate a default .merchant-pulse.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the full (or quick) agent pipeline and write a report
    Analyze {
        #[arg(short, long)]
        user: String,
        /// Run the short pipeline
        #[arg(long)]
        quick: bool,
        /// Override the configured pipeline
        #[arg(long, value_name = "KIND")]
        pipeline: Option<PipelineKind>,
    },
    /// Run one companion agent (budget, risk, cashflow, ...)
    Companion {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        agent: String,
    },
    /// Profit statement for a period
    Profit {
        #[arg(short, long)]
        user: String,
        /// daily, weekly, monthly, quarterly or yearly
        #[arg(short, long, default_value = "monthly")]
        period: String,
    },
    /// Trust score for one customer
    Trust {
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        customer: String,
    },
    /// Customers ranked by collection priority
    Collections {
        #[arg(short, long)]
        user: String,
    },
    /// Outstanding credit by age bucket
    Aging {
        #[arg(short, long)]
        user: String,
    },
    /// VAT position for a quarter (e.g. 2026-Q3; defaults to the current one)
    Vat {
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        quarter: Option<String>,
    },
    /// VAT return boxes and filing deadline
    VatReturn {
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        quarter: Option<String>,
    },
    /// Output, input and net VAT per month, oldest first
    VatSummary {
        #[arg(short, long)]
        user: String,
        #[arg(long, default_value = "12")]
        months: u32,
    },
    /// Registration obligation from trailing revenue
    VatRegistration {
        #[arg(short, long)]
        user: String,
    },
    /// Check a tax registration number
    ValidateTrn { trn: String },
    /// VAT on a single amount
    VatCalc {
        amount: f64,
        #[arg(long, default_value = "general_goods")]
        category: String,
        /// The amount already includes VAT
        #[arg(long)]
        inclusive: bool,
    },
    /// Seven-dimension business health score
    Health {
        #[arg(short, long)]
        user: String,
        /// Exit with code 2 when the overall score is below this value
        #[arg(long, value_name = "SCORE")]
        fail_below: Option<f64>,
    },
    /// Stored health scores over recent months
    HealthTrend {
        #[arg(short, long)]
        user: String,
        #[arg(long, default_value = "6")]
        months: usize,
    },
    /// Items at or below their reorder point
    Reorder {
        #[arg(short, long)]
        user: String,
    },
    /// Demand forecast for one item
    PredictDemand {
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        item: String,
        #[arg(long, default_value = "7")]
        days: u32,
    },
    /// Reorder alerts grouped into supplier orders
    SupplierOrders {
        #[arg(short, long)]
        user: String,
    },
    /// SME programs the business qualifies for
    Programs {
        #[arg(short, long)]
        user: String,
    },
    /// Details of one program
    Program { program_id: String },
    /// Apply to a program
    ApplyProgram {
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        program: String,
    },
    /// Today's prioritized recommendations, or one category
    Recommendations {
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Record completed, dismissed or snoozed on a recommendation
    MarkRecommendation { id: String, action: String },
    /// Hourly, weekday and category sales patterns
    Patterns {
        #[arg(short, long)]
        user: String,
        #[arg(long, default_value = "30")]
        days: i64,
    },
    /// Customers grouped into high value, regular, at risk and occasional
    Segments {
        #[arg(short, long)]
        user: String,
    },
    /// Sales forecast from weekday averages
    Forecast {
        #[arg(short, long)]
        user: String,
        #[arg(long, default_value = "7")]
        days: u32,
    },
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        let Some(ref command) = self.command else {
            return Err("A subcommand is required (try --help)".to_string());
        };

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        for (name, url) in [("Store", &self.store_url), ("Model", &self.model_url)] {
            if let Some(url) = url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(format!("{} URL must start with 'http://' or 'https://'", name));
                }
            }
        }

        if let Some(ref fixtures) = self.fixtures {
            if !fixtures.is_file() {
                return Err(format!("Fixture file does not exist: {}", fixtures.display()));
            }
        }

        match command {
            Command::Analyze { user, .. }
            | Command::Companion { user, .. }
            | Command::Profit { user, .. }
            | Command::Trust { user, .. }
            | Command::Collections { user }
            | Command::Aging { user }
            | Command::Vat { user, .. }
            | Command::VatReturn { user, .. }
            | Command::VatRegistration { user }
            | Command::Health { user, .. }
            | Command::HealthTrend { user, .. }
            | Command::Reorder { user }
            | Command::PredictDemand { user, .. }
            | Command::SupplierOrders { user }
            | Command::Programs { user }
            | Command::ApplyProgram { user, .. }
            | Command::Recommendations { user, .. }
            | Command::Patterns { user, .. }
            | Command::Forecast { user, .. }
            | Command::Segments { user }
            | Command::VatSummary { user, .. }
                if user.trim().is_empty() =>
            {
                Err("User id must not be empty".to_string())
            }
            Command::VatCalc { amount, .. } if !amount.is_finite() || *amount < 0.0 => {
                Err("Amount must be a non-negative number".to_string())
            }
            Command::Health {
                fail_below: Some(score),
                ..
            } if !(0.0..=100.0).contains(score) => {
                Err("--fail-below must be between 0 and 100".to_string())
            }
            Command::Patterns { days, .. } if *days < 1 => {
                Err("Days must be at least 1".to_string())
            }
            Command::PredictDemand { days, .. } | Command::Forecast { days, .. }
                if *days == 0 || *days > MAX_FORECAST_DAYS =>
            {
                Err(format!("Days must be between 1 and {}", MAX_FORECAST_DAYS))
            }
            Command::VatSummary { months, .. }
                if *months == 0 || *months > MAX_SUMMARY_MONTHS =>
            {
                Err(format!("Months must be between 1 and {}", MAX_SUMMARY_MONTHS))
            }
            _ => Ok(()),
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(command: Command) -> Args {
        Args {
            command: Some(command),
            config: None,
            verbose: false,
            quiet: false,
            format: None,
            output: None,
            fixtures: None,
            store_url: None,
            store_key: None,
            model: None,
            model_url: None,
            init_config: false,
        }
    }

    fn analyze() -> Command {
        Command::Analyze {
            user: "u1".to_string(),
            quick: false,
            pipeline: None,
        }
    }

    #[test]
    fn test_parse_analyze() {
        let args = Args::try_parse_from([
            "merchant-pulse",
            "--format",
            "json",
            "analyze",
            "--user",
            "u1",
            "--quick",
            "--pipeline",
            "companion",
        ])
        .unwrap();
        assert_eq!(args.format, Some(OutputFormat::Json));
        match args.command {
            Some(Command::Analyze {
                user,
                quick,
                pipeline,
            }) => {
                assert_eq!(user, "u1");
                assert!(quick);
                assert_eq!(pipeline, Some(PipelineKind::Companion));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "merchant-pulse",
            "health",
            "--user",
            "u1",
            "--fail-below",
            "40",
            "--verbose",
        ])
        .unwrap();
        assert!(args.verbose);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_requires_command() {
        let mut args = make_args(analyze());
        args.command = None;
        assert!(args.validate().is_err());

        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args(analyze());
        args.store_url = Some("localhost:54321".to_string());
        assert!(args.validate().is_err());

        args.store_url = Some("https://project.example.co".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_command_arguments() {
        let args = make_args(Command::Reorder {
            user: "  ".to_string(),
        });
        assert!(args.validate().is_err());

        let args = make_args(Command::Health {
            user: "u1".to_string(),
            fail_below: Some(120.0),
        });
        assert!(args.validate().is_err());

        let args = make_args(Command::VatCalc {
            amount: -5.0,
            category: "general_goods".to_string(),
            inclusive: false,
        });
        assert!(args.validate().is_err());

        let args = make_args(Command::Forecast {
            user: "u1".to_string(),
            days: 0,
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_caps_forecast_horizon() {
        let forecast = |days| {
            make_args(Command::Forecast {
                user: "u1".to_string(),
                days,
            })
        };
        assert!(forecast(MAX_FORECAST_DAYS).validate().is_ok());
        assert!(forecast(u32::MAX).validate().is_err());

        let args = make_args(Command::PredictDemand {
            user: "u1".to_string(),
            item: "rice".to_string(),
            days: MAX_FORECAST_DAYS + 1,
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_vat_summary_and_segments() {
        let summary = |months| {
            make_args(Command::VatSummary {
                user: "u1".to_string(),
                months,
            })
        };
        assert!(summary(12).validate().is_ok());
        assert!(summary(0).validate().is_err());
        assert!(summary(MAX_SUMMARY_MONTHS + 1).validate().is_err());

        let args = make_args(Command::Segments {
            user: String::new(),
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(analyze());
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(analyze());
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
