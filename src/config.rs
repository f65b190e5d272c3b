//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.merchant-pulse.toml` files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cli::OutputFormat;
use crate::orchestrator::PipelineKind;
use crate::scoring::ScoringTables;

pub const DEFAULT_CONFIG_FILE: &str = ".merchant-pulse.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Data store endpoint.
    #[serde(default)]
    pub store: StoreConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Pipeline selection and pacing.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Lookup tables for the scoring functions.
    #[serde(default)]
    pub scoring: ScoringTables,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default report path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            format: OutputFormat::default(),
        }
    }
}

fn default_output() -> String {
    "merchant_pulse_report.md".to_string()
}

/// PostgREST-style store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Sent as both `apikey` and bearer token.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_store_timeout")]
    pub timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            api_key: String::new(),
            timeout_seconds: default_store_timeout(),
        }
    }
}

fn default_store_url() -> String {
    "http://localhost:54321".to_string()
}

fn default_store_timeout() -> u64 {
    30
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_model_url")]
    pub url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in response.
    #[serde(default)]
    pub max_tokens: Option<usize>,

    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            url: default_model_url(),
            temperature: default_temperature(),
            max_tokens: None,
            timeout_seconds: default_model_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_model_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_model_timeout() -> u64 {
    120
}

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Agent family run by `analyze`.
    #[serde(default)]
    pub pipeline: PipelineKind,

    /// Pause between steps of a full run.
    #[serde(default = "default_full_delay")]
    pub full_delay_ms: u64,

    /// Pause between steps of a quick run.
    #[serde(default = "default_quick_delay")]
    pub quick_delay_ms: u64,

    /// How long a finished run's status stays queryable.
    #[serde(default = "default_status_ttl")]
    pub status_ttl_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineKind::default(),
            full_delay_ms: default_full_delay(),
            quick_delay_ms: default_quick_delay(),
            status_ttl_seconds: default_status_ttl(),
        }
    }
}

impl OrchestratorConfig {
    pub fn full_delay(&self) -> Duration {
        Duration::from_millis(self.full_delay_ms)
    }

    pub fn quick_delay(&self) -> Duration {
        Duration::from_millis(self.quick_delay_ms)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_seconds)
    }
}

fn default_full_delay() -> u64 {
    500
}

fn default_quick_delay() -> u64 {
    300
}

fn default_status_ttl() -> u64 {
    3600
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line or through the environment override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.store_url {
            self.store.url = url.clone();
        }
        if let Some(ref key) = args.store_key {
            self.store.api_key = key.clone();
        }
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.model_url {
            self.model.url = url.clone();
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Reject settings the scoring and HTTP layers cannot work with.
    pub fn validate(&self) -> Result<()> {
        let total = self.scoring.health_weights.total();
        if (total - 100.0).abs() > 1e-6 {
            bail!("Health weights must sum to 100, got {}", total);
        }

        if !is_http_url(&self.store.url) {
            bail!("Store URL must start with 'http://' or 'https://'");
        }
        if !is_http_url(&self.model.url) {
            bail!("Model URL must start with 'http://' or 'https://'");
        }

        if !(0.0..=1.0).contains(&self.model.temperature) {
            bail!("Temperature must be between 0.0 and 1.0");
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "llama3.2:latest");
        assert_eq!(config.orchestrator.full_delay(), Duration::from_millis(500));
        assert_eq!(config.orchestrator.quick_delay(), Duration::from_millis(300));
        assert_eq!(config.orchestrator.pipeline, PipelineKind::Merchant);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "pulse.json"
format = "json"

[store]
url = "https://project.example.co"
api_key = "anon-key"

[model]
name = "qwen2.5:14b"
temperature = 0.1

[orchestrator]
pipeline = "companion"
quick_delay_ms = 0

[[scoring.season_windows]]
season = "ramadan"
start = "2027-02-08"
end = "2027-03-09"

[scoring.lead_times]
grocery = 1
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "pulse.json");
        assert_eq!(config.general.format, OutputFormat::Json);
        assert_eq!(config.store.api_key, "anon-key");
        assert_eq!(config.model.name, "qwen2.5:14b");
        assert_eq!(config.orchestrator.pipeline, PipelineKind::Companion);
        assert_eq!(config.orchestrator.quick_delay_ms, 0);
        assert_eq!(config.orchestrator.full_delay_ms, 500);
        assert_eq!(config.scoring.season_windows.len(), 1);
        assert_eq!(config.scoring.lead_time("grocery"), 1);
        // Untouched tables keep their defaults.
        assert_eq!(config.scoring.health_weights.total(), 100.0);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[model]\nname = \"mistral:7b\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.model.name, "mistral:7b");
        assert_eq!(config.store.timeout_seconds, 30);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[model\nname = ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut config = Config::default();
        config.scoring.health_weights.profitability = 40.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 100"));
    }

    #[test]
    fn test_validate_rejects_non_http_urls() {
        let mut config = Config::default();
        config.store.url = "ftp://store".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.model.url = "localhost:11434".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[orchestrator]"));
        assert!(toml_str.contains("health_weights"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.scoring, ScoringTables::default());
    }
}
