//! Markdown and JSON rendering of an analysis run.

use anyhow::Result;
use serde_json::Value;

use crate::orchestrator::{RunResult, StepResult};

/// Scalar fields shown per agent before the collapsed full result.
const MAX_HIGHLIGHTS: usize = 8;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(run: &RunResult) -> String {
    let mut output = String::new();

    output.push_str("# Merchant Pulse Report\n\n");
    output.push_str(&generate_metadata_section(run));
    output.push_str(&generate_summary_section(&run.results));
    output.push_str(&generate_results_section(&run.results));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(run: &RunResult) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **User:** `{}`\n", run.user_id));
    section.push_str(&format!("- **Mode:** {}\n", run.mode));
    section.push_str(&format!(
        "- **Started:** {}\n",
        run.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Agents Run:** {}\n", run.results.len()));
    if run.failed_steps() > 0 {
        section.push_str(&format!("- **Agents Failed:** {}\n", run.failed_steps()));
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        run.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_summary_section(results: &[StepResult]) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| # | Agent | Status |\n");
    section.push_str("|:---:|:---|:---:|\n");
    for (i, step) in results.iter().enumerate() {
        let status = if step.success { "✅" } else { "❌" };
        section.push_str(&format!("| {} | {} | {} |\n", i + 1, step.agent, status));
    }
    section.push('\n');

    section
}

fn generate_results_section(results: &[StepResult]) -> String {
    let mut section = String::new();

    section.push_str("## Agent Results\n\n");
    for step in results {
        section.push_str(&format!("### {}\n\n", step.agent));

        if let Some(ref error) = step.error {
            section.push_str(&format!("> ⚠️ **Failed:** {}\n\n", error));
            continue;
        }

        let Some(ref result) = step.result else {
            continue;
        };

        let highlights = highlights(result);
        for (key, value) in &highlights {
            section.push_str(&format!("- **{}:** {}\n", key, value));
        }
        if !highlights.is_empty() {
            section.push('\n');
        }

        section.push_str("<details>\n<summary>Full result</summary>\n\n```json\n");
        section.push_str(&serde_json::to_string_pretty(result).unwrap_or_default());
        section.push_str("\n```\n</details>\n\n");
    }

    section
}

/// Top-level scalar fields of an agent result, skipping envelope keys.
fn highlights(result: &Value) -> Vec<(String, String)> {
    let Some(object) = result.as_object() else {
        return Vec::new();
    };

    object
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "status" | "success" | "user_id" | "agent" | "timestamp"))
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.replace('_', " "), rendered))
        })
        .take(MAX_HIGHLIGHTS)
        .collect()
}

fn generate_footer() -> String {
    "---\n\n*Report generated by Merchant Pulse*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(run: &RunResult) -> Result<String> {
    serde_json::to_string_pretty(run).map_err(Into::into)
}
