//! Rendering of execution records for the terminal.

use anyhow::Result;
use colored::Colorize;
use pagewatch_core::{ExecutionRecord, ExecutionStatus};
use std::fmt::Write as _;

/// Output format for command results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    Text,
    /// One JSON document
    Json,
}

/// Render the result of a single execution.
pub fn render_record(record: &ExecutionRecord, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(record)?),
        OutputFormat::Text => Ok(record_text(record)),
    }
}

/// Render a stored history, oldest first.
pub fn render_history(
    url: &str,
    records: &[ExecutionRecord],
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        OutputFormat::Text => Ok(history_text(url, records)),
    }
}

fn status_label(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Completed => status.as_str().green().to_string(),
        ExecutionStatus::Skipped => status.as_str().cyan().to_string(),
        ExecutionStatus::Failed => status.as_str().red().bold().to_string(),
        ExecutionStatus::Pending | ExecutionStatus::Downloading => {
            status.as_str().yellow().to_string()
        },
    }
}

fn record_text(record: &ExecutionRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Execution ID: {}", record.execution_id);
    let _ = writeln!(out, "Status: {}", status_label(record.status));
    let changed = if record.change_detected {
        "yes".bold().to_string()
    } else {
        "no".to_string()
    };
    let _ = writeln!(out, "Change detected: {changed}");
    if let Some(change_type) = record.change_type {
        let _ = writeln!(out, "Change type: {change_type}");
    }
    if record.status == ExecutionStatus::Completed {
        let _ = writeln!(out, "Content size: {} bytes", record.content_size);
    }
    if let Some(ms) = record.download_duration_ms {
        let _ = writeln!(out, "Download duration: {ms} ms");
    }
    if let Some(error) = &record.error_message {
        let _ = writeln!(out, "Error: {}", error.red());
    }
    out
}

fn history_text(url: &str, records: &[ExecutionRecord]) -> String {
    if records.is_empty() {
        return format!("No executions recorded for {url}\n");
    }

    let mut out = format!("{} execution(s) recorded for {}\n", records.len(), url.bold());
    for record in records {
        let change = record
            .change_type
            .map_or_else(|| "-".to_string(), |ct| ct.to_string());
        let marker = if record.change_detected { "*" } else { " " };
        let short_id: String = record.execution_id.chars().take(12).collect();
        let _ = writeln!(
            out,
            "{marker} {}  {:<9}  {:<23}  {:>9} B  {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.status.as_str(),
            change,
            record.content_size,
            short_id.dimmed()
        );
    }
    out
}
