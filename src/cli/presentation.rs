//! CLI presentation: text and json formatters per command family.

use crate::circuit::CircuitRecord;
use crate::config::ConfigValidationError;
use crate::display::{Layout, ValidationResult};
use crate::orchestrator::{AttemptRecord, CycleOutcome};
use crate::provider::ConnectionCheck;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;

fn to_pretty_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_circuits_text(records: &[CircuitRecord]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Circuit", "Kind", "State", "Failures", "Since", "Last error"]);
    for record in records {
        table.add_row(vec![
            record.circuit_id.clone(),
            format!("{:?}", record.kind).to_lowercase(),
            record.state.to_string(),
            format!("{}/{}", record.failure_count, record.failure_threshold),
            record
                .last_transition_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            record.last_error.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table.to_string()
}

pub fn format_circuits_json(records: &[CircuitRecord]) -> String {
    to_pretty_json(&json!({ "circuits": records, "total": records.len() }))
}

pub fn format_circuit_change(record: &CircuitRecord) -> String {
    format!(
        "{} is now {} (failures: {})",
        record.circuit_id, record.state, record.failure_count
    )
}

pub fn format_preview_text(
    validation: &ValidationResult,
    layout: &Layout,
    warnings: &[String],
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Lines: {}  Longest: {}\n",
        validation.line_count, validation.max_line_length
    ));
    let mut notes = Vec::new();
    if validation.wrapping_applied {
        notes.push("wrapped");
    }
    if validation.truncation_applied {
        notes.push("truncated");
    }
    if validation.emoji_stripped {
        notes.push("emoji stripped");
    }
    if !notes.is_empty() {
        out.push_str(&format!("Adjusted: {}\n", notes.join(", ")));
    }
    for warning in warnings {
        out.push_str(&format!("Warning: {}\n", warning));
    }
    out.push('\n');
    out.push_str(&layout.to_string());
    out.push_str("\n\n");
    for row in layout.rows() {
        let codes: Vec<String> = row.iter().map(|code| format!("{:>2}", code)).collect();
        out.push_str(&format!("[{}]\n", codes.join(",")));
    }
    out
}

pub fn format_preview_json(
    validation: &ValidationResult,
    layout: &Layout,
    warnings: &[String],
) -> String {
    to_pretty_json(&json!({
        "validation": validation,
        "warnings": warnings,
        "layout": layout.to_vec(),
    }))
}

pub fn format_validation_error(error: &crate::error::ValidationError) -> String {
    format!("Message cannot be displayed: {}", error)
}

pub fn format_cycle_outcome(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Sent {
            generator_id,
            used_fallback: false,
        } => format!("Sent content from '{}'", generator_id),
        CycleOutcome::Sent {
            generator_id,
            used_fallback: true,
        } => format!("Primary generation failed; sent fallback content from '{}'", generator_id),
        CycleOutcome::Refreshed => "Frame refreshed".to_string(),
        CycleOutcome::Skipped(reason) => format!("Skipped: {}", reason),
    }
}

pub fn format_probe_result(provider: &str, check: &ConnectionCheck) -> String {
    let latency = check
        .latency_ms
        .map(|ms| format!(" ({} ms)", ms))
        .unwrap_or_default();
    if check.success {
        format!("Provider '{}' reachable{}; circuit closed", provider, latency)
    } else {
        format!(
            "Provider '{}' unreachable{}: {}",
            provider,
            latency,
            check.message.as_deref().unwrap_or("unknown error")
        )
    }
}

pub fn format_history_text(records: &[AttemptRecord]) -> String {
    if records.is_empty() {
        return "No attempts recorded.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Time", "Generator", "Provider", "Result", "Duration", "Error"]);
    for record in records {
        let result = match (record.success, record.used_fallback) {
            (true, false) => "ok",
            (true, true) => "ok (fallback)",
            (false, _) => "failed",
        };
        table.add_row(vec![
            record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            record.generator_id.clone().unwrap_or_else(|| "-".to_string()),
            record.provider.clone().unwrap_or_else(|| "-".to_string()),
            result.to_string(),
            format!("{} ms", record.duration_ms),
            record.error.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table.to_string()
}

pub fn format_history_json(records: &[AttemptRecord]) -> String {
    to_pretty_json(&json!({ "attempts": records, "total": records.len() }))
}

pub fn format_config_validation(result: &Result<(), Vec<ConfigValidationError>>) -> String {
    match result {
        Ok(()) => "Configuration is valid".to_string(),
        Err(errors) => {
            let mut out = format!("Configuration has {} problem(s):", errors.len());
            for error in errors {
                out.push_str(&format!("\n  - {}", error));
            }
            out
        }
    }
}
