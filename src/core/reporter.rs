use chrono::{DateTime, Utc};
use std::fmt::Write;
use tracing::{debug, warn};

use crate::core::outcome::Outcome;
use crate::core::task::{Task, TaskAction};
use crate::core::types::Record;
use crate::sources::SourceAdapter;

const RAW_TEXT_PREVIEW_CHARS: usize = 300;

/// Render the result block posted back onto the originating record.
pub fn format_report(
    record: &Record,
    task: &Task,
    outcome: &Outcome,
    executed_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "🤖 {} report",
        task.agent_label.as_deref().unwrap_or("duetask")
    );
    let _ = writeln!(out, "Task: {}", task.kind().label());
    let _ = writeln!(
        out,
        "Executed: {}",
        executed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "{}", task.summary());
    if let Some(expected) = &task.expected_result {
        let _ = writeln!(out, "Expected result: {}", expected);
    }
    if let Some(detail) = &outcome.detail {
        let _ = writeln!(out, "Detail: {}", detail);
    }

    if outcome.is_success() {
        let _ = writeln!(out, "Status: ✅ Success");
    } else {
        let _ = writeln!(out, "Status: ❌ Failed");
        if let Some(message) = outcome.error_message() {
            let _ = writeln!(out, "Error: {}", message);
        }
    }
    if let Some(code) = outcome.exit_code {
        let _ = writeln!(out, "Exit code: {}", code);
    }
    if !outcome.stdout_excerpt.is_empty() {
        let _ = write!(out, "\nOutput:\n{}\n", outcome.stdout_excerpt);
    }
    if !outcome.stderr_excerpt.is_empty() {
        let _ = write!(out, "\nErrors:\n{}\n", outcome.stderr_excerpt);
    }
    if let TaskAction::Unknown { raw_text } = &task.action {
        let preview: String = raw_text.chars().take(RAW_TEXT_PREVIEW_CHARS).collect();
        if !preview.trim().is_empty() {
            let _ = write!(out, "\nInstruction as received:\n{}\n", preview.trim());
        }
    }
    debug!(record_id = %record.id, bytes = out.len(), "formatted report");
    out.trim_end().to_string()
}

/// Post the report through the record's own source. Failures are logged
/// and swallowed.
pub async fn report(adapter: &dyn SourceAdapter, record: &Record, task: &Task, outcome: &Outcome) {
    let text = format_report(record, task, outcome, Utc::now());
    if let Err(e) = adapter.post_comment(&record.id, &text).await {
        warn!(
            source = %record.source,
            record_id = %record.id,
            "failed to post report: {:#}",
            e
        );
    }
}
