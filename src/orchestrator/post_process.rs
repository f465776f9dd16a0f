//! Post-run processing utilities.
//!
//! Builds the final summary and handles exports once monitoring ends.

use crate::model::RunStatus;
use crate::text_summary::build_text_summary;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What gets written by `--export-json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(default)]
    pub timestamp_utc: String,
    pub base_url: String,
    /// False when monitoring was interrupted before the run finished.
    pub completed: bool,
    pub status: Option<RunStatus>,
}

/// Result of post-run processing, ready for presentation layers.
pub struct ProcessedRun {
    pub summary: Vec<String>,
    pub export_messages: Vec<String>,
    pub exported_path: Option<PathBuf>,
}

pub fn export_json(path: &Path, record: &RunRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record).context("serialize run record")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Summarize the last status and export it if a path was given. Export
/// failures are reported as messages rather than errors.
pub fn process_run_completion(
    base_url: &str,
    status: Option<&RunStatus>,
    completed: bool,
    export_path: Option<&Path>,
) -> ProcessedRun {
    let summary = match status {
        Some(s) => build_text_summary(s, completed).lines,
        None => vec!["No status received before monitoring stopped.".to_string()],
    };

    let mut export_messages = Vec::new();
    let mut exported_path = None;
    if let Some(path) = export_path {
        let record = RunRecord {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            base_url: base_url.to_string(),
            completed,
            status: status.cloned(),
        };
        match export_json(path, &record) {
            Ok(()) => {
                export_messages.push(format!("Exported JSON: {}", path.display()));
                exported_path = Some(path.to_path_buf());
            }
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedRun {
        summary,
        export_messages,
        exported_path,
    }
}
