//! Text summary builder for CLI output.

use crate::model::RunStatus;

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

pub fn build_text_summary(status: &RunStatus, completed: bool) -> TextSummary {
    let mut lines = Vec::new();

    if completed {
        lines.push("Test completed.".to_string());
    } else {
        lines.push("Monitoring stopped; the test continues on the server.".to_string());
    }
    if let Some(channel) = status.channel {
        lines.push(format!("Channel: {channel}"));
    }
    lines.push(format!(
        "Cycles: {}/{}",
        status.current_cycle, status.total_cycles
    ));
    if let Some(mode) = status.current_mode() {
        let index = status
            .current_step_index
            .map(|i| format!(" (step {i})"))
            .unwrap_or_default();
        lines.push(format!("Last step: {}{index}", mode.as_str().to_uppercase()));
    }
    lines.push(format!("Total time: {:.2} h", status.total_time / 3600.0));
    lines.push(format!("Total charge: {:.4} Ah", status.total_ah));
    if let Some(cycle_ah) = status.cycle_ah {
        lines.push(format!("Last cycle charge: {cycle_ah:.4} Ah"));
    }
    if let Some(log) = status.log_file.as_deref() {
        if !log.trim().is_empty() {
            lines.push(format!("Server log: {log}"));
        }
    }

    TextSummary { lines }
}
