//! Test lifecycle orchestration.
//!
//! This module owns the validate/start/stop/pause/resume controller, the
//! status polling loop used to monitor a run, and post-run processing such as
//! the final summary and exports. CLI layers call into this module rather than
//! talking to the transport directly.

mod controller;
mod poller;
mod post_process;

pub use controller::{
    TestOrchestrator, PAUSE_PATH, RESUME_PATH, START_PATH, STATUS_PATH, STOP_PATH, VALIDATE_PATH,
};
pub use poller::{format_progress, print_progress, PollOutcome, StatusPoller};
pub use post_process::{export_json, process_run_completion, ProcessedRun, RunRecord};
