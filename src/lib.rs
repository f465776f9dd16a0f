//! Client for scripting battery cycling tests on a minismu instrument server.
//!
//! A test is an ordered list of electrical steps between a pair of cycle
//! markers. [`steps`] builds and checks such lists, [`TestOrchestrator`]
//! validates and starts them and issues stop/pause/resume, and
//! [`StatusPoller`] watches a run until the server reports it finished.
//!
//! ```no_run
//! # async fn demo() -> smu_cycler::ClientResult<()> {
//! use smu_cycler::steps::{build_standard_cycle, StandardCycle};
//! use smu_cycler::{ClientConfig, TestDefinition, TestOrchestrator};
//! use std::time::Duration;
//!
//! let cycler = TestOrchestrator::connect(&ClientConfig::default()).await?;
//! let def = TestDefinition::new(1, build_standard_cycle(&StandardCycle::default()))
//!     .cycles(3)
//!     .metadata("batteryId", "CELL_001");
//! cycler.start(&def).await?;
//! let done = cycler
//!     .poller()
//!     .wait_for_completion(Duration::from_secs(30), None)
//!     .await?;
//! println!("finished after {:.1} h", done.total_time / 3600.0);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod steps;
pub mod text_summary;

pub use engine::{SmuClient, Telemetry, TransportClient};
pub use error::{ClientError, ClientResult, TransportFailure};
pub use model::{
    ClientConfig, ControlAck, CycleBoundary, CycleMarker, Cutoffs, Measurement, RunStatus,
    Setpoints, StartReceipt, Step, StepEntry, StepMode, TestDefinition, ValidateReport,
};
pub use orchestrator::{PollOutcome, StatusPoller, TestOrchestrator};
