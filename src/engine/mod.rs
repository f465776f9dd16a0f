//! Server-facing plumbing: the request primitive plus the device and
//! telemetry endpoint groups built on top of it.

mod device;
mod telemetry;
mod transport;

pub use device::SmuClient;
pub use telemetry::{
    Telemetry, DATA_ANALYSIS_PATH, PERFORMANCE_METRICS_PATH, STEP_ANALYSIS_PATH,
};
pub use transport::{TransportClient, PROBE_PATH};
