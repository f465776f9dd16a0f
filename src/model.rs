use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for one client instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    /// Applied to every request individually.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("smu-cycler/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepMode {
    Cc,
    Cv,
    Ocv,
    Rest,
}

impl StepMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StepMode::Cc => "cc",
            StepMode::Cv => "cv",
            StepMode::Ocv => "ocv",
            StepMode::Rest => "rest",
        }
    }
}

impl fmt::Display for StepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cc" => Ok(StepMode::Cc),
            "cv" => Ok(StepMode::Cv),
            "ocv" => Ok(StepMode::Ocv),
            "rest" => Ok(StepMode::Rest),
            other => Err(format!("unknown step mode: {other}")),
        }
    }
}

/// Terminating conditions for a step. Any that are set may end it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cutoffs {
    #[serde(rename = "cutoff_V", default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(rename = "cutoff_A", default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(rename = "cutoff_time_s", default, skip_serializing_if = "Option::is_none")]
    pub time_s: Option<f64>,
    #[serde(rename = "cutoff_Ah", default, skip_serializing_if = "Option::is_none")]
    pub charge_ah: Option<f64>,
    /// Ends the step once the measured voltage falls to this level.
    #[serde(rename = "cutoff_V_min", default, skip_serializing_if = "Option::is_none")]
    pub voltage_min: Option<f64>,
    /// Ends the step once the measured voltage rises to this level.
    #[serde(rename = "cutoff_V_max", default, skip_serializing_if = "Option::is_none")]
    pub voltage_max: Option<f64>,
}

impl Cutoffs {
    pub fn is_empty(&self) -> bool {
        self.voltage.is_none()
            && self.current.is_none()
            && self.time_s.is_none()
            && self.charge_ah.is_none()
            && self.voltage_min.is_none()
            && self.voltage_max.is_none()
    }
}

/// Setpoints sourced during a step: `current` for cc, `voltage` for cv.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Setpoints {
    pub current: Option<f64>,
    pub voltage: Option<f64>,
}

/// One electrical phase of a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub mode: StepMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(flatten)]
    pub cutoffs: Cutoffs,
    /// Keys this client has no typed field for. Sent back to the server
    /// unchanged so a step file never loses a condition on the way through.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleBoundary {
    Start,
    End,
}

/// `{"cycle": "start"}` or `{"cycle": "end"}` around the repeated group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleMarker {
    pub cycle: CycleBoundary,
}

/// An element of a step list as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepEntry {
    Marker(CycleMarker),
    Step(Step),
}

impl StepEntry {
    pub const START: StepEntry = StepEntry::Marker(CycleMarker {
        cycle: CycleBoundary::Start,
    });
    pub const END: StepEntry = StepEntry::Marker(CycleMarker {
        cycle: CycleBoundary::End,
    });

    pub fn as_step(&self) -> Option<&Step> {
        match self {
            StepEntry::Step(step) => Some(step),
            StepEntry::Marker(_) => None,
        }
    }

    pub fn boundary(&self) -> Option<CycleBoundary> {
        match self {
            StepEntry::Marker(m) => Some(m.cycle),
            StepEntry::Step(_) => None,
        }
    }
}

impl From<Step> for StepEntry {
    fn from(step: Step) -> Self {
        StepEntry::Step(step)
    }
}

/// Everything `POST /cycler/start` needs. Serializes to the start request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    pub channel: u32,
    pub cycles: u32,
    pub enable_logging: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub steps: Vec<StepEntry>,
}

impl TestDefinition {
    /// One cycle with server-side logging enabled and no metadata.
    pub fn new(channel: u32, steps: Vec<StepEntry>) -> Self {
        Self {
            channel,
            cycles: 1,
            enable_logging: true,
            metadata: BTreeMap::new(),
            steps,
        }
    }

    pub fn cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles;
        self
    }

    pub fn enable_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Body of `POST /cycler/validate`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ValidateRequest<'a> {
    pub steps: &'a [StepEntry],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateReport {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub total_steps: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub channel: Option<u32>,
    #[serde(default)]
    pub cycles: Option<u32>,
    #[serde(default)]
    pub total_steps: Option<usize>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply to stop, pause and resume. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Server-side snapshot of the run. Always fetched fresh, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub is_running: bool,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub channel: Option<u32>,
    #[serde(default)]
    pub current_cycle: u32,
    #[serde(default)]
    pub total_cycles: u32,
    #[serde(default)]
    pub current_step_index: Option<usize>,
    #[serde(default)]
    pub current_step: Option<StepEntry>,
    #[serde(default)]
    pub step_time: f64,
    #[serde(default)]
    pub total_time: f64,
    #[serde(default)]
    pub total_ah: f64,
    #[serde(default)]
    pub step_ah: Option<f64>,
    #[serde(default)]
    pub cycle_ah: Option<f64>,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub total_steps: Option<usize>,
}

impl RunStatus {
    pub fn current_mode(&self) -> Option<StepMode> {
        self.current_step
            .as_ref()
            .and_then(StepEntry::as_step)
            .map(|s| s.mode)
    }
}

/// A single voltage/current reading from the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub voltage: f64,
    pub current: f64,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_omits_unset_fields_on_the_wire() {
        let step = Step {
            mode: StepMode::Cc,
            current: Some(0.01),
            voltage: None,
            cutoffs: Cutoffs {
                voltage: Some(4.2),
                time_s: Some(3600.0),
                ..Default::default()
            },
            extra: Default::default(),
        };
        let wire = serde_json::to_value(step).unwrap();
        assert_eq!(
            wire,
            json!({"mode": "cc", "current": 0.01, "cutoff_V": 4.2, "cutoff_time_s": 3600.0})
        );
    }

    #[test]
    fn step_list_parses_markers_and_steps() {
        let entries: Vec<StepEntry> = serde_json::from_value(json!([
            {"cycle": "start"},
            {"mode": "rest", "cutoff_time_s": 300},
            {"cycle": "end"}
        ]))
        .unwrap();
        assert_eq!(entries[0], StepEntry::START);
        assert_eq!(entries[2], StepEntry::END);
        let rest = entries[1].as_step().unwrap();
        assert_eq!(rest.mode, StepMode::Rest);
        assert_eq!(rest.cutoffs.time_s, Some(300.0));
    }

    #[test]
    fn step_keeps_voltage_window_and_unknown_keys() {
        let raw = json!([
            {"cycle": "start"},
            {"mode": "cc", "current": 0.01, "cutoff_time_s": 3600, "cutoff_V_max": 4.25,
             "cutoff_dVdt": 0.002},
            {"cycle": "end"}
        ]);
        let entries: Vec<StepEntry> = serde_json::from_value(raw).unwrap();
        let cc = entries[1].as_step().unwrap();
        assert_eq!(cc.cutoffs.voltage_max, Some(4.25));
        assert_eq!(cc.extra.get("cutoff_dVdt"), Some(&json!(0.002)));
        assert!(!cc.extra.contains_key("cutoff_V_max"));

        let wire = serde_json::to_value(&entries).unwrap();
        assert_eq!(
            wire[1],
            json!({"mode": "cc", "current": 0.01, "cutoff_time_s": 3600.0,
                   "cutoff_V_max": 4.25, "cutoff_dVdt": 0.002})
        );
    }

    #[test]
    fn definition_uses_camel_case_start_body() {
        let def = TestDefinition::new(1, vec![StepEntry::START, StepEntry::END])
            .cycles(3)
            .enable_logging(false)
            .metadata("batteryId", "CELL_001");
        let wire = serde_json::to_value(&def).unwrap();
        assert_eq!(wire["enableLogging"], json!(false));
        assert_eq!(wire["cycles"], json!(3));
        assert_eq!(wire["metadata"]["batteryId"], json!("CELL_001"));
        assert_eq!(wire["steps"], json!([{"cycle": "start"}, {"cycle": "end"}]));
    }

    #[test]
    fn status_tolerates_idle_server_snapshot() {
        let status: RunStatus = serde_json::from_value(json!({
            "isRunning": false,
            "isPaused": false,
            "channel": null,
            "currentCycle": 0,
            "totalCycles": 0,
            "currentStepIndex": 0,
            "currentStep": null,
            "stepTime": 0,
            "totalTime": 0,
            "totalAh": 0,
            "logFile": null,
            "totalSteps": 0
        }))
        .unwrap();
        assert!(!status.is_running);
        assert_eq!(status.current_mode(), None);
    }

    #[test]
    fn status_without_running_flag_is_rejected() {
        let parsed = serde_json::from_value::<RunStatus>(json!({"currentCycle": 2}));
        assert!(parsed.is_err());
    }

    #[test]
    fn config_timeout_uses_humantime() {
        let cfg: ClientConfig = serde_json::from_value(json!({
            "base_url": "http://bench-7:3000",
            "timeout": "2s 500ms",
            "user_agent": "test"
        }))
        .unwrap();
        assert_eq!(cfg.timeout, Duration::from_millis(2500));
    }
}
