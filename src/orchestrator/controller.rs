//! Test lifecycle controller.
//!
//! Owns validate/start/stop/pause/resume against the server. Nothing about the
//! run is tracked locally: whether a test is active is always a question for
//! the server.

use crate::engine::{Telemetry, TransportClient, PROBE_PATH};
use crate::error::{ClientError, ClientResult, TransportFailure};
use crate::model::{
    ClientConfig, ControlAck, RunStatus, StartReceipt, StepEntry, TestDefinition,
    ValidateReport, ValidateRequest,
};
use crate::orchestrator::poller::StatusPoller;
use crate::steps;
use tracing::{info, warn};

pub const VALIDATE_PATH: &str = "/cycler/validate";
pub const START_PATH: &str = "/cycler/start";
pub const STOP_PATH: &str = "/cycler/stop";
pub const PAUSE_PATH: &str = "/cycler/pause";
pub const RESUME_PATH: &str = "/cycler/resume";
pub const STATUS_PATH: &str = "/cycler/status";

/// A server rejection of a step list becomes a step definition error.
fn rejected_definition(err: ClientError) -> ClientError {
    match err.rejection_reason() {
        Some(reason) => ClientError::StepDefinition { reason },
        None => err,
    }
}

/// A server rejection of a lifecycle transition becomes a cycler error.
fn refused(operation: &'static str, err: ClientError) -> ClientError {
    match err.rejection_reason() {
        Some(reason) => ClientError::Cycler { operation, reason },
        None => err,
    }
}

fn reason_or(error: Option<String>, message: Option<String>, fallback: &str) -> String {
    error.or(message).unwrap_or_else(|| fallback.to_string())
}

/// Drives one test through its lifecycle. No call here is ever retried: a
/// blind second `start` or `stop` could act twice on the instrument.
#[derive(Debug, Clone)]
pub struct TestOrchestrator {
    transport: TransportClient,
}

impl TestOrchestrator {
    pub fn new(cfg: &ClientConfig) -> ClientResult<Self> {
        Ok(Self::with_transport(TransportClient::new(cfg)?))
    }

    pub fn with_transport(transport: TransportClient) -> Self {
        Self { transport }
    }

    /// Builds an orchestrator and fails if the server does not answer the
    /// liveness probe.
    pub async fn connect(cfg: &ClientConfig) -> ClientResult<Self> {
        let orchestrator = Self::new(cfg)?;
        if !orchestrator.is_reachable().await {
            return Err(ClientError::Transport {
                endpoint: PROBE_PATH.to_string(),
                failure: TransportFailure::Connect(format!(
                    "cannot reach server at {}",
                    orchestrator.transport.base_url()
                )),
            });
        }
        Ok(orchestrator)
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    pub async fn is_reachable(&self) -> bool {
        self.transport.probe().await
    }

    /// Checks the step list locally, then asks the server to accept it.
    pub async fn validate(&self, steps: &[StepEntry]) -> ClientResult<ValidateReport> {
        if let Err(err) = steps::check_steps(steps) {
            warn!(error = %err, "step list failed local checks");
            return Err(err);
        }

        let report: ValidateReport = self
            .transport
            .post_json(VALIDATE_PATH, &ValidateRequest { steps })
            .await
            .map_err(rejected_definition)?;

        if !report.success {
            let reason = reason_or(
                report.error,
                report.message,
                "server did not accept the step list",
            );
            warn!(%reason, "step list rejected by server");
            return Err(ClientError::StepDefinition { reason });
        }
        info!(total_steps = ?report.total_steps, "step list accepted");
        Ok(report)
    }

    /// Validates, then starts. If validation fails in any way the start
    /// request is never sent.
    pub async fn start(&self, def: &TestDefinition) -> ClientResult<StartReceipt> {
        steps::check_definition(def)?;
        self.validate(&def.steps).await?;

        let receipt: StartReceipt = self
            .transport
            .post_json(START_PATH, def)
            .await
            .map_err(|e| refused("start", e))?;

        if !receipt.success {
            return Err(ClientError::Cycler {
                operation: "start",
                reason: reason_or(receipt.error, receipt.message, "start was not acknowledged"),
            });
        }
        info!(channel = def.channel, cycles = def.cycles, "cycling test started");
        Ok(receipt)
    }

    pub async fn stop(&self) -> ClientResult<ControlAck> {
        self.control("stop", STOP_PATH).await
    }

    pub async fn pause(&self) -> ClientResult<ControlAck> {
        self.control("pause", PAUSE_PATH).await
    }

    pub async fn resume(&self) -> ClientResult<ControlAck> {
        self.control("resume", RESUME_PATH).await
    }

    async fn control(&self, operation: &'static str, path: &str) -> ClientResult<ControlAck> {
        let ack: ControlAck = self
            .transport
            .post_empty(path)
            .await
            .map_err(|e| refused(operation, e))?;

        if !ack.success {
            return Err(ClientError::Cycler {
                operation,
                reason: reason_or(ack.error, ack.message, "request was not acknowledged"),
            });
        }
        info!(operation, "cycler acknowledged");
        Ok(ack)
    }

    pub async fn status(&self) -> ClientResult<RunStatus> {
        self.transport.get_json(STATUS_PATH).await
    }

    /// One status fetch. Errors are returned, not folded into `false`.
    pub async fn is_running(&self) -> ClientResult<bool> {
        Ok(self.status().await?.is_running)
    }

    pub fn poller(&self) -> StatusPoller<'_> {
        StatusPoller::new(&self.transport)
    }

    pub fn telemetry(&self) -> Telemetry<'_> {
        Telemetry::new(&self.transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: u16, body: &str) -> ClientError {
        ClientError::Transport {
            endpoint: START_PATH.into(),
            failure: TransportFailure::Status {
                status,
                body: body.into(),
            },
        }
    }

    #[test]
    fn json_error_body_is_a_refusal() {
        let err = refused("start", status_error(500, r#"{"error":"Cycler already running"}"#));
        assert!(matches!(
            err,
            ClientError::Cycler { operation: "start", ref reason } if reason == "Cycler already running"
        ));
    }

    #[test]
    fn bare_status_stays_a_transport_error() {
        let err = refused("stop", status_error(503, "Service Unavailable"));
        assert!(matches!(err, ClientError::Transport { .. }));

        let err = rejected_definition(status_error(404, "Not Found"));
        assert!(matches!(err, ClientError::Transport { .. }));
    }
}
