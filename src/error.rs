//! Error taxonomy for the cycler client.
//!
//! Every failure is surfaced to the caller as a distinct variant; nothing here
//! retries or recovers on its own.

use thiserror::Error;

/// Why a request never produced a usable response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    #[error("timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {status}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    /// Server unreachable, request timed out, or a non-success HTTP status.
    #[error("request to {endpoint} failed: {failure}")]
    Transport {
        endpoint: String,
        failure: TransportFailure,
    },

    /// The server answered, but not with the body we expected.
    #[error("unexpected response from {endpoint}: {message}")]
    ResponseFormat { endpoint: String, message: String },

    /// A test definition broke a structural rule or was rejected by the server.
    #[error("step definition rejected: {reason}")]
    StepDefinition { reason: String },

    /// The server refused a lifecycle transition (start, stop, pause, resume).
    #[error("cycler refused {operation}: {reason}")]
    Cycler {
        operation: &'static str,
        reason: String,
    },

    /// A device-facing endpoint returned a reading without the expected fields.
    #[error("device operation {operation} failed: {message}")]
    DeviceOperation {
        operation: &'static str,
        message: String,
    },
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub(crate) fn transport(endpoint: &str, failure: TransportFailure) -> Self {
        ClientError::Transport {
            endpoint: endpoint.to_string(),
            failure,
        }
    }

    pub(crate) fn response_format(endpoint: &str, message: impl Into<String>) -> Self {
        ClientError::ResponseFormat {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn step_definition(reason: impl Into<String>) -> Self {
        ClientError::StepDefinition {
            reason: reason.into(),
        }
    }

    /// Returns the server's own rejection message when this is a non-success
    /// HTTP status whose body is JSON with an `error` field.
    pub fn rejection_reason(&self) -> Option<String> {
        let ClientError::Transport {
            failure: TransportFailure::Status { body, .. },
            ..
        } = self
        else {
            return None;
        };
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        value
            .get("error")
            .and_then(|e| e.as_str())
            .map(str::to_string)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ClientError::Transport {
                failure: TransportFailure::Timeout,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_reason_reads_error_field_from_status_body() {
        let err = ClientError::transport(
            "/cycler/validate",
            TransportFailure::Status {
                status: 400,
                body: r#"{"error":"CC step missing current at step 1"}"#.into(),
            },
        );
        assert_eq!(
            err.rejection_reason().as_deref(),
            Some("CC step missing current at step 1")
        );
    }

    #[test]
    fn rejection_reason_ignores_plain_text_bodies() {
        let err = ClientError::transport(
            "/cycler/start",
            TransportFailure::Status {
                status: 502,
                body: "Bad Gateway".into(),
            },
        );
        assert!(err.rejection_reason().is_none());
        assert!(!err.is_timeout());
    }
}
