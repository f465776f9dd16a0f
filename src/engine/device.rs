//! Channel control and measurement on the SMU behind the server.

use crate::engine::transport::TransportClient;
use crate::error::{ClientError, ClientResult};
use crate::model::{ClientConfig, Measurement};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct ChannelBody {
    channel: u32,
}

#[derive(Serialize)]
struct PotentialBody {
    channel: u32,
    potential: f64,
}

#[derive(Serialize)]
struct CurrentBody {
    channel: u32,
    current: f64,
}

/// Pulls a numeric field out of a reading. Numeric strings are accepted,
/// anything else is a [`ClientError::DeviceOperation`].
fn reading_field(reading: &Value, field: &str, operation: &'static str) -> ClientResult<f64> {
    let value = reading.get(field).and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    });
    value.ok_or_else(|| ClientError::DeviceOperation {
        operation,
        message: format!("reading has no numeric `{field}`: {reading}"),
    })
}

#[derive(Debug, Clone)]
pub struct SmuClient {
    transport: TransportClient,
}

impl SmuClient {
    pub fn new(cfg: &ClientConfig) -> ClientResult<Self> {
        Ok(Self::with_transport(TransportClient::new(cfg)?))
    }

    pub fn with_transport(transport: TransportClient) -> Self {
        Self { transport }
    }

    pub async fn enable_channel(&self, channel: u32) -> ClientResult<String> {
        self.transport
            .post_json_for_text("/smu/enable_channel", &ChannelBody { channel })
            .await
    }

    pub async fn disable_channel(&self, channel: u32) -> ClientResult<String> {
        self.transport
            .post_json_for_text("/smu/disable_channel", &ChannelBody { channel })
            .await
    }

    pub async fn set_voltage(&self, channel: u32, voltage: f64) -> ClientResult<String> {
        self.transport
            .post_json_for_text(
                "/smu/set_potential",
                &PotentialBody {
                    channel,
                    potential: voltage,
                },
            )
            .await
    }

    pub async fn set_current(&self, channel: u32, current: f64) -> ClientResult<String> {
        self.transport
            .post_json_for_text("/smu/set_current", &CurrentBody { channel, current })
            .await
    }

    pub async fn measure_voltage(&self, channel: u32) -> ClientResult<f64> {
        let reading: Value = self
            .transport
            .post_json("/smu/measure_voltage", &ChannelBody { channel })
            .await?;
        reading_field(&reading, "voltage", "measure_voltage")
    }

    pub async fn measure_current(&self, channel: u32) -> ClientResult<f64> {
        let reading: Value = self
            .transport
            .post_json("/smu/measure_current", &ChannelBody { channel })
            .await?;
        reading_field(&reading, "current", "measure_current")
    }

    pub async fn measure_voltage_and_current(&self, channel: u32) -> ClientResult<Measurement> {
        let reading: Value = self
            .transport
            .post_json("/smu/measure_voltage_and_current", &ChannelBody { channel })
            .await?;
        Ok(Measurement {
            voltage: reading_field(&reading, "voltage", "measure_voltage_and_current")?,
            current: reading_field(&reading, "current", "measure_voltage_and_current")?,
            timestamp: reading.get("timestamp").cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reading_accepts_numbers_and_numeric_strings() {
        assert_eq!(
            reading_field(&json!({"voltage": 3.71}), "voltage", "measure_voltage").unwrap(),
            3.71
        );
        assert_eq!(
            reading_field(&json!({"current": " -0.002 "}), "current", "measure_current").unwrap(),
            -0.002
        );
    }

    #[test]
    fn reading_without_field_is_a_device_error() {
        let err = reading_field(&json!({"status": "ok"}), "voltage", "measure_voltage").unwrap_err();
        assert!(matches!(
            err,
            ClientError::DeviceOperation {
                operation: "measure_voltage",
                ..
            }
        ));
    }
}
