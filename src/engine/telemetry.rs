//! Read-only analytics endpoints. Payloads are handed back untouched; the
//! server's analysis format is not interpreted here.

use crate::engine::transport::TransportClient;
use crate::error::ClientResult;
use serde_json::Value;

pub const STEP_ANALYSIS_PATH: &str = "/cycler/step_analysis";
pub const PERFORMANCE_METRICS_PATH: &str = "/cycler/performance_metrics";
pub const DATA_ANALYSIS_PATH: &str = "/data/analysis";

pub struct Telemetry<'a> {
    transport: &'a TransportClient,
}

impl<'a> Telemetry<'a> {
    pub fn new(transport: &'a TransportClient) -> Self {
        Self { transport }
    }

    pub async fn step_analysis(&self) -> ClientResult<Value> {
        self.transport.get_json(STEP_ANALYSIS_PATH).await
    }

    pub async fn performance_metrics(&self) -> ClientResult<Value> {
        self.transport.get_json(PERFORMANCE_METRICS_PATH).await
    }

    /// Raw data array for one channel, optionally only the last `limit` points.
    pub async fn channel_data(&self, channel: u32, limit: Option<u32>) -> ClientResult<Value> {
        let path = format!("/data/ch{channel}");
        let query: Vec<(&str, String)> = limit
            .map(|l| vec![("limit", l.to_string())])
            .unwrap_or_default();
        self.transport.get_json_with_query(&path, &query).await
    }

    pub async fn data_analysis(&self, channel: Option<u32>) -> ClientResult<Value> {
        let query: Vec<(&str, String)> = channel
            .map(|c| vec![("channel", c.to_string())])
            .unwrap_or_default();
        self.transport
            .get_json_with_query(DATA_ANALYSIS_PATH, &query)
            .await
    }
}
