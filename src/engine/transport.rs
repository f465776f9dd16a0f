use crate::error::{ClientError, ClientResult, TransportFailure};
use crate::model::ClientConfig;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Liveness endpoint; any success status means the server is reachable.
pub const PROBE_PATH: &str = "/read/";

/// Issues one HTTP request per call against the instrument server.
///
/// Every call is at-most-once: there is no retry and no backoff. The
/// configured timeout applies to each request on its own.
#[derive(Debug, Clone)]
pub struct TransportClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

fn classify(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::Timeout
    } else if err.is_connect() {
        TransportFailure::Connect(err.to_string())
    } else {
        TransportFailure::Other(err.to_string())
    }
}

impl TransportClient {
    pub fn new(cfg: &ClientConfig) -> ClientResult<Self> {
        let base_url = cfg.base_url.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(|e| ClientError::transport(&base_url, TransportFailure::Other(e.to_string())))?;
        Ok(Self {
            http,
            base_url,
            timeout: cfg.timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends the request and turns transport failures and non-success
    /// statuses into [`ClientError::Transport`]. The body of a failed status
    /// is kept so callers can read the server's own reason.
    async fn send(&self, path: &str, req: RequestBuilder) -> ClientResult<Response> {
        debug!(endpoint = path, "sending request");
        let resp = req
            .send()
            .await
            .map_err(|e| ClientError::transport(path, classify(&e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!(endpoint = path, status = status.as_u16(), "non-success status");
            return Err(ClientError::transport(
                path,
                TransportFailure::Status {
                    status: status.as_u16(),
                    body,
                },
            ));
        }
        Ok(resp)
    }

    async fn read_text(path: &str, resp: Response) -> ClientResult<String> {
        resp.text()
            .await
            .map_err(|e| ClientError::transport(path, classify(&e)))
    }

    async fn read_json<T: DeserializeOwned>(path: &str, resp: Response) -> ClientResult<T> {
        let text = Self::read_text(path, resp).await?;
        serde_json::from_str(&text).map_err(|e| ClientError::response_format(path, e.to_string()))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let resp = self.send(path, self.http.get(self.url(path))).await?;
        Self::read_json(path, resp).await
    }

    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        let resp = self
            .send(path, self.http.get(self.url(path)).query(query))
            .await?;
        Self::read_json(path, resp).await
    }

    pub async fn get_text(&self, path: &str) -> ClientResult<String> {
        let resp = self.send(path, self.http.get(self.url(path))).await?;
        Self::read_text(path, resp).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .send(path, self.http.post(self.url(path)).json(body))
            .await?;
        Self::read_json(path, resp).await
    }

    /// POST with a JSON body where the reply is not expected to be JSON.
    pub async fn post_json_for_text<B>(&self, path: &str, body: &B) -> ClientResult<String>
    where
        B: Serialize + ?Sized,
    {
        let resp = self
            .send(path, self.http.post(self.url(path)).json(body))
            .await?;
        Self::read_text(path, resp).await
    }

    /// POST without a request body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let resp = self.send(path, self.http.post(self.url(path))).await?;
        Self::read_json(path, resp).await
    }

    /// Yes/no reachability check. Any failure, including a non-success
    /// status, collapses to `false`.
    pub async fn probe(&self) -> bool {
        match self.get_text(PROBE_PATH).await {
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "liveness probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let cfg = ClientConfig::new("http://bench-3:3000/").with_timeout(Duration::from_secs(2));
        let client = TransportClient::new(&cfg).unwrap();
        assert_eq!(client.base_url(), "http://bench-3:3000");
        assert_eq!(client.url("/cycler/status"), "http://bench-3:3000/cycler/status");
        assert_eq!(client.timeout(), Duration::from_secs(2));
    }
}
