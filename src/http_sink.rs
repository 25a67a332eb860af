use crate::record::LogRecord;
use crate::sink::{LogSink, SinkError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Configuration for [`HttpSink`].
#[derive(Clone, Debug)]
pub struct HttpSinkConfig {
    /// Collector endpoint, e.g. "https://logs.example.com/ingest".
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub bearer_token: Option<String>,
}

impl HttpSinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        HttpSinkConfig { url: url.into(), timeout: Duration::from_secs(5), bearer_token: None }
    }
}

/// Ships each batch as one JSON array in a `POST` request.
#[derive(Clone)]
pub struct HttpSink {
    client: Client,
    config: HttpSinkConfig,
}

impl HttpSink {
    pub fn new(config: HttpSinkConfig) -> Self {
        Self { client: Client::new(), config }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl LogSink for HttpSink {
    async fn send_batch(&self, records: &[LogRecord]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut request = self.client.post(&self.config.url).timeout(self.config.timeout).json(records);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(format!("log collector rejected batch with status {}: {}", status, text).into())
        }
    }
}
