//! HTTP webhook sink
//!
//! POSTs each event as JSON to an HTTP endpoint. Timeouts are deterministic
//! config values; the sink does not retry, failures surface to the worker.

use crate::error::SinkError;
use crate::event::EnhancedEvent;
use crate::sinks::{layout, Sink};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub endpoint: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub layout: Option<Value>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_seconds: u64,
}

pub struct WebhookSink {
    client: Client,
    config: WebhookConfig,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| SinkError::Init(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Sink for WebhookSink {
    async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError> {
        let payload = layout::event_payload(event, self.config.layout.as_ref())?;

        let mut request = self.client.post(&self.config.endpoint).json(&payload);
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            SinkError::Connection(format!("cannot reach {}: {e}", self.config.endpoint))
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(endpoint = %self.config.endpoint, status = %status, "webhook delivered");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SinkError::Send(format!(
                "webhook returned {status}: {body}"
            )))
        }
    }

    async fn close(&self) {
        debug!(endpoint = %self.config.endpoint, "webhook sink closed");
    }
}
