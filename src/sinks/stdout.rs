//! Stdout sink
//!
//! Writes one JSON line per event. Useful as a pipeline debugging tap and
//! for log-scraping agents that pick events up from container stdout.

use crate::error::SinkError;
use crate::event::EnhancedEvent;
use crate::sinks::{layout, Sink};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::io::Write;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StdoutConfig {
    /// Optional layout; the full enhanced event is written when absent.
    #[serde(default)]
    pub layout: Option<Value>,

    /// Indented JSON instead of one line per event.
    #[serde(default)]
    pub pretty: bool,
}

pub struct StdoutSink {
    config: StdoutConfig,
}

impl StdoutSink {
    pub fn new(config: StdoutConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError> {
        let payload = layout::event_payload(event, self.config.layout.as_ref())?;
        let line = if self.config.pretty {
            serde_json::to_string_pretty(&payload)?
        } else {
            serde_json::to_string(&payload)?
        };

        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}").map_err(|e| SinkError::Send(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Event;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn sample() -> EnhancedEvent {
        EnhancedEvent::new(Event {
            metadata: ObjectMeta {
                name: Some("ev".into()),
                namespace: Some("default".into()),
                ..Default::default()
            },
            reason: Some("Created".into()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_send_full_event() {
        let sink = StdoutSink::new(StdoutConfig::default());
        sink.send(&sample()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_with_layout() {
        let config: StdoutConfig = serde_yaml::from_str(
            r#"
layout:
  reason: "{{ reason }}"
"#,
        )
        .unwrap();
        let sink = StdoutSink::new(config);
        sink.send(&sample()).await.unwrap();
    }
}
