//! File sink
//!
//! Appends one JSON line per event to a local path. The file is opened at
//! bootstrap so an unwritable path fails before the watcher starts.

use crate::error::SinkError;
use crate::event::EnhancedEvent;
use crate::sinks::{layout, Sink};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub path: PathBuf,

    #[serde(default)]
    pub layout: Option<Value>,
}

pub struct FileSink {
    config: FileConfig,
    file: Mutex<File>,
}

impl FileSink {
    pub async fn new(config: FileConfig) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .await
            .map_err(|e| {
                SinkError::Init(format!("cannot open {}: {e}", config.path.display()))
            })?;
        Ok(Self {
            config,
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError> {
        let payload = layout::event_payload(event, self.config.layout.as_ref())?;
        let mut line = serde_json::to_vec(&payload)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| SinkError::Send(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) {
        let mut file = self.file.lock().await;
        if let Err(e) = file.flush().await {
            tracing::error!(path = %self.config.path.display(), error = %e, "flush on close failed");
        }
        info!(path = %self.config.path.display(), "file sink closed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Event;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn sample(reason: &str) -> EnhancedEvent {
        EnhancedEvent::new(Event {
            metadata: ObjectMeta {
                name: Some("ev".into()),
                namespace: Some("default".into()),
                ..Default::default()
            },
            reason: Some(reason.into()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");

        let sink = FileSink::new(FileConfig {
            path: path.clone(),
            layout: None,
        })
        .await
        .unwrap();

        sink.send(&sample("Created")).await.unwrap();
        sink.send(&sample("Started")).await.unwrap();
        sink.close().await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["reason"], "Created");
    }

    #[tokio::test]
    async fn test_unwritable_path_fails_at_bootstrap() {
        let result = FileSink::new(FileConfig {
            path: PathBuf::from("/nonexistent-dir/events.json"),
            layout: None,
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_layout_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");

        let config: FileConfig = serde_yaml::from_str(&format!(
            "path: {}\nlayout:\n  r: \"{{{{ reason }}}}\"",
            path.display()
        ))
        .unwrap();
        let sink = FileSink::new(config).await.unwrap();
        sink.send(&sample("Created")).await.unwrap();
        sink.close().await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(parsed, serde_json::json!({"r": "Created"}));
    }
}
