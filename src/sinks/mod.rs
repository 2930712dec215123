//! Sink system for VIRTA
//!
//! Sinks deliver enhanced events to external destinations. Each configured
//! receiver owns exactly one sink instance, created at engine bootstrap and
//! closed exactly once at shutdown by its registry worker.

pub mod file;
pub mod layout;
pub mod stdout;
pub mod webhook;

use crate::error::SinkError;
use crate::event::EnhancedEvent;
use async_trait::async_trait;
use serde::Deserialize;

pub use file::{FileConfig, FileSink};
pub use stdout::{StdoutConfig, StdoutSink};
pub use webhook::{WebhookConfig, WebhookSink};

/// Sink trait - delivers events to a destination
///
/// `send` is synchronous from the worker's point of view: the worker awaits
/// each delivery before taking the next event, which gives per-receiver FIFO.
/// Cancellation on engine shutdown happens by dropping the in-flight future;
/// sinks needing ordered teardown do it in `close`.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver one event. Errors are counted and logged by the worker;
    /// there is no retry at this level.
    async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError>;

    /// Release resources. Called exactly once, after the receiver queue
    /// has drained.
    async fn close(&self) {}
}

/// A named receiver entry from configuration
///
/// Exactly one sink-kind key must be populated; `validate` enforces it and
/// `create` selects the variant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiverConfig {
    pub name: String,

    #[serde(default)]
    pub stdout: Option<StdoutConfig>,

    #[serde(default)]
    pub file: Option<FileConfig>,

    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl ReceiverConfig {
    /// Number of sink kinds configured on this receiver.
    pub fn kind_count(&self) -> usize {
        [
            self.stdout.is_some(),
            self.file.is_some(),
            self.webhook.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    pub fn validate(&self) -> Result<(), SinkError> {
        if self.name.is_empty() {
            return Err(SinkError::Init("receiver has no name".into()));
        }
        match self.kind_count() {
            0 => Err(SinkError::Init(format!(
                "receiver '{}' has no sink configured",
                self.name
            ))),
            1 => Ok(()),
            n => Err(SinkError::Init(format!(
                "receiver '{}' has {n} sinks configured, expected exactly one",
                self.name
            ))),
        }
    }

    /// Construct the configured sink. Bootstrap failures (unwritable file,
    /// bad URL) surface here, before the watcher starts.
    pub async fn create(&self) -> Result<Box<dyn Sink>, SinkError> {
        self.validate()?;
        if let Some(cfg) = &self.stdout {
            return Ok(Box::new(StdoutSink::new(cfg.clone())));
        }
        if let Some(cfg) = &self.file {
            return Ok(Box::new(FileSink::new(cfg.clone()).await?));
        }
        if let Some(cfg) = &self.webhook {
            return Ok(Box::new(WebhookSink::new(cfg.clone())?));
        }
        Err(SinkError::Init(format!(
            "receiver '{}' has no sink configured",
            self.name
        )))
    }
}
