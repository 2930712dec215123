//! Channel-based receiver registry
//!
//! Maps receiver names to sink instances. Each receiver owns one bounded
//! channel and one long-lived worker draining it, which gives per-receiver
//! FIFO and isolates a slow or failing sink from its siblings. Producers
//! block on a full buffer, transmitting backpressure to the watcher task.

use crate::event::EnhancedEvent;
use crate::metrics::Store;
use crate::sinks::Sink;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct ReceiverRegistry {
    metrics: Arc<Store>,
    buffer_depth: usize,
    senders: parking_lot::Mutex<HashMap<String, mpsc::Sender<Arc<EnhancedEvent>>>>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl ReceiverRegistry {
    pub fn new(metrics: Arc<Store>, buffer_depth: usize) -> Self {
        Self {
            metrics,
            buffer_depth: buffer_depth.max(1),
            senders: parking_lot::Mutex::new(HashMap::new()),
            workers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Register a sink under a receiver name and start its worker.
    ///
    /// The worker drains the receiver queue, delivering one event at a time,
    /// and closes the sink exactly once after the queue is dropped.
    pub fn register(&self, name: impl Into<String>, sink: Box<dyn Sink>) {
        let name = name.into();
        let (tx, mut rx) = mpsc::channel::<Arc<EnhancedEvent>>(self.buffer_depth);
        let metrics = Arc::clone(&self.metrics);

        info!(receiver = %name, "registered receiver");

        let worker_name = name.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = sink.send(&event).await {
                    metrics.send_errors.inc();
                    error!(
                        receiver = %worker_name,
                        namespace = %event.namespace(),
                        event = %event.name(),
                        error = %e,
                        "failed to send event"
                    );
                }
            }
            sink.close().await;
            debug!(receiver = %worker_name, "receiver worker stopped");
        });

        self.senders.lock().insert(name, tx);
        self.workers.lock().push(handle);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.senders.lock().contains_key(name)
    }

    /// Enqueue an event for a receiver. Blocks when the receiver buffer is
    /// full; per-receiver delivery order follows enqueue order.
    pub async fn send(&self, name: &str, event: Arc<EnhancedEvent>) {
        let sender = self.senders.lock().get(name).cloned();
        match sender {
            Some(tx) => {
                if tx.send(event).await.is_err() {
                    warn!(receiver = %name, "receiver queue closed, event dropped");
                }
            }
            None => warn!(receiver = %name, "unknown receiver, event dropped"),
        }
    }

    /// Close every receiver queue and wait for the workers to drain and
    /// shut their sinks. Safe to call more than once.
    pub async fn close(&self) {
        let senders = std::mem::take(&mut *self.senders.lock());
        let workers = std::mem::take(&mut *self.workers.lock());
        if senders.is_empty() && workers.is_empty() {
            return;
        }

        info!(receivers = senders.len(), "closing receivers");
        drop(senders);

        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "receiver worker panicked");
            }
        }
    }
}
