//! Event watcher
//!
//! Streams the cluster's Event resource, filters by age, enriches each
//! Event with involved-object metadata, and hands the result to a single
//! handler. Events are emitted on first observation only; re-deliveries of
//! an updated Event object (count bumps) are skipped via a small LRU of
//! seen event UIDs.

use crate::engine::EventHandler;
use crate::event::EnhancedEvent;
use crate::k8s::metadata::ObjectMetadataProvider;
use crate::metrics::Store;
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use kube::api::Api;
use kube::runtime::watcher;
use kube::Client;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// Capacity of the seen-UID window used to suppress watch re-deliveries of
// updated Event objects.
const SEEN_EVENTS: usize = 4096;

enum WatcherState {
    Idle,
    Running {
        stop: oneshot::Sender<()>,
        task: JoinHandle<()>,
    },
    Stopped,
}

pub struct EventWatcher {
    client: Option<Client>,
    namespace: String,
    max_event_age: Duration,
    startup_time: DateTime<Utc>,
    metadata: Arc<dyn ObjectMetadataProvider>,
    omit_lookup: bool,
    handler: Arc<dyn EventHandler>,
    metrics: Arc<Store>,
    state: Mutex<WatcherState>,
    seen: Mutex<LruCache<String, ()>>,
}

impl EventWatcher {
    /// `startup_time` is the process-wide start timestamp, injected so the
    /// pre-startup silent-drop window is testable.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Client,
        namespace: String,
        max_event_age_seconds: i64,
        startup_time: DateTime<Utc>,
        metadata: Arc<dyn ObjectMetadataProvider>,
        omit_lookup: bool,
        handler: Arc<dyn EventHandler>,
        metrics: Arc<Store>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client: Some(client),
            namespace,
            max_event_age: Duration::seconds(max_event_age_seconds),
            startup_time,
            metadata,
            omit_lookup,
            handler,
            metrics,
            state: Mutex::new(WatcherState::Idle),
            seen: Mutex::new(LruCache::new(
                NonZeroUsize::new(SEEN_EVENTS).unwrap_or(NonZeroUsize::MIN),
            )),
        })
    }

    /// Begin streaming. A second call while running is a no-op.
    pub fn start(self: Arc<Self>) {
        let mut state = self.state.lock();
        match &*state {
            WatcherState::Idle => {}
            WatcherState::Running { .. } => {
                warn!("event watcher already running");
                return;
            }
            WatcherState::Stopped => {
                warn!("event watcher already stopped");
                return;
            }
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let watcher = Arc::clone(&self);
        let task = tokio::spawn(async move {
            watcher.run(stop_rx).await;
        });
        *state = WatcherState::Running {
            stop: stop_tx,
            task,
        };
    }

    /// Terminate the stream and wait for the watch task to exit. Idempotent
    /// from the caller's perspective; the stop signal fires exactly once.
    pub async fn stop(&self) {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, WatcherState::Stopped)
        };
        match previous {
            WatcherState::Running { stop, task } => {
                let _ = stop.send(());
                if let Err(e) = task.await {
                    error!(error = %e, "event watcher task failed");
                }
            }
            _ => debug!("event watcher stop: nothing running"),
        }
    }

    async fn run(self: Arc<Self>, mut stop_rx: oneshot::Receiver<()>) {
        let Some(client) = self.client.clone() else {
            error!("event watcher has no client");
            return;
        };
        let api: Api<Event> = if self.namespace.is_empty() {
            Api::all(client)
        } else {
            Api::namespaced(client, &self.namespace)
        };

        let stream = watcher::watcher(api, watcher::Config::default());
        tokio::pin!(stream);

        info!(namespace = %self.namespace, "event watcher started");

        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    info!("event watcher stopping");
                    break;
                }
                item = stream.next() => match item {
                    Some(Ok(watcher::Event::Apply(event) | watcher::Event::InitApply(event))) => {
                        self.on_event(&event).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.metrics.watch_errors.inc();
                        warn!(error = %e, "watch stream error");
                    }
                    None => {
                        warn!("watch stream ended");
                        break;
                    }
                }
            }
        }
    }

    fn is_event_discarded(&self, event: &Event) -> bool {
        let timestamp = event
            .last_timestamp
            .as_ref()
            .map(|t| t.0)
            .or_else(|| event.event_time.as_ref().map(|t| t.0));
        let Some(timestamp) = timestamp else {
            // No usable timestamp; treat as initial-sync noise.
            return true;
        };

        let age = Utc::now() - timestamp;
        if age > self.max_event_age {
            // Warn only for events created after the watcher started, to
            // suppress noise from the initial synchronization.
            if timestamp > self.startup_time {
                warn!(
                    age_seconds = age.num_seconds(),
                    namespace = %event.metadata.namespace.as_deref().unwrap_or_default(),
                    event = %event.metadata.name.as_deref().unwrap_or_default(),
                    "event discarded as older than the max event age"
                );
                self.metrics.events_discarded.inc();
            }
            return true;
        }
        false
    }

    async fn on_event(&self, event: &Event) {
        // A watch re-delivers the Event object on every update (count
        // bumps); only the first observation is emitted.
        if let Some(uid) = event.metadata.uid.as_deref() {
            if self.seen.lock().put(uid.to_string(), ()).is_some() {
                return;
            }
        }

        if self.is_event_discarded(event) {
            return;
        }

        debug!(
            namespace = %event.metadata.namespace.as_deref().unwrap_or_default(),
            reason = %event.reason.as_deref().unwrap_or_default(),
            involved_object = %event.involved_object.name.as_deref().unwrap_or_default(),
            msg = %event.message.as_deref().unwrap_or_default(),
            "received event"
        );

        self.metrics.events_processed.inc();

        let mut enhanced = EnhancedEvent::new(event.clone());

        if !self.omit_lookup {
            match self.metadata.object_metadata(&event.involved_object).await {
                Ok(metadata) => {
                    enhanced.involved_object.labels = metadata.labels;
                    enhanced.involved_object.annotations = metadata.annotations;
                    enhanced.involved_object.owner_references = metadata.owner_references;
                    enhanced.involved_object.deleted = metadata.deleted;
                }
                Err(e) if e.is_not_found() => {
                    enhanced.involved_object.deleted = true;
                    error!(error = %e, "object not found, likely deleted");
                }
                Err(e) => {
                    error!(error = %e, "failed to get object metadata");
                }
            }
        }

        self.handler.handle(enhanced).await;
    }
}
