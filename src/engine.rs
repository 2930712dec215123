//! Dispatch engine
//!
//! Connects the route tree to the receiver registry. The watcher hands each
//! enhanced event to a single [`EventHandler`]; the engine walks the tree
//! and enqueues the event for every receiver the walk selects.

use crate::error::VirtaError;
use crate::event::EnhancedEvent;
use crate::registry::ReceiverRegistry;
use crate::routing::route::{Route, RouteConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Receives enhanced events from the watcher
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: EnhancedEvent);
}

pub struct Engine {
    route: Route,
    registry: ReceiverRegistry,
}

impl Engine {
    /// Compile the route tree and bind it to the registry. Every receiver
    /// name referenced by the tree must already be registered.
    pub fn new(route_config: &RouteConfig, registry: ReceiverRegistry) -> Result<Self, VirtaError> {
        let route = Route::compile(route_config)?;
        for name in route.receiver_names() {
            if !registry.contains(name) {
                return Err(VirtaError::Routing(format!(
                    "route references unknown receiver '{name}'"
                )));
            }
        }
        Ok(Self { route, registry })
    }

    /// Dispatch one event through the route tree.
    pub async fn on_event(&self, event: EnhancedEvent) {
        let event = Arc::new(event);
        let mut targets = Vec::new();
        self.route.collect(&event, &mut targets);

        debug!(
            namespace = %event.namespace(),
            event = %event.name(),
            receivers = targets.len(),
            "dispatching event"
        );

        for name in targets {
            self.registry.send(name, Arc::clone(&event)).await;
        }
    }

    /// Close every receiver and its sink. Tolerates repeated calls.
    pub async fn stop(&self) {
        self.registry.close().await;
    }
}

#[async_trait]
impl EventHandler for Engine {
    async fn handle(&self, event: EnhancedEvent) {
        self.on_event(event).await;
    }
}

/// Wrapping handler that tags every event with the configured cluster name
/// before handing it to the engine.
pub struct ClusterNameTagger {
    cluster_name: String,
    inner: Arc<dyn EventHandler>,
}

impl ClusterNameTagger {
    pub fn new(cluster_name: String, inner: Arc<dyn EventHandler>) -> Self {
        Self {
            cluster_name,
            inner,
        }
    }
}

#[async_trait]
impl EventHandler for ClusterNameTagger {
    async fn handle(&self, mut event: EnhancedEvent) {
        event.cluster_name = Some(self.cluster_name.clone());
        self.inner.handle(event).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::metrics::Store;
    use crate::sinks::Sink;
    use k8s_openapi::api::core::v1::{Event, ObjectReference};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    struct RecordingSink {
        seen: Arc<parking_lot::Mutex<Vec<EnhancedEvent>>>,
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError> {
            self.seen.lock().push(event.clone());
            Ok(())
        }
    }

    fn recording_registry(
        names: &[&str],
    ) -> (
        ReceiverRegistry,
        Vec<Arc<parking_lot::Mutex<Vec<EnhancedEvent>>>>,
    ) {
        let store = Arc::new(Store::new("test_").unwrap());
        let registry = ReceiverRegistry::new(store, 16);
        let mut records = Vec::new();
        for name in names {
            let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
            registry.register(
                *name,
                Box::new(RecordingSink {
                    seen: Arc::clone(&seen),
                }),
            );
            records.push(seen);
        }
        (registry, records)
    }

    fn event(reason: &str, type_: &str, namespace: &str) -> EnhancedEvent {
        EnhancedEvent::new(Event {
            metadata: ObjectMeta {
                name: Some("ev".into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            reason: Some(reason.into()),
            type_: Some(type_.into()),
            involved_object: ObjectReference::default(),
            ..Default::default()
        })
    }

    fn route(yaml: &str) -> RouteConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_fan_out_invokes_only_matching_receiver() {
        let (registry, records) = recording_registry(&["a", "b"]);
        let engine = Engine::new(
            &route(
                r#"
routes:
  - match:
      - reason: Pulled
    receiver: a
  - match:
      - type: Warning
    receiver: b
"#,
            ),
            registry,
        )
        .unwrap();

        engine.on_event(event("Pulled", "Normal", "default")).await;
        engine.stop().await;

        assert_eq!(records[0].lock().len(), 1);
        assert_eq!(records[1].lock().len(), 0);
    }

    #[tokio::test]
    async fn test_drop_prunes_subtree_receivers() {
        let (registry, records) = recording_registry(&["x", "y"]);
        let engine = Engine::new(
            &route(
                r#"
routes:
  - drop:
      - namespace: kube-system
    receivers: [x]
    routes:
      - receiver: y
"#,
            ),
            registry,
        )
        .unwrap();

        engine
            .on_event(event("Pulled", "Normal", "kube-system"))
            .await;
        engine.stop().await;

        assert_eq!(records[0].lock().len(), 0);
        assert_eq!(records[1].lock().len(), 0);
    }

    #[tokio::test]
    async fn test_unknown_receiver_reference_fails_startup() {
        let (registry, _records) = recording_registry(&["a"]);
        let result = Engine::new(&route("receiver: missing"), registry);
        assert!(matches!(result, Err(VirtaError::Routing(_))));
    }

    #[tokio::test]
    async fn test_cluster_name_tagger_sets_name_before_dispatch() {
        let (registry, records) = recording_registry(&["all"]);
        let engine = Arc::new(Engine::new(&route("receiver: all"), registry).unwrap());
        let tagger = ClusterNameTagger::new(
            "prod-eu".into(),
            Arc::clone(&engine) as Arc<dyn EventHandler>,
        );

        tagger.handle(event("Pulled", "Normal", "default")).await;
        engine.stop().await;

        let seen = records[0].lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].cluster_name.as_deref(), Some("prod-eu"));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (registry, _records) = recording_registry(&["all"]);
        let engine = Engine::new(&route("receiver: all"), registry).unwrap();
        engine.stop().await;
        engine.stop().await;
    }
}
