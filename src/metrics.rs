//! Prometheus metrics for VIRTA
//!
//! Counters live in a per-store registry so tests can construct stores
//! freely; the metrics server gathers from the store it is handed.

use crate::error::VirtaError;
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

/// Counter surface the pipeline increments
pub struct Store {
    registry: Registry,

    /// Events that passed the age filter and entered the pipeline
    pub events_processed: IntCounter,

    /// Events dropped by the age filter after startup
    pub events_discarded: IntCounter,

    /// Errors received from the Event watch stream
    pub watch_errors: IntCounter,

    /// Sink send failures
    pub send_errors: IntCounter,

    /// GET requests issued for involved-object metadata
    pub kube_api_read_requests: IntCounter,

    /// Metadata lookups answered from the cache
    pub kube_api_read_cache_hits: IntCounter,
}

fn register_counter(
    registry: &Registry,
    prefix: &str,
    name: &str,
    help: &str,
) -> Result<IntCounter, VirtaError> {
    let counter = IntCounter::with_opts(Opts::new(format!("{prefix}{name}"), help))
        .map_err(|e| VirtaError::Metrics(format!("{name}: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| VirtaError::Metrics(format!("{name}: {e}")))?;
    Ok(counter)
}

impl Store {
    /// Create a store with all counters registered under the given name
    /// prefix.
    pub fn new(prefix: &str) -> Result<Self, VirtaError> {
        let registry = Registry::new();

        let events_processed = register_counter(
            &registry,
            prefix,
            "events_sent",
            "The total number of events processed",
        )?;
        let events_discarded = register_counter(
            &registry,
            prefix,
            "events_discarded",
            "The total number of events discarded for being older than the max event age",
        )?;
        let watch_errors = register_counter(
            &registry,
            prefix,
            "watch_errors",
            "The total number of errors received from the watch stream",
        )?;
        let send_errors = register_counter(
            &registry,
            prefix,
            "send_event_errors",
            "The total number of send event errors",
        )?;
        let kube_api_read_requests = register_counter(
            &registry,
            prefix,
            "kube_api_read_requests",
            "The total number of object metadata reads issued to the Kubernetes API",
        )?;
        let kube_api_read_cache_hits = register_counter(
            &registry,
            prefix,
            "kube_api_read_cache_hits",
            "The total number of object metadata reads answered from the cache",
        )?;

        Ok(Self {
            registry,
            events_processed,
            events_discarded,
            watch_errors,
            send_errors,
            kube_api_read_requests,
            kube_api_read_cache_hits,
        })
    }

    /// Encode all registered metrics in Prometheus text format.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_ok() {
            String::from_utf8(buffer).unwrap_or_default()
        } else {
            String::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let store = Store::new("test_").unwrap();
        assert_eq!(store.events_processed.get(), 0);
        assert_eq!(store.events_discarded.get(), 0);
    }

    #[test]
    fn test_gather_carries_prefix() {
        let store = Store::new("virta_").unwrap();
        store.events_processed.inc();
        store.send_errors.inc();

        let text = store.gather();
        assert!(text.contains("virta_events_sent 1"));
        assert!(text.contains("virta_send_event_errors 1"));
        assert!(text.contains("virta_watch_errors 0"));
    }

    #[test]
    fn test_stores_are_independent() {
        let a = Store::new("a_").unwrap();
        let b = Store::new("b_").unwrap();
        a.events_processed.inc();
        assert_eq!(a.events_processed.get(), 1);
        assert_eq!(b.events_processed.get(), 0);
    }
}
