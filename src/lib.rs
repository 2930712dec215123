//! VIRTA - Kubernetes Event Stream Exporter
//!
//! Watches the cluster Event stream, enriches each Event with metadata about
//! the object it references, and fans the enriched record out to configured
//! sinks through a hierarchical routing policy.
//!
//! # Pipeline
//!
//! ```text
//! Watcher ──► age filter ──► enrichment ──► Route Tree ──► Receivers ──► Sinks
//! ```
//!
//! The watcher, the route tree and the receiver registry are the load-bearing
//! pieces; sinks are pluggable leaf adapters behind the [`sinks::Sink`] trait.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod k8s;
pub mod metrics;
pub mod metrics_server;
pub mod registry;
pub mod routing;
pub mod sinks;

pub use crate::config::Config;
pub use crate::engine::{ClusterNameTagger, Engine, EventHandler};
pub use crate::error::{Result, SinkError, VirtaError};
pub use crate::event::{EnhancedEvent, EnhancedObjectReference};
pub use crate::k8s::metadata::{ObjectMetadata, ObjectMetadataCache, ObjectMetadataProvider};
pub use crate::k8s::watcher::EventWatcher;
pub use crate::metrics::Store;
pub use crate::registry::ReceiverRegistry;
pub use crate::routing::matcher::Matcher;
pub use crate::routing::route::Route;
pub use crate::sinks::Sink;
