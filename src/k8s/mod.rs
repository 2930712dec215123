//! Kubernetes integration: client bootstrap, the Event watcher, the
//! involved-object metadata cache, and the leader-election contract.

pub mod cache;
pub mod client;
pub mod leader;
pub mod metadata;
pub mod watcher;
