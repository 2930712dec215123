//! Routing policy: predicate matchers and the route tree
//!
//! Routes form a strict tree loaded from configuration; each node carries
//! optional `match`/`drop` matchers and zero or more receiver bindings.
//! The tree is immutable after compilation and traversal is a pure read.

pub mod matcher;
pub mod route;

pub use matcher::{Matcher, MatcherConfig, PatternValue};
pub use route::{Route, RouteConfig};
