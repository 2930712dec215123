//! The route tree
//!
//! Each node carries optional `match` and `drop` matcher lists, receiver
//! bindings, and child routes. Dispatch walks the tree from the root:
//! a matching `drop` prunes the whole subtree, a failing `match` skips the
//! node and its children, and a matching node emits to its receivers before
//! recursing into children in declared order.

use crate::error::VirtaError;
use crate::event::EnhancedEvent;
use crate::routing::matcher::{Matcher, MatcherConfig};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Raw route configuration as it appears in YAML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteConfig {
    #[serde(default, rename = "match")]
    pub match_rules: Vec<MatcherConfig>,

    #[serde(default)]
    pub drop: Vec<MatcherConfig>,

    /// Single receiver shorthand
    #[serde(default)]
    pub receiver: Option<String>,

    #[serde(default)]
    pub receivers: Vec<String>,

    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// A compiled route node
#[derive(Debug, Default)]
pub struct Route {
    match_rules: Vec<Matcher>,
    drop_rules: Vec<Matcher>,
    receivers: Vec<String>,
    routes: Vec<Route>,
}

impl Route {
    /// Compile the configured tree, validating every matcher pattern.
    pub fn compile(config: &RouteConfig) -> Result<Self, VirtaError> {
        let match_rules = config
            .match_rules
            .iter()
            .map(Matcher::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let drop_rules = config
            .drop
            .iter()
            .map(Matcher::compile)
            .collect::<Result<Vec<_>, _>>()?;

        let mut receivers: Vec<String> = Vec::new();
        if let Some(r) = &config.receiver {
            receivers.push(r.clone());
        }
        receivers.extend(config.receivers.iter().cloned());

        let routes = config
            .routes
            .iter()
            .map(Route::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            match_rules,
            drop_rules,
            receivers,
            routes,
        })
    }

    /// Walk the tree and collect the receiver names the event dispatches to,
    /// in visit order. Pure read; the caller performs the enqueue.
    pub fn collect<'a>(&'a self, event: &EnhancedEvent, out: &mut Vec<&'a str>) {
        if self.drop_rules.iter().any(|m| m.matches(event)) {
            return;
        }
        if !self.match_rules.is_empty() && !self.match_rules.iter().any(|m| m.matches(event)) {
            return;
        }
        for receiver in &self.receivers {
            out.push(receiver);
        }
        for child in &self.routes {
            child.collect(event, out);
        }
    }

    /// Every receiver name referenced anywhere in the tree.
    pub fn receiver_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        for receiver in &self.receivers {
            out.insert(receiver.as_str());
        }
        for child in &self.routes {
            child.collect_names(out);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Event, ObjectReference};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

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

    fn compile(yaml: &str) -> Route {
        let config: RouteConfig = serde_yaml::from_str(yaml).unwrap();
        Route::compile(&config).unwrap()
    }

    fn dispatch<'a>(route: &'a Route, ev: &EnhancedEvent) -> Vec<&'a str> {
        let mut out = Vec::new();
        route.collect(ev, &mut out);
        out
    }

    #[test]
    fn test_node_without_matchers_always_dispatches() {
        let route = compile("receiver: all");
        assert_eq!(dispatch(&route, &event("Pulled", "Normal", "default")), ["all"]);
    }

    #[test]
    fn test_fan_out_by_child_match() {
        let route = compile(
            r#"
routes:
  - match:
      - reason: Pulled
    receiver: images
  - match:
      - type: Warning
    receiver: alerts
"#,
        );
        let ev = event("Pulled", "Normal", "default");
        assert_eq!(dispatch(&route, &ev), ["images"]);

        let ev = event("Failed", "Warning", "default");
        assert_eq!(dispatch(&route, &ev), ["alerts"]);

        let ev = event("Pulled", "Warning", "default");
        assert_eq!(dispatch(&route, &ev), ["images", "alerts"]);
    }

    #[test]
    fn test_failed_match_skips_children() {
        let route = compile(
            r#"
match:
  - type: Warning
receiver: warnings
routes:
  - receiver: child
"#,
        );
        let ev = event("Pulled", "Normal", "default");
        assert!(dispatch(&route, &ev).is_empty());
    }

    #[test]
    fn test_drop_prunes_subtree() {
        let route = compile(
            r#"
routes:
  - drop:
      - namespace: kube-system
    receiver: x
    routes:
      - receiver: y
"#,
        );
        let ev = event("Pulled", "Normal", "kube-system");
        assert!(dispatch(&route, &ev).is_empty());

        let ev = event("Pulled", "Normal", "default");
        assert_eq!(dispatch(&route, &ev), ["x", "y"]);
    }

    #[test]
    fn test_grouping_node_without_receivers() {
        let route = compile(
            r#"
routes:
  - match:
      - type: Warning
    routes:
      - match:
          - namespace: prod
        receiver: prod-alerts
      - receiver: all-warnings
"#,
        );
        let ev = event("Failed", "Warning", "prod");
        assert_eq!(dispatch(&route, &ev), ["prod-alerts", "all-warnings"]);

        let ev = event("Failed", "Warning", "dev");
        assert_eq!(dispatch(&route, &ev), ["all-warnings"]);
    }

    #[test]
    fn test_match_list_is_disjunctive() {
        let route = compile(
            r#"
match:
  - reason: Pulled
  - reason: Created
receiver: lifecycle
"#,
        );
        assert_eq!(
            dispatch(&route, &event("Created", "Normal", "default")),
            ["lifecycle"]
        );
        assert!(dispatch(&route, &event("Killing", "Normal", "default")).is_empty());
    }

    #[test]
    fn test_receiver_names_collects_whole_tree() {
        let route = compile(
            r#"
receiver: root
routes:
  - receivers: [a, b]
    routes:
      - receiver: c
"#,
        );
        let names = route.receiver_names();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["a", "b", "c", "root"]
        );
    }
}
