//! Configuration for VIRTA
//!
//! Loaded from a YAML file whose text is environment-expanded (`$VAR` /
//! `${VAR}`) before parsing. Validation runs once at startup and every
//! failure there is fatal.

use crate::error::{Result, VirtaError};
use crate::routing::route::{Route, RouteConfig};
use crate::sinks::ReceiverConfig;
use serde::Deserialize;
use std::collections::BTreeSet;

fn default_max_event_age_seconds() -> i64 {
    5
}

fn default_cache_size() -> usize {
    1024
}

fn default_throttle_period() -> usize {
    1000
}

fn default_kube_qps() -> f32 {
    20.0
}

fn default_kube_burst() -> i32 {
    30
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, rename = "leaderElectionID")]
    pub leader_election_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// debug | info | warn | error; empty means info
    #[serde(default)]
    pub log_level: String,

    /// json | pretty; empty means pretty
    #[serde(default)]
    pub log_format: String,

    /// Attached to every event when set
    #[serde(default)]
    pub cluster_name: Option<String>,

    /// Watch scope; empty watches all namespaces
    #[serde(default)]
    pub namespace: String,

    #[serde(default = "default_max_event_age_seconds")]
    pub max_event_age_seconds: i64,

    /// Accepted for config compatibility; see the client module.
    #[serde(default = "default_kube_qps", rename = "kubeQPS")]
    pub kube_qps: f32,

    #[serde(default = "default_kube_burst")]
    pub kube_burst: i32,

    /// Skip involved-object metadata enrichment
    #[serde(default)]
    pub omit_lookup: bool,

    /// Metadata cache capacity
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    #[serde(default)]
    pub metrics_name_prefix: String,

    #[serde(default)]
    pub leader_election: LeaderElectionConfig,

    /// Per-receiver channel buffer depth
    #[serde(default = "default_throttle_period")]
    pub throttle_period: usize,

    #[serde(default)]
    pub route: RouteConfig,

    #[serde(default)]
    pub receivers: Vec<ReceiverConfig>,
}

impl Config {
    /// Parse config from YAML text, expanding environment variables first.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let expanded = expand_env(text);
        serde_yaml::from_str(&expanded).map_err(|e| decorate_yaml_error(e, &expanded))
    }

    pub fn validate(&self) -> Result<()> {
        match self.log_level.as_str() {
            "" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(VirtaError::Config(format!(
                    "unknown log level '{other}', expected debug|info|warn|error"
                )))
            }
        }
        match self.log_format.as_str() {
            "" | "json" | "pretty" => {}
            other => {
                return Err(VirtaError::Config(format!(
                    "unknown log format '{other}', expected json|pretty"
                )))
            }
        }
        if self.max_event_age_seconds < 1 {
            return Err(VirtaError::Config(
                "maxEventAgeSeconds must be at least 1".into(),
            ));
        }
        if self.cache_size < 1 {
            return Err(VirtaError::Config("cacheSize must be at least 1".into()));
        }
        if self.receivers.is_empty() {
            return Err(VirtaError::Config("no receivers defined".into()));
        }

        let mut names = BTreeSet::new();
        for receiver in &self.receivers {
            receiver
                .validate()
                .map_err(|e| VirtaError::Config(e.to_string()))?;
            if !names.insert(receiver.name.as_str()) {
                return Err(VirtaError::Config(format!(
                    "duplicate receiver name '{}'",
                    receiver.name
                )));
            }
        }

        // Compiling also validates every matcher pattern up front.
        let route = Route::compile(&self.route)?;
        for referenced in route.receiver_names() {
            if !names.contains(referenced) {
                return Err(VirtaError::Config(format!(
                    "route references unknown receiver '{referenced}'"
                )));
            }
        }

        Ok(())
    }
}

/// Expand `$VAR` and `${VAR}` references against the process environment.
/// Unset variables expand to the empty string.
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('{') => {
                chars.next();
                let mut name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    name.push(c);
                }
                out.push_str(&std::env::var(&name).unwrap_or_default());
            }
            Some(&next) if next.is_ascii_alphabetic() || next == '_' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&std::env::var(&name).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }
    out
}

fn decorate_yaml_error(err: serde_yaml::Error, source: &str) -> VirtaError {
    let mut message = format!("cannot parse config to YAML: {err}");
    if let Some(location) = err.location() {
        let line_number = location.line();
        message.push_str(&format!(" [line {line_number}]"));
        if let Some(line) = source.lines().nth(line_number.saturating_sub(1)) {
            if line.contains("{{") {
                message.push_str(": need to wrap values with special characters in quotes");
            }
        }
    }
    VirtaError::Config(message)
}
