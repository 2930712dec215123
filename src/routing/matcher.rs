//! Field-path predicate matchers
//!
//! A matcher is a conjunction of predicates over event field paths. Within
//! one matcher every predicate must hold; a route node carries a list of
//! matchers and an event satisfies the node if any matcher in the list does.
//!
//! Predicate forms, selected by the configured pattern value:
//! - a plain string with no regex metacharacters compares by equality
//! - a string containing metacharacters compiles as a regex
//! - a list of strings is a set-membership test

use crate::error::VirtaError;
use crate::event::{parse_path, EnhancedEvent};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Raw matcher configuration: field path → pattern
pub type MatcherConfig = BTreeMap<String, PatternValue>;

/// A configured pattern: a single string or a membership set
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PatternValue {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug)]
enum Predicate {
    Equals(String),
    Regex(Regex),
    In(Vec<String>),
}

impl Predicate {
    fn holds(&self, value: &str) -> bool {
        match self {
            Predicate::Equals(expected) => value == expected,
            Predicate::Regex(re) => re.is_match(value),
            Predicate::In(set) => set.iter().any(|s| s == value),
        }
    }
}

#[derive(Debug)]
struct FieldPredicate {
    path: Vec<String>,
    predicate: Predicate,
}

/// A compiled conjunction of field predicates
#[derive(Debug, Default)]
pub struct Matcher {
    predicates: Vec<FieldPredicate>,
}

impl Matcher {
    /// Compile a raw matcher. Regex patterns are validated here so that a
    /// bad pattern fails at startup, not at dispatch time.
    pub fn compile(config: &MatcherConfig) -> Result<Self, VirtaError> {
        let mut predicates = Vec::with_capacity(config.len());
        for (field, pattern) in config {
            let predicate = match pattern {
                PatternValue::Many(set) => Predicate::In(set.clone()),
                PatternValue::One(s) if regex::escape(s) == *s => Predicate::Equals(s.clone()),
                PatternValue::One(s) => Predicate::Regex(Regex::new(s).map_err(|e| {
                    VirtaError::Routing(format!("invalid pattern for field '{field}': {e}"))
                })?),
            };
            predicates.push(FieldPredicate {
                path: parse_path(field),
                predicate,
            });
        }
        Ok(Self { predicates })
    }

    /// Evaluate the conjunction. A missing field path yields the empty
    /// string rather than an error.
    pub fn matches(&self, event: &EnhancedEvent) -> bool {
        self.predicates.iter().all(|fp| {
            let value = event.field(&fp.path);
            fp.predicate.holds(value.as_deref().unwrap_or(""))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}
