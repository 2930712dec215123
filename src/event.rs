//! Enhanced Event model
//!
//! The [`EnhancedEvent`] is the envelope that flows through the pipeline: the
//! raw Kubernetes Event (with its bulky `managedFields` stripped) plus the
//! resolved metadata of the object it references and an optional cluster tag.
//! It is immutable after the watcher hands it off and is shared as
//! `Arc<EnhancedEvent>` across the receiver fan-out.

use k8s_openapi::api::core::v1::{Event, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// The raw object reference plus the metadata resolved for it
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnhancedObjectReference {
    #[serde(flatten)]
    pub reference: ObjectReference,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(rename = "ownerReferences", skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    /// True when the referenced object no longer exists (or carries a
    /// deletion timestamp) at enrichment time.
    pub deleted: bool,
}

/// A Kubernetes Event enriched with involved-object metadata
#[derive(Debug, Clone)]
pub struct EnhancedEvent {
    pub event: Event,
    pub involved_object: EnhancedObjectReference,
    pub cluster_name: Option<String>,
}

impl EnhancedEvent {
    /// Wrap a raw Event. Strips `managedFields` and seeds the involved
    /// object with the raw reference; enrichment fills in the rest.
    pub fn new(mut event: Event) -> Self {
        event.metadata.managed_fields = None;
        let reference = event.involved_object.clone();
        Self {
            event,
            involved_object: EnhancedObjectReference {
                reference,
                ..Default::default()
            },
            cluster_name: None,
        }
    }

    pub fn namespace(&self) -> &str {
        self.event.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.event.metadata.name.as_deref().unwrap_or_default()
    }

    /// JSON rendering with the enriched involved object in place of the raw
    /// reference. `serde_json` maps are key-sorted, so the output is
    /// byte-for-byte deterministic for a given event.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(&self.event)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "involvedObject".to_string(),
                serde_json::to_value(&self.involved_object)?,
            );
            if let Some(cluster) = &self.cluster_name {
                obj.insert(
                    "clusterName".to_string(),
                    serde_json::Value::String(cluster.clone()),
                );
            }
        }
        Ok(value)
    }

    /// Resolve a parsed field path against this event.
    ///
    /// Missing paths resolve to `None`; callers treat that as the empty
    /// string. Map lookups into labels/annotations address the involved
    /// object's maps.
    pub fn field(&self, path: &[String]) -> Option<Cow<'_, str>> {
        let mut segs = path.iter().map(String::as_str);
        let head = segs.next()?;
        match head {
            "type" => self.event.type_.as_deref().map(Cow::Borrowed),
            "reason" => self.event.reason.as_deref().map(Cow::Borrowed),
            "message" => self.event.message.as_deref().map(Cow::Borrowed),
            "namespace" => self.event.metadata.namespace.as_deref().map(Cow::Borrowed),
            "name" => self.event.metadata.name.as_deref().map(Cow::Borrowed),
            "uid" => self.event.metadata.uid.as_deref().map(Cow::Borrowed),
            "count" => self.event.count.map(|c| Cow::Owned(c.to_string())),
            "clusterName" => self.cluster_name.as_deref().map(Cow::Borrowed),
            "reportingComponent" => self
                .event
                .reporting_component
                .as_deref()
                .map(Cow::Borrowed),
            "reportingInstance" => self.event.reporting_instance.as_deref().map(Cow::Borrowed),
            "source" => {
                let source = self.event.source.as_ref()?;
                match segs.next()? {
                    "component" => source.component.as_deref().map(Cow::Borrowed),
                    "host" => source.host.as_deref().map(Cow::Borrowed),
                    _ => None,
                }
            }
            "involvedObject" => self.involved_object_field(segs),
            // Shorthand for the involved object's maps
            "labels" => self
                .involved_object
                .labels
                .get(segs.next()?)
                .map(|v| Cow::Borrowed(v.as_str())),
            "annotations" => self
                .involved_object
                .annotations
                .get(segs.next()?)
                .map(|v| Cow::Borrowed(v.as_str())),
            _ => None,
        }
    }

    fn involved_object_field<'a, I>(&self, mut segs: I) -> Option<Cow<'_, str>>
    where
        I: Iterator<Item = &'a str>,
    {
        let io = &self.involved_object;
        match segs.next()? {
            "kind" => io.reference.kind.as_deref().map(Cow::Borrowed),
            "name" => io.reference.name.as_deref().map(Cow::Borrowed),
            "namespace" => io.reference.namespace.as_deref().map(Cow::Borrowed),
            "uid" => io.reference.uid.as_deref().map(Cow::Borrowed),
            "apiVersion" => io.reference.api_version.as_deref().map(Cow::Borrowed),
            "resourceVersion" => io.reference.resource_version.as_deref().map(Cow::Borrowed),
            "fieldPath" => io.reference.field_path.as_deref().map(Cow::Borrowed),
            "deleted" => Some(Cow::Owned(io.deleted.to_string())),
            "labels" => io.labels.get(segs.next()?).map(|v| Cow::Borrowed(v.as_str())),
            "annotations" => io
                .annotations
                .get(segs.next()?)
                .map(|v| Cow::Borrowed(v.as_str())),
            _ => None,
        }
    }
}

impl Serialize for EnhancedEvent {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

/// Parse a dotted field path into segments.
///
/// Bracket-quoted segments address map keys that themselves contain dots:
/// `labels["k8s.io/foo"]` yields `["labels", "k8s.io/foo"]`. Both quote
/// styles are accepted.
pub fn parse_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let quote = match chars.peek() {
                    Some(&q @ ('"' | '\'')) => {
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                let mut key = String::new();
                for c in chars.by_ref() {
                    match quote {
                        Some(q) if c == q => break,
                        None if c == ']' => break,
                        _ => key.push(c),
                    }
                }
                if quote.is_some() {
                    // Consume the closing bracket after a quoted key.
                    if let Some(&']') = chars.peek() {
                        chars.next();
                    }
                }
                segments.push(key);
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}
