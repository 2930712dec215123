//! Involved-object metadata cache
//!
//! Resolves the labels, annotations and owner references of the object an
//! Event points at, via discovery and a typeless dynamic GET. Results are
//! kept in an adaptive replacement cache keyed by `UID/ResourceVersion`,
//! so an object update naturally misses the cache and stale entries age
//! out under cache pressure without explicit invalidation. Only successful
//! lookups are cached.

use crate::error::MetadataError;
use crate::k8s::cache::AdaptiveCache;
use crate::metrics::Store;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DynamicObject};
use kube::core::ApiResource;
use kube::discovery::{Discovery, Scope};
use kube::Client;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Metadata extracted from the referenced object
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub owner_references: Vec<OwnerReference>,
    pub deleted: bool,
}

/// Lookup contract the watcher enriches through
///
/// Deterministic in `(uid, resourceVersion)`; concurrent callers for the
/// same key may each issue a fetch, which is tolerated because per-object
/// updates are rare.
#[async_trait]
pub trait ObjectMetadataProvider: Send + Sync {
    async fn object_metadata(
        &self,
        reference: &ObjectReference,
    ) -> Result<ObjectMetadata, MetadataError>;
}

/// Discovery-backed provider with an adaptive replacement cache
pub struct ObjectMetadataCache {
    client: Client,
    cache: Mutex<AdaptiveCache<String, ObjectMetadata>>,
    // GVK key -> (resource, namespaced); discovery results are stable for
    // the life of the process.
    resources: RwLock<HashMap<String, (ApiResource, bool)>>,
    metrics: Arc<Store>,
}

impl ObjectMetadataCache {
    pub fn new(client: Client, cache_size: usize, metrics: Arc<Store>) -> Self {
        Self {
            client,
            cache: Mutex::new(AdaptiveCache::new(cache_size)),
            resources: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    async fn api_resource(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<(ApiResource, bool), MetadataError> {
        let key = if group.is_empty() {
            format!("{version}/{kind}")
        } else {
            format!("{group}/{version}/{kind}")
        };
        if let Some(found) = self.resources.read().get(&key).cloned() {
            return Ok(found);
        }

        let discovery = Discovery::new(self.client.clone()).run().await?;
        for api_group in discovery.groups() {
            for (ar, caps) in api_group.recommended_resources() {
                if ar.group == group && ar.version == version && ar.kind == kind {
                    let namespaced = matches!(caps.scope, Scope::Namespaced);
                    self.resources
                        .write()
                        .insert(key, (ar.clone(), namespaced));
                    return Ok((ar, namespaced));
                }
            }
        }
        Err(MetadataError::UnknownKind(key))
    }
}

#[async_trait]
impl ObjectMetadataProvider for ObjectMetadataCache {
    async fn object_metadata(
        &self,
        reference: &ObjectReference,
    ) -> Result<ObjectMetadata, MetadataError> {
        // ResourceVersion changes on every update, so keying by
        // UID/ResourceVersion means an updated object misses the cache and
        // gets fresh metadata.
        let uid = reference.uid.as_deref().unwrap_or_default();
        let resource_version = reference.resource_version.as_deref().unwrap_or_default();
        let cache_key = format!("{uid}/{resource_version}");

        if let Some(found) = self.cache.lock().get(&cache_key).cloned() {
            self.metrics.kube_api_read_cache_hits.inc();
            return Ok(found);
        }

        let api_version = reference.api_version.as_deref().unwrap_or_default();
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        let kind = reference
            .kind
            .as_deref()
            .ok_or(MetadataError::IncompleteReference("kind"))?;
        let name = reference
            .name
            .as_deref()
            .ok_or(MetadataError::IncompleteReference("name"))?;

        let (ar, namespaced) = self.api_resource(group, version, kind).await?;

        let api: Api<DynamicObject> = if namespaced {
            match reference.namespace.as_deref() {
                Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
                None => Api::all_with(self.client.clone(), &ar),
            }
        } else {
            Api::all_with(self.client.clone(), &ar)
        };

        let result = api.get(name).await;
        self.metrics.kube_api_read_requests.inc();

        let item = result.map_err(|e| match e {
            kube::Error::Api(ref response) if response.code == 404 => {
                MetadataError::NotFound(format!("{kind}/{name}"))
            }
            other => MetadataError::Kube(other),
        })?;

        let metadata = ObjectMetadata {
            labels: item.metadata.labels.clone().unwrap_or_default(),
            annotations: item.metadata.annotations.clone().unwrap_or_default(),
            owner_references: item.metadata.owner_references.clone().unwrap_or_default(),
            deleted: item.metadata.deletion_timestamp.is_some(),
        };

        debug!(kind, name, "fetched object metadata");
        self.cache.lock().put(cache_key, metadata.clone());
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_shape() {
        // Two references agree on the cache key iff uid and resourceVersion
        // both agree.
        let key = |uid: &str, rv: &str| format!("{uid}/{rv}");
        assert_eq!(key("u1", "7"), key("u1", "7"));
        assert_ne!(key("u1", "7"), key("u1", "8"));
        assert_ne!(key("u1", "7"), key("u2", "7"));
    }

    #[test]
    fn test_api_version_split() {
        let split = |api_version: &str| match api_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        assert_eq!(split("v1"), (String::new(), "v1".into()));
        assert_eq!(split("apps/v1"), ("apps".into(), "v1".into()));
    }
}
