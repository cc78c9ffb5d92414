//! Access to cluster objects
//!
//! The reconcile pipeline only talks to the cluster through [`ResourceStore`]
//! and writes the stack status through [`StatusWriter`]. [`KubeStore`] backs
//! both with the API server; [`crate::mock::MockStore`] keeps everything in
//! memory for tests.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    core::{GroupVersionKind, TypeMeta},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

use lokistack_core::{LokiStack, LokiStackStatus};

use crate::error::{KubeError, Result};

/// Field manager recorded on every write
pub const FIELD_MANAGER: &str = "lokistack-operator";

/// Identity of a stored object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub api_version: String,
    pub kind: String,
    /// `None` for cluster-scoped objects
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }

    /// Key of a dynamic object, as currently addressed by its metadata
    pub fn of(obj: &DynamicObject) -> Result<Self> {
        let types = obj
            .types
            .as_ref()
            .ok_or_else(|| KubeError::InvalidManifest("object missing apiVersion or kind".to_string()))?;
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| KubeError::InvalidManifest(format!("{} missing metadata.name", types.kind)))?;
        Ok(Self {
            api_version: types.api_version.clone(),
            kind: types.kind.clone(),
            namespace: obj.metadata.namespace.clone(),
            name,
        })
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", ns, self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Cluster object access used by the reconcile pipeline
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch an object, `None` when it does not exist
    async fn get(&self, key: &ResourceKey) -> Result<Option<DynamicObject>>;

    /// List objects of one type, in one namespace or cluster-wide
    async fn list(&self, api_version: &str, kind: &str, namespace: Option<&str>) -> Result<Vec<DynamicObject>>;

    /// Create an object, returning the stored copy
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Replace an object previously fetched with [`ResourceStore::get`]
    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Apply a JSON merge patch
    async fn patch(&self, key: &ResourceKey, patch: &Value) -> Result<DynamicObject>;

    /// Delete an object, `false` when it was already gone
    async fn delete(&self, key: &ResourceKey) -> Result<bool>;

    async fn get_stack(&self, namespace: &str, name: &str) -> Result<Option<LokiStack>> {
        get_typed(self, &ResourceKey::new("loki.grafana.com/v1", "LokiStack", Some(namespace), name)).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        get_typed(self, &ResourceKey::new("v1", "Secret", Some(namespace), name)).await
    }
}

/// Writer for the stack status subresource
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Replace the status of a stack
    async fn update_status(&self, namespace: &str, name: &str, status: &LokiStackStatus) -> Result<()>;
}

/// Fetch an object and convert it to a typed resource
pub async fn get_typed<K, S>(store: &S, key: &ResourceKey) -> Result<Option<K>>
where
    K: DeserializeOwned,
    S: ResourceStore + ?Sized,
{
    match store.get(key).await? {
        Some(obj) => Ok(Some(serde_json::from_value(serde_json::to_value(obj)?)?)),
        None => Ok(None),
    }
}

/// [`ResourceStore`] backed by the API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    discovery: std::sync::Arc<Discovery>,
}

impl KubeStore {
    /// Create a store, running API discovery once
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(|e| KubeError::Discovery(e.to_string()))?;

        Ok(Self {
            client,
            discovery: std::sync::Arc::new(discovery),
        })
    }

    fn resolve(&self, api_version: &str, kind: &str) -> Result<(ApiResource, ApiCapabilities)> {
        let gvk = gvk_from_type_meta(&TypeMeta {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        });
        self.discovery
            .resolve_gvk(&gvk)
            .ok_or_else(|| KubeError::UnknownResource {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            })
    }

    fn api_for(&self, api_version: &str, kind: &str, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
        let (resource, capabilities) = self.resolve(api_version, kind)?;
        Ok(match (capabilities.scope, namespace) {
            (Scope::Namespaced, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &resource),
            (Scope::Namespaced, None) => Api::default_namespaced_with(self.client.clone(), &resource),
            (Scope::Cluster, _) => Api::all_with(self.client.clone(), &resource),
        })
    }

    fn api_for_object(&self, obj: &DynamicObject) -> Result<(Api<DynamicObject>, ResourceKey)> {
        let key = ResourceKey::of(obj)?;
        let api = self.api_for(&key.api_version, &key.kind, key.namespace.as_deref())?;
        Ok((api, key))
    }
}

fn write_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<DynamicObject>> {
        let api = self.api_for(&key.api_version, &key.kind, key.namespace.as_deref())?;
        Ok(api.get_opt(&key.name).await?)
    }

    async fn list(&self, api_version: &str, kind: &str, namespace: Option<&str>) -> Result<Vec<DynamicObject>> {
        let api = self.api_for(api_version, kind, namespace)?;
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let (api, _) = self.api_for_object(obj)?;
        Ok(api.create(&write_params(), obj).await?)
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let (api, key) = self.api_for_object(obj)?;
        api.replace(&key.name, &write_params(), obj)
            .await
            .map_err(|e| match e {
                kube::Error::Api(resp) if resp.code == 409 => KubeError::Conflict {
                    kind: key.kind.clone(),
                    name: key.name.clone(),
                    message: resp.message,
                },
                other => KubeError::Api(other),
            })
    }

    async fn patch(&self, key: &ResourceKey, patch: &Value) -> Result<DynamicObject> {
        let api = self.api_for(&key.api_version, &key.kind, key.namespace.as_deref())?;
        Ok(api.patch(&key.name, &patch_params(), &Patch::Merge(patch)).await?)
    }

    async fn delete(&self, key: &ResourceKey) -> Result<bool> {
        let api = self.api_for(&key.api_version, &key.kind, key.namespace.as_deref())?;
        match api.delete(&key.name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StatusWriter for KubeStore {
    async fn update_status(&self, namespace: &str, name: &str, status: &LokiStackStatus) -> Result<()> {
        let stacks: Api<LokiStack> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "status": status
        });

        stacks
            .patch_status(name, &patch_params(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Convert TypeMeta to GroupVersionKind
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
pub fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}
