//! In-memory resource store for testing
//!
//! Objects get a uid and a resourceVersion on create. Updates bump the
//! resourceVersion and reject stale copies. Writes to chosen objects can be
//! made to fail.

use async_trait::async_trait;
use kube::api::DynamicObject;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use lokistack_core::{LokiStack, LokiStackStatus};

use crate::error::{KubeError, Result};
use crate::store::{ResourceKey, ResourceStore, StatusWriter};

/// In-memory store keyed by [`ResourceKey`]
#[derive(Clone, Default)]
pub struct MockStore {
    objects: Arc<RwLock<BTreeMap<ResourceKey, DynamicObject>>>,
    /// Names whose create or update fails
    failing: Arc<RwLock<BTreeSet<String>>>,
    /// Every status written, oldest first
    statuses: Arc<RwLock<Vec<LokiStackStatus>>>,
    operations: Arc<RwLock<OperationCounts>>,
    next_uid: Arc<RwLock<u64>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub creates: usize,
    pub updates: usize,
    pub patches: usize,
    pub deletes: usize,
    pub status_updates: usize,
}

impl MockStore {
    /// Create a new empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, assigning uid and resourceVersion
    pub fn insert<K: serde::Serialize>(&self, obj: &K) -> Result<DynamicObject> {
        let obj: DynamicObject = serde_json::from_value(serde_json::to_value(obj)?)?;
        self.store_new(obj)
    }

    /// Seed a stack
    pub fn insert_stack(&self, stack: &LokiStack) -> Result<DynamicObject> {
        self.insert(stack)
    }

    /// Make every write to objects with this name fail
    pub fn fail_writes_to(&self, name: &str) {
        self.failing.write().unwrap().insert(name.to_string());
    }

    /// Remove an object, as if deleted out of band
    pub fn remove(&self, key: &ResourceKey) -> Option<DynamicObject> {
        self.objects.write().unwrap().remove(key)
    }

    /// Current copy of an object
    pub fn object(&self, key: &ResourceKey) -> Option<DynamicObject> {
        self.objects.read().unwrap().get(key).cloned()
    }

    /// Every stored object
    pub fn objects(&self) -> Vec<DynamicObject> {
        self.objects.read().unwrap().values().cloned().collect()
    }

    /// Last status written by the pipeline
    pub fn last_status(&self) -> Option<LokiStackStatus> {
        self.statuses.read().unwrap().last().cloned()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self.operations.write().unwrap() = OperationCounts::default();
    }

    fn check_failing(&self, key: &ResourceKey) -> Result<()> {
        if self.failing.read().unwrap().contains(&key.name) {
            return Err(KubeError::InvalidManifest(format!("injected failure writing {}", key)));
        }
        Ok(())
    }

    fn store_new(&self, mut obj: DynamicObject) -> Result<DynamicObject> {
        let key = ResourceKey::of(&obj)?;
        let mut objects = self.objects.write().unwrap();
        if objects.contains_key(&key) {
            return Err(KubeError::Conflict {
                kind: key.kind,
                name: key.name,
                message: "already exists".to_string(),
            });
        }

        let uid = {
            let mut next = self.next_uid.write().unwrap();
            *next += 1;
            *next
        };
        obj.metadata.uid = Some(format!("uid-{}", uid));
        obj.metadata.resource_version = Some("1".to_string());
        objects.insert(key, obj.clone());
        Ok(obj)
    }
}

#[async_trait]
impl ResourceStore for MockStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<DynamicObject>> {
        self.operations.write().unwrap().gets += 1;
        Ok(self.objects.read().unwrap().get(key).cloned())
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        self.operations.write().unwrap().creates += 1;
        self.check_failing(&ResourceKey::of(obj)?)?;
        self.store_new(obj.clone())
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        self.operations.write().unwrap().updates += 1;
        let key = ResourceKey::of(obj)?;
        self.check_failing(&key)?;

        let mut objects = self.objects.write().unwrap();
        let current = objects.get(&key).ok_or_else(|| KubeError::NotFound {
            kind: key.kind.clone(),
            name: key.name.clone(),
        })?;
        if obj.metadata.resource_version != current.metadata.resource_version {
            return Err(KubeError::Conflict {
                kind: key.kind,
                name: key.name,
                message: "object has been modified".to_string(),
            });
        }

        let mut updated = obj.clone();
        updated.metadata.uid = current.metadata.uid.clone();
        updated.metadata.resource_version = Some(bump(current.metadata.resource_version.as_deref()));
        objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn list(&self, api_version: &str, kind: &str, namespace: Option<&str>) -> Result<Vec<DynamicObject>> {
        Ok(self
            .objects
            .read()
            .unwrap()
            .iter()
            .filter(|(key, _)| {
                key.api_version == api_version
                    && key.kind == kind
                    && (namespace.is_none() || key.namespace.as_deref() == namespace)
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn patch(&self, key: &ResourceKey, patch: &Value) -> Result<DynamicObject> {
        self.operations.write().unwrap().patches += 1;
        self.check_failing(key)?;

        let mut objects = self.objects.write().unwrap();
        let current = objects.get_mut(key).ok_or_else(|| KubeError::NotFound {
            kind: key.kind.clone(),
            name: key.name.clone(),
        })?;
        let mut value = serde_json::to_value(&*current)?;
        merge_patch(&mut value, patch);
        let mut patched: DynamicObject = serde_json::from_value(value)?;
        patched.metadata.uid = current.metadata.uid.clone();
        patched.metadata.resource_version = Some(bump(current.metadata.resource_version.as_deref()));
        *current = patched.clone();
        Ok(patched)
    }

    async fn delete(&self, key: &ResourceKey) -> Result<bool> {
        self.operations.write().unwrap().deletes += 1;
        self.check_failing(key)?;
        Ok(self.objects.write().unwrap().remove(key).is_some())
    }
}

#[async_trait]
impl StatusWriter for MockStore {
    async fn update_status(&self, namespace: &str, name: &str, status: &LokiStackStatus) -> Result<()> {
        self.operations.write().unwrap().status_updates += 1;
        let key = ResourceKey::new("loki.grafana.com/v1", "LokiStack", Some(namespace), name);

        let mut objects = self.objects.write().unwrap();
        let stack = objects.get_mut(&key).ok_or_else(|| KubeError::NotFound {
            kind: key.kind.clone(),
            name: key.name.clone(),
        })?;
        stack.data["status"] = serde_json::to_value(status)?;
        self.statuses.write().unwrap().push(status.clone());
        Ok(())
    }
}

fn bump(version: Option<&str>) -> String {
    let version = version.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
    (version + 1).to_string()
}

/// JSON merge patch: objects merge recursively, `null` removes a key,
/// anything else replaces
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("obs".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new("v1", "ConfigMap", Some("obs"), name)
    }

    #[tokio::test]
    async fn test_create_assigns_identity() {
        let store = MockStore::new();
        let created = store.insert(&config_map("a")).unwrap();

        assert_eq!(created.metadata.uid.as_deref(), Some("uid-1"));
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        assert!(store.get(&key("a")).await.unwrap().is_some());
        assert!(store.get(&key("missing")).await.unwrap().is_none());
        assert_eq!(store.operation_counts().gets, 2);
    }

    #[tokio::test]
    async fn test_update_rejects_stale_copy() {
        let store = MockStore::new();
        let created = store.insert(&config_map("a")).unwrap();

        let updated = store.update(&created).await.unwrap();
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));

        let err = store.update(&created).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MockStore::new();
        store.fail_writes_to("broken");
        let obj: DynamicObject =
            serde_json::from_value(serde_json::to_value(config_map("broken")).unwrap()).unwrap();

        assert!(store.create(&obj).await.is_err());
        assert!(store.object(&key("broken")).is_none());
    }

    #[tokio::test]
    async fn test_patch_list_delete() {
        let store = MockStore::new();
        store.insert(&config_map("a")).unwrap();
        store.insert(&config_map("b")).unwrap();

        let patched = store
            .patch(&key("a"), &serde_json::json!({"data": {"k": "v"}, "metadata": {"labels": {"x": "y"}}}))
            .await
            .unwrap();
        assert_eq!(patched.data["data"]["k"], "v");
        assert_eq!(patched.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(patched.metadata.uid.as_deref(), Some("uid-1"));

        let listed = store.list("v1", "ConfigMap", Some("obs")).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(store.list("v1", "Secret", None).await.unwrap().is_empty());

        assert!(store.delete(&key("b")).await.unwrap());
        assert!(!store.delete(&key("b")).await.unwrap());
        assert_eq!(store.operation_counts().deletes, 2);
    }

    #[test]
    fn test_merge_patch_removes_null_keys() {
        let mut target = serde_json::json!({"a": 1, "b": {"c": 2, "d": 3}});
        merge_patch(&mut target, &serde_json::json!({"a": null, "b": {"c": 4}}));
        assert_eq!(target, serde_json::json!({"b": {"c": 4, "d": 3}}));
    }
}
