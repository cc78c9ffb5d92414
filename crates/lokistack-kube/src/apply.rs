//! Converging generated objects onto the cluster
//!
//! Each desired object is created when absent. When present, only the
//! fields the operator owns are compared and copied over the live object,
//! so fields written by other controllers (defaults, injected sidecars,
//! token secrets) survive. An object whose owned fields already match is
//! left alone, which makes a second pass over unchanged input write nothing.
//!
//! Failures are collected per object and never stop the loop.

use kube::api::DynamicObject;
use serde_json::Value;
use std::collections::BTreeMap;

use lokistack_engine::manifests::var::{
    SERVICE_ACCOUNT_NAME_ANNOTATION, SERVICE_ACCOUNT_UID_ANNOTATION,
};

use crate::error::{KubeError, Result};
use crate::ownership::{OwnerLinker, set_controller_reference};
use crate::store::{ResourceKey, ResourceStore};

/// What happened to one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    Created,
    Updated,
    Unchanged,
}

/// Result of applying a single object
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub key: ResourceKey,
    pub action: ApplyAction,
}

/// Summary of an apply pass
#[derive(Debug, Clone, Default)]
pub struct ApplySummary {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    /// Failed objects with errors
    pub failed: Vec<(String, String)>,
}

impl ApplySummary {
    /// Check if all operations succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Get total count
    pub fn total(&self) -> usize {
        self.created.len() + self.updated.len() + self.unchanged.len() + self.failed.len()
    }

    /// Number of objects written
    pub fn changed(&self) -> usize {
        self.created.len() + self.updated.len()
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        if !self.created.is_empty() {
            parts.push(format!("{} created", self.created.len()));
        }
        if !self.updated.is_empty() {
            parts.push(format!("{} updated", self.updated.len()));
        }
        if !self.unchanged.is_empty() {
            parts.push(format!("{} unchanged", self.unchanged.len()));
        }
        if !self.failed.is_empty() {
            parts.push(format!("{} failed", self.failed.len()));
        }
        if parts.is_empty() {
            "No resources processed".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Turn collected failures into a single error
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let details = self
            .failed
            .iter()
            .map(|(name, err)| format!("{}: {}", name, err))
            .collect::<Vec<_>>()
            .join("; ");
        Err(KubeError::ApplyFailed {
            failed: self.failed.len(),
            total: self.total(),
            details,
        })
    }

    fn record(&mut self, result: ApplyResult) {
        let name = result.key.to_string();
        match result.action {
            ApplyAction::Created => self.created.push(name),
            ApplyAction::Updated => self.updated.push(name),
            ApplyAction::Unchanged => self.unchanged.push(name),
        }
    }
}

/// Apply every object in order under `owner`
pub async fn apply_all<S, O>(store: &S, owner: &O, objects: Vec<DynamicObject>) -> Result<ApplySummary>
where
    S: ResourceStore + ?Sized,
    O: OwnerLinker + ?Sized,
{
    let mut summary = ApplySummary::default();
    for mut obj in objects {
        let obj_display = display_name(&obj);
        let result = async {
            let kind = obj
                .types
                .as_ref()
                .map(|t| t.kind.clone())
                .ok_or_else(|| KubeError::InvalidManifest(format!("{} missing apiVersion or kind", obj_display)))?;
            if !owner.is_cluster_scoped(&kind) {
                owner.assign_owner(&mut obj);
            }
            stamp_service_account_uid(store, &mut obj).await?;
            apply_one(store, obj).await
        }
        .await;

        match result {
            Ok(result) => {
                tracing::debug!(
                    object_kind = %result.key.kind,
                    object_name = %result.key.name,
                    action = ?result.action,
                    "applied"
                );
                summary.record(result);
            }
            Err(e) => {
                tracing::warn!(object = %obj_display, error = %e, "failed to apply object");
                summary.failed.push((obj_display, e.to_string()));
            }
        }
    }

    Ok(summary)
}

/// Create or update a single object
pub async fn apply_one<S>(store: &S, desired: DynamicObject) -> Result<ApplyResult>
where
    S: ResourceStore + ?Sized,
{
    let key = ResourceKey::of(&desired)?;

    let Some(existing) = store.get(&key).await? else {
        store.create(&desired).await?;
        return Ok(ApplyResult {
            key,
            action: ApplyAction::Created,
        });
    };

    if owned_fields_match(&existing, &desired) {
        return Ok(ApplyResult {
            key,
            action: ApplyAction::Unchanged,
        });
    }

    let merged = merge_owned_fields(existing, &desired);
    store.update(&merged).await?;
    Ok(ApplyResult {
        key,
        action: ApplyAction::Updated,
    })
}

/// Top-level paths under an object's body the operator owns, per kind
fn owned_paths(kind: &str) -> &'static [&'static [&'static str]] {
    match kind {
        "ConfigMap" => &[&["data"], &["binaryData"]],
        "Secret" => &[&["data"], &["type"]],
        "ServiceAccount" => &[&["automountServiceAccountToken"]],
        "Service" => &[
            &["spec", "ports"],
            &["spec", "selector"],
            &["spec", "publishNotReadyAddresses"],
        ],
        "Deployment" => &[
            &["spec", "replicas"],
            &["spec", "template", "spec"],
            &["spec", "strategy"],
            &["spec", "revisionHistoryLimit"],
        ],
        "StatefulSet" => &[
            &["spec", "replicas"],
            &["spec", "template", "spec"],
            &["spec", "updateStrategy"],
            &["spec", "podManagementPolicy"],
            &["spec", "revisionHistoryLimit"],
        ],
        "PodDisruptionBudget" => &[&["spec", "minAvailable"], &["spec", "selector"]],
        _ => &[&["spec"], &["data"]],
    }
}

/// Maps merged key by key, so entries set by other writers survive
fn merged_map_paths(kind: &str) -> &'static [&'static [&'static str]] {
    match kind {
        "Deployment" | "StatefulSet" => &[
            &["spec", "template", "metadata", "labels"],
            &["spec", "template", "metadata", "annotations"],
        ],
        _ => &[],
    }
}

/// Whether every owned field of `desired` is already present in `existing`
pub fn owned_fields_match(existing: &DynamicObject, desired: &DynamicObject) -> bool {
    let kind = desired.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default();

    let metadata_match = map_is_subset(&desired.metadata.labels, &existing.metadata.labels)
        && map_is_subset(&desired.metadata.annotations, &existing.metadata.annotations)
        && desired
            .metadata
            .owner_references
            .iter()
            .flatten()
            .all(|r| existing.metadata.owner_references.iter().flatten().any(|e| e == r));
    if !metadata_match {
        return false;
    }

    owned_paths(kind)
        .iter()
        .chain(merged_map_paths(kind))
        .all(|path| match lookup(&desired.data, path) {
            Some(want) => lookup(&existing.data, path).is_some_and(|have| is_subset(want, have)),
            None => true,
        })
}

/// Copy owned fields of `desired` onto `existing`, keeping everything else
pub fn merge_owned_fields(mut existing: DynamicObject, desired: &DynamicObject) -> DynamicObject {
    let kind = desired.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default();

    merge_map(&mut existing.metadata.labels, &desired.metadata.labels);
    merge_map(&mut existing.metadata.annotations, &desired.metadata.annotations);
    let controller = desired
        .metadata
        .owner_references
        .iter()
        .flatten()
        .find(|r| r.controller == Some(true));
    if let Some(owner) = controller {
        set_controller_reference(&mut existing, owner);
    }

    for path in owned_paths(kind) {
        if let Some(want) = lookup(&desired.data, path) {
            insert(&mut existing.data, path, want.clone());
        }
    }
    for path in merged_map_paths(kind) {
        if let Some(Value::Object(want)) = lookup(&desired.data, path) {
            match lookup_mut(&mut existing.data, path) {
                Some(Value::Object(have)) => have.extend(want.iter().map(|(k, v)| (k.clone(), v.clone()))),
                _ => insert(&mut existing.data, path, Value::Object(want.clone())),
            }
        }
    }
    existing
}

/// Resolve the service account named by the dependent annotation and stamp
/// its uid on the object and its pod template
async fn stamp_service_account_uid<S>(store: &S, obj: &mut DynamicObject) -> Result<()>
where
    S: ResourceStore + ?Sized,
{
    let Some(account) = obj
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(SERVICE_ACCOUNT_NAME_ANNOTATION))
        .cloned()
    else {
        return Ok(());
    };

    let key = ResourceKey::new(
        "v1",
        "ServiceAccount",
        obj.metadata.namespace.as_deref(),
        account.as_str(),
    );
    let Some(uid) = store.get(&key).await?.and_then(|sa| sa.metadata.uid) else {
        tracing::debug!(service_account = %account, "service account not found yet, skipping uid");
        return Ok(());
    };

    obj.metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(SERVICE_ACCOUNT_UID_ANNOTATION.to_string(), uid.clone());
    if let Some(Value::Object(annotations)) = obj
        .data
        .pointer_mut("/spec/template/metadata/annotations")
    {
        annotations.insert(SERVICE_ACCOUNT_UID_ANNOTATION.to_string(), Value::String(uid));
    }
    Ok(())
}

fn display_name(obj: &DynamicObject) -> String {
    let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("Unknown");
    let name = obj.metadata.name.as_deref().unwrap_or("unnamed");
    format!("{}/{}", kind, name)
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

fn lookup_mut<'a>(value: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    path.iter().try_fold(value, |v, key| v.get_mut(*key))
}

fn insert(value: &mut Value, path: &[&str], new: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = value;
    for key in parents {
        if !current.get(*key).is_some_and(Value::is_object) {
            current[*key] = Value::Object(Default::default());
        }
        current = &mut current[*key];
    }
    current[*last] = new;
}

/// Structural subset: every key in `want` exists in `have` with a subset value,
/// arrays must match length and element-wise
pub fn is_subset(want: &Value, have: &Value) -> bool {
    match (want, have) {
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(k, v)| match have.get(k) {
            Some(h) => is_subset(v, h),
            None => v.is_null(),
        }),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(w, h)| is_subset(w, h))
        }
        _ => want == have,
    }
}

fn map_is_subset(want: &Option<BTreeMap<String, String>>, have: &Option<BTreeMap<String, String>>) -> bool {
    want.iter()
        .flatten()
        .all(|(k, v)| have.as_ref().and_then(|h| h.get(k)) == Some(v))
}

fn merge_map(target: &mut Option<BTreeMap<String, String>>, source: &Option<BTreeMap<String, String>>) {
    if let Some(source) = source {
        target
            .get_or_insert_with(BTreeMap::new)
            .extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStore;
    use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
    use k8s_openapi::api::rbac::v1::ClusterRole;
    use kube::api::ObjectMeta;
    use crate::ownership::StackOwner;
    use lokistack_core::{LokiStack, LokiStackSpec};
    use serde_json::json;

    fn stack(store: &MockStore) -> StackOwner {
        let mut stack = LokiStack::new("dev", LokiStackSpec::default());
        stack.metadata.namespace = Some("obs".to_string());
        let stored = store.insert_stack(&stack).unwrap();
        stack.metadata.uid = stored.metadata.uid;
        StackOwner::new(&stack).unwrap()
    }

    fn dynamic<K: serde::Serialize>(obj: &K) -> DynamicObject {
        serde_json::from_value(serde_json::to_value(obj).unwrap()).unwrap()
    }

    fn config_map(name: &str, value: &str) -> DynamicObject {
        dynamic(&ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), "loki".to_string())])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("config.yaml".to_string(), value.to_string())])),
            ..Default::default()
        })
    }

    fn cm_key(name: &str) -> ResourceKey {
        ResourceKey::new("v1", "ConfigMap", Some("obs"), name)
    }

    #[test]
    fn test_is_subset() {
        let have = json!({"a": 1, "b": {"c": [1, 2], "d": "x"}});
        assert!(is_subset(&json!({"b": {"c": [1, 2]}}), &have));
        assert!(!is_subset(&json!({"b": {"c": [1]}}), &have));
        assert!(!is_subset(&json!({"a": 2}), &have));
        assert!(is_subset(&json!({"z": null}), &have));
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let store = MockStore::new();
        let stack = stack(&store);
        let objects = vec![config_map("dev-config", "a: 1"), config_map("dev-extra", "b: 2")];

        let first = apply_all(&store, &stack, objects.clone()).await.unwrap();
        assert_eq!(first.created.len(), 2);

        store.reset_counts();
        let second = apply_all(&store, &stack, objects).await.unwrap();
        assert_eq!(second.unchanged.len(), 2);
        assert_eq!(second.changed(), 0);
        let counts = store.operation_counts();
        assert_eq!(counts.creates + counts.updates, 0);
    }

    #[tokio::test]
    async fn test_update_keeps_foreign_fields() {
        let store = MockStore::new();
        let stack = stack(&store);
        apply_all(&store, &stack, vec![config_map("dev-config", "a: 1")])
            .await
            .unwrap();

        // Another writer adds a label and a data key
        let mut live = store.object(&cm_key("dev-config")).unwrap();
        live.metadata
            .labels
            .as_mut()
            .unwrap()
            .insert("team".to_string(), "logging".to_string());
        live.data["metadata_only"] = json!("kept");
        store.update(&live).await.unwrap();

        let summary = apply_all(&store, &stack, vec![config_map("dev-config", "a: 2")])
            .await
            .unwrap();
        assert_eq!(summary.updated.len(), 1);

        let live = store.object(&cm_key("dev-config")).unwrap();
        assert_eq!(live.data["data"]["config.yaml"], json!("a: 2"));
        assert_eq!(live.data["metadata_only"], json!("kept"));
        let labels = live.metadata.labels.unwrap();
        assert_eq!(labels.get("team").map(String::as_str), Some("logging"));
        assert_eq!(live.metadata.owner_references.unwrap()[0].kind, "LokiStack");
    }

    fn deployment(image: &str) -> DynamicObject {
        dynamic(&json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "dev-distributor"},
            "spec": {
                "replicas": 1,
                "template": {
                    "metadata": {
                        "labels": {"app": "loki"},
                        "annotations": {"loki.grafana.com/config-hash": "abc"}
                    },
                    "spec": {"containers": [{"name": "loki", "image": image}]}
                }
            }
        }))
    }

    #[tokio::test]
    async fn test_update_keeps_foreign_pod_template_metadata() {
        let store = MockStore::new();
        let stack = stack(&store);
        apply_all(&store, &stack, vec![deployment("loki:3.1.0")]).await.unwrap();

        // A rollout restart stamps the pod template
        let key = ResourceKey::new("apps/v1", "Deployment", Some("obs"), "dev-distributor");
        let mut live = store.object(&key).unwrap();
        live.data["spec"]["template"]["metadata"]["annotations"]["kubectl.kubernetes.io/restartedAt"] =
            json!("2024-06-01T00:00:00Z");
        store.update(&live).await.unwrap();

        let unchanged = apply_all(&store, &stack, vec![deployment("loki:3.1.0")]).await.unwrap();
        assert_eq!(unchanged.unchanged.len(), 1);

        let summary = apply_all(&store, &stack, vec![deployment("loki:3.1.1")]).await.unwrap();
        assert_eq!(summary.updated.len(), 1);

        let live = store.object(&key).unwrap();
        let template = &live.data["spec"]["template"];
        assert_eq!(template["spec"]["containers"][0]["image"], json!("loki:3.1.1"));
        assert_eq!(
            template["metadata"]["annotations"]["kubectl.kubernetes.io/restartedAt"],
            json!("2024-06-01T00:00:00Z")
        );
        assert_eq!(template["metadata"]["annotations"]["loki.grafana.com/config-hash"], json!("abc"));
        assert_eq!(template["metadata"]["labels"]["app"], json!("loki"));
    }

    #[tokio::test]
    async fn test_failures_are_collected() {
        let store = MockStore::new();
        let stack = stack(&store);
        store.fail_writes_to("dev-broken");

        let summary = apply_all(
            &store,
            &stack,
            vec![
                config_map("dev-a", "a"),
                config_map("dev-broken", "b"),
                config_map("dev-c", "c"),
            ],
        )
        .await
        .unwrap();

        insta::assert_snapshot!(summary.summary(), @"2 created, 1 failed");
        assert!(store.object(&cm_key("dev-c")).is_some());

        let err = summary.into_result().unwrap_err();
        assert!(matches!(err, KubeError::ApplyFailed { failed: 1, total: 3, .. }));
    }

    #[tokio::test]
    async fn test_cluster_scoped_objects_have_no_owner() {
        let store = MockStore::new();
        let stack = stack(&store);
        let role = dynamic(&ClusterRole {
            metadata: ObjectMeta {
                name: Some("dev-reader".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });

        apply_all(&store, &stack, vec![role]).await.unwrap();
        let key = ResourceKey::new("rbac.authorization.k8s.io/v1", "ClusterRole", None, "dev-reader");
        let live = store.object(&key).unwrap();
        assert!(live.metadata.namespace.is_none());
        assert!(live.metadata.owner_references.is_none());
    }

    #[tokio::test]
    async fn test_service_account_uid_is_stamped() {
        let store = MockStore::new();
        let stack = stack(&store);
        let account = dynamic(&ServiceAccount {
            metadata: ObjectMeta {
                name: Some("dev".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        let mut dependent = config_map("dev-dependent", "x");
        dependent.metadata.annotations = Some(BTreeMap::from([(
            SERVICE_ACCOUNT_NAME_ANNOTATION.to_string(),
            "dev".to_string(),
        )]));

        apply_all(&store, &stack, vec![account.clone(), dependent.clone()])
            .await
            .unwrap();
        let sa_key = ResourceKey::new("v1", "ServiceAccount", Some("obs"), "dev");
        let first_uid = store.object(&sa_key).unwrap().metadata.uid.unwrap();
        let stamped = |store: &MockStore| {
            store
                .object(&cm_key("dev-dependent"))
                .unwrap()
                .metadata
                .annotations
                .unwrap()
                .get(SERVICE_ACCOUNT_UID_ANNOTATION)
                .cloned()
        };
        assert_eq!(stamped(&store), Some(first_uid.clone()));

        // Recreated account gets a new uid; the dependent follows
        store.remove(&sa_key);
        let summary = apply_all(&store, &stack, vec![account, dependent]).await.unwrap();
        assert_eq!(summary.created.len(), 1);
        assert_eq!(summary.updated.len(), 1);
        assert_ne!(stamped(&store), Some(first_uid));
    }
}
