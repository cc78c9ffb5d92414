//! Owner references from the stack to the objects it generates
//!
//! Namespaced objects land in the stack's namespace with the stack as their
//! controller, so deleting the stack garbage-collects them. Cluster-scoped
//! kinds get neither.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use kube::api::DynamicObject;

use lokistack_core::LokiStack;

use crate::error::{KubeError, Result};

/// Kinds that never live in a namespace
pub const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "PersistentVolume",
    "StorageClass",
    "PriorityClass",
    "ValidatingWebhookConfiguration",
    "MutatingWebhookConfiguration",
];

/// Links generated objects to the resource that owns them
pub trait OwnerLinker: Send + Sync {
    fn is_cluster_scoped(&self, kind: &str) -> bool {
        CLUSTER_SCOPED_KINDS.contains(&kind)
    }

    /// Place `obj` under the owner's namespace and controller reference
    fn assign_owner(&self, obj: &mut DynamicObject);
}

/// [`OwnerLinker`] for objects generated from one stack
#[derive(Debug, Clone)]
pub struct StackOwner {
    namespace: String,
    reference: OwnerReference,
}

impl StackOwner {
    pub fn new(stack: &LokiStack) -> Result<Self> {
        let namespace = stack.metadata.namespace.clone().ok_or_else(|| {
            KubeError::InvalidManifest(format!(
                "stack '{}' has no namespace",
                stack.metadata.name.as_deref().unwrap_or_default()
            ))
        })?;
        Ok(Self {
            namespace,
            reference: stack_owner_reference(stack)?,
        })
    }
}

impl OwnerLinker for StackOwner {
    fn assign_owner(&self, obj: &mut DynamicObject) {
        obj.metadata.namespace = Some(self.namespace.clone());
        set_controller_reference(obj, &self.reference);
    }
}

/// Controller owner reference pointing at a stack
pub fn stack_owner_reference(stack: &LokiStack) -> Result<OwnerReference> {
    stack.controller_owner_ref(&()).ok_or_else(|| {
        KubeError::InvalidManifest(format!(
            "stack '{}' has no uid yet",
            stack.metadata.name.as_deref().unwrap_or_default()
        ))
    })
}

/// Make `owner` the controller of `obj`, replacing any other controller
/// reference and keeping non-controller references
pub fn set_controller_reference(obj: &mut DynamicObject, owner: &OwnerReference) {
    let refs = obj.metadata.owner_references.get_or_insert_with(Vec::new);
    refs.retain(|r| r.controller != Some(true) && r.uid != owner.uid);
    refs.push(owner.clone());
}
