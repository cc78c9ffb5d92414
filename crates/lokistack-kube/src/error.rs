//! Error types for lokistack-kube

use thiserror::Error;

use lokistack_core::{CoreError, DegradedError};
use lokistack_engine::EngineError;

/// Result type for lokistack-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while reconciling a stack
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Kubernetes discovery error
    #[error("discovery error: {0}")]
    Discovery(String),

    /// User input blocks the reconcile; reported on the stack status
    #[error(transparent)]
    Degraded(#[from] DegradedError),

    /// Core processing error
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Configuration rendering or manifest synthesis failed
    #[error("manifest error: {0}")]
    Manifest(#[from] EngineError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Object not found in the store
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// Write based on a stale copy of the object
    #[error("conflict writing {kind} '{name}': {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    /// Resource kind unknown to the cluster
    #[error("unknown resource type: {api_version}/{kind}")]
    UnknownResource { api_version: String, kind: String },

    /// One or more objects could not be applied
    #[error("failed to apply {failed} of {total} object(s): {details}")]
    ApplyFailed {
        failed: usize,
        total: usize,
        details: String,
    },
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            KubeError::NotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 409,
            KubeError::Conflict { .. } => true,
            _ => false,
        }
    }
}
