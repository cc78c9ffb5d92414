//! LokiStack Core - resource types and pure reconcile stages
//!
//! This crate provides the pieces of a LokiStack reconcile that do not talk
//! to the cluster:
//! - `stack`: The `LokiStack` custom resource and its status
//! - `size`: Per-size baseline profiles and resource tables
//! - `defaults`: Three-way merge of baseline, user spec and strict overrides
//! - `storage`: Object storage secret resolution and fingerprinting
//! - `schema`: Schema list reduction and history validation
//! - `status`: Condition helpers

pub mod component;
pub mod defaults;
pub mod error;
pub mod schema;
pub mod size;
pub mod stack;
pub mod status;
pub mod storage;
pub mod timeouts;

pub use component::{Component, WorkloadKind};
pub use defaults::{DefaultedStack, SINGLETON_COMPONENTS, apply_default_settings};
pub use error::{CoreError, DegradedError, Result};
pub use schema::{
    SCHEMA_CUTOFF_MARGIN, SchemaValidationErrors, SchemaViolation, build_schema_config,
    reduce_schemas, validate_schemas,
};
pub use size::{ComponentResources, ResourceProfile, SizeProfile, component_resources, size_profile};
pub use stack::{
    ComponentSpec, Condition, CredentialMode, EffectiveDate, InstanceAddrType, LokiStack,
    LokiStackSpec, LokiStackStatus, ObjectStorageSchema, ObjectStorageSecretSpec,
    ObjectStorageSecretType, ObjectStorageSpec, SchemaVersion, StackSize, StorageStatus,
};
pub use status::ConditionReason;
pub use storage::{BackendConfig, StorageOptions, extract_secrets, hash_secret_data};
pub use timeouts::HttpTimeouts;
