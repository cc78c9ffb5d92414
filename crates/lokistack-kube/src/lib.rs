//! LokiStack Kube - cluster side of the LokiStack operator
//!
//! This crate provides:
//! - **Resource Store**: Object access through the dynamic API, with an in-memory mock
//! - **Ownership**: Namespace and controller references for generated objects
//! - **Applier**: Idempotent create-or-update that only touches owned fields
//! - **Status**: Ready, Degraded and Failed conditions plus persisted storage state
//! - **Handler**: The full reconcile pipeline for one stack
//! - **Controller**: The watch loop driving the handler

pub mod apply;
pub mod controller;
pub mod error;
pub mod handler;
pub mod mock;
pub mod ownership;
pub mod status;
pub mod store;

pub use apply::{ApplyAction, ApplyResult, ApplySummary, apply_all, apply_one};
pub use controller::{Context, next_action, run};
pub use error::{KubeError, Result};
pub use handler::{HandlerConfig, ReconcileOutcome, create_or_update};
pub use mock::{MockStore, OperationCounts};
pub use ownership::{CLUSTER_SCOPED_KINDS, OwnerLinker, StackOwner, stack_owner_reference};
pub use store::{FIELD_MANAGER, KubeStore, ResourceKey, ResourceStore, StatusWriter};
