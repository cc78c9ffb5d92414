//! One reconcile of one stack
//!
//! Stages run in a fixed order and the first one that fails decides the
//! outcome:
//! 1. Fetch the stack and its object storage secret
//! 2. Resolve storage options from the secret
//! 3. Validate the schema list against the applied history
//! 4. Default the stack from its size profile
//! 5. Render configuration and synthesize manifests
//! 6. Apply every object
//!
//! Invalid storage input becomes a `Degraded` condition. Anything else,
//! including a stack that cannot be defaulted, is recorded as `Failed` and
//! handed back to the scheduler.

use chrono::{DateTime, Utc};

use lokistack_core::{
    DegradedError, LokiStack, apply_default_settings, build_schema_config, extract_secrets, storage,
};
use lokistack_engine::{DEFAULT_LOKI_IMAGE, Options, build_all};

use crate::apply::{ApplySummary, apply_all};
use crate::error::{KubeError, Result};
use crate::ownership::StackOwner;
use crate::status::{degraded_status, failed_status, ready_status, write_status};
use crate::store::{ResourceStore, StatusWriter};

/// Operator-wide settings applied to every stack
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Loki image for every component
    pub image: String,
    /// Require linux nodes on every workload
    pub node_affinity: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_LOKI_IMAGE.to_string(),
            node_affinity: false,
        }
    }
}

/// How a reconcile ended, when it did not fail
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Every object converged
    Ready(ApplySummary),
    /// User input blocks convergence; reported on the stack status
    Degraded(DegradedError),
    /// The stack no longer exists
    NotFound,
}

/// Run the full pipeline for the stack `namespace/name`
pub async fn create_or_update<S>(
    store: &S,
    config: &HandlerConfig,
    namespace: &str,
    name: &str,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome>
where
    S: ResourceStore + StatusWriter + ?Sized,
{
    let Some(stack) = store.get_stack(namespace, name).await? else {
        tracing::debug!(lokistack = %name, "stack not found, nothing to do");
        return Ok(ReconcileOutcome::NotFound);
    };

    match converge(store, config, &stack, now).await {
        Ok(summary) => {
            tracing::info!(lokistack = %name, summary = %summary.summary(), "stack ready");
            Ok(ReconcileOutcome::Ready(summary))
        }
        Err(KubeError::Degraded(err)) => {
            tracing::warn!(lokistack = %name, reason = %err.reason, "{}", err);
            write_status(store, &stack, degraded_status(&stack, &err, now)).await?;
            Ok(ReconcileOutcome::Degraded(err))
        }
        Err(err) => {
            tracing::error!(lokistack = %name, error = %err, "reconcile failed");
            if let Err(status_err) = write_status(store, &stack, failed_status(&stack, &err.to_string(), now)).await {
                tracing::warn!(lokistack = %name, error = %status_err, "failed to record failure on status");
            }
            Err(err)
        }
    }
}

async fn converge<S>(store: &S, config: &HandlerConfig, stack: &LokiStack, now: DateTime<Utc>) -> Result<ApplySummary>
where
    S: ResourceStore + StatusWriter + ?Sized,
{
    let namespace = stack.metadata.namespace.as_deref().unwrap_or_default();
    let name = stack.metadata.name.as_deref().unwrap_or_default();
    let secret_spec = &stack.spec.storage.secret;

    let secret = store
        .get_secret(namespace, &secret_spec.name)
        .await?
        .ok_or_else(|| storage::missing_secret(&secret_spec.name))?;
    let mut object_storage = extract_secrets(secret_spec.type_, &secret)?;

    let previous = stack.status.as_ref().map(|s| &s.storage);
    let schemas = build_schema_config(now, &stack.spec.storage, previous).map_err(DegradedError::from)?;
    object_storage.schemas = schemas.clone();

    let defaulted = apply_default_settings(&stack.spec)?;

    let opts = Options::new(name, namespace, defaulted, object_storage.clone())
        .with_image(&config.image)
        .with_node_affinity(config.node_affinity);
    let objects = build_all(&opts)?;

    let owner = StackOwner::new(stack)?;
    let summary = apply_all(store, &owner, objects).await?.into_result()?;

    write_status(store, stack, ready_status(stack, &schemas, &object_storage, now)).await?;
    Ok(summary)
}
