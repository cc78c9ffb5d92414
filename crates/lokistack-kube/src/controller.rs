//! LokiStack controller
//!
//! Watches stacks and the workloads they own, and runs
//! [`create_or_update`] for every change.

use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use lokistack_core::LokiStack;

use crate::error::{KubeError, Result};
use crate::handler::{HandlerConfig, ReconcileOutcome, create_or_update};
use crate::store::KubeStore;

/// Delay before retrying a reconcile that returned an error
pub const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Shared state handed to every reconcile
pub struct Context {
    pub store: KubeStore,
    pub config: HandlerConfig,
    /// Resync interval for converged stacks and retryable degraded ones
    pub requeue: Duration,
}

/// Run the controller until a shutdown signal arrives
pub async fn run(client: Client, config: HandlerConfig, requeue: Duration) -> Result<()> {
    let store = KubeStore::new(client.clone()).await?;
    let ctx = Arc::new(Context {
        store,
        config,
        requeue,
    });

    let stacks: Api<LokiStack> = Api::all(client.clone());
    info!("Starting LokiStack controller");

    Controller::new(stacks, Config::default())
        .owns(Api::<StatefulSet>::all(client.clone()), Config::default())
        .owns(Api::<Deployment>::all(client.clone()), Config::default())
        .owns(Api::<ConfigMap>::all(client), Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!("Reconciled stack: {}", obj.name);
                }
                Err(e) => {
                    error!("Reconciliation failed: {:?}", e);
                }
            }
        })
        .await;

    Ok(())
}

async fn reconcile(stack: Arc<LokiStack>, ctx: Arc<Context>) -> std::result::Result<Action, KubeError> {
    let name = stack.name_any();
    let namespace = stack
        .namespace()
        .ok_or_else(|| KubeError::InvalidManifest(format!("stack '{}' has no namespace", name)))?;

    info!("Reconciling LokiStack {}/{}", namespace, name);
    let outcome = create_or_update(&ctx.store, &ctx.config, &namespace, &name, Utc::now()).await?;
    Ok(next_action(&outcome, ctx.requeue))
}

fn error_policy(_stack: Arc<LokiStack>, error: &KubeError, _ctx: Arc<Context>) -> Action {
    error!("Reconciliation error: {:?}", error);
    Action::requeue(ERROR_REQUEUE)
}

/// When to look at a stack again after a reconcile that did not fail
pub fn next_action(outcome: &ReconcileOutcome, requeue: Duration) -> Action {
    match outcome {
        ReconcileOutcome::Ready(_) => Action::requeue(requeue),
        ReconcileOutcome::Degraded(err) if err.requeue => Action::requeue(requeue),
        ReconcileOutcome::Degraded(_) | ReconcileOutcome::NotFound => Action::await_change(),
    }
}
