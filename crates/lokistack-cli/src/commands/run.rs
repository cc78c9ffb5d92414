//! Run command - start the controller against the current cluster

use kube::Client;

use crate::config::OperatorConfig;
use crate::error::{CliError, Result};

pub async fn run(operator: &OperatorConfig) -> Result<()> {
    let client = Client::try_default().await.map_err(|e| CliError::Cluster {
        message: format!("failed to create Kubernetes client: {}", e),
    })?;
    tracing::info!(
        image = %operator.image(),
        node_affinity = operator.node_affinity,
        requeue_secs = operator.requeue_secs,
        "Connected to Kubernetes API server"
    );

    lokistack_kube::run(client, operator.handler_config(), operator.requeue()).await?;
    tracing::info!("Controller stopped");
    Ok(())
}
