//! Operator settings from flags and environment

use clap::Args;
use std::time::Duration;

use lokistack_engine::DEFAULT_LOKI_IMAGE;
use lokistack_kube::HandlerConfig;

/// Settings shared by `run` and `render`
#[derive(Args, Debug, Clone)]
pub struct OperatorConfig {
    /// Loki image for every component
    #[arg(long, env = "LOKI_IMAGE")]
    pub image: Option<String>,

    /// Loki image injected by the operator bundle, used when --image is unset
    #[arg(long, env = "RELATED_IMAGE_LOKI", hide = true)]
    pub related_image: Option<String>,

    /// Require linux nodes for every workload
    #[arg(long, env = "LOKISTACK_NODE_AFFINITY")]
    pub node_affinity: bool,

    /// Seconds between resyncs of a converged stack
    #[arg(long, env = "LOKISTACK_REQUEUE_SECS", default_value_t = 300)]
    pub requeue_secs: u64,
}

impl OperatorConfig {
    pub fn image(&self) -> &str {
        self.image
            .as_deref()
            .or(self.related_image.as_deref())
            .unwrap_or(DEFAULT_LOKI_IMAGE)
    }

    pub fn requeue(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            image: self.image().to_string(),
            node_affinity: self.node_affinity,
        }
    }
}
