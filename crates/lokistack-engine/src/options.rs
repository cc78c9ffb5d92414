//! Inputs shared by configuration rendering and manifest synthesis

use lokistack_core::{
    Component, ComponentResources, ComponentSpec, DefaultedStack, InstanceAddrType,
    LokiStackSpec, StorageOptions, HttpTimeouts,
};
use lokistack_core::stack::MemberListSpec;

/// Image used when none is configured
pub const DEFAULT_LOKI_IMAGE: &str = "docker.io/grafana/loki:3.1.1";

/// Everything needed to turn a defaulted stack into configuration and manifests
#[derive(Debug, Clone)]
pub struct Options {
    /// Stack name, used as prefix for every object name
    pub name: String,
    pub namespace: String,
    pub image: String,
    /// Spec after defaulting and strict overrides
    pub stack: LokiStackSpec,
    pub resources: ComponentResources,
    pub object_storage: StorageOptions,
    pub timeouts: HttpTimeouts,
    /// Require linux nodes on every workload
    pub node_affinity: bool,
    /// Fingerprint of the rendered configuration, set by [`crate::build_all`]
    pub config_sha1: String,
}

impl Options {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        defaulted: DefaultedStack,
        object_storage: StorageOptions,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            image: DEFAULT_LOKI_IMAGE.to_string(),
            timeouts: HttpTimeouts::from_query_timeout(defaulted.query_timeout),
            stack: defaulted.spec,
            resources: defaulted.resources,
            object_storage,
            node_affinity: false,
            config_sha1: String::new(),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_node_affinity(mut self, enabled: bool) -> Self {
        self.node_affinity = enabled;
        self
    }

    /// Components deployed for this stack, in deployment order
    pub fn components(&self) -> Vec<Component> {
        Component::ALL
            .into_iter()
            .filter(|c| *c != Component::Ruler || self.stack.rules_enabled())
            .collect()
    }

    pub fn component_spec(&self, component: Component) -> Option<&ComponentSpec> {
        self.stack
            .template
            .as_ref()
            .and_then(|t| t.component(component))
    }

    pub fn replicas(&self, component: Component) -> i32 {
        self.component_spec(component)
            .and_then(|c| c.replicas)
            .unwrap_or(1)
    }

    pub fn replication_factor(&self) -> i32 {
        self.stack
            .replication
            .as_ref()
            .and_then(|r| r.factor)
            .unwrap_or(1)
    }

    pub fn memberlist(&self) -> Option<&MemberListSpec> {
        self.stack
            .hash_ring
            .as_ref()
            .and_then(|h| h.memberlist.as_ref())
    }

    /// Ring members advertise their pod IP instead of letting Loki pick an interface
    pub fn advertise_pod_ip(&self) -> bool {
        self.memberlist().is_some_and(|m| {
            m.enable_ipv6 || m.instance_addr_type == InstanceAddrType::PodIp
        })
    }

    pub fn enable_ipv6(&self) -> bool {
        self.memberlist().is_some_and(|m| m.enable_ipv6)
    }

    pub fn zone_aware(&self) -> bool {
        self.stack
            .replication
            .as_ref()
            .is_some_and(|r| !r.zones.is_empty())
    }
}
