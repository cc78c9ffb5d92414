//! Names, ports, labels and paths shared by every generated object

use std::collections::BTreeMap;

use lokistack_core::Component;

pub const HTTP_PORT: i32 = 3100;
pub const GRPC_PORT: i32 = 9095;
pub const GOSSIP_PORT: i32 = 7946;

pub const HTTP_PORT_NAME: &str = "metrics";
pub const GRPC_PORT_NAME: &str = "grpclb";
pub const GOSSIP_PORT_NAME: &str = "gossip-ring";

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_CREATED_BY: &str = "app.kubernetes.io/created-by";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
/// Marks pods that join the memberlist gossip ring
pub const LABEL_GOSSIP: &str = "loki.grafana.com/gossip";

pub const APP_NAME: &str = "lokistack";
pub const MANAGER_NAME: &str = "lokistack-operator";

pub const CONFIG_HASH_ANNOTATION: &str = "loki.grafana.com/config-hash";
pub const OBJECT_STORE_HASH_ANNOTATION: &str = "loki.grafana.com/object-store-hash";

/// Annotation naming the service account an object depends on
pub const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";
/// Annotation carrying the uid of that service account
pub const SERVICE_ACCOUNT_UID_ANNOTATION: &str = "kubernetes.io/service-account.uid";

pub const CONFIG_VOLUME_NAME: &str = "config";
pub const STORAGE_VOLUME_NAME: &str = "storage";
pub const WAL_VOLUME_NAME: &str = "wal";
pub const STORAGE_SECRET_VOLUME_NAME: &str = "storage-credentials";

pub const CONFIG_DIRECTORY: &str = "/etc/loki/config";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const RUNTIME_CONFIG_FILE_NAME: &str = "runtime-config.yaml";
pub const DATA_DIRECTORY: &str = "/tmp/loki";
pub const WAL_DIRECTORY: &str = "/tmp/wal";
pub const SECRET_DIRECTORY: &str = "/etc/storage/secrets";

pub const LIVENESS_PATH: &str = "/loki/api/v1/status/buildinfo";
pub const READINESS_PATH: &str = "/ready";

pub const REVISION_HISTORY_LIMIT: i32 = 10;
pub const CONFIG_VOLUME_MODE: i32 = 0o644;

pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";
pub const OS_LABEL: &str = "kubernetes.io/os";

pub fn component_name(stack: &str, component: Component) -> String {
    format!("{}-{}", stack, component)
}

pub fn http_service_name(stack: &str, component: Component) -> String {
    format!("{}-{}-http", stack, component)
}

pub fn grpc_service_name(stack: &str, component: Component) -> String {
    format!("{}-{}-grpc", stack, component)
}

pub fn gossip_ring_service_name(stack: &str) -> String {
    format!("{}-gossip-ring", stack)
}

pub fn config_map_name(stack: &str) -> String {
    format!("{}-config", stack)
}

pub fn service_account_name(stack: &str) -> String {
    stack.to_string()
}

/// Cluster-local DNS name of a service
pub fn fqdn(service: &str, namespace: &str) -> String {
    format!("{}.{}.svc.cluster.local", service, namespace)
}

/// Labels carried by every object of a stack
pub fn common_labels(stack: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), APP_NAME.to_string()),
        (LABEL_INSTANCE.to_string(), stack.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGER_NAME.to_string()),
        (LABEL_CREATED_BY.to_string(), MANAGER_NAME.to_string()),
    ])
}

/// Labels identifying the pods of one component, also used as selectors
pub fn component_labels(stack: &str, component: Component) -> BTreeMap<String, String> {
    let mut labels = common_labels(stack);
    labels.insert(LABEL_COMPONENT.to_string(), component.to_string());
    labels
}

/// Selector for every pod in the gossip ring
pub fn gossip_labels(stack: &str) -> BTreeMap<String, String> {
    let mut labels = common_labels(stack);
    labels.insert(LABEL_GOSSIP.to_string(), "true".to_string());
    labels
}
