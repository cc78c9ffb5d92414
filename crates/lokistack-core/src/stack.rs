//! LokiStack custom resource definition
//!
//! Describes a Loki deployment by size class plus optional per-component
//! overrides. Everything not set here is filled in from the size profile
//! by [`crate::defaults::apply_default_settings`].

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::component::Component;

/// LokiStack is the Schema for the lokistacks API
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "loki.grafana.com",
    version = "v1",
    kind = "LokiStack",
    namespaced,
    status = "LokiStackStatus",
    shortname = "ls",
    printcolumn = r#"{"name":"Size","type":"string","jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LokiStackSpec {
    /// Size class selecting replica counts, resources and limits
    pub size: StackSize,

    /// Object storage backend and schema history
    pub storage: ObjectStorageSpec,

    /// Storage class used for every persistent volume claim
    #[serde(default)]
    pub storage_class_name: String,

    /// Zone-aware replication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<ReplicationSpec>,

    /// Global and per-tenant limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<LimitsSpec>,

    /// Per-component scheduling overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateSpec>,

    /// Hash ring discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_ring: Option<HashRingSpec>,

    /// Outbound proxy for components talking to object storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxySpec>,

    /// Ruler component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<RulesSpec>,
}

impl LokiStackSpec {
    pub fn rules_enabled(&self) -> bool {
        self.rules.as_ref().is_some_and(|r| r.enabled)
    }
}

/// Supported size classes
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum StackSize {
    #[default]
    #[serde(rename = "1x.demo")]
    OneXDemo,
    #[serde(rename = "1x.extra-small")]
    OneXExtraSmall,
    #[serde(rename = "1x.small")]
    OneXSmall,
    #[serde(rename = "1x.medium")]
    OneXMedium,
}

impl StackSize {
    pub const ALL: [StackSize; 4] = [
        StackSize::OneXDemo,
        StackSize::OneXExtraSmall,
        StackSize::OneXSmall,
        StackSize::OneXMedium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StackSize::OneXDemo => "1x.demo",
            StackSize::OneXExtraSmall => "1x.extra-small",
            StackSize::OneXSmall => "1x.small",
            StackSize::OneXMedium => "1x.medium",
        }
    }
}

impl fmt::Display for StackSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStorageSpec {
    /// Schema versions and the dates they take effect
    #[serde(default)]
    pub schemas: Vec<ObjectStorageSchema>,

    /// Secret holding the backend credentials
    pub secret: ObjectStorageSecretSpec,
}

/// A schema version taking effect on a given date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStorageSchema {
    pub version: SchemaVersion,
    pub effective_date: EffectiveDate,
}

impl ObjectStorageSchema {
    pub fn new(version: SchemaVersion, effective_date: impl Into<String>) -> Self {
        Self {
            version,
            effective_date: EffectiveDate(effective_date.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub enum SchemaVersion {
    #[serde(rename = "v11")]
    V11,
    #[serde(rename = "v12")]
    V12,
    #[serde(rename = "v13")]
    V13,
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V11 => "v11",
            SchemaVersion::V12 => "v12",
            SchemaVersion::V13 => "v13",
        }
    }

    /// Index store used by this schema version
    pub fn index_store(&self) -> &'static str {
        match self {
            SchemaVersion::V11 | SchemaVersion::V12 => "boltdb-shipper",
            SchemaVersion::V13 => "tsdb",
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar date in `YYYY-MM-DD` form, interpreted as UTC midnight
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct EffectiveDate(pub String);

impl EffectiveDate {
    pub const FORMAT: &'static str = "%Y-%m-%d";

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn utc_time(&self) -> Result<chrono::DateTime<chrono::Utc>, chrono::ParseError> {
        let date = chrono::NaiveDate::parse_from_str(&self.0, Self::FORMAT)?;
        Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }
}

impl fmt::Display for EffectiveDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStorageSecretSpec {
    /// Backend type of the referenced secret
    #[serde(rename = "type")]
    pub type_: ObjectStorageSecretType,

    /// Name of a secret in the stack namespace
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ObjectStorageSecretType {
    #[default]
    #[serde(rename = "s3")]
    S3,
    #[serde(rename = "gcs")]
    Gcs,
    #[serde(rename = "azure")]
    Azure,
    #[serde(rename = "swift")]
    Swift,
    #[serde(rename = "alibabacloud")]
    AlibabaCloud,
}

impl ObjectStorageSecretType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectStorageSecretType::S3 => "s3",
            ObjectStorageSecretType::Gcs => "gcs",
            ObjectStorageSecretType::Azure => "azure",
            ObjectStorageSecretType::Swift => "swift",
            ObjectStorageSecretType::AlibabaCloud => "alibabacloud",
        }
    }
}

impl fmt::Display for ObjectStorageSecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSpec {
    /// Number of copies written per stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<i32>,

    /// Failure domains to spread replicas across
    #[serde(default)]
    pub zones: Vec<ZoneSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSpec {
    /// Node label identifying the zone
    pub topology_key: String,

    #[serde(default = "default_max_skew")]
    pub max_skew: i32,
}

fn default_max_skew() -> i32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LimitsSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<LimitsTemplate>,

    /// Overrides keyed by tenant id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tenants: BTreeMap<String, LimitsTemplate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LimitsTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion: Option<IngestionLimits>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries: Option<QueryLimits>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestionLimits {
    /// Per-tenant ingestion rate in MB/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_rate: Option<i32>,

    /// Per-tenant burst size in MB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_burst_size: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_label_name_length: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_label_value_length: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_label_names_per_series: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_global_streams_per_tenant: Option<i32>,

    /// Maximum log line size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_line_size: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_stream_desired_rate: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_stream_rate_limit: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_stream_rate_limit_burst: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries_limit_per_query: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chunks_per_query: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_query_series: Option<i32>,

    /// Query timeout such as `3m` or `90s`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality_limit: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_volume_series: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compactor: Option<ComponentSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distributor: Option<ComponentSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingester: Option<ComponentSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub querier: Option<ComponentSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_frontend: Option<ComponentSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_gateway: Option<ComponentSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruler: Option<ComponentSpec>,
}

impl TemplateSpec {
    pub fn component(&self, component: Component) -> Option<&ComponentSpec> {
        self.slot(component).as_ref()
    }

    pub fn component_mut(&mut self, component: Component) -> &mut Option<ComponentSpec> {
        match component {
            Component::Compactor => &mut self.compactor,
            Component::Distributor => &mut self.distributor,
            Component::Ingester => &mut self.ingester,
            Component::Querier => &mut self.querier,
            Component::QueryFrontend => &mut self.query_frontend,
            Component::IndexGateway => &mut self.index_gateway,
            Component::Ruler => &mut self.ruler,
        }
    }

    fn slot(&self, component: Component) -> &Option<ComponentSpec> {
        match component {
            Component::Compactor => &self.compactor,
            Component::Distributor => &self.distributor,
            Component::Ingester => &self.ingester,
            Component::Querier => &self.querier,
            Component::QueryFrontend => &self.query_frontend,
            Component::IndexGateway => &self.index_gateway,
            Component::Ruler => &self.ruler,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Replaces the size profile's requests and limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Replaces the default preferred anti-affinity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_anti_affinity: Option<PodAntiAffinitySpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub limits: ResourceList,
    #[serde(default)]
    pub requests: ResourceList,
}

/// Resource quantities such as `500m` or `2Gi`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceList {
    pub fn new(cpu: &str, memory: &str) -> Self {
        Self {
            cpu: Some(cpu.to_string()),
            memory: Some(memory.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Exists or Equal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// NoSchedule, PreferNoSchedule or NoExecute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodAntiAffinitySpec {
    #[serde(default)]
    pub preferred: Vec<WeightedTopologyTerm>,

    /// Topology keys replicas must never share
    #[serde(default)]
    pub required_topology_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeightedTopologyTerm {
    pub weight: i32,
    pub topology_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HashRingSpec {
    #[serde(rename = "type", default)]
    pub type_: HashRingType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memberlist: Option<MemberListSpec>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum HashRingType {
    #[default]
    #[serde(rename = "memberlist")]
    Memberlist,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberListSpec {
    #[serde(default)]
    pub instance_addr_type: InstanceAddrType,

    #[serde(default, rename = "enableIPv6")]
    pub enable_ipv6: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum InstanceAddrType {
    /// Let each component pick its advertise address
    #[default]
    #[serde(rename = "default")]
    Default,
    /// Advertise the pod IP from the downward API
    #[serde(rename = "podIP")]
    PodIp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RulesSpec {
    #[serde(default)]
    pub enabled: bool,
}

/// Observed state of a LokiStack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LokiStackStatus {
    /// Storage state carried across reconciles
    #[serde(default)]
    pub storage: StorageStatus,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    /// Reduced schema list applied by the last successful reconcile
    #[serde(default)]
    pub schemas: Vec<ObjectStorageSchema>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_mode: Option<CredentialMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CredentialMode {
    #[serde(rename = "static")]
    Static,
    #[serde(rename = "token")]
    Token,
    #[serde(rename = "token-cco")]
    TokenCco,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    /// True, False or Unknown
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_spec() {
        let yaml = r#"
size: 1x.small
storage:
  schemas:
    - version: v13
      effectiveDate: "2024-10-01"
  secret:
    type: s3
    name: loki-s3
storageClassName: gp3
"#;
        let spec: LokiStackSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.size, StackSize::OneXSmall);
        assert_eq!(spec.storage.secret.type_, ObjectStorageSecretType::S3);
        assert_eq!(spec.storage.schemas[0].version, SchemaVersion::V13);
        assert_eq!(spec.storage.schemas[0].effective_date.as_str(), "2024-10-01");
        assert!(spec.template.is_none());
        assert!(!spec.rules_enabled());
    }

    #[test]
    fn test_parse_hash_ring_and_overrides() {
        let yaml = r#"
size: 1x.extra-small
storage:
  secret:
    type: azure
    name: loki-azure
hashRing:
  type: memberlist
  memberlist:
    instanceAddrType: podIP
    enableIPv6: true
template:
  querier:
    replicas: 4
    nodeSelector:
      pool: query
"#;
        let spec: LokiStackSpec = serde_yaml::from_str(yaml).unwrap();
        let ring = spec.hash_ring.unwrap().memberlist.unwrap();
        assert_eq!(ring.instance_addr_type, InstanceAddrType::PodIp);
        assert!(ring.enable_ipv6);

        let template = spec.template.unwrap();
        let querier = template.component(Component::Querier).unwrap();
        assert_eq!(querier.replicas, Some(4));
        assert_eq!(querier.node_selector.get("pool").map(String::as_str), Some("query"));
        assert!(template.component(Component::Ingester).is_none());
    }

    #[test]
    fn test_effective_date_utc_time() {
        let date = EffectiveDate("2024-06-01".to_string());
        let time = date.utc_time().unwrap();
        assert_eq!(time.to_rfc3339(), "2024-06-01T00:00:00+00:00");

        assert!(EffectiveDate("2024/06/01".to_string()).utc_time().is_err());
        assert!(EffectiveDate("2024-13-01".to_string()).utc_time().is_err());
    }

    #[test]
    fn test_size_serialization() {
        let yaml = serde_yaml::to_string(&StackSize::OneXMedium).unwrap();
        assert_eq!(yaml.trim(), "1x.medium");
        assert_eq!(StackSize::OneXExtraSmall.to_string(), "1x.extra-small");
    }
}
