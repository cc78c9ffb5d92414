//! Loki configuration rendering
//!
//! Two YAML documents are produced from embedded MiniJinja templates: the
//! main `config.yaml` shared by every component and `runtime-config.yaml`
//! with per-tenant overrides. Rendering is pure, and the SHA-1 over both
//! documents is stamped on pod templates so any change rolls the pods.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use sha1::{Digest, Sha1};

use lokistack_core::size::cpu_cores;
use lokistack_core::stack::LimitsTemplate;
use lokistack_core::timeouts::format_duration;
use lokistack_core::{BackendConfig, Component, SchemaVersion};

use crate::error::{Result, TemplateError};
use crate::filters;
use crate::manifests::var;
use crate::options::Options;

pub const CONFIG_TEMPLATE_NAME: &str = "loki-config.yaml";
pub const RUNTIME_CONFIG_TEMPLATE_NAME: &str = "loki-runtime-config.yaml";

const CONFIG_TEMPLATE: &str = include_str!("templates/loki-config.yaml");
const RUNTIME_CONFIG_TEMPLATE: &str = include_str!("templates/loki-runtime-config.yaml");

/// Rendered configuration documents and their combined fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub config: String,
    pub runtime_config: String,
    /// Lowercase hex SHA-1 over `config` followed by `runtime_config`
    pub sha1: String,
}

/// Render both configuration documents for a stack
pub fn render(opts: &Options) -> Result<RenderedConfig> {
    let env = environment();

    let config = render_template(&env, CONFIG_TEMPLATE_NAME, CONFIG_TEMPLATE, &ConfigContext::new(opts))?;
    let runtime_config = render_template(
        &env,
        RUNTIME_CONFIG_TEMPLATE_NAME,
        RUNTIME_CONFIG_TEMPLATE,
        &RuntimeContext::new(opts),
    )?;

    let mut hasher = Sha1::new();
    hasher.update(config.as_bytes());
    hasher.update(runtime_config.as_bytes());
    let sha1 = hex::encode(hasher.finalize());

    tracing::debug!(stack = %opts.name, sha1 = %sha1, "rendered loki configuration");

    Ok(RenderedConfig {
        config,
        runtime_config,
        sha1,
    })
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_filter("quote", filters::quote);
    env
}

fn render_template<S: Serialize>(
    env: &Environment<'static>,
    name: &'static str,
    source: &'static str,
    ctx: &S,
) -> Result<String> {
    let template = env
        .template_from_named_str(name, source)
        .map_err(|e| TemplateError::from_minijinja(e, name, source))?;
    let rendered = template
        .render(ctx)
        .map_err(|e| TemplateError::from_minijinja(e, name, source))?;
    Ok(rendered)
}

#[derive(Debug, Serialize)]
struct ConfigContext {
    storage: StorageContext,
    shared_store: &'static str,
    storage_directory: &'static str,
    wal_directory: &'static str,
    http_port: i32,
    grpc_port: i32,
    gossip_port: i32,
    compactor: Address,
    query_frontend: Address,
    querier: Address,
    index_gateway: Address,
    gossip_ring: Address,
    memberlist: MemberlistContext,
    replication_factor: i32,
    max_concurrent: u32,
    delete_worker_count: u32,
    limits: LimitsContext,
    structured_metadata: bool,
    schemas: Vec<SchemaContext>,
    shippers: Vec<&'static str>,
    ruler: bool,
    timeouts: TimeoutsContext,
}

impl ConfigContext {
    fn new(opts: &Options) -> Self {
        let grpc = |component| Address::grpc(opts, component);
        let querier_cpu = opts
            .resources
            .get(Component::Querier)
            .and_then(|p| p.requirements.requests.cpu.as_deref())
            .and_then(cpu_cores)
            .unwrap_or(1);

        let schemas = &opts.object_storage.schemas;
        let mut shippers = Vec::new();
        for schema in schemas {
            let shipper = match schema.version {
                SchemaVersion::V11 | SchemaVersion::V12 => "boltdb",
                SchemaVersion::V13 => "tsdb",
            };
            if !shippers.contains(&shipper) {
                shippers.push(shipper);
            }
        }

        let global = opts
            .stack
            .limits
            .as_ref()
            .and_then(|l| l.global.as_ref())
            .cloned()
            .unwrap_or_default();

        Self {
            storage: StorageContext::new(&opts.object_storage.backend),
            shared_store: opts.object_storage.shared_store.as_str(),
            storage_directory: var::DATA_DIRECTORY,
            wal_directory: var::WAL_DIRECTORY,
            http_port: var::HTTP_PORT,
            grpc_port: var::GRPC_PORT,
            gossip_port: var::GOSSIP_PORT,
            compactor: grpc(Component::Compactor),
            query_frontend: grpc(Component::QueryFrontend),
            querier: Address::http(opts, Component::Querier),
            index_gateway: grpc(Component::IndexGateway),
            gossip_ring: Address::new(
                var::fqdn(&var::gossip_ring_service_name(&opts.name), &opts.namespace),
                var::GOSSIP_PORT,
            ),
            memberlist: MemberlistContext {
                enable_ipv6: opts.enable_ipv6(),
                advertise_pod_ip: opts.advertise_pod_ip(),
            },
            replication_factor: opts.replication_factor(),
            max_concurrent: querier_cpu.max(1),
            delete_worker_count: opts.resources.delete_worker_count,
            limits: LimitsContext::new(&global),
            structured_metadata: schemas
                .last()
                .is_some_and(|s| s.version == SchemaVersion::V13),
            schemas: schemas
                .iter()
                .map(|s| SchemaContext {
                    effective_date: s.effective_date.to_string(),
                    version: s.version.as_str(),
                    store: s.version.index_store(),
                })
                .collect(),
            shippers,
            ruler: opts.stack.rules_enabled(),
            timeouts: TimeoutsContext {
                idle: format_duration(opts.timeouts.idle),
                read: format_duration(opts.timeouts.read),
                write: format_duration(opts.timeouts.write),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct Address {
    address: String,
    url: String,
}

impl Address {
    fn new(host: String, port: i32) -> Self {
        Self {
            url: format!("http://{}:{}", host, port),
            address: format!("{}:{}", host, port),
        }
    }

    fn grpc(opts: &Options, component: Component) -> Self {
        let service = var::grpc_service_name(&opts.name, component);
        Self::new(var::fqdn(&service, &opts.namespace), var::GRPC_PORT)
    }

    fn http(opts: &Options, component: Component) -> Self {
        let service = var::http_service_name(&opts.name, component);
        Self::new(var::fqdn(&service, &opts.namespace), var::HTTP_PORT)
    }
}

#[derive(Debug, Serialize)]
struct MemberlistContext {
    enable_ipv6: bool,
    advertise_pod_ip: bool,
}

#[derive(Debug, Serialize)]
struct TimeoutsContext {
    idle: String,
    read: String,
    write: String,
}

#[derive(Debug, Serialize)]
struct SchemaContext {
    effective_date: String,
    version: &'static str,
    store: &'static str,
}

#[derive(Debug, Default, Serialize)]
struct StorageContext {
    s3: Option<S3Context>,
    gcs: Option<GcsContext>,
    azure: Option<AzureContext>,
}

#[derive(Debug, Serialize)]
struct S3Context {
    endpoint: String,
    buckets: String,
    region: Option<String>,
    force_path_style: bool,
}

#[derive(Debug, Serialize)]
struct GcsContext {
    bucket: String,
}

#[derive(Debug, Serialize)]
struct AzureContext {
    environment: String,
    container: String,
    endpoint_suffix: Option<String>,
}

impl StorageContext {
    fn new(backend: &BackendConfig) -> Self {
        match backend {
            BackendConfig::S3(s3) => Self {
                s3: Some(S3Context {
                    endpoint: s3.endpoint.clone(),
                    buckets: s3.buckets.clone(),
                    region: s3.region.clone(),
                    force_path_style: s3.force_path_style,
                }),
                ..Default::default()
            },
            BackendConfig::Gcs(gcs) => Self {
                gcs: Some(GcsContext {
                    bucket: gcs.bucket.clone(),
                }),
                ..Default::default()
            },
            BackendConfig::Azure(azure) => Self {
                azure: Some(AzureContext {
                    environment: azure.environment.clone(),
                    container: azure.container.clone(),
                    endpoint_suffix: azure.endpoint_suffix.clone(),
                }),
                ..Default::default()
            },
        }
    }
}

/// A single `key: value` line of a limits block
#[derive(Debug, PartialEq, Serialize)]
struct LimitEntry {
    key: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct LimitsContext {
    entries: Vec<LimitEntry>,
    shard_desired_rate: Option<String>,
}

impl LimitsContext {
    /// Map the stack limits onto Loki's `limits_config` keys, skipping unset fields
    fn new(limits: &LimitsTemplate) -> Self {
        let mut entries = Vec::new();
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(value) = value {
                entries.push(LimitEntry { key, value });
            }
        };
        let plain = |v: Option<i32>| v.map(|v| v.to_string());
        let megabytes = |v: Option<i32>| v.map(|v| format!("{}MB", v));

        let mut shard_desired_rate = None;
        if let Some(ingestion) = &limits.ingestion {
            push("ingestion_rate_mb", plain(ingestion.ingestion_rate));
            push("ingestion_burst_size_mb", plain(ingestion.ingestion_burst_size));
            push("max_label_name_length", plain(ingestion.max_label_name_length));
            push("max_label_value_length", plain(ingestion.max_label_value_length));
            push("max_label_names_per_series", plain(ingestion.max_label_names_per_series));
            push(
                "max_global_streams_per_user",
                plain(ingestion.max_global_streams_per_tenant),
            );
            push("max_line_size", plain(ingestion.max_line_size));
            push("per_stream_rate_limit", megabytes(ingestion.per_stream_rate_limit));
            push(
                "per_stream_rate_limit_burst",
                megabytes(ingestion.per_stream_rate_limit_burst),
            );
            shard_desired_rate = megabytes(ingestion.per_stream_desired_rate);
        }
        if let Some(queries) = &limits.queries {
            push("max_entries_limit_per_query", plain(queries.max_entries_limit_per_query));
            push("max_chunks_per_query", plain(queries.max_chunks_per_query));
            push("max_query_series", plain(queries.max_query_series));
            push("query_timeout", queries.query_timeout.clone());
            push("cardinality_limit", plain(queries.cardinality_limit));
            push("volume_max_series", plain(queries.max_volume_series));
        }

        Self {
            entries,
            shard_desired_rate,
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.shard_desired_rate.is_none()
    }
}

#[derive(Debug, Serialize)]
struct RuntimeContext {
    tenants: Vec<TenantContext>,
}

#[derive(Debug, Serialize)]
struct TenantContext {
    name: String,
    limits: LimitsContext,
}

impl RuntimeContext {
    fn new(opts: &Options) -> Self {
        let tenants = opts
            .stack
            .limits
            .iter()
            .flat_map(|l| l.tenants.iter())
            .map(|(name, limits)| TenantContext {
                name: name.clone(),
                limits: LimitsContext::new(limits),
            })
            .filter(|t| !t.limits.is_empty())
            .collect();
        Self { tenants }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::fixtures::{options, options_for, spec};
    use lokistack_core::stack::{
        HashRingSpec, IngestionLimits, LimitsSpec, MemberListSpec, QueryLimits, ReplicationSpec,
        RulesSpec,
    };
    use lokistack_core::storage::GcsStorageConfig;
    use lokistack_core::{InstanceAddrType, ObjectStorageSchema, ObjectStorageSecretType, StackSize};
    use std::collections::BTreeMap;

    fn parse(doc: &str) -> serde_yaml::Value {
        serde_yaml::from_str(doc).expect("rendered document is valid YAML")
    }

    #[test]
    fn test_render_is_deterministic() {
        let opts = options(StackSize::OneXSmall);
        let first = render(&opts).unwrap();
        let second = render(&opts).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.sha1.len(), 40);
        assert!(first.sha1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_changes_with_input() {
        let a = render(&options(StackSize::OneXSmall)).unwrap();
        let b = render(&options(StackSize::OneXMedium)).unwrap();
        assert_ne!(a.sha1, b.sha1);
    }

    #[test]
    fn test_config_addresses_and_timeouts() {
        let rendered = render(&options(StackSize::OneXSmall)).unwrap();
        let doc = parse(&rendered.config);

        assert_eq!(
            doc["common"]["compactor_grpc_address"].as_str(),
            Some("lokistack-dev-compactor-grpc.observability.svc.cluster.local:9095")
        );
        assert_eq!(
            doc["frontend"]["tail_proxy_url"].as_str(),
            Some("http://lokistack-dev-querier-http.observability.svc.cluster.local:3100")
        );
        assert_eq!(
            doc["memberlist"]["join_members"][0].as_str(),
            Some("lokistack-dev-gossip-ring.observability.svc.cluster.local:7946")
        );
        assert_eq!(doc["server"]["http_server_idle_timeout"].as_str(), Some("30s"));
        assert_eq!(doc["server"]["http_server_read_timeout"].as_str(), Some("18s"));
        assert_eq!(doc["server"]["http_server_write_timeout"].as_str(), Some("4m"));
        assert_eq!(doc["limits_config"]["query_timeout"].as_str(), Some("3m"));
        assert_eq!(doc["common"]["storage"]["s3"]["bucketnames"].as_str(), Some("loki"));
        assert_eq!(doc["common"]["replication_factor"].as_i64(), Some(1));
    }

    #[test]
    fn test_querier_concurrency_follows_cpu() {
        let doc = parse(&render(&options(StackSize::OneXExtraSmall)).unwrap().config);
        // 1500m rounds up
        assert_eq!(doc["querier"]["max_concurrent"].as_i64(), Some(2));

        let doc = parse(&render(&options(StackSize::OneXDemo)).unwrap().config);
        assert_eq!(doc["querier"]["max_concurrent"].as_i64(), Some(1));
    }

    #[test]
    fn test_schema_shippers() {
        let mut opts = options(StackSize::OneXSmall);
        opts.object_storage.schemas = vec![
            ObjectStorageSchema::new(SchemaVersion::V11, "2020-10-11"),
            ObjectStorageSchema::new(SchemaVersion::V13, "2024-01-01"),
        ];
        let doc = parse(&render(&opts).unwrap().config);

        let configs = doc["schema_config"]["configs"].as_sequence().unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0]["from"].as_str(), Some("2020-10-11"));
        assert_eq!(configs[0]["store"].as_str(), Some("boltdb-shipper"));
        assert_eq!(configs[1]["schema"].as_str(), Some("v13"));
        assert!(doc["storage_config"]["boltdb_shipper"].is_mapping());
        assert!(doc["storage_config"]["tsdb_shipper"].is_mapping());
        assert_eq!(doc["limits_config"]["allow_structured_metadata"].as_bool(), Some(true));
    }

    #[test]
    fn test_memberlist_pod_ip() {
        let mut s = spec(StackSize::OneXSmall);
        s.hash_ring = Some(HashRingSpec {
            memberlist: Some(MemberListSpec {
                instance_addr_type: InstanceAddrType::Default,
                enable_ipv6: true,
            }),
            ..Default::default()
        });
        let rendered = render(&options_for(&s)).unwrap();
        let doc = parse(&rendered.config);

        assert_eq!(doc["common"]["ring"]["instance_enable_ipv6"].as_bool(), Some(true));
        assert_eq!(
            doc["memberlist"]["advertise_addr"].as_str(),
            Some("${HASH_RING_INSTANCE_ADDR}")
        );
    }

    #[test]
    fn test_ruler_block_and_replication() {
        let mut s = spec(StackSize::OneXMedium);
        s.rules = Some(RulesSpec { enabled: true });
        s.replication = Some(ReplicationSpec {
            factor: Some(3),
            zones: Vec::new(),
        });
        let doc = parse(&render(&options_for(&s)).unwrap().config);

        assert!(doc["ruler"].is_mapping());
        assert_eq!(doc["common"]["replication_factor"].as_i64(), Some(3));

        let doc = parse(&render(&options(StackSize::OneXMedium)).unwrap().config);
        assert!(doc["ruler"].is_null());
    }

    #[test]
    fn test_gcs_backend() {
        let mut opts = options(StackSize::OneXDemo);
        opts.object_storage.shared_store = ObjectStorageSecretType::Gcs;
        opts.object_storage.backend = BackendConfig::Gcs(GcsStorageConfig {
            bucket: "logs".to_string(),
        });
        let doc = parse(&render(&opts).unwrap().config);

        assert_eq!(doc["common"]["storage"]["gcs"]["bucket_name"].as_str(), Some("logs"));
        assert_eq!(doc["compactor"]["delete_request_store"].as_str(), Some("gcs"));
    }

    #[test]
    fn test_runtime_config_tenants() {
        let rendered = render(&options(StackSize::OneXSmall)).unwrap();
        assert!(parse(&rendered.runtime_config)["overrides"]
            .as_mapping()
            .unwrap()
            .is_empty());

        let mut s = spec(StackSize::OneXSmall);
        s.limits = Some(LimitsSpec {
            global: None,
            tenants: BTreeMap::from([
                (
                    "application".to_string(),
                    lokistack_core::stack::LimitsTemplate {
                        ingestion: Some(IngestionLimits {
                            ingestion_rate: Some(20),
                            per_stream_desired_rate: Some(4),
                            ..Default::default()
                        }),
                        queries: Some(QueryLimits {
                            query_timeout: Some("5m".to_string()),
                            ..Default::default()
                        }),
                    },
                ),
                ("empty".to_string(), Default::default()),
            ]),
        });
        let doc = parse(&render(&options_for(&s)).unwrap().runtime_config);

        let app = &doc["overrides"]["application"];
        assert_eq!(app["ingestion_rate_mb"].as_i64(), Some(20));
        assert_eq!(app["query_timeout"].as_str(), Some("5m"));
        assert_eq!(app["shard_streams"]["desired_rate"].as_str(), Some("4MB"));
        assert!(doc["overrides"]["empty"].is_null());
    }
}
