//! Mutation passes applied to every pod template after the base build
//!
//! Passes run in a fixed order: object storage credentials, hash ring
//! address, proxy environment, affinity, then zone spread. Each pass only
//! adds to the template, so later passes never undo earlier ones.

use k8s_openapi::api::core::v1::{
    Affinity, Container, EnvVar, EnvVarSource, NodeAffinity, NodeSelector,
    NodeSelectorRequirement, NodeSelectorTerm, ObjectFieldSelector, PodAffinityTerm,
    PodAntiAffinity, PodSpec, PodTemplateSpec, SecretKeySelector, SecretVolumeSource,
    TopologySpreadConstraint, Volume, VolumeMount, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use lokistack_core::storage::keys;
use lokistack_core::{BackendConfig, Component};

use super::var;
use crate::error::{EngineError, Result};
use crate::options::Options;

pub const ENV_HASH_RING_INSTANCE_ADDR: &str = "HASH_RING_INSTANCE_ADDR";
pub const ENV_GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

type Pass = fn(&mut PodTemplateSpec, &Options, Component) -> Result<()>;

const PASSES: [Pass; 5] = [
    configure_object_storage,
    configure_hash_ring,
    configure_proxy,
    configure_affinity,
    configure_replication,
];

/// Run every pass over a component's pod template
pub fn apply_all(template: &mut PodTemplateSpec, opts: &Options, component: Component) -> Result<()> {
    for pass in PASSES {
        pass(template, opts, component)?;
    }
    Ok(())
}

/// Mount the storage secret and expose its credentials to Loki
pub fn configure_object_storage(
    template: &mut PodTemplateSpec,
    opts: &Options,
    component: Component,
) -> Result<()> {
    if !component.uses_object_storage() {
        return Ok(());
    }
    let storage = &opts.object_storage;

    template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(Default::default)
        .insert(
            var::OBJECT_STORE_HASH_ANNOTATION.to_string(),
            storage.secret_sha1.clone(),
        );

    let pod = pod_spec(template, component)?;
    pod.volumes.get_or_insert_with(Vec::new).push(Volume {
        name: var::STORAGE_SECRET_VOLUME_NAME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(storage.secret_name.clone()),
            ..Default::default()
        }),
        ..Default::default()
    });

    let env: Vec<EnvVar> = match &storage.backend {
        BackendConfig::S3(_) => vec![
            secret_env("AWS_ACCESS_KEY_ID", &storage.secret_name, keys::S3_ACCESS_KEY_ID),
            secret_env(
                "AWS_ACCESS_KEY_SECRET",
                &storage.secret_name,
                keys::S3_ACCESS_KEY_SECRET,
            ),
        ],
        BackendConfig::Gcs(_) => vec![plain_env(
            ENV_GOOGLE_APPLICATION_CREDENTIALS,
            &format!("{}/{}", var::SECRET_DIRECTORY, keys::GCS_KEY_JSON),
        )],
        BackendConfig::Azure(_) => vec![
            secret_env(
                "AZURE_STORAGE_ACCOUNT_NAME",
                &storage.secret_name,
                keys::AZURE_ACCOUNT_NAME,
            ),
            secret_env(
                "AZURE_STORAGE_ACCOUNT_KEY",
                &storage.secret_name,
                keys::AZURE_ACCOUNT_KEY,
            ),
        ],
    };

    let container = main_container(pod, component)?;
    container
        .volume_mounts
        .get_or_insert_with(Vec::new)
        .push(VolumeMount {
            name: var::STORAGE_SECRET_VOLUME_NAME.to_string(),
            mount_path: var::SECRET_DIRECTORY.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    for entry in env {
        set_env(container, entry);
    }
    Ok(())
}

/// Advertise the pod IP on the hash ring when requested
pub fn configure_hash_ring(
    template: &mut PodTemplateSpec,
    opts: &Options,
    component: Component,
) -> Result<()> {
    if !component.is_ring_member() || !opts.advertise_pod_ip() {
        return Ok(());
    }

    let pod = pod_spec(template, component)?;
    let container = main_container(pod, component)?;
    set_env(
        container,
        EnvVar {
            name: ENV_HASH_RING_INSTANCE_ADDR.to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    api_version: Some("v1".to_string()),
                    field_path: "status.podIP".to_string(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    Ok(())
}

/// Export proxy variables in both upper and lower case on every container
pub fn configure_proxy(
    template: &mut PodTemplateSpec,
    opts: &Options,
    component: Component,
) -> Result<()> {
    let Some(proxy) = &opts.stack.proxy else {
        return Ok(());
    };

    let mut env = Vec::new();
    for (name, value) in [
        ("HTTP_PROXY", &proxy.http_proxy),
        ("HTTPS_PROXY", &proxy.https_proxy),
        ("NO_PROXY", &proxy.no_proxy),
    ] {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            env.push(plain_env(name, value));
            env.push(plain_env(&name.to_lowercase(), value));
        }
    }
    if env.is_empty() {
        return Ok(());
    }

    let pod = pod_spec(template, component)?;
    for container in pod.containers.iter_mut() {
        for entry in &env {
            set_env(container, entry.clone());
        }
    }
    Ok(())
}

/// Spread replicas across hosts and optionally pin to linux nodes
pub fn configure_affinity(
    template: &mut PodTemplateSpec,
    opts: &Options,
    component: Component,
) -> Result<()> {
    let selector = LabelSelector {
        match_labels: Some(var::component_labels(&opts.name, component)),
        ..Default::default()
    };
    let term = |topology_key: &str| PodAffinityTerm {
        label_selector: Some(selector.clone()),
        topology_key: topology_key.to_string(),
        ..Default::default()
    };

    let anti_affinity = match opts.component_spec(component).and_then(|c| c.pod_anti_affinity.as_ref()) {
        Some(custom) => PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(
                custom
                    .preferred
                    .iter()
                    .map(|p| WeightedPodAffinityTerm {
                        weight: p.weight,
                        pod_affinity_term: term(&p.topology_key),
                    })
                    .collect(),
            )
            .filter(|v: &Vec<_>| !v.is_empty()),
            required_during_scheduling_ignored_during_execution: Some(
                custom
                    .required_topology_keys
                    .iter()
                    .map(|key| term(key))
                    .collect(),
            )
            .filter(|v: &Vec<_>| !v.is_empty()),
        },
        None => PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: 100,
                    pod_affinity_term: term(var::HOSTNAME_TOPOLOGY_KEY),
                },
            ]),
            ..Default::default()
        },
    };

    let node_affinity = opts.node_affinity.then(|| NodeAffinity {
        required_during_scheduling_ignored_during_execution: Some(NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm {
                match_expressions: Some(vec![NodeSelectorRequirement {
                    key: var::OS_LABEL.to_string(),
                    operator: "In".to_string(),
                    values: Some(vec!["linux".to_string()]),
                }]),
                ..Default::default()
            }],
        }),
        ..Default::default()
    });

    let pod = pod_spec(template, component)?;
    pod.affinity = Some(Affinity {
        node_affinity,
        pod_anti_affinity: Some(anti_affinity),
        ..Default::default()
    });
    Ok(())
}

/// One topology spread constraint per configured zone
pub fn configure_replication(
    template: &mut PodTemplateSpec,
    opts: &Options,
    component: Component,
) -> Result<()> {
    let Some(replication) = opts.stack.replication.as_ref().filter(|_| opts.zone_aware()) else {
        return Ok(());
    };

    let selector = LabelSelector {
        match_labels: Some(var::component_labels(&opts.name, component)),
        ..Default::default()
    };
    let constraints = replication
        .zones
        .iter()
        .map(|zone| TopologySpreadConstraint {
            max_skew: zone.max_skew,
            topology_key: zone.topology_key.clone(),
            when_unsatisfiable: "DoNotSchedule".to_string(),
            label_selector: Some(selector.clone()),
            ..Default::default()
        })
        .collect();

    pod_spec(template, component)?.topology_spread_constraints = Some(constraints);
    Ok(())
}

fn pod_spec(template: &mut PodTemplateSpec, component: Component) -> Result<&mut PodSpec> {
    template
        .spec
        .as_mut()
        .ok_or_else(|| EngineError::build(component.as_str(), "pod template has no spec"))
}

fn main_container(pod: &mut PodSpec, component: Component) -> Result<&mut Container> {
    pod.containers
        .first_mut()
        .ok_or_else(|| EngineError::build(component.as_str(), "pod template has no containers"))
}

/// Insert or replace an environment variable by name
fn set_env(container: &mut Container, entry: EnvVar) {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|e| e.name == entry.name) {
        Some(existing) => *existing = entry,
        None => env.push(entry),
    }
}

fn plain_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
