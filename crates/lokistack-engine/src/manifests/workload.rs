//! Deployments and StatefulSets for each component

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateStatefulSetStrategy, StatefulSet,
    StatefulSetSpec, StatefulSetUpdateStrategy,
};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, HTTPGetAction, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
    Toleration, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use lokistack_core::stack::{ResourceList, Toleration as SpecToleration};
use lokistack_core::{Component, WorkloadKind};

use super::var;
use crate::error::{EngineError, Result};
use crate::options::Options;

/// A component's workload, before mutation passes run
#[derive(Debug, Clone)]
pub enum Workload {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
}

impl Workload {
    pub fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        match self {
            Workload::Deployment(d) => d.spec.as_mut().map(|s| &mut s.template),
            Workload::StatefulSet(s) => s.spec.as_mut().map(|s| &mut s.template),
        }
    }

    pub fn to_dynamic(&self) -> Result<kube::api::DynamicObject> {
        match self {
            Workload::Deployment(d) => super::to_dynamic(d),
            Workload::StatefulSet(s) => super::to_dynamic(s),
        }
    }
}

/// Build the workload of one component
pub fn build_workload(opts: &Options, component: Component) -> Result<Workload> {
    let name = var::component_name(&opts.name, component);
    let labels = var::component_labels(&opts.name, component);
    let template = pod_template(opts, component)?;
    let selector = LabelSelector {
        match_labels: Some(labels.clone()),
        ..Default::default()
    };

    let mut annotations = BTreeMap::new();
    annotations.insert(
        var::SERVICE_ACCOUNT_NAME_ANNOTATION.to_string(),
        var::service_account_name(&opts.name),
    );
    let metadata = ObjectMeta {
        name: Some(name),
        labels: Some(labels),
        annotations: Some(annotations),
        ..Default::default()
    };
    let replicas = Some(opts.replicas(component));

    let workload = match component.workload_kind() {
        WorkloadKind::Deployment => Workload::Deployment(Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                replicas,
                selector,
                template,
                strategy: Some(DeploymentStrategy {
                    type_: Some("RollingUpdate".to_string()),
                    ..Default::default()
                }),
                revision_history_limit: Some(var::REVISION_HISTORY_LIMIT),
                ..Default::default()
            }),
            ..Default::default()
        }),
        WorkloadKind::StatefulSet => Workload::StatefulSet(StatefulSet {
            metadata,
            spec: Some(StatefulSetSpec {
                replicas,
                selector,
                template,
                service_name: var::grpc_service_name(&opts.name, component).into(),
                pod_management_policy: Some("Parallel".to_string()),
                update_strategy: Some(StatefulSetUpdateStrategy {
                    type_: Some("RollingUpdate".to_string()),
                    rolling_update: Some(RollingUpdateStatefulSetStrategy {
                        partition: Some(0),
                        ..Default::default()
                    }),
                }),
                revision_history_limit: Some(var::REVISION_HISTORY_LIMIT),
                volume_claim_templates: Some(volume_claims(opts, component)?),
                ..Default::default()
            }),
            ..Default::default()
        }),
    };

    Ok(workload)
}

fn pod_template(opts: &Options, component: Component) -> Result<PodTemplateSpec> {
    let mut labels = var::component_labels(&opts.name, component);
    if component.is_ring_member() {
        labels.insert(var::LABEL_GOSSIP.to_string(), "true".to_string());
    }

    let annotations = BTreeMap::from([(
        var::CONFIG_HASH_ANNOTATION.to_string(),
        opts.config_sha1.clone(),
    )]);

    let overrides = opts.component_spec(component);
    let tolerations: Vec<Toleration> = overrides
        .map(|c| c.tolerations.iter().map(toleration).collect())
        .unwrap_or_default();
    let node_selector = overrides
        .map(|c| c.node_selector.clone())
        .filter(|s| !s.is_empty());

    Ok(PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(var::service_account_name(&opts.name)),
            containers: vec![container(opts, component)?],
            volumes: Some(vec![Volume {
                name: var::CONFIG_VOLUME_NAME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: var::config_map_name(&opts.name),
                    default_mode: Some(var::CONFIG_VOLUME_MODE),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            tolerations: (!tolerations.is_empty()).then_some(tolerations),
            node_selector,
            ..Default::default()
        }),
    })
}

fn container(opts: &Options, component: Component) -> Result<Container> {
    let mut ports = vec![
        container_port(var::HTTP_PORT_NAME, var::HTTP_PORT),
        container_port(var::GRPC_PORT_NAME, var::GRPC_PORT),
    ];
    if component.is_ring_member() {
        ports.push(container_port(var::GOSSIP_PORT_NAME, var::GOSSIP_PORT));
    }

    let mut volume_mounts = vec![VolumeMount {
        name: var::CONFIG_VOLUME_NAME.to_string(),
        mount_path: var::CONFIG_DIRECTORY.to_string(),
        read_only: Some(true),
        ..Default::default()
    }];
    if component.workload_kind() == WorkloadKind::StatefulSet {
        volume_mounts.push(VolumeMount {
            name: var::STORAGE_VOLUME_NAME.to_string(),
            mount_path: var::DATA_DIRECTORY.to_string(),
            ..Default::default()
        });
    }
    if component.has_wal() {
        volume_mounts.push(VolumeMount {
            name: var::WAL_VOLUME_NAME.to_string(),
            mount_path: var::WAL_DIRECTORY.to_string(),
            ..Default::default()
        });
    }

    let requirements = opts
        .resources
        .get(component)
        .map(|p| &p.requirements)
        .ok_or_else(|| EngineError::build(component.as_str(), "no resource profile"))?;

    Ok(Container {
        name: component.to_string(),
        image: Some(opts.image.clone()),
        args: Some(vec![
            format!("-target={}", component),
            format!("-config.file={}/{}", var::CONFIG_DIRECTORY, var::CONFIG_FILE_NAME),
            format!(
                "-runtime-config.file={}/{}",
                var::CONFIG_DIRECTORY,
                var::RUNTIME_CONFIG_FILE_NAME
            ),
            "-config.expand-env=true".to_string(),
        ]),
        ports: Some(ports),
        resources: Some(ResourceRequirements {
            limits: quantities(&requirements.limits),
            requests: quantities(&requirements.requests),
            ..Default::default()
        }),
        liveness_probe: Some(Probe {
            http_get: Some(http_get(var::LIVENESS_PATH)),
            period_seconds: Some(30),
            timeout_seconds: Some(2),
            success_threshold: Some(1),
            failure_threshold: Some(10),
            ..Default::default()
        }),
        readiness_probe: Some(Probe {
            http_get: Some(http_get(var::READINESS_PATH)),
            initial_delay_seconds: Some(15),
            timeout_seconds: Some(1),
            ..Default::default()
        }),
        volume_mounts: Some(volume_mounts),
        termination_message_path: Some("/dev/termination-log".to_string()),
        termination_message_policy: Some("File".to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ..Default::default()
    })
}

fn volume_claims(opts: &Options, component: Component) -> Result<Vec<PersistentVolumeClaim>> {
    let size = opts
        .resources
        .get(component)
        .and_then(|p| p.pvc_size.clone())
        .ok_or_else(|| EngineError::build(component.as_str(), "no persistent volume size"))?;

    let mut names = vec![var::STORAGE_VOLUME_NAME];
    if component.has_wal() {
        names.push(var::WAL_VOLUME_NAME);
    }

    let labels = var::component_labels(&opts.name, component);
    let storage_class = Some(opts.stack.storage_class_name.clone()).filter(|s| !s.is_empty());

    Ok(names
        .into_iter()
        .map(|name| PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(size.clone()),
                    )])),
                    ..Default::default()
                }),
                storage_class_name: storage_class.clone(),
                volume_mode: Some("Filesystem".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect())
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn http_get(path: &str) -> HTTPGetAction {
    HTTPGetAction {
        path: Some(path.to_string()),
        port: IntOrString::Int(var::HTTP_PORT),
        scheme: Some("HTTP".to_string()),
        ..Default::default()
    }
}

fn quantities(list: &ResourceList) -> Option<BTreeMap<String, Quantity>> {
    if list.is_empty() {
        return None;
    }
    let mut map = BTreeMap::new();
    if let Some(cpu) = &list.cpu {
        map.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &list.memory {
        map.insert("memory".to_string(), Quantity(memory.clone()));
    }
    Some(map)
}

fn toleration(t: &SpecToleration) -> Toleration {
    Toleration {
        key: t.key.clone(),
        operator: t.operator.clone(),
        value: t.value.clone(),
        effect: t.effect.clone(),
        toleration_seconds: t.toleration_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::fixtures::{options, options_for, spec};
    use lokistack_core::StackSize;
    use lokistack_core::stack::{ComponentSpec, TemplateSpec};

    fn statefulset(workload: Workload) -> StatefulSet {
        match workload {
            Workload::StatefulSet(s) => s,
            other => panic!("expected statefulset, got {:?}", other),
        }
    }

    #[test]
    fn test_ingester_statefulset() {
        let opts = options(StackSize::OneXSmall);
        let sts = statefulset(build_workload(&opts, Component::Ingester).unwrap());
        let spec = sts.spec.unwrap();

        assert_eq!(sts.metadata.name.as_deref(), Some("lokistack-dev-ingester"));
        assert_eq!(spec.replicas, Some(2));
        let claims = spec.volume_claim_templates.unwrap();
        let names: Vec<_> = claims.iter().filter_map(|c| c.metadata.name.as_deref()).collect();
        assert_eq!(names, vec!["storage", "wal"]);

        let pod = spec.template.spec.unwrap();
        let container = &pod.containers[0];
        assert_eq!(container.args.as_ref().unwrap()[0], "-target=ingester");
        assert_eq!(container.ports.as_ref().unwrap().len(), 3);
        assert_eq!(pod.service_account_name.as_deref(), Some("lokistack-dev"));

        let labels = spec.template.metadata.unwrap().labels.unwrap();
        assert_eq!(labels.get(var::LABEL_GOSSIP).map(String::as_str), Some("true"));
    }

    #[test]
    fn test_query_frontend_is_not_in_ring() {
        let opts = options(StackSize::OneXSmall);
        let Workload::Deployment(deploy) = build_workload(&opts, Component::QueryFrontend).unwrap() else {
            panic!("expected deployment");
        };
        let template = deploy.spec.unwrap().template;
        assert!(!template.metadata.unwrap().labels.unwrap().contains_key(var::LABEL_GOSSIP));
        assert_eq!(template.spec.unwrap().containers[0].ports.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_compactor_is_singleton() {
        let mut s = spec(StackSize::OneXMedium);
        s.template = Some(TemplateSpec {
            compactor: Some(ComponentSpec {
                replicas: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        });
        let sts = statefulset(build_workload(&options_for(&s), Component::Compactor).unwrap());
        assert_eq!(sts.spec.unwrap().replicas, Some(1));
    }

    #[test]
    fn test_storage_class_and_tolerations() {
        let mut s = spec(StackSize::OneXSmall);
        s.storage_class_name = "gp3".to_string();
        s.template = Some(TemplateSpec {
            index_gateway: Some(ComponentSpec {
                tolerations: vec![SpecToleration {
                    key: Some("dedicated".to_string()),
                    operator: Some("Exists".to_string()),
                    effect: Some("NoSchedule".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        });
        let sts = statefulset(build_workload(&options_for(&s), Component::IndexGateway).unwrap());
        let spec = sts.spec.unwrap();

        let claim = &spec.volume_claim_templates.unwrap()[0];
        assert_eq!(claim.spec.as_ref().unwrap().storage_class_name.as_deref(), Some("gp3"));
        let tolerations = spec.template.spec.unwrap().tolerations.unwrap();
        assert_eq!(tolerations[0].key.as_deref(), Some("dedicated"));
    }

    #[test]
    fn test_config_hash_annotation() {
        let mut opts = options(StackSize::OneXDemo);
        opts.config_sha1 = "abc123".to_string();
        let Workload::Deployment(deploy) = build_workload(&opts, Component::Distributor).unwrap() else {
            panic!("expected deployment");
        };
        let annotations = deploy.spec.unwrap().template.metadata.unwrap().annotations.unwrap();
        assert_eq!(
            annotations.get(var::CONFIG_HASH_ANNOTATION).map(String::as_str),
            Some("abc123")
        );
    }

    #[test]
    fn test_config_mounted_read_only() {
        let opts = options(StackSize::OneXDemo);
        let sts = statefulset(build_workload(&opts, Component::Ingester).unwrap());
        let pod = sts.spec.unwrap().template.spec.unwrap();
        let mounts = pod.containers[0].volume_mounts.clone().unwrap();

        let config = mounts.iter().find(|m| m.name == var::CONFIG_VOLUME_NAME).unwrap();
        assert_eq!(config.mount_path, var::CONFIG_DIRECTORY);
        assert_eq!(config.read_only, Some(true));
        let data = mounts.iter().find(|m| m.name == var::STORAGE_VOLUME_NAME).unwrap();
        assert_eq!(data.read_only, None);
    }
}
