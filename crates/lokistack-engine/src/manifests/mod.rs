//! Manifest synthesis
//!
//! [`build_all`] turns [`Options`] into the complete, ordered list of objects
//! a stack needs. The build is all-or-nothing: the first failing component
//! aborts and nothing is returned.

pub mod mutate;
pub mod pdb;
pub mod services;
pub mod var;
pub mod workload;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use serde::Serialize;

use lokistack_core::Component;

use crate::config::{self, RenderedConfig};
use crate::error::{EngineError, Result};
use crate::options::Options;

/// Render the configuration and synthesize every object of the stack
///
/// Order: config map, service account, per-component objects in
/// deployment order, then the gossip ring service.
pub fn build_all(opts: &Options) -> Result<Vec<DynamicObject>> {
    let rendered = config::render(opts)?;

    let mut opts = opts.clone();
    opts.config_sha1 = rendered.sha1.clone();

    let mut objects = vec![
        to_dynamic(&build_config_map(&opts, &rendered))?,
        to_dynamic(&build_service_account(&opts))?,
    ];
    for component in opts.components() {
        objects.extend(build_component(&opts, component)?);
    }
    objects.push(to_dynamic(&services::build_gossip_ring_service(&opts))?);

    tracing::debug!(stack = %opts.name, objects = objects.len(), "synthesized manifests");
    Ok(objects)
}

/// Workload, services and disruption budget of one component
pub fn build_component(opts: &Options, component: Component) -> Result<Vec<DynamicObject>> {
    let mut workload = workload::build_workload(opts, component)?;
    let template = workload
        .pod_template_mut()
        .ok_or_else(|| EngineError::build(component.as_str(), "workload has no pod template"))?;
    mutate::apply_all(template, opts, component)?;

    let mut objects = vec![workload.to_dynamic()?];
    for service in services::build_services(opts, component) {
        objects.push(to_dynamic(&service)?);
    }
    if let Some(pdb) = pdb::build_pod_disruption_budget(opts, component) {
        objects.push(to_dynamic(&pdb)?);
    }
    Ok(objects)
}

pub fn build_config_map(opts: &Options, rendered: &RenderedConfig) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(var::config_map_name(&opts.name)),
            labels: Some(var::common_labels(&opts.name)),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (var::CONFIG_FILE_NAME.to_string(), rendered.config.clone()),
            (
                var::RUNTIME_CONFIG_FILE_NAME.to_string(),
                rendered.runtime_config.clone(),
            ),
        ])),
        ..Default::default()
    }
}

pub fn build_service_account(opts: &Options) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(var::service_account_name(&opts.name)),
            labels: Some(var::common_labels(&opts.name)),
            ..Default::default()
        },
        automount_service_account_token: Some(true),
        ..Default::default()
    }
}

/// Convert a typed object into a [`DynamicObject`], keeping apiVersion and kind
pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject> {
    let value = serde_json::to_value(obj)?;
    Ok(serde_json::from_value(value)?)
}
