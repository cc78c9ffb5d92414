//! Render command - produce the configuration and manifests of a stack offline

use console::style;
use kube::api::DynamicObject;
use std::fs;
use std::path::{Path, PathBuf};

use lokistack_core::{
    DegradedError, LokiStack, apply_default_settings, build_schema_config, extract_secrets,
};
use lokistack_engine::{Options, build_all, render};
use lokistack_kube::CLUSTER_SCOPED_KINDS;

use crate::commands::{load_secret, load_stack, reference_time};
use crate::config::OperatorConfig;
use crate::error::{CliError, Result};

/// Arguments of `lokistack render`
pub struct RenderArgs<'a> {
    pub stack: &'a Path,
    pub secret: &'a Path,
    pub namespace: Option<&'a str>,
    pub at: Option<&'a str>,
    pub output_dir: Option<&'a Path>,
    pub config_only: bool,
    pub operator: &'a OperatorConfig,
}

pub fn run(args: RenderArgs<'_>) -> Result<()> {
    let stack = load_stack(args.stack, args.namespace)?;
    let secret = load_secret(args.secret)?;
    let now = reference_time(args.at)?;

    let expected = &stack.spec.storage.secret.name;
    if secret.metadata.name.as_deref() != Some(expected.as_str()) {
        tracing::warn!(
            expected = %expected,
            found = secret.metadata.name.as_deref().unwrap_or_default(),
            "secret name does not match spec.storage.secret.name"
        );
    }

    let opts = build_options(&stack, &secret, now, args.operator)?;
    tracing::debug!(lokistack = %opts.name, namespace = %opts.namespace, "rendering stack");

    if args.config_only {
        let rendered = render(&opts)?;
        println!("{}", style(format!("# config.yaml (sha1 {})", rendered.sha1)).dim());
        println!("{}", rendered.config.trim_end());
        println!("---");
        println!("{}", style("# runtime-config.yaml").dim());
        println!("{}", rendered.runtime_config.trim_end());
        return Ok(());
    }

    let mut objects = build_all(&opts)?;
    for obj in &mut objects {
        let cluster_scoped = obj
            .types
            .as_ref()
            .is_some_and(|t| CLUSTER_SCOPED_KINDS.contains(&t.kind.as_str()));
        if !cluster_scoped {
            obj.metadata.namespace = Some(opts.namespace.clone());
        }
    }

    match args.output_dir {
        Some(dir) => write_objects(dir, &objects),
        None => print_objects(&objects),
    }
}

/// Run every pure stage of the reconcile pipeline
pub fn build_options(
    stack: &LokiStack,
    secret: &k8s_openapi::api::core::v1::Secret,
    now: chrono::DateTime<chrono::Utc>,
    operator: &OperatorConfig,
) -> Result<Options> {
    let name = stack.metadata.name.as_deref().unwrap_or_default();
    let namespace = stack.metadata.namespace.as_deref().unwrap_or_default();

    let mut object_storage = extract_secrets(stack.spec.storage.secret.type_, secret)?;
    let previous = stack.status.as_ref().map(|s| &s.storage);
    object_storage.schemas =
        build_schema_config(now, &stack.spec.storage, previous).map_err(DegradedError::from)?;
    let defaulted = apply_default_settings(&stack.spec)?;

    Ok(Options::new(name, namespace, defaulted, object_storage)
        .with_image(operator.image())
        .with_node_affinity(operator.node_affinity))
}

fn object_id(obj: &DynamicObject) -> (String, String) {
    let kind = obj.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
    let name = obj.metadata.name.clone().unwrap_or_default();
    (kind, name)
}

fn print_objects(objects: &[DynamicObject]) -> Result<()> {
    for obj in objects {
        let (kind, name) = object_id(obj);
        let yaml = serde_yaml::to_string(obj)
            .map_err(|e| CliError::internal(format!("failed to serialize {}/{}: {}", kind, name, e)))?;
        println!("---");
        println!("{}", style(format!("# {}/{}", kind, name)).dim());
        println!("{}", yaml.trim_end());
    }
    Ok(())
}

fn write_objects(dir: &Path, objects: &[DynamicObject]) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| CliError::io(dir, e))?;

    for (index, obj) in objects.iter().enumerate() {
        let (kind, name) = object_id(obj);
        let path: PathBuf = dir.join(format!("{:02}-{}-{}.yaml", index, kind.to_lowercase(), name));
        let yaml = serde_yaml::to_string(obj)
            .map_err(|e| CliError::internal(format!("failed to serialize {}/{}: {}", kind, name, e)))?;
        fs::write(&path, yaml).map_err(|e| CliError::io(&path, e))?;
        println!("{} {}", style("wrote").green(), path.display());
    }
    Ok(())
}
