//! Validate command - check a stack and its storage secret without a cluster

use console::style;
use std::path::Path;

use lokistack_core::{DegradedError, apply_default_settings, build_schema_config, extract_secrets};
use lokistack_engine::{Options, build_all};

use crate::commands::{load_secret, load_stack, reference_time};
use crate::config::OperatorConfig;
use crate::display::ValidationReport;
use crate::error::{CliError, Result};

pub fn run(
    stack_path: &Path,
    secret_path: Option<&Path>,
    at: Option<&str>,
    json_output: bool,
    operator: &OperatorConfig,
) -> Result<()> {
    let stack = load_stack(stack_path, None)?;
    let now = reference_time(at)?;
    let stack_file = stack_path.display().to_string();
    let name = stack.metadata.name.clone().unwrap_or_default();

    if !json_output {
        println!(
            "{} Validating LokiStack {} ({})",
            style("→").blue(),
            name,
            stack.spec.size
        );
    }

    let mut report = ValidationReport::new();

    let previous = stack.status.as_ref().map(|s| &s.storage);
    let schemas = match build_schema_config(now, &stack.spec.storage, previous) {
        Ok(schemas) => Some(schemas),
        Err(errors) => {
            for violation in errors.violations() {
                report.add_error(
                    &stack_file,
                    &violation.field,
                    &violation.message,
                    Some(format!("value: {}", violation.value)),
                );
            }
            None
        }
    };

    let defaulted = match apply_default_settings(&stack.spec) {
        Ok(defaulted) => Some(defaulted),
        Err(e) => {
            report.add_error(&stack_file, "spec", &e.to_string(), None);
            None
        }
    };

    let storage = match secret_path {
        None => {
            report.add_warning(
                &stack_file,
                "spec.storage.secret",
                "no secret given, object storage not checked",
                Some("pass --secret <file>".to_string()),
            );
            None
        }
        Some(path) => {
            let secret = load_secret(path)?;
            match extract_secrets(stack.spec.storage.secret.type_, &secret) {
                Ok(storage) => Some(storage),
                Err(DegradedError { message, reason, .. }) => {
                    report.add_error(
                        &path.display().to_string(),
                        "data",
                        &message,
                        Some(format!("reported on the stack as {}", reason)),
                    );
                    None
                }
            }
        }
    };

    if let (Some(schemas), Some(defaulted), Some(mut storage)) = (schemas, defaulted, storage) {
        storage.schemas = schemas;
        let namespace = stack.metadata.namespace.as_deref().unwrap_or_default();
        let opts = Options::new(&name, namespace, defaulted, storage)
            .with_image(operator.image())
            .with_node_affinity(operator.node_affinity);
        match build_all(&opts) {
            Ok(objects) => report.validated_count = objects.len(),
            Err(e) => report.add_error(&stack_file, "", &CliError::from(e).to_string(), None),
        }
    }

    let (errors, _) = report.summary();
    if json_output {
        let output = serde_json::json!({
            "valid": errors == 0,
            "stack": {
                "name": name,
                "size": stack.spec.size.as_str(),
            },
            "objects": report.validated_count,
            "errors": report.issues.iter().map(|issue| {
                serde_json::json!({
                    "file": issue.file,
                    "path": issue.path,
                    "message": issue.message,
                    "severity": issue.severity.as_str(),
                })
            }).collect::<Vec<_>>(),
        });
        let text = serde_json::to_string_pretty(&output)
            .map_err(|e| CliError::internal(e.to_string()))?;
        println!("{}", text);
    } else {
        report.display();
        println!();
        report.print_summary();
    }

    if errors > 0 {
        return Err(CliError::ValidationFailed { errors });
    }
    Ok(())
}
