//! CLI commands

pub mod crd;
pub mod render;
pub mod run;
pub mod validate;

use chrono::{DateTime, Utc};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use serde::de::DeserializeOwned;
use std::path::Path;

use lokistack_core::LokiStack;

use crate::error::{CliError, Result};

/// Namespace used when neither the flag nor the manifest sets one
pub const DEFAULT_NAMESPACE: &str = "default";

fn read_yaml<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    serde_yaml::from_str(&content).map_err(|e| {
        CliError::validation_with_help(
            format!("failed to parse {} from {}: {}", what, path.display(), e),
            format!("expected a single {} manifest in YAML", what),
        )
    })
}

/// Load a LokiStack manifest, placing it in `namespace` when given
pub fn load_stack(path: &Path, namespace: Option<&str>) -> Result<LokiStack> {
    let mut stack: LokiStack = read_yaml(path, "LokiStack")?;
    if stack.metadata.name.is_none() {
        return Err(CliError::validation(format!(
            "{}: LokiStack has no metadata.name",
            path.display()
        )));
    }
    if let Some(ns) = namespace {
        stack.metadata.namespace = Some(ns.to_string());
    }
    stack
        .metadata
        .namespace
        .get_or_insert_with(|| DEFAULT_NAMESPACE.to_string());
    Ok(stack)
}

/// Load a Secret manifest, folding `stringData` into `data` the way the API server does
pub fn load_secret(path: &Path) -> Result<Secret> {
    let mut secret: Secret = read_yaml(path, "Secret")?;
    if let Some(string_data) = secret.string_data.take() {
        let data = secret.data.get_or_insert_with(Default::default);
        for (key, value) in string_data {
            data.insert(key, ByteString(value.into_bytes()));
        }
    }
    Ok(secret)
}

/// Reference time for schema validation, `now` unless overridden
pub fn reference_time(at: Option<&str>) -> Result<DateTime<Utc>> {
    match at {
        None => Ok(Utc::now()),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                CliError::validation_with_help(
                    format!("invalid --at time '{}': {}", value, e),
                    "use RFC 3339, e.g. 2024-06-01T00:00:00Z",
                )
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_secret_folds_string_data() {
        let file = write_temp(
            r#"
apiVersion: v1
kind: Secret
metadata:
  name: loki-s3
data:
  bucketnames: bG9raQ==
stringData:
  endpoint: https://s3.example.com
"#,
        );
        let secret = load_secret(file.path()).unwrap();
        let data = secret.data.unwrap();
        assert_eq!(data["bucketnames"].0, b"loki");
        assert_eq!(data["endpoint"].0, b"https://s3.example.com");
        assert!(secret.string_data.is_none());
    }

    #[test]
    fn test_load_stack_namespace() {
        let file = write_temp(
            r#"
apiVersion: loki.grafana.com/v1
kind: LokiStack
metadata:
  name: dev
spec:
  size: 1x.demo
  storage:
    schemas:
      - version: v13
        effectiveDate: "2024-01-01"
    secret:
      type: s3
      name: loki-s3
"#,
        );
        let stack = load_stack(file.path(), None).unwrap();
        assert_eq!(stack.metadata.namespace.as_deref(), Some(DEFAULT_NAMESPACE));

        let stack = load_stack(file.path(), Some("obs")).unwrap();
        assert_eq!(stack.metadata.namespace.as_deref(), Some("obs"));
    }

    #[test]
    fn test_reference_time() {
        let at = reference_time(Some("2024-06-01T00:00:00Z")).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-06-01T00:00:00+00:00");
        assert!(reference_time(Some("yesterday")).is_err());
    }
}
