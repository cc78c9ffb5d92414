//! Object storage credential resolution
//!
//! Reads the storage secret once per reconcile, fingerprints its content
//! and extracts the backend-specific settings needed to render the Loki
//! configuration. Secret values are never kept beyond the fingerprint and
//! the non-sensitive fields below; credentials reach the pods through
//! secret key references.

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

use crate::error::DegradedError;
use crate::stack::{CredentialMode, ObjectStorageSchema, ObjectStorageSecretType};
use crate::status::ConditionReason;

/// Secret keys per backend
pub mod keys {
    pub const S3_BUCKETS: &str = "bucketnames";
    pub const S3_ENDPOINT: &str = "endpoint";
    pub const S3_ACCESS_KEY_ID: &str = "access_key_id";
    pub const S3_ACCESS_KEY_SECRET: &str = "access_key_secret";
    pub const S3_REGION: &str = "region";
    pub const S3_FORCE_PATH_STYLE: &str = "forcepathstyle";

    pub const GCS_BUCKET: &str = "bucketname";
    pub const GCS_KEY_JSON: &str = "key.json";

    pub const AZURE_ENVIRONMENT: &str = "environment";
    pub const AZURE_CONTAINER: &str = "container";
    pub const AZURE_ACCOUNT_NAME: &str = "account_name";
    pub const AZURE_ACCOUNT_KEY: &str = "account_key";
    pub const AZURE_ENDPOINT_SUFFIX: &str = "endpoint_suffix";
}

const AZURE_ENVIRONMENTS: &[&str] = &[
    "AzureGlobal",
    "AzureChinaCloud",
    "AzureGermanCloud",
    "AzureUSGovernment",
];

/// Resolved object storage settings for one reconcile
#[derive(Debug, Clone, PartialEq)]
pub struct StorageOptions {
    /// Reduced schema list, filled in after schema validation
    pub schemas: Vec<ObjectStorageSchema>,
    pub shared_store: ObjectStorageSecretType,
    pub credential_mode: CredentialMode,
    pub secret_name: String,
    /// Fingerprint of the secret content
    pub secret_sha1: String,
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    S3(S3StorageConfig),
    Gcs(GcsStorageConfig),
    Azure(AzureStorageConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct S3StorageConfig {
    pub endpoint: String,
    pub region: Option<String>,
    /// Comma separated bucket list
    pub buckets: String,
    pub force_path_style: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GcsStorageConfig {
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AzureStorageConfig {
    pub environment: String,
    pub container: String,
    pub endpoint_suffix: Option<String>,
}

/// Degraded error for a secret that does not exist
pub fn missing_secret(name: &str) -> DegradedError {
    DegradedError::new(
        ConditionReason::MissingObjectStorageSecret,
        format!("missing object storage secret '{}'", name),
    )
    .with_requeue()
}

/// SHA-1 over the secret content, independent of key order.
///
/// Each pair contributes `key,value,` in ascending key order.
pub fn hash_secret_data(data: &BTreeMap<String, ByteString>) -> String {
    let mut hasher = Sha1::new();
    for (key, value) in data {
        hasher.update(key.as_bytes());
        hasher.update(b",");
        hasher.update(&value.0);
        hasher.update(b",");
    }
    hex::encode(hasher.finalize())
}

/// Extract backend settings from the storage secret
pub fn extract_secrets(
    secret_type: ObjectStorageSecretType,
    secret: &Secret,
) -> Result<StorageOptions, DegradedError> {
    let secret_name = secret.metadata.name.clone().unwrap_or_default();
    let empty = BTreeMap::new();
    let data = secret.data.as_ref().unwrap_or(&empty);
    let fields = SecretFields { data };

    let backend = match secret_type {
        ObjectStorageSecretType::S3 => BackendConfig::S3(extract_s3(&fields)?),
        ObjectStorageSecretType::Gcs => BackendConfig::Gcs(extract_gcs(&fields)?),
        ObjectStorageSecretType::Azure => BackendConfig::Azure(extract_azure(&fields)?),
        ObjectStorageSecretType::Swift | ObjectStorageSecretType::AlibabaCloud => {
            return Err(invalid(format!(
                "unsupported object storage type: {}",
                secret_type
            )));
        }
    };

    tracing::debug!(
        secret = %secret_name,
        backend = %secret_type,
        "resolved object storage secret"
    );

    Ok(StorageOptions {
        schemas: Vec::new(),
        shared_store: secret_type,
        credential_mode: CredentialMode::Static,
        secret_sha1: hash_secret_data(data),
        secret_name,
        backend,
    })
}

fn invalid(message: String) -> DegradedError {
    DegradedError::new(ConditionReason::InvalidObjectStorageSecret, message)
}

struct SecretFields<'a> {
    data: &'a BTreeMap<String, ByteString>,
}

impl SecretFields<'_> {
    fn optional(&self, key: &str) -> Result<Option<String>, DegradedError> {
        match self.data.get(key) {
            None => Ok(None),
            Some(value) => {
                let text = String::from_utf8(value.0.clone())
                    .map_err(|_| invalid(format!("secret field is not valid UTF-8: {}", key)))?;
                let text = text.trim().to_string();
                Ok((!text.is_empty()).then_some(text))
            }
        }
    }

    fn required(&self, key: &str) -> Result<String, DegradedError> {
        self.optional(key)?
            .ok_or_else(|| invalid(format!("missing secret field: {}", key)))
    }
}

fn extract_s3(fields: &SecretFields<'_>) -> Result<S3StorageConfig, DegradedError> {
    let buckets = fields.required(keys::S3_BUCKETS)?;
    let endpoint = fields.required(keys::S3_ENDPOINT)?;
    validate_endpoint(&endpoint)?;
    fields.required(keys::S3_ACCESS_KEY_ID)?;
    fields.required(keys::S3_ACCESS_KEY_SECRET)?;

    let force_path_style = match fields.optional(keys::S3_FORCE_PATH_STYLE)? {
        None => false,
        Some(v) => v.parse::<bool>().map_err(|_| {
            invalid(format!(
                "secret field {} must be true or false, got '{}'",
                keys::S3_FORCE_PATH_STYLE,
                v
            ))
        })?,
    };

    Ok(S3StorageConfig {
        endpoint,
        region: fields.optional(keys::S3_REGION)?,
        buckets,
        force_path_style,
    })
}

fn validate_endpoint(endpoint: &str) -> Result<(), DegradedError> {
    let parsed = url::Url::parse(endpoint).map_err(|e| {
        invalid(format!(
            "{}: failed to parse endpoint '{}': {}",
            keys::S3_ENDPOINT,
            endpoint,
            e
        ))
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!(
            "{}: endpoint '{}' must use the http or https scheme",
            keys::S3_ENDPOINT,
            endpoint
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid(format!(
            "{}: endpoint '{}' has no host",
            keys::S3_ENDPOINT,
            endpoint
        )));
    }
    Ok(())
}

fn extract_gcs(fields: &SecretFields<'_>) -> Result<GcsStorageConfig, DegradedError> {
    let bucket = fields.required(keys::GCS_BUCKET)?;
    let key = fields.required(keys::GCS_KEY_JSON)?;
    serde_json::from_str::<serde_json::Value>(&key).map_err(|e| {
        invalid(format!("{} is not valid JSON: {}", keys::GCS_KEY_JSON, e))
    })?;
    Ok(GcsStorageConfig { bucket })
}

fn extract_azure(fields: &SecretFields<'_>) -> Result<AzureStorageConfig, DegradedError> {
    let environment = fields.required(keys::AZURE_ENVIRONMENT)?;
    if !AZURE_ENVIRONMENTS.contains(&environment.as_str()) {
        return Err(invalid(format!(
            "{}: unknown azure environment '{}'",
            keys::AZURE_ENVIRONMENT,
            environment
        )));
    }
    let container = fields.required(keys::AZURE_CONTAINER)?;
    fields.required(keys::AZURE_ACCOUNT_NAME)?;
    fields.required(keys::AZURE_ACCOUNT_KEY)?;

    Ok(AzureStorageConfig {
        environment,
        container,
        endpoint_suffix: fields.optional(keys::AZURE_ENDPOINT_SUFFIX)?,
    })
}
