//! Stack status after a reconcile
//!
//! Exactly one of Ready, Degraded and Failed is True at a time. Storage
//! status only moves on a successful reconcile so the schema history keeps
//! reflecting what Loki actually runs with.

use chrono::{DateTime, Utc};

use lokistack_core::status::{
    CONDITION_DEGRADED, CONDITION_FAILED, CONDITION_READY, CONDITION_TRUE, build_condition,
    set_exclusive_condition,
};
use lokistack_core::{
    ConditionReason, DegradedError, LokiStack, LokiStackStatus, ObjectStorageSchema, StorageOptions,
    StorageStatus,
};

use crate::error::Result;
use crate::store::StatusWriter;

fn current(stack: &LokiStack) -> LokiStackStatus {
    stack.status.clone().unwrap_or_default()
}

/// Status after every object converged
pub fn ready_status(
    stack: &LokiStack,
    schemas: &[ObjectStorageSchema],
    storage: &StorageOptions,
    now: DateTime<Utc>,
) -> LokiStackStatus {
    let mut status = current(stack);
    status.storage = StorageStatus {
        schemas: schemas.to_vec(),
        credential_mode: Some(storage.credential_mode),
    };
    set_exclusive_condition(
        &mut status.conditions,
        build_condition(
            CONDITION_READY,
            CONDITION_TRUE,
            ConditionReason::ReadyComponents,
            "All components ready",
            now,
        ),
        now,
    );
    status
}

/// Status when user input blocks convergence
pub fn degraded_status(stack: &LokiStack, err: &DegradedError, now: DateTime<Utc>) -> LokiStackStatus {
    let mut status = current(stack);
    set_exclusive_condition(
        &mut status.conditions,
        build_condition(CONDITION_DEGRADED, CONDITION_TRUE, err.reason, &err.message, now),
        now,
    );
    status
}

/// Status when convergence failed for reasons outside user input
pub fn failed_status(stack: &LokiStack, message: &str, now: DateTime<Utc>) -> LokiStackStatus {
    let mut status = current(stack);
    set_exclusive_condition(
        &mut status.conditions,
        build_condition(
            CONDITION_FAILED,
            CONDITION_TRUE,
            ConditionReason::FailedComponents,
            message,
            now,
        ),
        now,
    );
    status
}

/// Write a status unless it is already in place
pub async fn write_status<S>(store: &S, stack: &LokiStack, status: LokiStackStatus) -> Result<()>
where
    S: StatusWriter + ?Sized,
{
    if stack.status.as_ref() == Some(&status) {
        tracing::trace!("status unchanged, skipping write");
        return Ok(());
    }
    let namespace = stack.metadata.namespace.as_deref().unwrap_or_default();
    let name = stack.metadata.name.as_deref().unwrap_or_default();
    store.update_status(namespace, name, &status).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lokistack_core::status::CONDITION_FALSE;
    use lokistack_core::{CredentialMode, LokiStackSpec, SchemaVersion};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    fn storage() -> StorageOptions {
        use lokistack_core::storage::GcsStorageConfig;
        use lokistack_core::{BackendConfig, ObjectStorageSecretType};
        StorageOptions {
            schemas: Vec::new(),
            shared_store: ObjectStorageSecretType::Gcs,
            credential_mode: CredentialMode::Static,
            secret_name: "loki-gcs".to_string(),
            secret_sha1: "abc".to_string(),
            backend: BackendConfig::Gcs(GcsStorageConfig {
                bucket: "loki".to_string(),
            }),
        }
    }

    fn condition<'a>(status: &'a LokiStackStatus, kind: &str) -> Option<&'a lokistack_core::Condition> {
        status.conditions.iter().find(|c| c.r#type == kind)
    }

    #[test]
    fn test_degraded_then_ready() {
        let mut stack = LokiStack::new("dev", LokiStackSpec::default());
        let err = lokistack_core::storage::missing_secret("loki-gcs");

        let degraded = degraded_status(&stack, &err, at(1));
        assert_eq!(condition(&degraded, CONDITION_DEGRADED).unwrap().reason, "MissingObjectStorageSecret");
        assert!(degraded.storage.schemas.is_empty());

        stack.status = Some(degraded);
        let schemas = vec![ObjectStorageSchema::new(SchemaVersion::V13, "2024-01-01")];
        let ready = ready_status(&stack, &schemas, &storage(), at(2));

        assert_eq!(condition(&ready, CONDITION_READY).unwrap().status, CONDITION_TRUE);
        let degraded = condition(&ready, CONDITION_DEGRADED).unwrap();
        assert_eq!(degraded.status, CONDITION_FALSE);
        assert_eq!(degraded.last_transition_time, Some(at(2).to_rfc3339()));
        assert_eq!(ready.storage.schemas, schemas);
        assert_eq!(ready.storage.credential_mode, Some(CredentialMode::Static));
    }

    #[test]
    fn test_failure_keeps_storage_status() {
        let mut stack = LokiStack::new("dev", LokiStackSpec::default());
        let schemas = vec![ObjectStorageSchema::new(SchemaVersion::V13, "2024-01-01")];
        stack.status = Some(ready_status(&stack, &schemas, &storage(), at(1)));

        let failed = failed_status(&stack, "failed to apply 1 object(s)", at(2));
        assert_eq!(failed.storage.schemas, schemas);
        assert_eq!(condition(&failed, CONDITION_FAILED).unwrap().reason, "FailedComponents");
        assert_eq!(condition(&failed, CONDITION_READY).unwrap().status, CONDITION_FALSE);
    }
}
