//! Object storage schema lifecycle
//!
//! The schema list selects the index and chunk format Loki uses for data
//! written on or after each effective date. Once a schema entry is in effect
//! its date and version are frozen, otherwise readers would interpret
//! already-written data with the wrong format.
//!
//! An entry counts as in effect when its date is at or before
//! `now + SCHEMA_CUTOFF_MARGIN`. Entries beyond the cutoff may be edited or
//! removed freely.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::error::DegradedError;
use crate::stack::{ObjectStorageSchema, ObjectStorageSpec, SchemaVersion, StorageStatus};
use crate::status::ConditionReason;

/// Distance ahead of `now` inside which schema entries are frozen.
///
/// Must stay larger than the reconcile interval.
pub const SCHEMA_CUTOFF_MARGIN: Duration = Duration::from_secs(2 * 60 * 60);

const SCHEMAS_FIELD: &str = "spec.storage.schemas";

/// A single rule violation with the field it applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub field: String,
    pub value: String,
    pub message: String,
}

impl SchemaViolation {
    fn new(field: impl Into<String>, value: impl Into<String>, message: &str) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.message, self.value)
    }
}

/// Every violation found in one validation pass
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid object storage schema: {}", join_violations(.0))]
pub struct SchemaValidationErrors(pub Vec<SchemaViolation>);

impl SchemaValidationErrors {
    pub fn violations(&self) -> &[SchemaViolation] {
        &self.0
    }
}

fn join_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<SchemaValidationErrors> for DegradedError {
    fn from(err: SchemaValidationErrors) -> Self {
        DegradedError::new(ConditionReason::InvalidObjectStorageSchema, err.to_string())
    }
}

/// Boundary between frozen and editable entries
pub fn schema_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now + TimeDelta::seconds(SCHEMA_CUTOFF_MARGIN.as_secs() as i64)
}

/// Sort by effective date and collapse consecutive entries sharing a version.
///
/// The sort is stable, so entries with equal dates keep their input order.
pub fn reduce_schemas(schemas: &[ObjectStorageSchema]) -> Vec<ObjectStorageSchema> {
    let mut sorted = schemas.to_vec();
    sorted.sort_by(|a, b| a.effective_date.cmp(&b.effective_date));

    let mut reduced: Vec<ObjectStorageSchema> = Vec::with_capacity(sorted.len());
    for schema in sorted {
        if reduced.last().is_some_and(|last| last.version == schema.version) {
            continue;
        }
        reduced.push(schema);
    }
    reduced
}

/// Check the declared schema list against previously applied history.
///
/// All violations are collected before returning.
pub fn validate_schemas(
    spec: &[ObjectStorageSchema],
    applied: &[ObjectStorageSchema],
    now: DateTime<Utc>,
) -> Result<(), SchemaValidationErrors> {
    let cutoff = schema_cutoff(now);
    let mut violations = Vec::new();

    // Status entries already in effect, keyed by date
    let frozen: BTreeMap<&str, SchemaVersion> = applied
        .iter()
        .filter(|s| s.effective_date.utc_time().is_ok_and(|t| t < cutoff))
        .map(|s| (s.effective_date.as_str(), s.version))
        .collect();

    let reduced = reduce_schemas(spec);
    let mut seen_dates = HashSet::new();
    let mut found_frozen = HashSet::new();
    let mut found_valid_start = false;

    for (index, schema) in spec.iter().enumerate() {
        let field = format!("{}[{}].effectiveDate", SCHEMAS_FIELD, index);
        let date = schema.effective_date.as_str();

        if !seen_dates.insert(date) {
            violations.push(SchemaViolation::new(field.clone(), date, "effective dates are not unique"));
        }

        let effective = match schema.effective_date.utc_time() {
            Ok(t) => t,
            Err(_) => {
                violations.push(SchemaViolation::new(field, date, "failed to parse effective date"));
                continue;
            }
        };

        if effective > cutoff {
            continue;
        }
        found_valid_start = true;

        match frozen.get(date) {
            Some(version) => {
                found_frozen.insert(date);
                if *version != schema.version {
                    violations.push(SchemaViolation::new(
                        format!("{}[{}].version", SCHEMAS_FIELD, index),
                        schema.version.as_str(),
                        "cannot retroactively change schema",
                    ));
                }
            }
            // A new entry inside the cutoff only matters when it changes the
            // version step function; same-version padding is harmless.
            None if !frozen.is_empty() && reduced.contains(schema) => {
                violations.push(SchemaViolation::new(field, date, "cannot retroactively add schema"));
            }
            None => {}
        }
    }

    if !found_valid_start {
        violations.push(SchemaViolation::new(
            SCHEMAS_FIELD,
            format!("{} entries", spec.len()),
            "schema does not contain a valid starting effective date",
        ));
    }

    for date in frozen.keys().filter(|d| !found_frozen.contains(*d)) {
        violations.push(SchemaViolation::new(
            SCHEMAS_FIELD,
            *date,
            "cannot retroactively remove schema",
        ));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaValidationErrors(violations))
    }
}

/// Validate the declared schemas and return the reduced list to persist in status
pub fn build_schema_config(
    now: DateTime<Utc>,
    spec: &ObjectStorageSpec,
    status: Option<&StorageStatus>,
) -> Result<Vec<ObjectStorageSchema>, SchemaValidationErrors> {
    let applied = status.map(|s| s.schemas.as_slice()).unwrap_or_default();
    validate_schemas(&spec.schemas, applied, now)?;
    Ok(reduce_schemas(&spec.schemas))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn schema(version: SchemaVersion, date: &str) -> ObjectStorageSchema {
        ObjectStorageSchema::new(version, date)
    }

    fn messages(err: &SchemaValidationErrors) -> Vec<&str> {
        err.violations().iter().map(|v| v.message.as_str()).collect()
    }

    #[test]
    fn test_reduce_collapses_same_version_runs() {
        let input = vec![
            schema(SchemaVersion::V11, "2024-02-01"),
            schema(SchemaVersion::V12, "2024-03-01"),
            schema(SchemaVersion::V11, "2024-01-01"),
        ];
        assert_eq!(
            reduce_schemas(&input),
            vec![
                schema(SchemaVersion::V11, "2024-01-01"),
                schema(SchemaVersion::V12, "2024-03-01"),
            ]
        );
    }

    #[test]
    fn test_reduce_keeps_version_changes_back() {
        let input = vec![
            schema(SchemaVersion::V11, "2024-01-01"),
            schema(SchemaVersion::V12, "2024-02-01"),
            schema(SchemaVersion::V11, "2024-03-01"),
        ];
        assert_eq!(reduce_schemas(&input).len(), 3);
    }

    #[test]
    fn test_first_reconcile_accepts_any_valid_history() {
        let spec = vec![
            schema(SchemaVersion::V11, "2023-01-01"),
            schema(SchemaVersion::V13, "2024-01-01"),
        ];
        assert!(validate_schemas(&spec, &[], now()).is_ok());
    }

    #[test]
    fn test_removing_applied_entry_fails() {
        let applied = vec![schema(SchemaVersion::V11, "2024-01-01")];
        let spec = vec![schema(SchemaVersion::V12, "2024-02-01")];

        let err = validate_schemas(&spec, &applied, now()).unwrap_err();
        assert!(messages(&err).contains(&"cannot retroactively remove schema"));
    }

    #[test]
    fn test_changing_applied_version_fails() {
        let applied = vec![schema(SchemaVersion::V11, "2024-01-01")];
        let spec = vec![schema(SchemaVersion::V12, "2024-01-01")];

        let err = validate_schemas(&spec, &applied, now()).unwrap_err();
        assert_eq!(messages(&err), vec!["cannot retroactively change schema"]);
        assert_eq!(err.violations()[0].field, "spec.storage.schemas[0].version");
    }

    #[test]
    fn test_adding_future_entry_succeeds() {
        let applied = vec![schema(SchemaVersion::V11, "2024-01-01")];
        let spec = vec![
            schema(SchemaVersion::V11, "2024-01-01"),
            schema(SchemaVersion::V13, "2024-12-01"),
        ];

        let reduced = build_schema_config(
            now(),
            &ObjectStorageSpec {
                schemas: spec,
                ..Default::default()
            },
            Some(&StorageStatus {
                schemas: applied,
                credential_mode: None,
            }),
        )
        .unwrap();
        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced[1].version, SchemaVersion::V13);
    }

    #[test]
    fn test_adding_past_entry_fails() {
        let applied = vec![schema(SchemaVersion::V11, "2024-01-01")];
        let spec = vec![
            schema(SchemaVersion::V11, "2024-01-01"),
            schema(SchemaVersion::V12, "2024-03-01"),
        ];

        let err = validate_schemas(&spec, &applied, now()).unwrap_err();
        assert_eq!(messages(&err), vec!["cannot retroactively add schema"]);
    }

    #[test]
    fn test_same_version_padding_is_allowed() {
        let applied = vec![schema(SchemaVersion::V11, "2024-01-01")];
        let spec = vec![
            schema(SchemaVersion::V11, "2024-01-01"),
            schema(SchemaVersion::V11, "2024-03-01"),
        ];
        assert!(validate_schemas(&spec, &applied, now()).is_ok());
    }

    #[test]
    fn test_entry_within_margin_is_frozen() {
        let now = Utc.with_ymd_and_hms(2024, 5, 31, 23, 0, 0).unwrap();
        let applied = vec![
            schema(SchemaVersion::V11, "2024-01-01"),
            schema(SchemaVersion::V12, "2024-06-01"),
        ];
        let spec = vec![
            schema(SchemaVersion::V11, "2024-01-01"),
            schema(SchemaVersion::V13, "2024-06-01"),
        ];

        let err = validate_schemas(&spec, &applied, now).unwrap_err();
        assert_eq!(messages(&err), vec!["cannot retroactively change schema"]);
    }

    #[test]
    fn test_only_future_entries_has_no_valid_start() {
        let spec = vec![schema(SchemaVersion::V13, "2024-12-01")];

        let err = validate_schemas(&spec, &[], now()).unwrap_err();
        assert_eq!(
            messages(&err),
            vec!["schema does not contain a valid starting effective date"]
        );
        assert_eq!(err.violations()[0].field, "spec.storage.schemas");
    }

    #[test]
    fn test_empty_spec_has_no_valid_start() {
        assert!(validate_schemas(&[], &[], now()).is_err());
    }

    #[test]
    fn test_all_violations_collected() {
        let applied = vec![
            schema(SchemaVersion::V11, "2024-01-01"),
            schema(SchemaVersion::V12, "2024-02-01"),
        ];
        let spec = vec![
            schema(SchemaVersion::V12, "2024-01-01"),
            schema(SchemaVersion::V13, "2024-01-01"),
            schema(SchemaVersion::V13, "2024-99-01"),
        ];

        let err = validate_schemas(&spec, &applied, now()).unwrap_err();
        assert_eq!(
            messages(&err),
            vec![
                "cannot retroactively change schema",
                "effective dates are not unique",
                "cannot retroactively change schema",
                "failed to parse effective date",
                "cannot retroactively remove schema",
            ]
        );
        assert_eq!(err.violations()[1].field, "spec.storage.schemas[1].effectiveDate");
        assert_eq!(err.violations()[4].value, "2024-02-01");
    }

    #[test]
    fn test_schema_errors_become_degraded() {
        let err = validate_schemas(&[], &[], now()).unwrap_err();
        let degraded: DegradedError = err.into();
        assert_eq!(degraded.reason, ConditionReason::InvalidObjectStorageSchema);
        assert!(!degraded.requeue);
        assert!(degraded.message.contains("valid starting effective date"));
    }

    #[test]
    fn test_duplicate_frozen_date_reports_every_violation() {
        let applied = vec![schema(SchemaVersion::V12, "2024-01-01")];
        let spec = vec![
            schema(SchemaVersion::V12, "2024-01-01"),
            schema(SchemaVersion::V13, "2024-01-01"),
        ];

        let err = validate_schemas(&spec, &applied, now()).unwrap_err();
        assert_eq!(
            messages(&err),
            vec!["effective dates are not unique", "cannot retroactively change schema"]
        );
        assert_eq!(err.violations()[0].field, "spec.storage.schemas[1].effectiveDate");
        assert_eq!(err.violations()[1].field, "spec.storage.schemas[1].version");
    }
}
