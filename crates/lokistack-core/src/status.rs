//! Status condition helpers
//!
//! Conditions follow the Kubernetes API conventions: one entry per type,
//! `lastTransitionTime` only moves when the status value flips.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::stack::Condition;

pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

/// All components are converged
pub const CONDITION_READY: &str = "Ready";
/// User input blocks convergence
pub const CONDITION_DEGRADED: &str = "Degraded";
/// Convergence failed for reasons outside user input
pub const CONDITION_FAILED: &str = "Failed";

/// Machine-readable reason attached to a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionReason {
    ReadyComponents,
    FailedComponents,
    MissingObjectStorageSecret,
    InvalidObjectStorageSecret,
    InvalidObjectStorageSchema,
}

impl ConditionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionReason::ReadyComponents => "ReadyComponents",
            ConditionReason::FailedComponents => "FailedComponents",
            ConditionReason::MissingObjectStorageSecret => "MissingObjectStorageSecret",
            ConditionReason::InvalidObjectStorageSecret => "InvalidObjectStorageSecret",
            ConditionReason::InvalidObjectStorageSchema => "InvalidObjectStorageSchema",
        }
    }
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a condition stamped with `now`
pub fn build_condition(
    condition_type: &str,
    status: &str,
    reason: ConditionReason,
    message: &str,
    now: DateTime<Utc>,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: reason.as_str().to_string(),
        message: message.to_string(),
        last_transition_time: Some(now.to_rfc3339()),
        observed_generation: None,
    }
}

/// Set or update a condition, preserving lastTransitionTime when status hasn't changed
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == new.r#type) {
        if existing.status != new.status {
            *existing = new;
        } else {
            existing.reason = new.reason;
            existing.message = new.message;
            existing.observed_generation = new.observed_generation;
        }
    } else {
        conditions.push(new);
    }
}

/// Mark exactly one condition type True and every other known type False
pub fn set_exclusive_condition(conditions: &mut Vec<Condition>, active: Condition, now: DateTime<Utc>) {
    for other in [CONDITION_READY, CONDITION_DEGRADED, CONDITION_FAILED] {
        if other == active.r#type {
            continue;
        }
        if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == other) {
            if existing.status == CONDITION_TRUE {
                existing.status = CONDITION_FALSE.to_string();
                existing.last_transition_time = Some(now.to_rfc3339());
            }
        }
    }
    set_condition(conditions, active);
}
