//! Core error types

use thiserror::Error;

use crate::status::ConditionReason;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid stack configuration: {message}")]
    Config { message: String },

    #[error("Invalid duration '{value}' for {field}")]
    InvalidDuration { field: String, value: String },
}

impl CoreError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Invalid user input that blocks convergence.
///
/// Degraded errors never fail the reconcile loop. They are written to the
/// stack status as a `Degraded` condition carrying `reason`, and the caller
/// decides whether to requeue based on `requeue`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cluster degraded: {message}")]
pub struct DegradedError {
    pub message: String,
    pub reason: ConditionReason,
    pub requeue: bool,
}

impl DegradedError {
    pub fn new(reason: ConditionReason, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reason,
            requeue: false,
        }
    }

    /// Ask the scheduler to retry after a bounded delay
    pub fn with_requeue(mut self) -> Self {
        self.requeue = true;
        self
    }
}
