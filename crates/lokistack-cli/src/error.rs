//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use miette::Diagnostic;
use thiserror::Error;

use lokistack_core::{CoreError, DegradedError};
use lokistack_engine::EngineError;
use lokistack_kube::KubeError;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Stack or secret rejected
    #[error("Validation failed: {message}")]
    #[diagnostic(code(lokistack::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Validation found problems, already reported
    #[error("Validation failed with {errors} error(s)")]
    #[diagnostic(code(lokistack::cli::validation))]
    ValidationFailed { errors: usize },

    /// Configuration rendering or manifest synthesis failed
    #[error("Template error: {message}")]
    #[diagnostic(code(lokistack::cli::template))]
    Template {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Talking to the cluster failed
    #[error("Cluster error: {message}")]
    #[diagnostic(code(lokistack::cli::cluster))]
    Cluster { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(lokistack::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(lokistack::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } | CliError::ValidationFailed { .. } => {
                exit_codes::VALIDATION_ERROR
            }
            CliError::Template { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: None,
        }
    }

    /// Create a validation error with help text
    pub fn validation_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an IO error for a path
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{}: {}", path.display(), err),
        }
    }
}

impl From<DegradedError> for CliError {
    fn from(err: DegradedError) -> Self {
        Self::validation_with_help(err.message, format!("reported on the stack as {}", err.reason))
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Template(te) => Self::Template {
                help: Some(format!("in template {}", te.src.name())),
                message: te.message,
            },
            other => Self::Template {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Degraded(degraded) => degraded.into(),
            KubeError::Manifest(engine) => engine.into(),
            other => Self::Cluster {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use lokistack_core::ConditionReason;

    #[test]
    fn test_exit_codes() {
        let degraded = DegradedError::new(ConditionReason::InvalidObjectStorageSecret, "missing secret field: endpoint");
        let err = CliError::from(degraded);
        assert_eq!(err.exit_code(), exit_codes::VALIDATION_ERROR);
        assert_eq!(err.to_string(), "Validation failed: missing secret field: endpoint");

        let err = CliError::from(KubeError::Discovery("no api server".to_string()));
        assert_eq!(err.exit_code(), exit_codes::CLUSTER_ERROR);
    }
}
