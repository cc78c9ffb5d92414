//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - stack, secret or schema list rejected
pub const VALIDATION_ERROR: i32 = 2;

/// Template error - configuration rendering or manifest synthesis failed
pub const TEMPLATE_ERROR: i32 = 3;

/// Cluster error - the API server rejected or failed a request
pub const CLUSTER_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;
