//! LokiStack Engine - configuration rendering and manifest synthesis
//!
//! This crate turns a defaulted stack into:
//! - Loki's `config.yaml` and `runtime-config.yaml`, rendered with MiniJinja
//! - The ordered set of Kubernetes objects that run the stack
//!
//! Nothing here talks to the cluster; the same [`Options`] always produce
//! byte-identical output.

pub mod config;
pub mod error;
pub mod filters;
pub mod manifests;
pub mod options;

pub use config::{RenderedConfig, render};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use manifests::{build_all, build_component, to_dynamic};
pub use options::{DEFAULT_LOKI_IMAGE, Options};
