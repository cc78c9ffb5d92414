//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error")]
    Template(#[from] TemplateError),

    #[error("Failed to build {component} manifests: {message}")]
    Build { component: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn build(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Build {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    SyntaxError,
    TypeError,
    Other,
}

/// A rendering failure located in one of the embedded templates
#[derive(Error, Debug, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(lokistack::template::render))]
pub struct TemplateError {
    pub message: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,
}

impl TemplateError {
    /// Wrap a MiniJinja error with the template it came from
    pub fn from_minijinja(err: minijinja::Error, template_name: &str, template_source: &str) -> Self {
        let kind = match err.kind() {
            minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
            minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
            minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
            minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
                TemplateErrorKind::TypeError
            }
            _ => TemplateErrorKind::Other,
        };

        let message = format!(
            "{}: {}",
            template_name,
            err.to_string().replace("undefined value", "undefined variable")
        );
        let span = err
            .line()
            .and_then(|line| calculate_span(template_source, line));

        Self {
            message,
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
        }
    }
}

/// Span covering a 1-based line of the template source
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;

    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }

    None
}

pub type Result<T> = std::result::Result<T, EngineError>;
