//! Crd command - print the LokiStack CustomResourceDefinition

use kube::CustomResourceExt;

use lokistack_core::LokiStack;

use crate::error::{CliError, Result};

pub fn run() -> Result<()> {
    let yaml = serde_yaml::to_string(&LokiStack::crd())
        .map_err(|e| CliError::internal(format!("failed to serialize CRD: {}", e)))?;
    print!("{}", yaml);
    Ok(())
}
