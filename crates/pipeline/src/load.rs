// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! YAML loading for pipeline and manifest documents

use crate::def::PipelineDef;
use crate::manifest::Manifest;
use thiserror::Error;

/// Errors loading a pipeline or manifest document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unexpected document kind `{found}` (expected `{expected}`)")]
    WrongKind { expected: &'static str, found: String },
    #[error("pipeline has no steps")]
    Empty,
}

/// Parse a pipeline document from YAML text.
///
/// Only well-formedness is checked here; graph validation happens in
/// [`crate::plan`].
pub fn load_pipeline_str(yaml: &str) -> Result<PipelineDef, LoadError> {
    let def: PipelineDef = serde_yaml::from_str(yaml)?;
    if def.kind != "Pipeline" {
        return Err(LoadError::WrongKind {
            expected: "Pipeline",
            found: def.kind,
        });
    }
    if def.steps.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(def)
}

/// Parse a root manifest from YAML text.
pub fn load_manifest_str(yaml: &str) -> Result<Manifest, LoadError> {
    let manifest: Manifest = serde_yaml::from_str(yaml)?;
    if manifest.kind != "Manifest" {
        return Err(LoadError::WrongKind {
            expected: "Manifest",
            found: manifest.kind,
        });
    }
    Ok(manifest)
}

#[cfg(test)]
#[path = "load_tests.rs"]
mod tests;
