// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Matrix and worker-pool aggregation
//!
//! A fanned-out step produces one synthetic artifact,
//! `matrix-result.json`, aggregating every worker's outcome. Worker
//! results are ordered by item index regardless of completion order, so
//! downstream consumers can line results up with `items_source`.

use crate::artifacts::ArtifactMap;
use crate::contract::recover_json;
use crate::step::StepError;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use wave_core::ErrorKind;
use wave_pipeline::StepDef;

/// Name of the synthetic aggregate artifact.
pub(crate) const MATRIX_RESULT: &str = "matrix-result.json";

/// One worker's contribution to the aggregate.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct WorkerReport {
    pub index: usize,
    /// `completed` or `failed`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub artifacts: Vec<String>,
    #[serde(skip)]
    pub workspace: PathBuf,
    #[serde(skip)]
    pub tokens: u64,
}

#[derive(Debug, Serialize)]
struct Aggregate<'a> {
    items: &'a [Value],
    worker_results: &'a [WorkerReport],
    worker_workspaces: Vec<String>,
    succeeded: usize,
    failed: usize,
}

/// Resolve the matrix item list from an injected upstream artifact.
///
/// `items_source` forms:
/// - `<as>#<pointer>`: explicit injected artifact by logical name
/// - `/a/b`: JSON pointer into the first injected artifact
/// - `$.a.b`: JSONPath-style dotted form of the same
pub(crate) fn resolve_items(step: &StepDef, artifacts: &ArtifactMap) -> Result<Vec<Value>, StepError> {
    let matrix = step.matrix().ok_or_else(|| {
        StepError::new(ErrorKind::Internal, "resolve_items on a non-matrix step")
    })?;

    let (as_name, pointer) = match matrix.items_source.split_once('#') {
        Some((name, pointer)) => (Some(name), pointer),
        None => (None, matrix.items_source.as_str()),
    };

    let inject = match as_name {
        Some(name) => step
            .memory
            .inject_artifacts
            .iter()
            .find(|i| i.as_name == name),
        None => step.memory.inject_artifacts.first(),
    }
    .ok_or_else(|| {
        StepError::new(
            ErrorKind::Contract,
            format!(
                "items_source `{}` needs an inject_artifacts entry to read from",
                matrix.items_source
            ),
        )
    })?;

    let path = artifacts.get(&inject.step, &inject.artifact).ok_or_else(|| {
        StepError::new(
            ErrorKind::Contract,
            format!(
                "artifact `{}` from step `{}` is not in the artifact map",
                inject.artifact, inject.step
            ),
        )
    })?;
    let text = std::fs::read_to_string(&path).map_err(|e| {
        StepError::new(ErrorKind::Resource, format!("{}: {}", path.display(), e))
    })?;
    let doc = recover_json(&text)
        .map_err(|e| StepError::new(ErrorKind::Contract, format!("{}: {}", path.display(), e)))?;

    let items = doc
        .pointer(&normalize_pointer(pointer))
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| {
            StepError::new(
                ErrorKind::Contract,
                format!(
                    "items_source `{}` did not resolve to an array in `{}`",
                    matrix.items_source,
                    path.display()
                ),
            )
        })?;
    Ok(items)
}

/// `$.a.b` and `a.b` become `/a/b`; pointers pass through; empty means
/// the document root.
fn normalize_pointer(source: &str) -> String {
    if source.is_empty() || source.starts_with('/') {
        return source.to_string();
    }
    let dotted = source.strip_prefix("$.").or_else(|| source.strip_prefix('$')).unwrap_or(source);
    if dotted.is_empty() {
        return String::new();
    }
    format!("/{}", dotted.replace('.', "/"))
}

/// Write `matrix-result.json` into the step's aggregate directory.
///
/// `reports` must already be sorted by index.
pub(crate) fn write_aggregate(
    dir: &Path,
    items: &[Value],
    reports: &[WorkerReport],
) -> Result<PathBuf, StepError> {
    let succeeded = reports.iter().filter(|r| r.status == "completed").count();
    let failed = reports.len() - succeeded;
    let aggregate = Aggregate {
        items,
        worker_results: reports,
        worker_workspaces: reports
            .iter()
            .map(|r| r.workspace.to_string_lossy().into_owned())
            .collect(),
        succeeded,
        failed,
    };

    std::fs::create_dir_all(dir)
        .map_err(|e| StepError::new(ErrorKind::Resource, e.to_string()))?;
    let path = dir.join(MATRIX_RESULT);
    let json = serde_json::to_string_pretty(&aggregate)
        .map_err(|e| StepError::new(ErrorKind::Internal, e.to_string()))?;
    std::fs::write(&path, json)
        .map_err(|e| StepError::new(ErrorKind::Resource, e.to_string()))?;
    Ok(path)
}

#[cfg(test)]
#[path = "matrix_tests.rs"]
mod tests;
