// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use thiserror::Error;
use wave_pipeline::PlanError;
use wave_storage::StoreError;

/// Errors that abort a run before or outside step execution.
///
/// Step-local failures are not errors at this level: they mark the step
/// failed, skip its consumers, and surface through the run summary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("pipeline `{0}` is disabled")]
    Disabled(String),
    #[error("persona not found in manifest: {0}")]
    UnknownPersona(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no prior run found for `{0}`")]
    RunNotFound(String),
    #[error("internal error: {0}; please report this")]
    Internal(String),
}
