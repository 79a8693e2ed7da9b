// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State store trait and the JSON-file-backed implementation
//!
//! One JSON document per run under `<state_dir>/runs/<pipeline_id>.json`,
//! written atomically (tmp + rename + fsync) so a crash mid-write never
//! corrupts a record. Corrupt documents are quarantined to `.bak` and
//! treated as absent, letting resume degrade to a fresh run.

use crate::record::{RunRecord, StepRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use wave_core::{PipelineId, RunStatus};

/// Errors from state store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("run not found: {0}")]
    RunNotFound(String),
}

/// Persistence seam between the engine and its run records.
///
/// The event bus projects state transitions through this trait; the
/// resume manager reads prior runs back. Implementations must be safe
/// to call from multiple tasks.
pub trait StateStore: Send + Sync + 'static {
    /// Create or replace the run record.
    fn save_run(&self, run: &RunRecord) -> Result<(), StoreError>;

    /// Update the status (and `updated_at`) of an existing run.
    fn update_run_status(
        &self,
        id: &PipelineId,
        status: RunStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Insert or replace one step record of a run.
    fn upsert_step(&self, id: &PipelineId, step: &StepRecord) -> Result<(), StoreError>;

    /// Fetch a run record, `None` when absent.
    fn get_run(&self, id: &PipelineId) -> Result<Option<RunRecord>, StoreError>;

    /// All step records of a run, in insertion order.
    fn get_steps(&self, id: &PipelineId) -> Result<Vec<StepRecord>, StoreError>;
}

/// On-disk document: the run plus its steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunDocument {
    run: RunRecord,
    #[serde(default)]
    steps: Vec<StepRecord>,
}

/// File-backed state store.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    runs_dir: PathBuf,
}

impl JsonStateStore {
    /// Store rooted at `<state_dir>/runs/`.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            runs_dir: state_dir.into().join("runs"),
        }
    }

    fn run_path(&self, id: &PipelineId) -> PathBuf {
        self.runs_dir.join(format!("{}.json", id))
    }

    /// Save atomically: write to `.tmp`, fsync, rename over the target.
    fn save_document(&self, path: &Path, doc: &RunDocument) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, doc)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load a document; corrupt files are moved aside and reported absent.
    fn load_document(&self, path: &Path) -> Result<Option<RunDocument>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(path)?;
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                let backup = path.with_extension("bak");
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "corrupt run record, quarantining"
                );
                if let Err(rename_err) = fs::rename(path, &backup) {
                    warn!(error = %rename_err, "failed to quarantine corrupt run record");
                }
                Ok(None)
            }
        }
    }

    fn modify(
        &self,
        id: &PipelineId,
        apply: impl FnOnce(&mut RunDocument),
    ) -> Result<(), StoreError> {
        let path = self.run_path(id);
        let mut doc = self
            .load_document(&path)?
            .ok_or_else(|| StoreError::RunNotFound(id.to_string()))?;
        apply(&mut doc);
        self.save_document(&path, &doc)
    }
}

impl StateStore for JsonStateStore {
    fn save_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let path = self.run_path(&run.pipeline_id);
        // Preserve existing steps when the run record is re-saved
        let steps = self
            .load_document(&path)?
            .map(|doc| doc.steps)
            .unwrap_or_default();
        self.save_document(
            &path,
            &RunDocument {
                run: run.clone(),
                steps,
            },
        )
    }

    fn update_run_status(
        &self,
        id: &PipelineId,
        status: RunStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.modify(id, |doc| {
            doc.run.status = status;
            doc.run.updated_at = updated_at;
        })
    }

    fn upsert_step(&self, id: &PipelineId, step: &StepRecord) -> Result<(), StoreError> {
        self.modify(id, |doc| {
            match doc.steps.iter_mut().find(|s| s.step_id == step.step_id) {
                Some(existing) => *existing = step.clone(),
                None => doc.steps.push(step.clone()),
            }
        })
    }

    fn get_run(&self, id: &PipelineId) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.load_document(&self.run_path(id))?.map(|doc| doc.run))
    }

    fn get_steps(&self, id: &PipelineId) -> Result<Vec<StepRecord>, StoreError> {
        Ok(self
            .load_document(&self.run_path(id))?
            .map(|doc| doc.steps)
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
