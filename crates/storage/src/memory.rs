// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory state store for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::record::{RunRecord, StepRecord};
use crate::store::{StateStore, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use wave_core::{PipelineId, RunStatus};

#[derive(Default)]
struct Inner {
    runs: HashMap<PipelineId, RunRecord>,
    steps: HashMap<PipelineId, Vec<StepRecord>>,
}

/// State store holding everything in memory; cloneable and shared.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All runs, for assertions.
    pub fn runs(&self) -> Vec<RunRecord> {
        self.inner.lock().runs.values().cloned().collect()
    }
}

impl StateStore for MemoryStateStore {
    fn save_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .runs
            .insert(run.pipeline_id.clone(), run.clone());
        Ok(())
    }

    fn update_run_status(
        &self,
        id: &PipelineId,
        status: RunStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let run = inner
            .runs
            .get_mut(id)
            .ok_or_else(|| StoreError::RunNotFound(id.to_string()))?;
        run.status = status;
        run.updated_at = updated_at;
        Ok(())
    }

    fn upsert_step(&self, id: &PipelineId, step: &StepRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.runs.contains_key(id) {
            return Err(StoreError::RunNotFound(id.to_string()));
        }
        let steps = inner.steps.entry(id.clone()).or_default();
        match steps.iter_mut().find(|s| s.step_id == step.step_id) {
            Some(existing) => *existing = step.clone(),
            None => steps.push(step.clone()),
        }
        Ok(())
    }

    fn get_run(&self, id: &PipelineId) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.inner.lock().runs.get(id).cloned())
    }

    fn get_steps(&self, id: &PipelineId) -> Result<Vec<StepRecord>, StoreError> {
        Ok(self.inner.lock().steps.get(id).cloned().unwrap_or_default())
    }
}
