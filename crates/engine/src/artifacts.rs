// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory artifact map for one run

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use wave_core::StepId;

/// `(step_id, artifact_name) -> absolute path`, written through by the
/// step executor after contract validation and read by downstream
/// workspace setup. Writers are serialized by the pipeline executor;
/// readers only see completed steps' entries.
#[derive(Debug, Default)]
pub struct ArtifactMap {
    inner: RwLock<HashMap<(StepId, String), PathBuf>>,
}

impl ArtifactMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, step_id: StepId, name: impl Into<String>, path: PathBuf) {
        self.inner.write().insert((step_id, name.into()), path);
    }

    pub fn get(&self, step_id: &StepId, name: &str) -> Option<PathBuf> {
        self.inner
            .read()
            .get(&(step_id.clone(), name.to_string()))
            .cloned()
    }

    /// All entries, sorted by (step, name) for stable summaries.
    pub fn snapshot(&self) -> Vec<((StepId, String), PathBuf)> {
        let mut entries: Vec<_> = self
            .inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
