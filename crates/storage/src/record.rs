// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted run and step records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use wave_core::{PipelineId, RunStatus, StepId, StepState};

/// One pipeline run, as persisted for resume and dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub pipeline_id: PipelineId,
    pub pipeline_name: String,
    #[serde(default)]
    pub input_payload: serde_json::Value,
    pub status: RunStatus,
    /// Content hash of the pipeline definition; resume warns when the
    /// definition changed since the prior run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// Fresh record in `running` status.
    pub fn new(
        pipeline_id: PipelineId,
        pipeline_name: impl Into<String>,
        input_payload: serde_json::Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            pipeline_id,
            pipeline_name: pipeline_name.into(),
            input_payload,
            status: RunStatus::Running,
            pipeline_hash: None,
            started_at,
            updated_at: started_at,
        }
    }

    pub fn with_pipeline_hash(mut self, hash: impl Into<String>) -> Self {
        self.pipeline_hash = Some(hash.into());
        self
    }
}

/// One step's persisted state within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: StepId,
    pub state: StepState,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    /// Fresh record in `pending` state.
    pub fn pending(step_id: StepId) -> Self {
        Self {
            step_id,
            state: StepState::Pending,
            retry_count: 0,
            workspace_path: None,
            error_message: None,
            started_at: None,
            completed_at: None,
        }
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
