// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event records emitted by the pipeline engine
//!
//! Events are the single observable surface of a run: every component
//! publishes them to the event bus, which fans out to terminal displays,
//! NDJSON writers, and the state store. One event serializes to one
//! NDJSON line; consumers filter by `state`.

use crate::id::{PipelineId, StepId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State carried by an event.
///
/// The first six values are step lifecycle transitions; the rest are
/// informational stream states that sinks may drop under pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
    Skipped,
    StreamActivity,
    StepProgress,
    Heartbeat,
    Resuming,
}

impl StepState {
    /// Lifecycle transitions must reach every sink; the rest are
    /// droppable under backpressure.
    pub fn is_transition(&self) -> bool {
        matches!(
            self,
            StepState::Pending
                | StepState::Running
                | StepState::Completed
                | StepState::Failed
                | StepState::Retrying
                | StepState::Skipped
                | StepState::Resuming
        )
    }

    /// True for terminal step states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed | StepState::Failed | StepState::Skipped
        )
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepState::Pending => "pending",
            StepState::Running => "running",
            StepState::Completed => "completed",
            StepState::Failed => "failed",
            StepState::Retrying => "retrying",
            StepState::Skipped => "skipped",
            StepState::StreamActivity => "stream_activity",
            StepState::StepProgress => "step_progress",
            StepState::Heartbeat => "heartbeat",
            StepState::Resuming => "resuming",
        };
        write!(f, "{}", s)
    }
}

/// Overall status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One event on the run's stream.
///
/// Optional fields are omitted from the wire form when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub pipeline_id: PipelineId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    pub state: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_activity: Option<String>,
    /// Step workspace path, set on `running` events so state-store
    /// projections can persist it for resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<String>,
}

impl Event {
    /// Pipeline-scoped event with no step.
    pub fn pipeline(timestamp: DateTime<Utc>, pipeline_id: PipelineId, state: StepState) -> Self {
        Self {
            timestamp,
            pipeline_id,
            step_id: None,
            state,
            persona: None,
            adapter: None,
            model: None,
            duration_ms: None,
            tokens_used: None,
            completed_steps: None,
            total_steps: None,
            progress_pct: None,
            estimated_time_ms: None,
            message: None,
            tool_activity: None,
            workspace_path: None,
        }
    }

    /// Step-scoped event.
    pub fn step(
        timestamp: DateTime<Utc>,
        pipeline_id: PipelineId,
        step_id: StepId,
        state: StepState,
    ) -> Self {
        let mut event = Self::pipeline(timestamp, pipeline_id, state);
        event.step_id = Some(step_id);
        event
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_tokens(mut self, tokens_used: u64) -> Self {
        self.tokens_used = Some(tokens_used);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_tool_activity(mut self, activity: impl Into<String>) -> Self {
        self.tool_activity = Some(activity.into());
        self
    }

    pub fn with_workspace_path(mut self, path: impl Into<String>) -> Self {
        self.workspace_path = Some(path.into());
        self
    }

    /// Attach run-level progress counters.
    pub fn with_progress(mut self, completed: usize, total: usize) -> Self {
        self.completed_steps = Some(completed);
        self.total_steps = Some(total);
        if total > 0 {
            self.progress_pct = Some((completed as f64 / total as f64) * 100.0);
        }
        self
    }

    pub fn with_estimated_time_ms(mut self, estimate: u64) -> Self {
        self.estimated_time_ms = Some(estimate);
        self
    }

    /// Events that must never be dropped by a saturated sink.
    pub fn is_essential(&self) -> bool {
        self.state.is_transition()
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
