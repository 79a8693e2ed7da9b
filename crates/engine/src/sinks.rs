// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in event sinks

use crate::bus::EventSink;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use wave_core::{Event, StepState};
use wave_storage::{StateStore, StepRecord};

/// Writes every event as one JSON object per line.
///
/// Never throttled: structured consumers get the full stream.
pub struct NdjsonSink<W: Write + Send + 'static> {
    writer: W,
}

impl<W: Write + Send + 'static> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send + 'static> EventSink for NdjsonSink<W> {
    fn emit(&mut self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(line) => {
                if writeln!(self.writer, "{}", line).is_err() {
                    tracing::warn!("ndjson sink write failed");
                }
                let _ = self.writer.flush();
            }
            Err(e) => tracing::warn!(error = %e, "ndjson sink serialization failed"),
        }
    }
}

/// Projects step state transitions into the state store.
///
/// Retry counts are derived from `retrying` events; timestamps from the
/// events that carry the transition. Store errors are logged; the run
/// must not fail because a dashboard record did.
pub struct StateStoreSink {
    store: Arc<dyn StateStore>,
}

impl StateStoreSink {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

impl EventSink for StateStoreSink {
    fn emit(&mut self, event: &Event) {
        let Some(step_id) = &event.step_id else {
            return;
        };
        if !event.state.is_transition() || event.state == StepState::Resuming {
            return;
        }

        let existing = match self.store.get_steps(&event.pipeline_id) {
            Ok(steps) => steps.into_iter().find(|s| s.step_id == *step_id),
            Err(e) => {
                tracing::warn!(error = %e, "state store read failed");
                None
            }
        };
        let mut record = existing.unwrap_or_else(|| StepRecord::pending(step_id.clone()));

        record.state = event.state;
        match event.state {
            StepState::Running => {
                if record.started_at.is_none() {
                    record.started_at = Some(event.timestamp);
                }
            }
            StepState::Retrying => {
                record.retry_count += 1;
                record.error_message = event.message.clone();
            }
            StepState::Completed | StepState::Failed | StepState::Skipped => {
                record.completed_at = Some(event.timestamp);
                if event.state != StepState::Completed {
                    record.error_message = event.message.clone();
                }
            }
            _ => {}
        }
        if let Some(path) = &event.workspace_path {
            record.workspace_path = Some(path.into());
        }

        if let Err(e) = self.store.upsert_step(&event.pipeline_id, &record) {
            tracing::warn!(error = %e, step_id = %step_id, "state store write failed");
        }
    }
}

/// Collects events in memory, for tests and summaries.
#[derive(Clone, Default)]
pub struct CollectSink {
    events: Arc<Mutex<Vec<Event>>>,
    throttled: bool,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variant that behaves like a human-facing sink (throttled stream).
    pub fn throttled() -> Self {
        Self {
            events: Arc::default(),
            throttled: true,
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// `(step_id, state)` pairs, for terse assertions.
    pub fn transitions(&self) -> Vec<(String, StepState)> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.state.is_transition())
            .map(|e| {
                (
                    e.step_id
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                    e.state,
                )
            })
            .collect()
    }
}

impl EventSink for CollectSink {
    fn emit(&mut self, event: &Event) {
        self.events.lock().push(event.clone());
    }

    fn throttle_stream(&self) -> bool {
        self.throttled
    }
}

#[cfg(test)]
#[path = "sinks_tests.rs"]
mod tests;
