// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use parking_lot::Mutex as PlMutex;
use serde_json::json;
use wave_core::{PipelineId, StepId};
use wave_storage::{MemoryStateStore, RunRecord, StateStore as _};

fn event(step: &str, state: StepState) -> Event {
    Event::step(Utc::now(), PipelineId::new("p-1"), StepId::new(step), state)
}

/// Shared in-memory writer for NdjsonSink assertions.
#[derive(Clone, Default)]
struct SharedBuf(Arc<PlMutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn ndjson_sink_writes_one_line_per_event() {
    let buf = SharedBuf::default();
    let mut sink = NdjsonSink::new(buf.clone());
    sink.emit(&event("a", StepState::Running));
    sink.emit(&event("a", StepState::Completed).with_tokens(42));

    let written = String::from_utf8(buf.0.lock().clone()).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["state"], "running");
    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second["tokens_used"], 42);
}

fn store_with_run() -> Arc<MemoryStateStore> {
    let store = Arc::new(MemoryStateStore::new());
    store
        .save_run(&RunRecord::new(
            PipelineId::new("p-1"),
            "test",
            json!(null),
            Utc::now(),
        ))
        .unwrap();
    store
}

#[test]
fn state_store_sink_projects_lifecycle() {
    let store = store_with_run();
    let mut sink = StateStoreSink::new(store.clone());

    sink.emit(&event("a", StepState::Running).with_workspace_path("/ws/a"));
    sink.emit(&event("a", StepState::Completed));

    let steps = store.get_steps(&PipelineId::new("p-1")).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].state, StepState::Completed);
    assert!(steps[0].started_at.is_some());
    assert!(steps[0].completed_at.is_some());
    assert_eq!(
        steps[0].workspace_path.as_deref(),
        Some(std::path::Path::new("/ws/a"))
    );
    assert!(steps[0].error_message.is_none());
}

#[test]
fn state_store_sink_counts_retries() {
    let store = store_with_run();
    let mut sink = StateStoreSink::new(store.clone());

    sink.emit(&event("a", StepState::Running));
    sink.emit(&event("a", StepState::Retrying).with_message("schema violation"));
    sink.emit(&event("a", StepState::Running));
    sink.emit(&event("a", StepState::Completed));

    let steps = store.get_steps(&PipelineId::new("p-1")).unwrap();
    assert_eq!(steps[0].retry_count, 1);
    assert_eq!(steps[0].state, StepState::Completed);
}

#[test]
fn state_store_sink_records_failure_message() {
    let store = store_with_run();
    let mut sink = StateStoreSink::new(store.clone());

    sink.emit(&event("a", StepState::Failed).with_message("[adapter] exit 1"));

    let steps = store.get_steps(&PipelineId::new("p-1")).unwrap();
    assert_eq!(steps[0].state, StepState::Failed);
    assert_eq!(steps[0].error_message.as_deref(), Some("[adapter] exit 1"));
}

#[test]
fn state_store_sink_ignores_stream_states() {
    let store = store_with_run();
    let mut sink = StateStoreSink::new(store.clone());

    sink.emit(&event("a", StepState::StreamActivity).with_tool_activity("Read `x`"));
    sink.emit(&Event::pipeline(
        Utc::now(),
        PipelineId::new("p-1"),
        StepState::Heartbeat,
    ));

    assert!(store.get_steps(&PipelineId::new("p-1")).unwrap().is_empty());
}

#[test]
fn collect_sink_transitions_filter() {
    let mut sink = CollectSink::new();
    let clone = sink.clone();
    sink.emit(&event("a", StepState::Running));
    sink.emit(&event("a", StepState::StreamActivity));
    assert_eq!(clone.transitions(), vec![("a".to_string(), StepState::Running)]);
    assert_eq!(clone.events().len(), 2);
}
