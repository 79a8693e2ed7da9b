// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).single().unwrap()
}

#[test]
fn step_event_serializes_snake_case_state() {
    let event = Event::step(
        ts(),
        PipelineId::new("p-1"),
        StepId::new("plan"),
        StepState::StreamActivity,
    )
    .with_tool_activity("Read `main.rs`");

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["state"], "stream_activity");
    assert_eq!(json["step_id"], "plan");
    assert_eq!(json["tool_activity"], "Read `main.rs`");
}

#[test]
fn unset_fields_are_omitted_from_wire_form() {
    let event = Event::pipeline(ts(), PipelineId::new("p-1"), StepState::Running);
    let json = serde_json::to_string(&event).unwrap();
    assert!(!json.contains("persona"));
    assert!(!json.contains("duration_ms"));
    assert!(!json.contains("step_id"));
}

#[test]
fn ndjson_line_round_trips() {
    let event = Event::step(
        ts(),
        PipelineId::new("p-1"),
        StepId::new("build"),
        StepState::Completed,
    )
    .with_persona("architect")
    .with_adapter("claude")
    .with_duration_ms(1234)
    .with_tokens(567);

    let line = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&line).unwrap();
    assert_eq!(back, event);
}

#[test]
fn transitions_are_essential_stream_states_are_not() {
    for state in [
        StepState::Pending,
        StepState::Running,
        StepState::Completed,
        StepState::Failed,
        StepState::Retrying,
        StepState::Skipped,
        StepState::Resuming,
    ] {
        assert!(state.is_transition(), "{state} should be a transition");
    }
    for state in [
        StepState::StreamActivity,
        StepState::StepProgress,
        StepState::Heartbeat,
    ] {
        assert!(!state.is_transition(), "{state} should be droppable");
    }
}

#[test]
fn with_progress_computes_percentage() {
    let event = Event::pipeline(ts(), PipelineId::new("p-1"), StepState::StepProgress)
        .with_progress(1, 4);
    assert_eq!(event.completed_steps, Some(1));
    assert_eq!(event.total_steps, Some(4));
    assert_eq!(event.progress_pct, Some(25.0));
}

#[test]
fn with_progress_handles_zero_total() {
    let event =
        Event::pipeline(ts(), PipelineId::new("p-1"), StepState::StepProgress).with_progress(0, 0);
    assert_eq!(event.progress_pct, None);
}

#[test]
fn terminal_states() {
    assert!(StepState::Completed.is_terminal());
    assert!(StepState::Failed.is_terminal());
    assert!(StepState::Skipped.is_terminal());
    assert!(!StepState::Running.is_terminal());
    assert!(!StepState::Retrying.is_terminal());
}
