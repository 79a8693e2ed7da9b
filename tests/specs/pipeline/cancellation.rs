//! S6: cancelling the run context interrupts in-flight steps.

use crate::prelude::*;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wave_adapters::ScriptedRun;
use wave_core::{RunStatus, StepId, StepState};
use wave_storage::StateStore;

const PIPELINE: &str = r#"
kind: Pipeline
metadata: { name: long }
steps:
  - id: a
    persona: builder
    exec: { type: inline, source: "step a" }
    output_artifacts:
      - path: out.json
  - id: b
    persona: builder
    dependencies: [a]
    exec: { type: inline, source: "step b" }
"#;

#[tokio::test]
async fn cancel_during_b_interrupts_and_marks_run_cancelled() {
    let spec = Spec::new();
    spec.runner
        .script("a", ScriptedRun::writing(&[("out.json", "{}")]));
    // b hangs until the context is cancelled
    spec.runner.script("b", ScriptedRun::blocking_until_cancel());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        });
    }

    let started = Instant::now();
    let summary = spec
        .executor()
        .execute(
            cancel,
            &pipeline(PIPELINE),
            &spec.manifest,
            json!({}),
            spec.options(),
        )
        .await
        .unwrap();

    // Workers exited promptly after the cancel, well under grace + epsilon
    assert!(started.elapsed() < Duration::from_secs(6));

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.completed, vec![StepId::from("a")]);

    // b's record is failed with the cancellation kind in its message
    let steps = spec.store.get_steps(&summary.pipeline_id).unwrap();
    let b = steps.iter().find(|s| s.step_id == *"b").unwrap();
    assert_eq!(b.state, StepState::Failed);
    assert!(
        b.error_message.as_deref().unwrap().contains("[cancelled]"),
        "got: {:?}",
        b.error_message
    );

    let record = spec.store.get_run(&summary.pipeline_id).unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Cancelled);
}

#[tokio::test]
async fn already_cancelled_context_dispatches_nothing() {
    let spec = Spec::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = spec
        .executor()
        .execute(
            cancel,
            &pipeline(PIPELINE),
            &spec.manifest,
            json!({}),
            spec.options(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert!(spec.runner.invocations().is_empty());
}
