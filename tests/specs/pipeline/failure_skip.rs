//! S4: a failing step marks its transitive consumers skipped.

use crate::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wave_adapters::{FakeFailure, ScriptedRun};
use wave_core::{RunStatus, StepState};
use wave_storage::StateStore;

pub const CHAIN: &str = r#"
kind: Pipeline
metadata: { name: chain }
steps:
  - id: a
    persona: builder
    exec: { type: inline, source: "step a" }
    output_artifacts:
      - path: out.json
  - id: b
    persona: builder
    dependencies: [a]
    memory:
      inject_artifacts:
        - { step: a, artifact: out.json, as: plan }
    exec: { type: inline, source: "step b" }
    output_artifacts:
      - path: mid.json
  - id: c
    persona: builder
    dependencies: [b]
    memory:
      inject_artifacts:
        - { step: b, artifact: mid.json, as: mid }
    exec: { type: inline, source: "step c" }
"#;

#[tokio::test]
async fn chain_failure_skips_downstream_and_fails_the_run() {
    let spec = Spec::new();
    spec.runner.script(
        "a",
        ScriptedRun::failing(FakeFailure::NonZeroExit {
            code: 1,
            stderr_tail: "model refused".to_string(),
        }),
    );

    let summary = spec
        .executor()
        .execute(
            CancellationToken::new(),
            &pipeline(CHAIN),
            &spec.manifest,
            json!({}),
            spec.options(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.skipped.len(), 2);

    // b and c emitted skipped events naming a as the root cause
    let events = spec.events.events();
    let skipped: Vec<_> = events
        .iter()
        .filter(|e| e.state == StepState::Skipped)
        .collect();
    assert_eq!(skipped.len(), 2);
    for event in &skipped {
        assert!(event.message.as_deref().unwrap().contains("`a`"));
    }

    // Step records: a failed with the adapter error, b and c skipped
    let steps = spec.store.get_steps(&summary.pipeline_id).unwrap();
    let state_of = |id: &str| steps.iter().find(|s| s.step_id == *id).unwrap().state;
    assert_eq!(state_of("a"), StepState::Failed);
    assert_eq!(state_of("b"), StepState::Skipped);
    assert_eq!(state_of("c"), StepState::Skipped);

    let error = steps
        .iter()
        .find(|s| s.step_id == *"a")
        .unwrap()
        .error_message
        .as_deref()
        .unwrap();
    assert!(error.contains("model refused"), "got: {error}");
}
