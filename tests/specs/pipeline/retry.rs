//! S2: contract failure with `on_failure: retry`.

use crate::prelude::*;
use serde_json::json;
use similar_asserts::assert_eq;
use tokio_util::sync::CancellationToken;
use wave_adapters::ScriptedRun;
use wave_core::{RunStatus, StepState};
use wave_storage::StateStore;

const PIPELINE: &str = r#"
kind: Pipeline
metadata: { name: retrying }
steps:
  - id: a
    persona: builder
    exec: { type: inline, source: "Produce the plan." }
    output_artifacts:
      - path: out.json
    handover:
      contract:
        schema: s.json
        source: out.json
        on_failure: retry
        max_retries: 2
"#;

const SCHEMA: &str = r#"{
  "type": "object",
  "required": ["goal"],
  "properties": { "goal": { "type": "string" } }
}"#;

#[tokio::test]
async fn invalid_then_valid_artifact_retries_once() {
    let spec = Spec::new();
    spec.write_contract("s.json", SCHEMA);
    // First attempt: prose with no recoverable JSON shape for "goal"
    spec.runner
        .script("a", ScriptedRun::writing(&[("out.json", r#"{"oops": true}"#)]));
    // Second attempt: valid
    spec.runner
        .script("a", ScriptedRun::writing(&[("out.json", r#"{"goal": "ship"}"#)]));

    let summary = spec
        .executor()
        .execute(
            CancellationToken::new(),
            &pipeline(PIPELINE),
            &spec.manifest,
            json!({}),
            spec.options(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(
        spec.transitions(),
        vec![
            ("a".to_string(), StepState::Running),
            ("a".to_string(), StepState::Retrying),
            ("a".to_string(), StepState::Running),
            ("a".to_string(), StepState::Completed),
        ]
    );

    // retry_count == 1 persisted on the step record
    let steps = spec.store.get_steps(&summary.pipeline_id).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].retry_count, 1);
    assert_eq!(steps[0].state, StepState::Completed);

    // The second prompt carried the validator detail forward
    let invocations = spec.runner.invocations_of("a");
    assert_eq!(invocations.len(), 2);
    assert!(invocations[1]
        .prompt
        .contains("Previous attempt failed validation"));
}

#[tokio::test]
async fn exhausted_retries_fail_the_run() {
    let spec = Spec::new();
    spec.write_contract("s.json", SCHEMA);
    spec.runner
        .script("a", ScriptedRun::writing(&[("out.json", r#"{"oops": true}"#)]));

    let summary = spec
        .executor()
        .execute(
            CancellationToken::new(),
            &pipeline(PIPELINE),
            &spec.manifest,
            json!({}),
            spec.options(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Failed);
    // initial attempt + max_retries
    assert_eq!(spec.runner.invocations_of("a").len(), 3);

    let steps = spec.store.get_steps(&summary.pipeline_id).unwrap();
    assert_eq!(steps[0].state, StepState::Failed);
    assert_eq!(steps[0].retry_count, 2);
    let error = steps[0].error_message.as_deref().unwrap();
    assert!(error.contains("contract"), "got: {error}");
}
