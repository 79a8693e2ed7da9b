//! S1: two-step pipeline with contract-checked handover.

use crate::prelude::*;
use serde_json::json;
use similar_asserts::assert_eq;
use tokio_util::sync::CancellationToken;
use wave_adapters::ScriptedRun;
use wave_core::{RunStatus, StepState, TokenUsage};
use wave_storage::StateStore;

const PIPELINE: &str = r#"
kind: Pipeline
metadata:
  name: review
  description: Plan then write
input:
  source: issues
steps:
  - id: a
    persona: architect
    exec: { type: inline, source: "Plan issue ${input.issue}" }
    output_artifacts:
      - path: out.json
    handover:
      contract:
        schema: s.json
        source: out.json
  - id: b
    persona: builder
    dependencies: [a]
    memory:
      inject_artifacts:
        - { step: a, artifact: out.json, as: plan }
    exec: { type: inline, source: "Write final from ${artifact.plan}" }
    output_artifacts:
      - path: final.md
"#;

const SCHEMA: &str = r#"{
  "type": "object",
  "required": ["goal"],
  "properties": { "goal": { "type": "string" } }
}"#;

#[tokio::test]
async fn two_step_handover_completes_in_order() {
    let spec = Spec::new();
    spec.write_contract("s.json", SCHEMA);
    spec.runner.script(
        "a",
        ScriptedRun::writing(&[("out.json", r#"{"goal": "ship it"}"#)]).with_usage(TokenUsage {
            input_tokens: 1000,
            output_tokens: 200,
            cache_creation_input_tokens: 50,
            cache_read_input_tokens: 9999,
        }),
    );
    spec.runner
        .script("b", ScriptedRun::writing(&[("final.md", "# done")]));

    let summary = spec
        .executor()
        .execute(
            CancellationToken::new(),
            &pipeline(PIPELINE),
            &spec.manifest,
            json!({"issue": "42"}),
            spec.options(),
        )
        .await
        .unwrap();

    // Events observed in order: A running/completed, then B
    assert_eq!(
        spec.transitions(),
        vec![
            ("a".to_string(), StepState::Running),
            ("a".to_string(), StepState::Completed),
            ("b".to_string(), StepState::Running),
            ("b".to_string(), StepState::Completed),
        ]
    );

    // Artifact map ends with both artifacts
    assert_eq!(summary.status, RunStatus::Completed);
    let names: Vec<String> = summary
        .artifacts
        .iter()
        .map(|((step, name), _)| format!("{step}/{name}"))
        .collect();
    assert_eq!(names, vec!["a/out.json", "b/final.md"]);

    // Token accounting excludes cache reads: 1000 + 200 + 50
    assert_eq!(summary.tokens_total, 1250);

    // Run record persisted as completed
    let record = spec.store.get_run(&summary.pipeline_id).unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Completed);

    // The running event resolved persona, adapter, and model
    let running = spec
        .events
        .events()
        .into_iter()
        .find(|e| e.state == StepState::Running)
        .unwrap();
    assert_eq!(running.persona.as_deref(), Some("architect"));
    assert_eq!(running.adapter.as_deref(), Some("claude"));
    assert_eq!(running.model.as_deref(), Some("opus"));
}
