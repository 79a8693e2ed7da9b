//! S3: matrix fan-out over an upstream work list.

use crate::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wave_adapters::{FakeFailure, ScriptedRun};
use wave_core::RunStatus;

const PIPELINE: &str = r#"
kind: Pipeline
metadata: { name: fanout }
steps:
  - id: plan
    persona: architect
    exec: { type: inline, source: "List the work." }
    output_artifacts:
      - path: work.json
  - id: m
    persona: builder
    dependencies: [plan]
    memory:
      inject_artifacts:
        - { step: plan, artifact: work.json, as: work }
    exec: { type: inline, source: "Handle ${item.id}" }
    output_artifacts:
      - path: out.json
    strategy:
      type: matrix
      items_source: "$.work.ids"
      item_key: id
      max_concurrency: 2
"#;

#[tokio::test]
async fn three_items_three_ordered_worker_results() {
    let spec = Spec::new();
    spec.runner.script(
        "plan",
        ScriptedRun::writing(&[("work.json", r#"{"work": {"ids": ["a", "b", "c"]}}"#)]),
    );
    spec.runner
        .script("m", ScriptedRun::writing(&[("out.json", "{}")]));

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

    // Three worker workspaces were created
    let invocations = spec.runner.invocations_of("m");
    assert_eq!(invocations.len(), 3);
    for i in 0..3 {
        assert!(
            invocations
                .iter()
                .any(|inv| inv.workspace.ends_with(format!("m/worker_{i}"))),
            "missing worker_{i} workspace"
        );
    }

    // worker_results has length 3 with indices 0,1,2 lined up to items
    let aggregate_path = summary
        .artifacts
        .iter()
        .find(|((step, name), _)| *step == "m" && name == "matrix-result.json")
        .map(|(_, path)| path.clone())
        .unwrap();
    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&aggregate_path).unwrap()).unwrap();
    assert_eq!(doc["items"], json!(["a", "b", "c"]));
    let results = doc["worker_results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result["index"], i);
        assert_eq!(result["status"], "completed");
    }
    assert_eq!(doc["succeeded"], 3);
    assert_eq!(doc["failed"], 0);
}

#[tokio::test]
async fn partial_worker_failure_still_completes_the_step() {
    let spec = Spec::new();
    spec.runner.script(
        "plan",
        ScriptedRun::writing(&[("work.json", r#"{"work": {"ids": ["a", "b"]}}"#)]),
    );
    // First worker fails, second succeeds (scripts consumed in order)
    spec.runner.script(
        "m",
        ScriptedRun::failing(FakeFailure::NonZeroExit {
            code: 1,
            stderr_tail: "worker died".to_string(),
        }),
    );
    spec.runner
        .script("m", ScriptedRun::writing(&[("out.json", "{}")]));

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

    // At least one worker succeeded, so the step (and run) completed
    assert_eq!(summary.status, RunStatus::Completed);

    let aggregate_path = summary
        .artifacts
        .iter()
        .find(|((step, name), _)| *step == "m" && name == "matrix-result.json")
        .map(|(_, path)| path.clone())
        .unwrap();
    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&aggregate_path).unwrap()).unwrap();
    assert_eq!(doc["succeeded"], 1);
    assert_eq!(doc["failed"], 1);
}

#[tokio::test]
async fn all_workers_failing_fails_the_step() {
    let spec = Spec::new();
    spec.runner.script(
        "plan",
        ScriptedRun::writing(&[("work.json", r#"{"work": {"ids": ["a", "b"]}}"#)]),
    );
    spec.runner.script(
        "m",
        ScriptedRun::failing(FakeFailure::NonZeroExit {
            code: 1,
            stderr_tail: String::new(),
        }),
    );

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
    assert_eq!(summary.failed.len(), 1);
}
