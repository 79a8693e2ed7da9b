//! S5: resuming a failed run skips intact completed steps.

use crate::pipeline_failure_skip::CHAIN;
use crate::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wave_adapters::{FakeFailure, ScriptedRun};
use wave_core::{RunStatus, StepId, StepState};
use wave_storage::StateStore;

/// Fail at b, resume, and finish b and c without re-running a.
#[tokio::test]
async fn resume_after_failure_skips_completed_steps() {
    let spec = Spec::new();
    spec.runner
        .script("a", ScriptedRun::writing(&[("out.json", r#"{"n": 1}"#)]));
    spec.runner.script(
        "b",
        ScriptedRun::failing(FakeFailure::NonZeroExit {
            code: 1,
            stderr_tail: "first try".to_string(),
        }),
    );

    let def = pipeline(CHAIN);
    let first = spec
        .executor()
        .execute(
            CancellationToken::new(),
            &def,
            &spec.manifest,
            json!({"issue": 7}),
            spec.options_with_id("chain-1"),
        )
        .await
        .unwrap();
    assert_eq!(first.status, RunStatus::Failed);
    let a_workspace = spec.workspace_root.path().join("chain-1/a");
    assert!(a_workspace.join("out.json").exists(), "kept for resume");

    // Second run: b and c succeed
    spec.runner
        .script("b", ScriptedRun::writing(&[("mid.json", r#"{"ok": true}"#)]));
    spec.runner.script("c", ScriptedRun::writing(&[]));

    let resumed = spec
        .executor()
        .resume(
            CancellationToken::new(),
            &def,
            &spec.manifest,
            "chain-1".into(),
            None,
            spec.options(),
        )
        .await
        .unwrap();

    assert_eq!(resumed.status, RunStatus::Completed);
    // a skipped (already invoked exactly once across both runs)
    assert_eq!(spec.runner.invocations_of("a").len(), 1);
    assert_eq!(spec.runner.invocations_of("b").len(), 2);
    assert_eq!(spec.runner.invocations_of("c").len(), 1);

    // A synthetic completed event replayed a's success
    let synthetic: Vec<_> = spec
        .events
        .events()
        .into_iter()
        .filter(|e| e.message.as_deref() == Some("completed in prior run"))
        .collect();
    assert_eq!(synthetic.len(), 1);
    assert_eq!(synthetic[0].step_id.as_ref().unwrap().as_str(), "a");
    assert_eq!(synthetic[0].duration_ms, Some(0));
    assert_eq!(synthetic[0].state, StepState::Completed);

    // b's prompt on resume still saw a's artifact
    let b_prompt = &spec.runner.invocations_of("b")[1].prompt;
    assert!(b_prompt.contains("step b"));

    let record = spec.store.get_run(&resumed.pipeline_id).unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Completed);
}

/// `from_step` forces everything at and after the cutoff to re-run.
#[tokio::test]
async fn resume_from_step_reruns_the_cutoff_step() {
    let spec = Spec::new();
    spec.runner
        .script("a", ScriptedRun::writing(&[("out.json", r#"{"n": 1}"#)]));
    spec.runner
        .script("b", ScriptedRun::writing(&[("mid.json", r#"{"ok": 1}"#)]));
    spec.runner.script(
        "c",
        ScriptedRun::failing(FakeFailure::NonZeroExit {
            code: 1,
            stderr_tail: String::new(),
        }),
    );

    let def = pipeline(CHAIN);
    let first = spec
        .executor()
        .execute(
            CancellationToken::new(),
            &def,
            &spec.manifest,
            json!({}),
            spec.options_with_id("chain-2"),
        )
        .await
        .unwrap();
    assert_eq!(first.status, RunStatus::Failed);

    spec.runner
        .script("b", ScriptedRun::writing(&[("mid.json", r#"{"ok": 2}"#)]));
    spec.runner.script("c", ScriptedRun::writing(&[]));

    let resumed = spec
        .executor()
        .resume(
            CancellationToken::new(),
            &def,
            &spec.manifest,
            "chain-2".into(),
            Some(StepId::new("b")),
            spec.options(),
        )
        .await
        .unwrap();

    assert_eq!(resumed.status, RunStatus::Completed);
    // a never re-ran; b re-ran despite its prior success
    assert_eq!(spec.runner.invocations_of("a").len(), 1);
    assert_eq!(spec.runner.invocations_of("b").len(), 2);
}

/// A vanished workspace demotes the step: it re-runs instead of skipping.
#[tokio::test]
async fn resume_reruns_steps_whose_workspace_is_gone() {
    let spec = Spec::new();
    spec.runner
        .script("a", ScriptedRun::writing(&[("out.json", r#"{"n": 1}"#)]));
    spec.runner.script(
        "b",
        ScriptedRun::failing(FakeFailure::NonZeroExit {
            code: 1,
            stderr_tail: String::new(),
        }),
    );

    let def = pipeline(CHAIN);
    spec.executor()
        .execute(
            CancellationToken::new(),
            &def,
            &spec.manifest,
            json!({}),
            spec.options_with_id("chain-3"),
        )
        .await
        .unwrap();

    // Wipe a's workspace behind the engine's back
    std::fs::remove_dir_all(spec.workspace_root.path().join("chain-3/a")).unwrap();

    spec.runner
        .script("b", ScriptedRun::writing(&[("mid.json", "{}")]));
    spec.runner.script("c", ScriptedRun::writing(&[]));

    let resumed = spec
        .executor()
        .resume(
            CancellationToken::new(),
            &def,
            &spec.manifest,
            "chain-3".into(),
            None,
            spec.options(),
        )
        .await
        .unwrap();

    assert_eq!(resumed.status, RunStatus::Completed);
    // a re-ran because its artifacts were gone
    assert_eq!(spec.runner.invocations_of("a").len(), 2);
}

/// Resuming an unknown run is an error, not a fresh run.
#[tokio::test]
async fn resume_unknown_run_is_rejected() {
    let spec = Spec::new();
    let err = spec
        .executor()
        .resume(
            CancellationToken::new(),
            &pipeline(CHAIN),
            &spec.manifest,
            "never-ran".into(),
            None,
            spec.options(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no prior run"));
}
