// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const FULL_STEP: &str = r#"
id: implement
persona: builder
dependencies: [plan]
memory:
  strategy: inject
  inject_artifacts:
    - step: plan
      artifact: plan.json
      as: plan
workspace:
  root:
    repo: .
    branch_template: "__wt_${pipeline_id}_${step_id}"
  mount:
    - source: ./docs
      target: docs
      mode: ro
exec:
  type: prompt_file
  source: prompts/implement.md
  timeout_minutes: 45
output_artifacts:
  - path: out/diff.patch
    type: patch
  - path: notes.md
    required: false
handover:
  contract:
    schema: implement.schema.json
    source: out/diff.patch
    on_failure: retry
    max_retries: 3
max_concurrent_agents: 4
"#;

#[test]
fn full_step_parses() {
    let step: StepDef = serde_yaml::from_str(FULL_STEP).unwrap();
    assert_eq!(step.id, "implement");
    assert_eq!(step.persona, "builder");
    assert_eq!(step.dependencies, vec!["plan".into()]);
    assert_eq!(step.memory.strategy, "inject");
    assert_eq!(step.memory.inject_artifacts[0].as_name, "plan");
    assert!(!step.memory.inject_artifacts[0].path_only);
    assert!(step.workspace.root.is_git_worktree());
    assert_eq!(step.workspace.mount[0].mode, MountMode::Ro);
    assert_eq!(step.exec.exec_type, ExecType::PromptFile);
    assert_eq!(step.exec.timeout_minutes, Some(45));
    assert!(step.output_artifacts[0].required);
    assert!(!step.output_artifacts[1].required);
    assert_eq!(step.max_concurrent_agents, Some(4));

    let contract = step.contract().unwrap();
    assert_eq!(contract.on_failure, OnFailure::Retry);
    assert_eq!(contract.max_retries, 3);
    assert!(contract.must_pass);
}

#[test]
fn minimal_step_gets_defaults() {
    let step: StepDef = serde_yaml::from_str(
        r#"
id: plan
persona: architect
exec:
  type: inline
  source: "Write a plan."
"#,
    )
    .unwrap();
    assert_eq!(step.memory.strategy, "fresh_context");
    assert!(step.memory.inject_artifacts.is_empty());
    assert!(!step.workspace.root.is_git_worktree());
    assert!(step.workspace.mount.is_empty());
    assert_eq!(step.concurrency, 0);
    assert!(step.worker_pool().is_none());
    assert!(step.matrix().is_none());
    assert!(step.contract().is_none());
}

#[test]
fn ephemeral_root_short_form() {
    let ws: WorkspaceDef = serde_yaml::from_str("root: ephemeral").unwrap();
    assert!(matches!(
        ws.root,
        WorkspaceRoot::Simple(WorkspaceKind::Ephemeral)
    ));
}

#[test]
fn matrix_strategy_parses() {
    let step: StepDef = serde_yaml::from_str(
        r#"
id: fan
persona: builder
exec: { type: inline, source: "work on ${item.id}" }
strategy:
  type: matrix
  items_source: /work/ids
  item_key: id
  max_concurrency: 2
"#,
    )
    .unwrap();
    let matrix = step.matrix().unwrap();
    assert_eq!(matrix.items_source, "/work/ids");
    assert_eq!(matrix.item_key, "id");
    assert_eq!(matrix.max_concurrency, 2);
}

#[yare::parameterized(
    zero_is_single = { 0, None },
    one_is_single = { 1, None },
    pool = { 3, Some(3) },
)]
fn worker_pool_width(concurrency: i64, expected: Option<usize>) {
    let mut step: StepDef = serde_yaml::from_str(
        "id: s\npersona: p\nexec: { type: inline, source: x }\n",
    )
    .unwrap();
    step.concurrency = concurrency;
    assert_eq!(step.worker_pool(), expected);
}

#[test]
fn output_lookup_by_name() {
    let step: StepDef = serde_yaml::from_str(
        r#"
id: s
persona: p
exec: { type: inline, source: x }
output_artifacts:
  - path: out.json
"#,
    )
    .unwrap();
    assert!(step.output("out.json").is_some());
    assert!(step.output("missing.json").is_none());
}
