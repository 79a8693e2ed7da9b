// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::def::PipelineDef;

fn pipeline(yaml_steps: &str) -> PipelineDef {
    let doc = format!(
        "kind: Pipeline\nmetadata: {{ name: t }}\nsteps:\n{}",
        yaml_steps
    );
    serde_yaml::from_str(&doc).unwrap()
}

fn step(id: &str, deps: &[&str]) -> String {
    format!(
        "  - id: {}\n    persona: p\n    dependencies: [{}]\n    exec: {{ type: inline, source: x }}\n",
        id,
        deps.join(", ")
    )
}

fn offenses_of(def: &PipelineDef) -> Vec<String> {
    match plan(def) {
        Err(PlanError::Invalid(offenses)) => offenses.iter().map(|o| o.to_string()).collect(),
        Ok(_) => panic!("expected rejection"),
    }
}

#[test]
fn diamond_layers_in_declaration_order() {
    let def = pipeline(&format!(
        "{}{}{}{}",
        step("a", &[]),
        step("b", &["a"]),
        step("c", &["a"]),
        step("d", &["b", "c"]),
    ));
    let plan = plan(&def).unwrap();
    let layers: Vec<Vec<&str>> = plan
        .layers()
        .iter()
        .map(|l| l.iter().map(|s| s.as_str()).collect())
        .collect();
    assert_eq!(layers, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
}

#[test]
fn plan_is_deterministic() {
    let def = pipeline(&format!(
        "{}{}{}",
        step("z", &[]),
        step("m", &["z"]),
        step("a", &["z"]),
    ));
    let first = plan(&def).unwrap();
    let second = plan(&def).unwrap();
    assert_eq!(first, second);
    // declaration order within the layer, not alphabetical
    assert_eq!(first.layers()[1], vec![StepId::new("m"), StepId::new("a")]);
}

#[test]
fn duplicate_ids_rejected() {
    let def = pipeline(&format!("{}{}", step("a", &[]), step("a", &[])));
    let offenses = offenses_of(&def);
    assert!(offenses.iter().any(|o| o.contains("duplicate step ID")));
}

#[test]
fn unknown_dependency_rejected() {
    let def = pipeline(&step("a", &["ghost"]));
    let offenses = offenses_of(&def);
    assert!(offenses.iter().any(|o| o.contains("unknown step `ghost`")));
}

#[test]
fn cycle_is_named() {
    let def = pipeline(&format!(
        "{}{}{}",
        step("a", &["c"]),
        step("b", &["a"]),
        step("c", &["b"]),
    ));
    let offenses = offenses_of(&def);
    let cycle = offenses.iter().find(|o| o.contains("cycle")).unwrap();
    // every member appears, and the path closes on its starting node
    for id in ["a", "b", "c"] {
        assert!(cycle.contains(id), "{cycle} should name {id}");
    }
}

#[test]
fn self_loop_is_a_cycle() {
    let def = pipeline(&step("a", &["a"]));
    let offenses = offenses_of(&def);
    assert!(offenses.iter().any(|o| o.contains("cycle: a -> a")));
}

#[test]
fn all_offenses_reported_together() {
    let def = pipeline(&format!(
        "{}{}{}",
        step("a", &[]),
        step("a", &[]),
        step("b", &["ghost"]),
    ));
    let offenses = offenses_of(&def);
    assert_eq!(offenses.len(), 2);
}

#[test]
fn negative_concurrency_rejected() {
    let mut def = pipeline(&step("a", &[]));
    def.steps[0].concurrency = -1;
    let offenses = offenses_of(&def);
    assert!(offenses.iter().any(|o| o.contains("must not be negative")));
}

#[test]
fn matrix_and_concurrency_are_exclusive() {
    let def: PipelineDef = serde_yaml::from_str(
        r#"
kind: Pipeline
metadata: { name: t }
steps:
  - id: fan
    persona: p
    exec: { type: inline, source: x }
    concurrency: 3
    strategy:
      type: matrix
      items_source: /ids
      item_key: id
"#,
    )
    .unwrap();
    let offenses = offenses_of(&def);
    assert!(offenses.iter().any(|o| o.contains("mutually exclusive")));
}

#[test]
fn max_concurrent_agents_bounded() {
    let mut def = pipeline(&step("a", &[]));
    def.steps[0].max_concurrent_agents = Some(11);
    let offenses = offenses_of(&def);
    assert!(offenses.iter().any(|o| o.contains("<= 10")));
}

#[test]
fn contract_source_must_be_declared_output() {
    let def: PipelineDef = serde_yaml::from_str(
        r#"
kind: Pipeline
metadata: { name: t }
steps:
  - id: a
    persona: p
    exec: { type: inline, source: x }
    output_artifacts:
      - path: out.json
    handover:
      contract: { schema: s.json, source: other.json }
"#,
    )
    .unwrap();
    let offenses = offenses_of(&def);
    assert!(offenses
        .iter()
        .any(|o| o.contains("not a declared output artifact")));
}

#[test]
fn injected_artifact_must_come_from_transitive_dependency() {
    let def: PipelineDef = serde_yaml::from_str(
        r#"
kind: Pipeline
metadata: { name: t }
steps:
  - id: a
    persona: p
    exec: { type: inline, source: x }
    output_artifacts: [{ path: out.json }]
  - id: b
    persona: p
    exec: { type: inline, source: x }
    memory:
      inject_artifacts:
        - { step: a, artifact: out.json, as: out }
"#,
    )
    .unwrap();
    // b does not depend on a
    let offenses = offenses_of(&def);
    assert!(offenses
        .iter()
        .any(|o| o.contains("not a transitive dependency")));
}

#[test]
fn injected_artifact_must_be_declared_by_producer() {
    let def: PipelineDef = serde_yaml::from_str(
        r#"
kind: Pipeline
metadata: { name: t }
steps:
  - id: a
    persona: p
    exec: { type: inline, source: x }
  - id: b
    persona: p
    dependencies: [a]
    exec: { type: inline, source: x }
    memory:
      inject_artifacts:
        - { step: a, artifact: out.json, as: out }
"#,
    )
    .unwrap();
    let offenses = offenses_of(&def);
    assert!(offenses
        .iter()
        .any(|o| o.contains("not declared as an output")));
}

#[test]
fn transitive_injection_through_intermediate_step_is_accepted() {
    let def: PipelineDef = serde_yaml::from_str(
        r#"
kind: Pipeline
metadata: { name: t }
steps:
  - id: a
    persona: p
    exec: { type: inline, source: x }
    output_artifacts: [{ path: out.json }]
  - id: b
    persona: p
    dependencies: [a]
    exec: { type: inline, source: x }
  - id: c
    persona: p
    dependencies: [b]
    exec: { type: inline, source: x }
    memory:
      inject_artifacts:
        - { step: a, artifact: out.json, as: out }
"#,
    )
    .unwrap();
    assert!(plan(&def).is_ok());
}

#[test]
fn matrix_result_is_a_valid_synthetic_artifact() {
    let def: PipelineDef = serde_yaml::from_str(
        r#"
kind: Pipeline
metadata: { name: t }
steps:
  - id: fan
    persona: p
    exec: { type: inline, source: x }
    strategy: { type: matrix, items_source: /ids, item_key: id }
  - id: merge
    persona: p
    dependencies: [fan]
    exec: { type: inline, source: x }
    memory:
      inject_artifacts:
        - { step: fan, artifact: matrix-result.json, as: results }
"#,
    )
    .unwrap();
    assert!(plan(&def).is_ok());
}

#[test]
fn transitive_consumers_in_topo_order() {
    let def = pipeline(&format!(
        "{}{}{}{}",
        step("a", &[]),
        step("b", &["a"]),
        step("c", &["b"]),
        step("d", &["a"]),
    ));
    let plan = plan(&def).unwrap();
    let consumers = plan.transitive_consumers(&StepId::new("a"));
    assert_eq!(
        consumers,
        vec![StepId::new("b"), StepId::new("d"), StepId::new("c")]
    );
    assert!(plan.transitive_consumers(&StepId::new("c")).is_empty());
}

#[test]
fn position_follows_flattened_order() {
    let def = pipeline(&format!(
        "{}{}{}",
        step("a", &[]),
        step("b", &["a"]),
        step("c", &["b"]),
    ));
    let plan = plan(&def).unwrap();
    assert_eq!(plan.position(&StepId::new("a")), Some(0));
    assert_eq!(plan.position(&StepId::new("c")), Some(2));
    assert_eq!(plan.position(&StepId::new("zzz")), None);
    assert_eq!(plan.step_count(), 3);
}
