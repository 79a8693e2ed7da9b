// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const PIPELINE: &str = r#"
kind: Pipeline
metadata:
  name: review
  description: Review incoming issues
input:
  source: issues
  label_filter: bug
  batch_size: 5
steps:
  - id: triage
    persona: architect
    exec: { type: inline, source: "Triage the issue." }
"#;

#[test]
fn loads_pipeline_document() {
    let def = load_pipeline_str(PIPELINE).unwrap();
    assert_eq!(def.metadata.name, "review");
    assert_eq!(def.input.batch_size, Some(5));
    assert_eq!(def.steps.len(), 1);
    assert!(!def.metadata.disabled);
}

#[test]
fn rejects_wrong_kind() {
    let err = load_pipeline_str("kind: Recipe\nmetadata: { name: x }\n").unwrap_err();
    assert!(matches!(err, LoadError::WrongKind { .. }));
    assert!(err.to_string().contains("Recipe"));
}

#[test]
fn rejects_empty_pipeline() {
    let err =
        load_pipeline_str("kind: Pipeline\nmetadata: { name: x }\nsteps: []\n").unwrap_err();
    assert!(matches!(err, LoadError::Empty));
}

#[test]
fn rejects_malformed_yaml() {
    let err = load_pipeline_str("kind: [unterminated").unwrap_err();
    assert!(matches!(err, LoadError::Yaml(_)));
}

#[test]
fn loads_manifest_document() {
    let m = load_manifest_str("apiVersion: wave/v1\nkind: Manifest\n").unwrap();
    assert_eq!(m.kind, "Manifest");
}

#[test]
fn manifest_wrong_kind_rejected() {
    let err = load_manifest_str("apiVersion: wave/v1\nkind: Pipeline\n").unwrap_err();
    assert!(matches!(err, LoadError::WrongKind { .. }));
}
