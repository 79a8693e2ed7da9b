//! Test helpers for behavioral specifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::sync::Arc;
use tempfile::TempDir;
use wave_adapters::FakeAdapterRunner;
use wave_core::{PipelineId, StepState, SystemClock};
use wave_engine::{CollectSink, ExecuteOptions, PipelineExecutor};
use wave_pipeline::{load_manifest_str, load_pipeline_str, Manifest, PipelineDef};
use wave_storage::MemoryStateStore;

/// One spec environment: scripted runner, in-memory store, tempdir
/// workspace root, and a project root carrying `.wave/contracts/`.
pub struct Spec {
    pub workspace_root: TempDir,
    pub project_root: TempDir,
    pub runner: FakeAdapterRunner,
    pub store: Arc<MemoryStateStore>,
    pub events: CollectSink,
    pub manifest: Manifest,
}

impl Spec {
    pub fn new() -> Self {
        let workspace_root = TempDir::new().unwrap();
        let project_root = TempDir::new().unwrap();
        std::fs::create_dir_all(project_root.path().join(".wave/contracts")).unwrap();

        let manifest = load_manifest_str(&format!(
            r#"
apiVersion: wave/v1
kind: Manifest
metadata: {{ name: specs }}
adapters:
  claude:
    binary: claude
    mode: ["-p"]
    output_format: stream-json
    default_permissions:
      allowed_tools: [Read, Write, Bash]
      deny: [WebSearch]
personas:
  architect:
    adapter: claude
    model: opus
  builder:
    adapter: claude
runtime:
  workspace_root: {root}
  max_concurrent_workers: 4
  default_timeout_minutes: 1
"#,
            root = workspace_root.path().display()
        ))
        .unwrap();

        Self {
            workspace_root,
            project_root,
            runner: FakeAdapterRunner::new(),
            store: Arc::new(MemoryStateStore::new()),
            events: CollectSink::new(),
            manifest,
        }
    }

    pub fn executor(&self) -> PipelineExecutor<FakeAdapterRunner, MemoryStateStore, SystemClock> {
        PipelineExecutor::new(self.runner.clone(), Arc::clone(&self.store), SystemClock)
    }

    pub fn options(&self) -> ExecuteOptions {
        ExecuteOptions {
            pipeline_id: None,
            project_root: self.project_root.path().to_path_buf(),
            keep_workspaces: false,
            sinks: vec![Box::new(self.events.clone())],
        }
    }

    pub fn options_with_id(&self, id: &str) -> ExecuteOptions {
        ExecuteOptions {
            pipeline_id: Some(PipelineId::new(id)),
            ..self.options()
        }
    }

    pub fn write_contract(&self, name: &str, contents: &str) {
        std::fs::write(
            self.project_root.path().join(".wave/contracts").join(name),
            contents,
        )
        .unwrap();
    }

    /// Lifecycle transitions seen so far, as `(step_id, state)` pairs.
    pub fn transitions(&self) -> Vec<(String, StepState)> {
        self.events.transitions()
    }
}

pub fn pipeline(yaml: &str) -> PipelineDef {
    load_pipeline_str(yaml).unwrap()
}
