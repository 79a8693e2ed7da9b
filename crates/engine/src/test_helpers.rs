// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::executor::{ExecuteOptions, PipelineExecutor};
use crate::sinks::CollectSink;
use std::sync::Arc;
use tempfile::TempDir;
use wave_adapters::FakeAdapterRunner;
use wave_core::SystemClock;
use wave_pipeline::{Manifest, PipelineDef};
use wave_storage::MemoryStateStore;

/// One self-contained engine test environment: fake runner, in-memory
/// store, tempdir workspace root, and a project root with a contracts
/// tree.
pub struct Harness {
    pub workspace_root: TempDir,
    pub project_root: TempDir,
    pub runner: FakeAdapterRunner,
    pub store: Arc<MemoryStateStore>,
    pub collect: CollectSink,
    pub manifest: Manifest,
}

impl Harness {
    pub fn new() -> Self {
        let workspace_root = TempDir::new().unwrap();
        let project_root = TempDir::new().unwrap();
        std::fs::create_dir_all(project_root.path().join(".wave/contracts")).unwrap();

        let manifest: Manifest = serde_yaml::from_str(&format!(
            r#"
apiVersion: wave/v1
kind: Manifest
adapters:
  fake:
    binary: fake
    default_permissions:
      allowed_tools: [Read, Write]
      deny: []
personas:
  p:
    adapter: fake
  architect:
    adapter: fake
    model: opus
runtime:
  workspace_root: {}
  max_concurrent_workers: 4
  default_timeout_minutes: 1
"#,
            workspace_root.path().display()
        ))
        .unwrap();

        Self {
            workspace_root,
            project_root,
            runner: FakeAdapterRunner::new(),
            store: Arc::new(MemoryStateStore::new()),
            collect: CollectSink::new(),
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
            sinks: vec![Box::new(self.collect.clone())],
        }
    }

    /// Write a schema under the project's contract root.
    pub fn write_contract(&self, name: &str, contents: &str) {
        std::fs::write(
            self.project_root.path().join(".wave/contracts").join(name),
            contents,
        )
        .unwrap();
    }
}

pub fn pipeline(yaml: &str) -> PipelineDef {
    serde_yaml::from_str(yaml).unwrap()
}
