// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline definitions
//!
//! A pipeline is a named DAG of steps, each of which runs a persona's
//! adapter in an isolated workspace and hands artifacts downstream under
//! a contract. Definitions are immutable once loaded; execution state
//! lives in the engine and the state store, never here.

use serde::{Deserialize, Serialize};
use wave_core::StepId;

/// Pipeline-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Release pipelines show up in dashboards; informational only here.
    #[serde(default)]
    pub release: bool,
    /// Disabled pipelines are rejected at execute time.
    #[serde(default)]
    pub disabled: bool,
}

/// Where the pipeline's input payload comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputDef {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub label_filter: Option<String>,
    #[serde(default)]
    pub batch_size: Option<u32>,
}

/// Memory strategy: which upstream artifacts a step starts with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDef {
    /// `fresh_context` (default) or a named strategy.
    #[serde(default = "MemoryDef::default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub inject_artifacts: Vec<InjectArtifact>,
}

impl MemoryDef {
    fn default_strategy() -> String {
        "fresh_context".to_string()
    }
}

impl Default for MemoryDef {
    fn default() -> Self {
        Self {
            strategy: Self::default_strategy(),
            inject_artifacts: Vec::new(),
        }
    }
}

/// One upstream artifact to make available to a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectArtifact {
    /// Producing step ID.
    pub step: StepId,
    /// Artifact name as declared in the producer's `output_artifacts`
    /// (the relative path).
    pub artifact: String,
    /// Logical name inside this step's workspace (`./injected/<as>`)
    /// and in template variables (`${artifact.<as>}`).
    #[serde(rename = "as")]
    pub as_name: String,
    /// Expose only the absolute path as a template variable instead of
    /// copying the file into the workspace.
    #[serde(default)]
    pub path_only: bool,
}

/// Workspace configuration for a step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceDef {
    #[serde(default)]
    pub root: WorkspaceRoot,
    #[serde(default)]
    pub mount: Vec<MountDef>,
}

/// Workspace root: a fresh directory, or a git worktree.
///
/// Supports two forms:
///   `root: ephemeral`                    (fresh directory, the default)
///   `root: { repo: ., branch_template: "..." }` (git worktree)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkspaceRoot {
    Simple(WorkspaceKind),
    Worktree(WorktreeRoot),
}

impl Default for WorkspaceRoot {
    fn default() -> Self {
        WorkspaceRoot::Simple(WorkspaceKind::Ephemeral)
    }
}

impl WorkspaceRoot {
    pub fn is_git_worktree(&self) -> bool {
        matches!(self, WorkspaceRoot::Worktree(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceKind {
    Ephemeral,
}

/// Git worktree workspace: a new branch checked out off the repository
/// HEAD into the step's workspace path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeRoot {
    /// Path to the repository (relative paths resolve against the
    /// engine's working directory).
    pub repo: String,
    /// Branch name template; `${pipeline_id}` and `${step_id}` are
    /// interpolated. Defaults to `__wt_${pipeline_id}_${step_id}`.
    #[serde(default)]
    pub branch_template: Option<String>,
}

/// A path mounted into the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountDef {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub mode: MountMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountMode {
    #[default]
    Ro,
    Rw,
}

/// What prompt a step sends to its adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecDef {
    #[serde(rename = "type")]
    pub exec_type: ExecType,
    /// Template file path, or the inline prompt text itself.
    pub source: String,
    /// Per-step wall-clock override for the adapter run.
    #[serde(default)]
    pub timeout_minutes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecType {
    PromptFile,
    Inline,
}

/// A file the step must (or may) leave in its workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputArtifactDef {
    /// Path relative to the step workspace; doubles as the artifact name.
    pub path: String,
    #[serde(rename = "type", default)]
    pub artifact_type: Option<String>,
    #[serde(default = "OutputArtifactDef::default_required")]
    pub required: bool,
}

impl OutputArtifactDef {
    fn default_required() -> bool {
        true
    }
}

/// Handover block wrapping the contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoverDef {
    pub contract: ContractDef,
}

/// Contract an output artifact must satisfy before downstream steps run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDef {
    /// Schema path, resolved against the approved contract roots.
    pub schema: String,
    /// Name of the artifact to validate (a declared output path).
    pub source: String,
    #[serde(default = "ContractDef::default_must_pass")]
    pub must_pass: bool,
    #[serde(default)]
    pub on_failure: OnFailure,
    #[serde(default = "ContractDef::default_max_retries")]
    pub max_retries: u32,
}

impl ContractDef {
    fn default_must_pass() -> bool {
        true
    }

    fn default_max_retries() -> u32 {
        2
    }
}

/// What to do when contract validation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    #[default]
    Fail,
    Retry,
    Continue,
}

/// Per-step fan-out strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StrategyDef {
    Matrix(MatrixDef),
}

/// Matrix fan-out: one worker per item drawn from an upstream artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixDef {
    /// JSON pointer into an upstream artifact (e.g. `/work/ids`).
    pub items_source: String,
    /// Template variable name each item binds to (`${item.<key>}`).
    pub item_key: String,
    #[serde(default = "MatrixDef::default_max_concurrency")]
    pub max_concurrency: usize,
}

impl MatrixDef {
    fn default_max_concurrency() -> usize {
        4
    }
}

/// A step within a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    pub id: StepId,
    /// Persona reference, resolved against the manifest.
    pub persona: String,
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    #[serde(default)]
    pub memory: MemoryDef,
    #[serde(default)]
    pub workspace: WorkspaceDef,
    pub exec: ExecDef,
    #[serde(default)]
    pub output_artifacts: Vec<OutputArtifactDef>,
    #[serde(default)]
    pub handover: Option<HandoverDef>,
    #[serde(default)]
    pub strategy: Option<StrategyDef>,
    /// N > 1 runs N parallel workers of this step over the same input.
    /// Signed so negative values can be rejected with a clear offense.
    #[serde(default)]
    pub concurrency: i64,
    /// Hint surfaced to the adapter prompt; never enforced by the engine.
    #[serde(default)]
    pub max_concurrent_agents: Option<u32>,
}

impl StepDef {
    /// Matrix definition, if this step fans out.
    pub fn matrix(&self) -> Option<&MatrixDef> {
        match &self.strategy {
            Some(StrategyDef::Matrix(m)) => Some(m),
            None => None,
        }
    }

    /// Worker-pool width: `concurrency` values of 0 and 1 mean single.
    pub fn worker_pool(&self) -> Option<usize> {
        if self.concurrency > 1 {
            Some(self.concurrency as usize)
        } else {
            None
        }
    }

    /// The contract, if the step declares a handover.
    pub fn contract(&self) -> Option<&ContractDef> {
        self.handover.as_ref().map(|h| &h.contract)
    }

    /// Declared output artifact by name.
    pub fn output(&self, name: &str) -> Option<&OutputArtifactDef> {
        self.output_artifacts.iter().find(|a| a.path == name)
    }
}

/// A pipeline definition: ordered steps plus metadata and input descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDef {
    pub kind: String,
    pub metadata: PipelineMetadata,
    #[serde(default)]
    pub input: InputDef,
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

impl PipelineDef {
    /// Get a step by ID.
    pub fn get_step(&self, id: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
#[path = "def_tests.rs"]
mod tests;
