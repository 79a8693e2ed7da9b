// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Pipeline and manifest definitions, YAML loading, and DAG planning

mod def;
mod load;
mod manifest;
mod planner;
mod template;

pub use def::{
    ContractDef, ExecDef, ExecType, HandoverDef, InjectArtifact, InputDef, MatrixDef, MemoryDef,
    MountDef, MountMode, OnFailure, OutputArtifactDef, PipelineDef, PipelineMetadata, StepDef,
    StrategyDef, WorkspaceDef, WorkspaceKind, WorkspaceRoot, WorktreeRoot,
};
pub use load::{load_manifest_str, load_pipeline_str, LoadError};
pub use manifest::{
    AdapterDef, Manifest, ManifestMetadata, MetaPipelineDef, PermissionsDef, PersonaDef, RelayDef,
    ResolvedPersona, RuntimeDef,
};
pub use planner::{plan, Offense, Plan, PlanError};
pub use template::{interpolate, referenced_vars, VAR_PATTERN};
