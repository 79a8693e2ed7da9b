// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Root manifest definitions
//!
//! The manifest names the available adapters and personas and carries
//! the runtime limits the engine enforces. Discovery and loading from
//! disk belong to the CLI; the engine consumes an already-parsed value.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Parsed root manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ManifestMetadata,
    #[serde(default)]
    pub adapters: IndexMap<String, AdapterDef>,
    #[serde(default)]
    pub personas: IndexMap<String, PersonaDef>,
    #[serde(default)]
    pub runtime: RuntimeDef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default)]
    pub name: Option<String>,
}

/// An external LLM CLI the engine can drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterDef {
    /// Binary name or path.
    pub binary: String,
    /// Mode flags passed before `--workspace`.
    #[serde(default)]
    pub mode: Vec<String>,
    /// Output format the binary is asked for (informational; the runner
    /// always parses NDJSON).
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default)]
    pub default_permissions: PermissionsDef,
}

/// Tool allow/deny lists rendered into the prompt restriction section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionsDef {
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl PermissionsDef {
    /// Step permissions override adapter defaults when present.
    pub fn is_empty(&self) -> bool {
        self.allowed_tools.is_empty() && self.deny.is_empty()
    }
}

/// A named configuration bundle a step selects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaDef {
    pub adapter: String,
    #[serde(default)]
    pub system_prompt_file: Option<PathBuf>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub permissions: Option<PermissionsDef>,
    /// Adapter-specific hook configuration, passed through opaquely.
    #[serde(default)]
    pub hooks: Option<serde_yaml::Value>,
}

/// Runtime limits and paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeDef {
    #[serde(default = "RuntimeDef::default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(default = "RuntimeDef::default_max_concurrent_workers")]
    pub max_concurrent_workers: usize,
    #[serde(default = "RuntimeDef::default_timeout_minutes")]
    pub default_timeout_minutes: u64,
    /// Wall-clock cap for the whole run; absent means unbounded.
    #[serde(default)]
    pub pipeline_timeout_minutes: Option<u64>,
    /// Absolute paths trusted as contract schema roots in addition to
    /// the project's `.wave/contracts/` tree.
    #[serde(default)]
    pub trusted_contract_roots: Vec<PathBuf>,
    #[serde(default)]
    pub relay: Option<RelayDef>,
    #[serde(default)]
    pub audit: bool,
    #[serde(default)]
    pub meta_pipeline: Option<MetaPipelineDef>,
}

impl RuntimeDef {
    fn default_workspace_root() -> PathBuf {
        PathBuf::from(".wave/workspaces")
    }

    fn default_max_concurrent_workers() -> usize {
        4
    }

    fn default_timeout_minutes() -> u64 {
        30
    }
}

impl Default for RuntimeDef {
    fn default() -> Self {
        Self {
            workspace_root: Self::default_workspace_root(),
            max_concurrent_workers: Self::default_max_concurrent_workers(),
            default_timeout_minutes: Self::default_timeout_minutes(),
            pipeline_timeout_minutes: None,
            trusted_contract_roots: Vec::new(),
            relay: None,
            audit: false,
            meta_pipeline: None,
        }
    }
}

/// Context-relay policy (consumed by the adapter layer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayDef {
    pub token_threshold_percent: u8,
    #[serde(default)]
    pub strategy: Option<String>,
}

/// Limits on pipelines that spawn pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaPipelineDef {
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub max_total_steps: Option<u32>,
    #[serde(default)]
    pub max_total_tokens: Option<u64>,
    #[serde(default)]
    pub timeout_minutes: Option<u64>,
}

/// A persona joined with its adapter, as a step executor needs it.
#[derive(Debug, Clone)]
pub struct ResolvedPersona<'a> {
    pub name: &'a str,
    pub persona: &'a PersonaDef,
    pub adapter_name: &'a str,
    pub adapter: &'a AdapterDef,
}

impl<'a> ResolvedPersona<'a> {
    /// Effective permissions: persona overrides, else adapter defaults.
    pub fn permissions(&self) -> &'a PermissionsDef {
        match &self.persona.permissions {
            Some(p) if !p.is_empty() => p,
            _ => &self.adapter.default_permissions,
        }
    }
}

impl Manifest {
    /// Resolve a step's persona reference to persona + adapter.
    pub fn resolve_persona<'a>(&'a self, name: &str) -> Option<ResolvedPersona<'a>> {
        let (persona_name, persona) = self.personas.get_key_value(name)?;
        let (adapter_name, adapter) = self.adapters.get_key_value(persona.adapter.as_str())?;
        Some(ResolvedPersona {
            name: persona_name,
            persona,
            adapter_name,
            adapter,
        })
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
