// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace management: per-step sandboxes and git worktrees
//!
//! Layout: `<workspace_root>/<pipeline_id>/<step_id>[/worker_<n>]/`.
//! A workspace is either a fresh directory or a git worktree on a new
//! branch off the repository HEAD. The per-repository lock is held only
//! for the git operations, so a long adapter run never blocks another
//! repository's steps. Worktrees are registered for targeted cleanup at
//! pipeline exit; cleanup is best-effort and never changes the run's
//! outcome.

use crate::artifacts::ArtifactMap;
use crate::repo_lock::{self, LockTimeout, LOCK_TIMEOUT};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use wave_adapters::{run_with_timeout, GIT_WORKTREE_TIMEOUT};
use wave_core::{file_uri_path, PipelineId, StepId};
use wave_pipeline::{interpolate, MountDef, MountMode, StepDef, WorkspaceRoot, WorktreeRoot};

/// Default branch template for worktree workspaces.
const DEFAULT_BRANCH_TEMPLATE: &str = "__wt_${pipeline_id}_${step_id}";

/// Errors preparing a step workspace. All of them fail the step with
/// kind `resource`.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace create failed: {0}")]
    Create(String),
    #[error("artifact injection failed: {0}")]
    Inject(String),
    #[error("mount failed: {0}")]
    Mount(String),
    #[error(transparent)]
    LockTimeout(#[from] LockTimeout),
    #[error("git {operation} failed: {detail}")]
    Git { operation: String, detail: String },
}

/// A worktree registered for cleanup at pipeline exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub step_id: StepId,
    pub worktree_path: PathBuf,
    /// Canonical repository root.
    pub repo_root: PathBuf,
}

/// Worktrees created during this run.
#[derive(Debug, Default)]
pub struct WorktreeRegistry {
    entries: Mutex<Vec<WorktreeEntry>>,
}

impl WorktreeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: WorktreeEntry) {
        self.entries.lock().push(entry);
    }

    /// Drain all entries for cleanup.
    pub fn take_all(&self) -> Vec<WorktreeEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Creates, populates, and tears down step workspaces.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    workspace_root: PathBuf,
    keep_workspaces: bool,
}

impl WorkspaceManager {
    pub fn new(workspace_root: impl Into<PathBuf>, keep_workspaces: bool) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            keep_workspaces,
        }
    }

    /// `<workspace_root>/<pipeline_id>/<step_id>[/worker_<n>]`
    pub fn step_dir(
        &self,
        pipeline_id: &PipelineId,
        step_id: &StepId,
        worker: Option<usize>,
    ) -> PathBuf {
        let mut dir = self
            .workspace_root
            .join(pipeline_id.as_str())
            .join(step_id.as_str());
        if let Some(n) = worker {
            dir = dir.join(format!("worker_{}", n));
        }
        dir
    }

    /// Create the workspace for one step (or one of its workers) and
    /// apply its mounts.
    pub async fn create(
        &self,
        pipeline_id: &PipelineId,
        step: &StepDef,
        worker: Option<usize>,
        registry: &WorktreeRegistry,
    ) -> Result<PathBuf, WorkspaceError> {
        let dir = self.step_dir(pipeline_id, &step.id, worker);
        match &step.workspace.root {
            WorkspaceRoot::Simple(_) => self.create_ephemeral(&dir).await?,
            WorkspaceRoot::Worktree(root) => {
                self.create_worktree(&dir, root, pipeline_id, &step.id, worker, registry)
                    .await?
            }
        }
        for mount in &step.workspace.mount {
            self.apply_mount(&dir, mount).await?;
        }
        Ok(dir)
    }

    async fn create_ephemeral(&self, dir: &Path) -> Result<(), WorkspaceError> {
        // Retries recreate from scratch
        if tokio::fs::try_exists(dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(dir)
                .await
                .map_err(|e| WorkspaceError::Create(e.to_string()))?;
        }
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| WorkspaceError::Create(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| WorkspaceError::Create(e.to_string()))?;
        }

        Ok(())
    }

    async fn create_worktree(
        &self,
        dir: &Path,
        root: &WorktreeRoot,
        pipeline_id: &PipelineId,
        step_id: &StepId,
        worker: Option<usize>,
        registry: &WorktreeRegistry,
    ) -> Result<(), WorkspaceError> {
        let repo = tokio::fs::canonicalize(&root.repo)
            .await
            .map_err(|e| WorkspaceError::Create(format!("repo `{}`: {}", root.repo, e)))?;

        let mut vars = HashMap::new();
        vars.insert("pipeline_id".to_string(), pipeline_id.to_string());
        vars.insert("step_id".to_string(), step_id.to_string());
        let template = root
            .branch_template
            .as_deref()
            .unwrap_or(DEFAULT_BRANCH_TEMPLATE);
        let mut branch = interpolate(template, &vars);
        if let Some(n) = worker {
            branch.push_str(&format!("_w{}", n));
        }

        if let Some(parent) = dir.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WorkspaceError::Create(e.to_string()))?;
        }

        // Lock held for the git operations only.
        let _guard = repo_lock::lock_repo(&repo, LOCK_TIMEOUT).await?;

        // Prune bookkeeping for worktrees whose directories are gone.
        self.git(&repo, &["worktree", "prune"], "worktree prune")
            .await?;

        // A stale path from a crashed run shadows the new worktree.
        if tokio::fs::try_exists(dir).await.unwrap_or(false) {
            let dir_str = dir.to_string_lossy().into_owned();
            let _ = self
                .git(
                    &repo,
                    &["worktree", "remove", "--force", &dir_str],
                    "stale worktree remove",
                )
                .await;
            if tokio::fs::try_exists(dir).await.unwrap_or(false) {
                tokio::fs::remove_dir_all(dir)
                    .await
                    .map_err(|e| WorkspaceError::Create(e.to_string()))?;
            }
        }
        // Same for a stale branch.
        let _ = self
            .git(&repo, &["branch", "-D", &branch], "stale branch delete")
            .await;

        let dir_str = dir.to_string_lossy().into_owned();
        self.git(
            &repo,
            &["worktree", "add", "-b", &branch, &dir_str, "HEAD"],
            "worktree add",
        )
        .await?;

        registry.register(WorktreeEntry {
            step_id: step_id.clone(),
            worktree_path: dir.to_path_buf(),
            repo_root: repo,
        });
        tracing::debug!(branch = %branch, path = %dir.display(), "worktree created");
        Ok(())
    }

    async fn git(
        &self,
        repo: &Path,
        args: &[&str],
        operation: &str,
    ) -> Result<(), WorkspaceError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(repo).args(args);
        let output = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, operation)
            .await
            .map_err(|detail| WorkspaceError::Git {
                operation: operation.to_string(),
                detail,
            })?;
        if !output.status.success() {
            return Err(WorkspaceError::Git {
                operation: operation.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Materialize the step's injected artifacts.
    ///
    /// Copies each artifact into `./injected/<as>` (or exposes only the
    /// absolute path for `path_only` entries) and returns the
    /// `artifact.<as>` template variables. Any missing artifact is
    /// fatal to the step.
    pub async fn inject(
        &self,
        workspace: &Path,
        step: &StepDef,
        artifacts: &ArtifactMap,
    ) -> Result<HashMap<String, String>, WorkspaceError> {
        let mut vars = HashMap::new();
        if step.memory.inject_artifacts.is_empty() {
            return Ok(vars);
        }

        let injected_dir = workspace.join("injected");
        for inject in &step.memory.inject_artifacts {
            let source = artifacts
                .get(&inject.step, &inject.artifact)
                .ok_or_else(|| {
                    WorkspaceError::Inject(format!(
                        "artifact `{}` from step `{}` is not in the artifact map",
                        inject.artifact, inject.step
                    ))
                })?;

            let exposed = if inject.path_only {
                source.clone()
            } else {
                tokio::fs::create_dir_all(&injected_dir)
                    .await
                    .map_err(|e| WorkspaceError::Inject(e.to_string()))?;
                let target = injected_dir.join(&inject.as_name);
                tokio::fs::copy(&source, &target).await.map_err(|e| {
                    WorkspaceError::Inject(format!(
                        "copy {} -> {}: {}",
                        source.display(),
                        target.display(),
                        e
                    ))
                })?;
                target
            };
            vars.insert(
                format!("artifact.{}", inject.as_name),
                exposed.to_string_lossy().into_owned(),
            );
        }
        Ok(vars)
    }

    async fn apply_mount(&self, workspace: &Path, mount: &MountDef) -> Result<(), WorkspaceError> {
        let source = tokio::fs::canonicalize(&mount.source)
            .await
            .map_err(|e| WorkspaceError::Mount(format!("source `{}`: {}", mount.source, e)))?;
        let target = workspace.join(&mount.target);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WorkspaceError::Mount(e.to_string()))?;
        }
        match mount.mode {
            MountMode::Ro => link_into(&source, &target).await,
            MountMode::Rw => copy_recursive(&source, &target).await,
        }
        .map_err(|e| {
            WorkspaceError::Mount(format!(
                "{} -> {}: {}",
                source.display(),
                target.display(),
                e
            ))
        })
    }

    /// Remove the whole run tree. Best-effort; honors `keep_workspaces`.
    pub async fn cleanup_run(&self, pipeline_id: &PipelineId) {
        if self.keep_workspaces {
            return;
        }
        let dir = self.workspace_root.join(pipeline_id.as_str());
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if dir.exists() {
                tracing::warn!(path = %file_uri_path(&dir), error = %e, "run cleanup failed");
            }
        }
    }

    /// Remove every registered worktree, forcing if dirty.
    ///
    /// Runs under its own short-lived context at pipeline exit
    /// (including failure and cancellation), so a cancelled run still
    /// cleans up. Errors are logged, never propagated.
    pub async fn cleanup_worktrees(&self, registry: &WorktreeRegistry) {
        for entry in registry.take_all() {
            let path = entry.worktree_path.to_string_lossy().into_owned();
            let removed = match self
                .git(&entry.repo_root, &["worktree", "remove", &path], "worktree remove")
                .await
            {
                Ok(()) => true,
                Err(_) => {
                    // Dirty worktree; force it.
                    self.git(
                        &entry.repo_root,
                        &["worktree", "remove", "--force", &path],
                        "worktree remove --force",
                    )
                    .await
                    .is_ok()
                }
            };
            if removed {
                tracing::debug!(step_id = %entry.step_id, path = %path, "worktree removed");
            } else {
                tracing::warn!(step_id = %entry.step_id, path = %path, "worktree removal failed");
            }
        }
    }
}

async fn link_into(source: &Path, target: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        tokio::fs::symlink(source, target).await
    }
    #[cfg(not(unix))]
    {
        copy_recursive(source, target).await
    }
}

/// Copy a file or directory tree.
async fn copy_recursive(source: &Path, target: &Path) -> std::io::Result<()> {
    let meta = tokio::fs::metadata(source).await?;
    if meta.is_file() {
        tokio::fs::copy(source, target).await?;
        return Ok(());
    }
    tokio::fs::create_dir_all(target).await?;
    // Iterative walk; async recursion would need boxing.
    let mut stack = vec![(source.to_path_buf(), target.to_path_buf())];
    while let Some((src_dir, dst_dir)) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&src_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let src = entry.path();
            let dst = dst_dir.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                tokio::fs::create_dir_all(&dst).await?;
                stack.push((src, dst));
            } else {
                tokio::fs::copy(&src, &dst).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
