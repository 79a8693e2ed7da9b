// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-repository locks for git worktree operations
//!
//! Worktree add/remove must not interleave within one repository, but
//! distinct repositories make progress concurrently. The registry maps
//! the canonical (symlink-resolved) repo root to an async mutex. This
//! registry is the only process-wide mutable state in the engine.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

/// Default acquisition timeout for the repository lock.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

static REGISTRY: LazyLock<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Guard over one repository's git operations.
pub struct RepoLockGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Acquire the lock for a canonical repo root, bounded by `timeout`.
///
/// The caller must hold the guard only for the git operations
/// themselves, never across an adapter run.
pub async fn lock_repo(
    canonical_repo: &Path,
    timeout: Duration,
) -> Result<RepoLockGuard, LockTimeout> {
    let mutex = {
        let mut registry = REGISTRY.lock();
        Arc::clone(
            registry
                .entry(canonical_repo.to_path_buf())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    };
    match tokio::time::timeout(timeout, mutex.lock_owned()).await {
        Ok(guard) => Ok(RepoLockGuard { _guard: guard }),
        Err(_elapsed) => Err(LockTimeout {
            repo: canonical_repo.to_path_buf(),
            after: timeout,
        }),
    }
}

/// Lock acquisition timed out; another operation holds the repo.
#[derive(Debug, thiserror::Error)]
#[error("timed out after {}s waiting for repository lock on {}", .after.as_secs(), .repo.display())]
pub struct LockTimeout {
    pub repo: PathBuf,
    pub after: Duration,
}

#[cfg(test)]
#[path = "repo_lock_tests.rs"]
mod tests;
