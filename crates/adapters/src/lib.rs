// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapter runners for external LLM command-line tools
//!
//! The engine sees an adapter as an opaque binary with a stable
//! invocation shape: `<binary> [mode flags] --workspace <abs>`, the
//! composed prompt on stdin, and newline-delimited JSON on stdout.
//! Everything provider-specific lives behind [`AdapterRunner`].

mod claude;
pub mod env;
mod stream;
mod subprocess;

pub use claude::ClaudeCliRunner;
pub use stream::{parse_stream_line, StreamEvent};
pub use subprocess::{run_with_timeout, GIT_WORKTREE_TIMEOUT};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAdapterRunner, FakeFailure, ScriptedRun};

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wave_core::{ErrorKind, PipelineId, StepId, TokenUsage};

/// Errors from adapter runs.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("adapter exited with {code}: {stderr_tail}")]
    NonZeroExit { code: i32, stderr_tail: String },
    #[error("adapter timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("adapter run cancelled")]
    Cancelled,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    /// Classification for step failure reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Adapter,
        }
    }
}

/// One adapter run, fully resolved by the step executor.
#[derive(Debug, Clone)]
pub struct AdapterInvocation {
    pub pipeline_id: PipelineId,
    pub step_id: StepId,
    /// Persona name, for `WAVE_PERSONA` and diagnostics.
    pub persona: String,
    /// Binary name or path from the manifest adapter definition.
    pub binary: String,
    /// Mode flags passed before `--workspace`.
    pub mode: Vec<String>,
    pub workspace: PathBuf,
    /// Fully composed prompt, written to stdin and `CLAUDE.md`.
    pub prompt: String,
    /// Extra environment beyond the inherited one and `WAVE_*`.
    pub env: Vec<(String, String)>,
    /// Wall-clock budget for the subprocess.
    pub timeout: Duration,
    /// Retry ordinal, surfaced as `WAVE_RUN_ATTEMPT`.
    pub attempt: u32,
}

/// Live progress forwarded while the adapter streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamActivity {
    /// Short human string, e.g. "Read `src/main.rs`".
    pub activity: String,
    /// Billed tokens observed so far (same formula as the final count).
    pub tokens_so_far: u64,
}

/// Result of a completed adapter run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterOutcome {
    /// Final billed token count, including fallback estimates.
    pub tokens_used: u64,
    /// Raw usage as reported; zero when only the byte estimate applied.
    pub usage: TokenUsage,
}

/// Driver for one kind of external LLM CLI.
#[async_trait]
pub trait AdapterRunner: Clone + Send + Sync + 'static {
    /// Run the adapter to completion inside the invocation's workspace.
    ///
    /// Streams [`StreamActivity`] updates over `stream_tx` while the
    /// subprocess runs. Honors `cancel` by interrupting the subprocess
    /// (SIGINT, then SIGKILL after the grace window).
    async fn run(
        &self,
        invocation: AdapterInvocation,
        stream_tx: mpsc::Sender<StreamActivity>,
        cancel: CancellationToken,
    ) -> Result<AdapterOutcome, AdapterError>;
}
