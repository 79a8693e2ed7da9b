// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake adapter runner for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::{
    AdapterError, AdapterInvocation, AdapterOutcome, AdapterRunner, StreamActivity,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wave_core::TokenUsage;

/// How a scripted run fails.
#[derive(Debug, Clone)]
pub enum FakeFailure {
    NonZeroExit { code: i32, stderr_tail: String },
    Timeout,
}

/// One scripted adapter run for a step.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    /// Files written into the workspace (relative path, contents).
    pub files: Vec<(String, String)>,
    /// Stream activities emitted before completing.
    pub activities: Vec<String>,
    pub usage: TokenUsage,
    pub failure: Option<FakeFailure>,
    /// Sleep before completing (cancellable).
    pub delay: Option<Duration>,
    /// Block until the run context is cancelled, then report cancellation.
    pub wait_for_cancel: bool,
}

impl ScriptedRun {
    /// Successful run producing the given workspace files.
    pub fn writing(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 20,
                ..TokenUsage::default()
            },
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn failing(failure: FakeFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn blocking_until_cancel() -> Self {
        Self {
            wait_for_cancel: true,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct FakeState {
    /// Per-step FIFO of scripted runs; each run pops one entry.
    scripts: HashMap<String, Vec<ScriptedRun>>,
    /// Most recently consumed script per step, replayed once the queue
    /// drains.
    last: HashMap<String, ScriptedRun>,
    invocations: Vec<AdapterInvocation>,
}

/// Fake adapter runner: scripted per step, records every invocation.
#[derive(Clone, Default)]
pub struct FakeAdapterRunner {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeAdapterRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted run for a step. Successive runs of the same
    /// step (retries, workers, resumed runs) consume entries in order;
    /// once the queue drains, the most recently consumed entry repeats.
    pub fn script(&self, step_id: &str, run: ScriptedRun) -> &Self {
        self.inner
            .lock()
            .scripts
            .entry(step_id.to_string())
            .or_default()
            .push(run);
        self
    }

    /// Every invocation observed so far.
    pub fn invocations(&self) -> Vec<AdapterInvocation> {
        self.inner.lock().invocations.clone()
    }

    /// Invocations of one step.
    pub fn invocations_of(&self, step_id: &str) -> Vec<AdapterInvocation> {
        self.inner
            .lock()
            .invocations
            .iter()
            .filter(|i| i.step_id == *step_id)
            .cloned()
            .collect()
    }

    fn next_script(&self, step_id: &str) -> ScriptedRun {
        let mut inner = self.inner.lock();
        let popped = match inner.scripts.get_mut(step_id) {
            Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
            _ => None,
        };
        match popped {
            Some(script) => {
                inner.last.insert(step_id.to_string(), script.clone());
                script
            }
            None => inner.last.get(step_id).cloned().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl AdapterRunner for FakeAdapterRunner {
    async fn run(
        &self,
        invocation: AdapterInvocation,
        stream_tx: mpsc::Sender<StreamActivity>,
        cancel: CancellationToken,
    ) -> Result<AdapterOutcome, AdapterError> {
        let script = self.next_script(invocation.step_id.as_str());
        self.inner.lock().invocations.push(invocation.clone());

        // CLAUDE.md lands in the workspace exactly like the real runner.
        tokio::fs::write(invocation.workspace.join("CLAUDE.md"), &invocation.prompt).await?;

        if script.wait_for_cancel {
            cancel.cancelled().await;
            return Err(AdapterError::Cancelled);
        }

        if let Some(delay) = script.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        for activity in &script.activities {
            let _ = stream_tx
                .send(StreamActivity {
                    activity: activity.clone(),
                    tokens_so_far: script.usage.billed(),
                })
                .await;
        }

        for (path, contents) in &script.files {
            let target = invocation.workspace.join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, contents).await?;
        }

        match script.failure {
            Some(FakeFailure::NonZeroExit { code, stderr_tail }) => {
                Err(AdapterError::NonZeroExit { code, stderr_tail })
            }
            Some(FakeFailure::Timeout) => Err(AdapterError::Timeout(invocation.timeout)),
            None => Ok(AdapterOutcome {
                tokens_used: script.usage.billed(),
                usage: script.usage,
            }),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
