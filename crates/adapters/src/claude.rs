// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude CLI adapter runner
//!
//! Spawns the CLI with the prompt on stdin and parses its NDJSON
//! stream for tool activity and token usage. Token accounting uses
//! `input + output + cache_creation` everywhere, streaming updates and
//! the final count alike, so a display never shows a number the result line
//! later contradicts. Cache reads are not billed and never counted.

use crate::env::{kill_grace, wave_env};
use crate::stream::{parse_stream_line, StreamEvent};
use crate::{AdapterError, AdapterInvocation, AdapterOutcome, AdapterRunner, StreamActivity};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use wave_core::TokenUsage;

/// Stderr kept for failure reports.
const STDERR_TAIL_BYTES: usize = 2048;

/// Runner for Claude-compatible CLIs speaking `stream-json` on stdout.
#[derive(Debug, Clone, Default)]
pub struct ClaudeCliRunner;

impl ClaudeCliRunner {
    pub fn new() -> Self {
        Self
    }
}

/// Why a run is being interrupted.
enum Interrupt {
    Timeout(Duration),
    Cancelled,
}

#[async_trait]
impl AdapterRunner for ClaudeCliRunner {
    async fn run(
        &self,
        invocation: AdapterInvocation,
        stream_tx: mpsc::Sender<StreamActivity>,
        cancel: CancellationToken,
    ) -> Result<AdapterOutcome, AdapterError> {
        tracing::debug!(
            pipeline_id = %invocation.pipeline_id,
            step_id = %invocation.step_id,
            binary = %invocation.binary,
            workspace = %invocation.workspace.display(),
            "spawning adapter"
        );

        // The prompt also lands in CLAUDE.md for adapter introspection.
        tokio::fs::write(invocation.workspace.join("CLAUDE.md"), &invocation.prompt).await?;

        let mut cmd = Command::new(&invocation.binary);
        cmd.args(&invocation.mode)
            .arg("--workspace")
            .arg(&invocation.workspace)
            .current_dir(&invocation.workspace)
            .envs(wave_env(&invocation))
            .envs(invocation.env.iter().cloned())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| AdapterError::SpawnFailed(format!("{}: {}", invocation.binary, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(invocation.prompt.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut reader = BufReader::new(stderr);
                let _ = reader.read_to_end(&mut buf).await;
                String::from_utf8_lossy(tail(&buf, STDERR_TAIL_BYTES)).into_owned()
            })
        });

        let deadline = Instant::now() + invocation.timeout;
        let mut lines = match child.stdout.take() {
            Some(stdout) => BufReader::new(stdout).lines(),
            None => {
                return Err(AdapterError::SpawnFailed(
                    "adapter stdout was not captured".to_string(),
                ))
            }
        };

        let mut last_assistant: Option<TokenUsage> = None;
        let mut result_usage: Option<TokenUsage> = None;
        let mut stdout_bytes: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    interrupt(&mut child, Interrupt::Cancelled).await;
                    return Err(AdapterError::Cancelled);
                }
                next = tokio::time::timeout_at(deadline, lines.next_line()) => next,
            };
            let line = match next {
                Err(_elapsed) => {
                    interrupt(&mut child, Interrupt::Timeout(invocation.timeout)).await;
                    return Err(AdapterError::Timeout(invocation.timeout));
                }
                Ok(result) => result?,
            };
            let Some(line) = line else { break };
            stdout_bytes += line.len() as u64 + 1;

            match parse_stream_line(&line) {
                StreamEvent::Assistant { activity, usage } => {
                    if usage.is_some() {
                        last_assistant = usage;
                    }
                    if let Some(activity) = activity {
                        let tokens_so_far = last_assistant
                            .as_ref()
                            .map(TokenUsage::billed)
                            .unwrap_or_default();
                        // Drop on backpressure: activity is advisory.
                        let _ = stream_tx.try_send(StreamActivity {
                            activity,
                            tokens_so_far,
                        });
                    }
                }
                StreamEvent::Result { usage } => result_usage = Some(usage),
                StreamEvent::Other => {}
            }
        }

        // The wait future borrows the child, so resolve the race first
        // and only then interrupt.
        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            waited = tokio::time::timeout_at(deadline, child.wait()) => Some(waited),
        };
        let status = match waited {
            None => {
                interrupt(&mut child, Interrupt::Cancelled).await;
                return Err(AdapterError::Cancelled);
            }
            Some(Err(_elapsed)) => {
                interrupt(&mut child, Interrupt::Timeout(invocation.timeout)).await;
                return Err(AdapterError::Timeout(invocation.timeout));
            }
            Some(Ok(status)) => status?,
        };

        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(AdapterError::NonZeroExit {
                code: status.code().unwrap_or(-1),
                stderr_tail,
            });
        }

        // Token fallback chain: result line, then the last assistant
        // line's running totals, then bytes/4 as a coarse estimate.
        let usage = result_usage.or(last_assistant).unwrap_or_default();
        let tokens_used = if usage.is_zero() {
            stdout_bytes / 4
        } else {
            usage.billed()
        };

        tracing::info!(
            step_id = %invocation.step_id,
            tokens_used,
            "adapter run completed"
        );

        Ok(AdapterOutcome { tokens_used, usage })
    }
}

fn tail(buf: &[u8], max: usize) -> &[u8] {
    if buf.len() <= max {
        buf
    } else {
        &buf[buf.len() - max..]
    }
}

/// Interrupt the subprocess: SIGINT, grace window, then SIGKILL.
async fn interrupt(child: &mut Child, reason: Interrupt) {
    match reason {
        Interrupt::Timeout(after) => {
            tracing::warn!(after_secs = after.as_secs(), "adapter timed out, interrupting")
        }
        Interrupt::Cancelled => tracing::debug!("adapter cancelled, interrupting"),
    }

    send_interrupt(child);

    if tokio::time::timeout(kill_grace(), child.wait()).await.is_err() {
        tracing::warn!("adapter ignored interrupt, killing");
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

#[cfg(unix)]
fn send_interrupt(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGINT);
    }
}

#[cfg(not(unix))]
fn send_interrupt(_child: &Child) {}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
