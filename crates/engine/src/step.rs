// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step execution: workspace, adapter, contract, retries
//!
//! One call runs one step attempt chain to a terminal state. The call
//! itself is single-threaded; all parallelism (layers, matrix workers,
//! pools) lives in the pipeline executor.

use crate::artifacts::ArtifactMap;
use crate::bus::EventBus;
use crate::contract::{ContractOutcome, ContractValidator, ValidationDetail};
use crate::prompt::{compose, PromptContext};
use crate::workspace::{WorkspaceManager, WorktreeRegistry};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wave_adapters::{AdapterInvocation, AdapterRunner, StreamActivity};
use wave_core::{file_uri_path, Clock, ErrorKind, Event, PipelineId, StepState};
use wave_pipeline::{ExecType, Manifest, OnFailure, StepDef};

/// Terminal failure of one step.
#[derive(Debug, Clone)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for StepError {}

/// Successful step outcome.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// `(artifact_name, absolute_path)` for every recovered output.
    pub artifacts: Vec<(String, PathBuf)>,
    pub tokens: u64,
    pub workspace_path: PathBuf,
    pub retries: u32,
    pub warnings: Vec<ValidationDetail>,
    pub duration_ms: u64,
}

/// Per-run dependencies shared by every step dispatch.
pub(crate) struct StepEnv<'a, A, C> {
    pub pipeline_id: &'a PipelineId,
    pub manifest: &'a Manifest,
    pub runner: &'a A,
    pub clock: &'a C,
    pub bus: &'a EventBus,
    pub workspaces: &'a WorkspaceManager,
    pub registry: &'a WorktreeRegistry,
    pub validator: &'a ContractValidator,
    pub artifacts: &'a ArtifactMap,
    pub project_root: &'a Path,
    pub input: &'a Value,
}

/// One dispatch of a step (or one matrix/pool worker of it).
pub(crate) struct StepRun<'a> {
    pub step: &'a StepDef,
    pub worker: Option<usize>,
    /// Matrix item bound as `${item.<key>}`.
    pub item: Option<(&'a str, &'a Value)>,
    pub cancel: CancellationToken,
    /// Workers inside a matrix/pool do not emit step lifecycle events;
    /// the aggregating dispatcher does.
    pub emit_lifecycle: bool,
}

pub(crate) async fn run_step<A: AdapterRunner, C: Clock>(
    env: &StepEnv<'_, A, C>,
    run: StepRun<'_>,
) -> Result<StepResult, StepError> {
    let step = run.step;
    let resolved = env
        .manifest
        .resolve_persona(&step.persona)
        .ok_or_else(|| {
            StepError::new(
                ErrorKind::Validation,
                format!("persona `{}` is not in the manifest", step.persona),
            )
        })?;

    let started = std::time::Instant::now();
    let timeout = Duration::from_secs(
        60 * step
            .exec
            .timeout_minutes
            .unwrap_or(env.manifest.runtime.default_timeout_minutes),
    );

    let max_retries = step.contract().map(|c| c.max_retries).unwrap_or(0);
    let mut feedback: Vec<ValidationDetail> = Vec::new();
    let mut tokens_total: u64 = 0;
    let mut attempt: u32 = 0;

    loop {
        // Each attempt announces itself: retrying -> running.
        if run.emit_lifecycle {
            let mut event = Event::step(
                env.clock.now(),
                env.pipeline_id.clone(),
                step.id.clone(),
                StepState::Running,
            )
            .with_persona(resolved.name)
            .with_adapter(resolved.adapter_name);
            if let Some(model) = &resolved.persona.model {
                event = event.with_model(model);
            }
            env.bus.publish(event).await;
        }

        let attempt_result = run_attempt(
            env,
            &run,
            &resolved,
            timeout,
            attempt,
            &feedback,
            &mut tokens_total,
        )
        .await;

        match attempt_result {
            Ok(AttemptOutcome::Success {
                workspace,
                artifacts,
                warnings,
            }) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                if run.emit_lifecycle {
                    let names: Vec<&str> =
                        artifacts.iter().map(|(name, _)| name.as_str()).collect();
                    env.bus
                        .publish(
                            Event::step(
                                env.clock.now(),
                                env.pipeline_id.clone(),
                                step.id.clone(),
                                StepState::Completed,
                            )
                            .with_persona(resolved.name)
                            .with_duration_ms(duration_ms)
                            .with_tokens(tokens_total)
                            .with_message(format!("artifacts: {}", names.join(", ")))
                            .with_workspace_path(workspace.to_string_lossy()),
                        )
                        .await;
                }
                return Ok(StepResult {
                    artifacts,
                    tokens: tokens_total,
                    workspace_path: workspace,
                    retries: attempt,
                    warnings,
                    duration_ms,
                });
            }
            Ok(AttemptOutcome::ContractFailed { workspace, details }) => {
                let on_failure = step
                    .contract()
                    .map(|c| c.on_failure)
                    .unwrap_or(OnFailure::Fail);
                let summary = summarize(&details);

                if on_failure == OnFailure::Retry && attempt < max_retries {
                    attempt += 1;
                    feedback = details;
                    if run.emit_lifecycle {
                        env.bus
                            .publish(
                                Event::step(
                                    env.clock.now(),
                                    env.pipeline_id.clone(),
                                    step.id.clone(),
                                    StepState::Retrying,
                                )
                                .with_persona(resolved.name)
                                .with_message(summary)
                                .with_workspace_path(workspace.to_string_lossy()),
                            )
                            .await;
                    }
                    continue;
                }

                let message = if on_failure == OnFailure::Retry {
                    format!(
                        "contract failed after {} retries: {}; see `ls {}`",
                        attempt,
                        summary,
                        file_uri_path(&workspace)
                    )
                } else {
                    format!("contract failed: {}; see `ls {}`", summary, file_uri_path(&workspace))
                };
                let error = StepError::new(ErrorKind::Contract, message);
                fail(env, &run, &resolved, Some(&workspace), &error, started).await;
                return Err(error);
            }
            Err(error) => {
                let workspace = env
                    .workspaces
                    .step_dir(env.pipeline_id, &step.id, run.worker);
                fail(env, &run, &resolved, Some(&workspace), &error, started).await;
                return Err(error);
            }
        }
    }
}

enum AttemptOutcome {
    Success {
        workspace: PathBuf,
        artifacts: Vec<(String, PathBuf)>,
        warnings: Vec<ValidationDetail>,
    },
    ContractFailed {
        workspace: PathBuf,
        details: Vec<ValidationDetail>,
    },
}

#[allow(clippy::too_many_arguments)]
async fn run_attempt<A: AdapterRunner, C: Clock>(
    env: &StepEnv<'_, A, C>,
    run: &StepRun<'_>,
    resolved: &wave_pipeline::ResolvedPersona<'_>,
    timeout: Duration,
    attempt: u32,
    feedback: &[ValidationDetail],
    tokens_total: &mut u64,
) -> Result<AttemptOutcome, StepError> {
    let step = run.step;

    // Workspace is recreated from scratch on every attempt.
    let workspace = env
        .workspaces
        .create(env.pipeline_id, step, run.worker, env.registry)
        .await
        .map_err(|e| StepError::new(ErrorKind::Resource, e.to_string()))?;

    let injected = env
        .workspaces
        .inject(&workspace, step, env.artifacts)
        .await
        .map_err(|e| StepError::new(ErrorKind::Resource, e.to_string()))?;

    let vars = template_vars(env, run, &workspace, injected);
    let task = render_task(env, step, &vars)?;

    let persona_prompt = match &resolved.persona.system_prompt_file {
        Some(file) => Some(
            std::fs::read_to_string(env.project_root.join(file)).map_err(|e| {
                StepError::new(
                    ErrorKind::Resource,
                    format!("persona prompt `{}`: {}", file.display(), e),
                )
            })?,
        ),
        None => None,
    };

    let contract_schema = match step.contract() {
        Some(contract) => Some(env.validator.load_schema(&contract.schema).map_err(|e| {
            StepError::new(ErrorKind::Contract, e.to_string())
        })?),
        None => None,
    };

    let prompt = compose(&PromptContext {
        persona_name: resolved.name,
        persona_prompt: persona_prompt.as_deref(),
        contract_schema: contract_schema.as_ref(),
        contract_source: step.contract().map(|c| c.source.as_str()),
        max_concurrent_agents: step.max_concurrent_agents,
        permissions: resolved.permissions(),
        task: &task,
        feedback,
    });

    // Forward adapter stream activity onto the bus.
    let (stream_tx, mut stream_rx) = mpsc::channel::<StreamActivity>(64);
    let forwarder = {
        let bus = env.bus.clone();
        let clock = env.clock.clone();
        let pipeline_id = env.pipeline_id.clone();
        let step_id = step.id.clone();
        tokio::spawn(async move {
            while let Some(activity) = stream_rx.recv().await {
                bus.publish(
                    Event::step(
                        clock.now(),
                        pipeline_id.clone(),
                        step_id.clone(),
                        StepState::StreamActivity,
                    )
                    .with_tool_activity(activity.activity)
                    .with_tokens(activity.tokens_so_far),
                )
                .await;
            }
        })
    };

    let mut adapter_env: Vec<(String, String)> = Vec::new();
    if let Some(model) = &resolved.persona.model {
        adapter_env.push(("WAVE_MODEL".to_string(), model.clone()));
    }

    let invocation = AdapterInvocation {
        pipeline_id: env.pipeline_id.clone(),
        step_id: step.id.clone(),
        persona: resolved.name.to_string(),
        binary: resolved.adapter.binary.clone(),
        mode: resolved.adapter.mode.clone(),
        workspace: workspace.clone(),
        prompt,
        env: adapter_env,
        timeout,
        attempt: attempt + 1,
    };

    let outcome = env
        .runner
        .run(invocation, stream_tx, run.cancel.clone())
        .await;
    let _ = forwarder.await;

    let outcome = outcome.map_err(|e| StepError::new(e.kind(), e.to_string()))?;
    *tokens_total += outcome.tokens_used;

    // Declared outputs: required ones must exist; optional ones are
    // recovered when present.
    let mut artifacts: Vec<(String, PathBuf)> = Vec::new();
    for output in &step.output_artifacts {
        let path = workspace.join(&output.path);
        if path.exists() {
            artifacts.push((output.path.clone(), path));
        } else if output.required {
            return Err(StepError::new(
                ErrorKind::Contract,
                format!(
                    "required artifact `{}` missing; see `ls {}`",
                    output.path,
                    file_uri_path(&workspace)
                ),
            ));
        }
    }

    let mut warnings = Vec::new();
    if let Some(contract) = step.contract() {
        let source_path = workspace.join(&contract.source);
        let result = env
            .validator
            .validate(&contract.schema, &source_path, contract.must_pass)
            .map_err(|e| StepError::new(ErrorKind::Contract, e.to_string()))?;
        match result {
            ContractOutcome::Passed => {}
            ContractOutcome::Warned(details) => warnings = details,
            ContractOutcome::Failed(details) => {
                return Ok(AttemptOutcome::ContractFailed { workspace, details })
            }
        }
    }

    Ok(AttemptOutcome::Success {
        workspace,
        artifacts,
        warnings,
    })
}

fn template_vars<A: AdapterRunner, C: Clock>(
    env: &StepEnv<'_, A, C>,
    run: &StepRun<'_>,
    workspace: &Path,
    injected: HashMap<String, String>,
) -> HashMap<String, String> {
    let mut vars = injected;
    vars.insert("pipeline_id".to_string(), env.pipeline_id.to_string());
    vars.insert("step_id".to_string(), run.step.id.to_string());
    vars.insert(
        "workspace".to_string(),
        workspace.to_string_lossy().into_owned(),
    );
    vars.insert("input".to_string(), env.input.to_string());
    if let Some(object) = env.input.as_object() {
        for (key, value) in object {
            vars.insert(format!("input.{}", key), scalar_string(value));
        }
    }
    if let Some((key, item)) = run.item {
        vars.insert(format!("item.{}", key), scalar_string(item));
        vars.insert("item".to_string(), item.to_string());
    }
    if let Some(n) = run.worker {
        vars.insert("worker".to_string(), n.to_string());
    }
    vars
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_task<A: AdapterRunner, C: Clock>(
    env: &StepEnv<'_, A, C>,
    step: &StepDef,
    vars: &HashMap<String, String>,
) -> Result<String, StepError> {
    let template = match step.exec.exec_type {
        ExecType::Inline => step.exec.source.clone(),
        ExecType::PromptFile => {
            let path = env.project_root.join(&step.exec.source);
            std::fs::read_to_string(&path).map_err(|e| {
                StepError::new(
                    ErrorKind::Resource,
                    format!("prompt template `{}`: {}", path.display(), e),
                )
            })?
        }
    };
    Ok(wave_pipeline::interpolate(&template, vars))
}

fn summarize(details: &[ValidationDetail]) -> String {
    let mut summary = details
        .iter()
        .take(3)
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    if details.len() > 3 {
        summary.push_str(&format!(" (+{} more)", details.len() - 3));
    }
    summary
}

async fn fail<A: AdapterRunner, C: Clock>(
    env: &StepEnv<'_, A, C>,
    run: &StepRun<'_>,
    resolved: &wave_pipeline::ResolvedPersona<'_>,
    workspace: Option<&Path>,
    error: &StepError,
    started: std::time::Instant,
) {
    tracing::warn!(
        step_id = %run.step.id,
        persona = resolved.name,
        kind = %error.kind,
        error = %error.message,
        "step failed"
    );
    if !run.emit_lifecycle {
        return;
    }
    let mut message = error.to_string();
    if let Some(workspace) = workspace {
        if !message.contains("file://") {
            message.push_str(&format!("; see `ls {}`", file_uri_path(workspace)));
        }
    }
    let mut event = Event::step(
        env.clock.now(),
        env.pipeline_id.clone(),
        run.step.id.clone(),
        StepState::Failed,
    )
    .with_persona(resolved.name)
    .with_adapter(resolved.adapter_name)
    .with_duration_ms(started.elapsed().as_millis() as u64)
    .with_message(message);
    if let Some(model) = &resolved.persona.model {
        event = event.with_model(model);
    }
    if let Some(workspace) = workspace {
        event = event.with_workspace_path(workspace.to_string_lossy());
    }
    env.bus.publish(event).await;
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
