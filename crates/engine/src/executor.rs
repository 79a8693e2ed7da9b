// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline executor: layers, fan-out, cancellation, cleanup
//!
//! Dispatches the planner's layers in order, each layer's steps
//! concurrently under the `max_concurrent_workers` cap. Matrix and
//! worker-pool steps draw their workers from the same cap. One
//! cancellable context governs the run; worktree cleanup runs after it,
//! outside the cancelled context, so a cancelled run still cleans up.

use crate::artifacts::ArtifactMap;
use crate::bus::{EventBus, EventSink};
use crate::contract::ContractValidator;
use crate::error::EngineError;
use crate::matrix::{self, WorkerReport, MATRIX_RESULT};
use crate::resume::{self, ResumeReport};
use crate::sinks::StateStoreSink;
use crate::step::{run_step, StepEnv, StepError, StepResult, StepRun};
use crate::workspace::{WorkspaceManager, WorktreeRegistry};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use wave_core::{Clock, ErrorKind, Event, PipelineId, RunStatus, StepId, StepState};
use wave_pipeline::{plan, Manifest, PipelineDef, Plan, StepDef};
use wave_storage::{RunRecord, StateStore, StepRecord};

/// Content hash of a pipeline definition, stored on the run record so
/// resume can notice definition drift.
pub fn pipeline_hash(def: &PipelineDef) -> String {
    let serialized = serde_json::to_string(def).unwrap_or_default();
    let digest = Sha256::digest(serialized.as_bytes());
    format!("{:x}", digest)
}

/// Per-call knobs for [`PipelineExecutor::execute`].
pub struct ExecuteOptions {
    /// Fixed run ID; generated from the pipeline name when absent.
    pub pipeline_id: Option<PipelineId>,
    /// Root against which prompt templates, persona files, and the
    /// `.wave/contracts` tree resolve.
    pub project_root: PathBuf,
    /// Keep all workspaces at exit, even on success.
    pub keep_workspaces: bool,
    /// Additional sinks; a state-store sink is always registered.
    pub sinks: Vec<Box<dyn EventSink>>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            pipeline_id: None,
            project_root: PathBuf::from("."),
            keep_workspaces: false,
            sinks: Vec::new(),
        }
    }
}

/// What a run produced, for the caller that launched it.
#[derive(Debug)]
pub struct RunSummary {
    pub pipeline_id: PipelineId,
    pub status: RunStatus,
    pub completed: Vec<StepId>,
    pub failed: Vec<(StepId, String)>,
    pub skipped: Vec<StepId>,
    pub tokens_total: u64,
    pub artifacts: Vec<((StepId, String), PathBuf)>,
}

/// Shared, owned state for one run; `Arc`ed into step tasks.
struct RunContext<A, C: Clock> {
    pipeline_id: PipelineId,
    pipeline: PipelineDef,
    manifest: Manifest,
    runner: A,
    clock: C,
    bus: EventBus,
    workspaces: WorkspaceManager,
    registry: WorktreeRegistry,
    validator: ContractValidator,
    artifacts: ArtifactMap,
    project_root: PathBuf,
    input: Value,
}

impl<A: wave_adapters::AdapterRunner, C: Clock> RunContext<A, C> {
    fn step_env(&self) -> StepEnv<'_, A, C> {
        StepEnv {
            pipeline_id: &self.pipeline_id,
            manifest: &self.manifest,
            runner: &self.runner,
            clock: &self.clock,
            bus: &self.bus,
            workspaces: &self.workspaces,
            registry: &self.registry,
            validator: &self.validator,
            artifacts: &self.artifacts,
            project_root: &self.project_root,
            input: &self.input,
        }
    }
}

/// Top-level coordinator for pipeline runs.
pub struct PipelineExecutor<A, S, C: Clock> {
    runner: A,
    store: Arc<S>,
    clock: C,
}

impl<A, S, C> PipelineExecutor<A, S, C>
where
    A: wave_adapters::AdapterRunner,
    S: StateStore,
    C: Clock,
{
    pub fn new(runner: A, store: Arc<S>, clock: C) -> Self {
        Self {
            runner,
            store,
            clock,
        }
    }

    /// Execute a pipeline from scratch.
    pub async fn execute(
        &self,
        cancel: CancellationToken,
        pipeline: &PipelineDef,
        manifest: &Manifest,
        input: Value,
        options: ExecuteOptions,
    ) -> Result<RunSummary, EngineError> {
        let plan = self.check(pipeline, manifest)?;
        let pipeline_id = options
            .pipeline_id
            .clone()
            .unwrap_or_else(|| PipelineId::generate(&pipeline.metadata.name));

        let record = RunRecord::new(
            pipeline_id.clone(),
            pipeline.metadata.name.clone(),
            input.clone(),
            self.clock.now(),
        )
        .with_pipeline_hash(pipeline_hash(pipeline));
        self.store.save_run(&record)?;
        for step in &pipeline.steps {
            self.store
                .upsert_step(&pipeline_id, &StepRecord::pending(step.id.clone()))?;
        }

        self.run(
            cancel,
            pipeline,
            manifest,
            input,
            plan,
            pipeline_id,
            ResumeReport::default(),
            options,
        )
        .await
    }

    /// Resume a prior run, skipping steps that completed with their
    /// workspaces and required artifacts intact.
    pub async fn resume(
        &self,
        cancel: CancellationToken,
        pipeline: &PipelineDef,
        manifest: &Manifest,
        pipeline_id: PipelineId,
        from_step: Option<StepId>,
        options: ExecuteOptions,
    ) -> Result<RunSummary, EngineError> {
        let plan = self.check(pipeline, manifest)?;

        let record = self
            .store
            .get_run(&pipeline_id)?
            .ok_or_else(|| EngineError::RunNotFound(pipeline_id.to_string()))?;
        let prior_steps = self.store.get_steps(&pipeline_id)?;

        let report = resume::classify(
            pipeline,
            &plan,
            &prior_steps,
            from_step.as_ref(),
            record
                .pipeline_hash
                .as_deref()
                .map(|prior| prior != pipeline_hash(pipeline))
                .unwrap_or(false),
        );

        // Reset the run and every residual step to a fresh state.
        let mut record = record;
        record.status = RunStatus::Running;
        record.updated_at = self.clock.now();
        self.store.save_run(&record)?;
        let completed: HashSet<&StepId> = report.completed.iter().collect();
        for step in &pipeline.steps {
            if !completed.contains(&step.id) {
                self.store
                    .upsert_step(&pipeline_id, &StepRecord::pending(step.id.clone()))?;
            }
        }

        self.run(
            cancel,
            pipeline,
            manifest,
            record.input_payload.clone(),
            plan,
            pipeline_id,
            report,
            options,
        )
        .await
    }

    fn check(&self, pipeline: &PipelineDef, manifest: &Manifest) -> Result<Plan, EngineError> {
        if pipeline.metadata.disabled {
            return Err(EngineError::Disabled(pipeline.metadata.name.clone()));
        }
        let plan = plan(pipeline)?;
        for step in &pipeline.steps {
            if manifest.resolve_persona(&step.persona).is_none() {
                return Err(EngineError::UnknownPersona(step.persona.clone()));
            }
        }
        Ok(plan)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        cancel: CancellationToken,
        pipeline: &PipelineDef,
        manifest: &Manifest,
        input: Value,
        plan: Plan,
        pipeline_id: PipelineId,
        prior: ResumeReport,
        options: ExecuteOptions,
    ) -> Result<RunSummary, EngineError> {
        let mut sinks = options.sinks;
        sinks.push(Box::new(StateStoreSink::new(
            Arc::clone(&self.store) as Arc<dyn StateStore>
        )));
        let (bus, bus_handle) = EventBus::start(pipeline_id.clone(), self.clock.clone(), sinks);

        let ctx = Arc::new(RunContext {
            pipeline_id: pipeline_id.clone(),
            pipeline: pipeline.clone(),
            manifest: manifest.clone(),
            runner: self.runner.clone(),
            clock: self.clock.clone(),
            bus,
            workspaces: WorkspaceManager::new(
                manifest.runtime.workspace_root.clone(),
                options.keep_workspaces,
            ),
            registry: WorktreeRegistry::new(),
            validator: ContractValidator::new(
                &options.project_root,
                &manifest.runtime.trusted_contract_roots,
            ),
            artifacts: ArtifactMap::new(),
            project_root: options.project_root.clone(),
            input,
        });

        replay_prior(&ctx, &prior).await;

        // Pipeline-level timeout wraps the run context; a watchdog flag
        // distinguishes it from user cancellation.
        let run_ctx = cancel.child_token();
        let timed_out = Arc::new(AtomicBool::new(false));
        let watchdog = manifest.runtime.pipeline_timeout_minutes.map(|minutes| {
            let run_ctx = run_ctx.clone();
            let timed_out = Arc::clone(&timed_out);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(60 * minutes)).await;
                timed_out.store(true, Ordering::Release);
                run_ctx.cancel();
            })
        });

        let outcome = self
            .dispatch_layers(&ctx, &plan, &prior, run_ctx.clone())
            .await;

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        // Cleanup runs on a fresh context: it must survive cancellation.
        ctx.workspaces.cleanup_worktrees(&ctx.registry).await;

        let was_timeout = timed_out.load(Ordering::Acquire);
        let status = if cancel.is_cancelled() && !was_timeout {
            RunStatus::Cancelled
        } else if was_timeout || !outcome.failed.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        if status == RunStatus::Completed {
            ctx.workspaces.cleanup_run(&pipeline_id).await;
        } else {
            tracing::info!(
                pipeline_id = %pipeline_id,
                "workspaces kept for inspection and resume"
            );
        }

        let artifacts = ctx.artifacts.snapshot();

        // Drop the last bus publisher so the dispatcher drains, then
        // finalize the run record: the state-store sink must see every
        // step transition before the status flips.
        drop(ctx);
        let _ = bus_handle.await;
        self.store
            .update_run_status(&pipeline_id, status, self.clock.now())?;

        Ok(RunSummary {
            pipeline_id,
            status,
            completed: outcome.completed,
            failed: outcome.failed,
            skipped: outcome.skipped,
            tokens_total: outcome.tokens_total,
            artifacts,
        })
    }

    async fn dispatch_layers(
        &self,
        ctx: &Arc<RunContext<A, C>>,
        plan: &Plan,
        prior: &ResumeReport,
        run_ctx: CancellationToken,
    ) -> LayerOutcome {
        let semaphore = Arc::new(Semaphore::new(ctx.manifest.runtime.max_concurrent_workers));
        let total_steps = plan.step_count();

        let mut completed: Vec<StepId> = prior.completed.clone();
        let mut failed: Vec<(StepId, String)> = Vec::new();
        let mut skipped: Vec<StepId> = Vec::new();
        let mut unavailable: HashMap<StepId, StepId> = HashMap::new(); // step -> root failing step
        let mut durations: Vec<u64> = Vec::new();
        let mut tokens_total: u64 = 0;
        let mut done: HashSet<StepId> = completed.iter().cloned().collect();

        for layer in plan.layers() {
            if run_ctx.is_cancelled() {
                break;
            }

            let mut join_set: JoinSet<(StepId, Result<StepResult, StepError>)> = JoinSet::new();

            for step_id in layer {
                if done.contains(step_id) {
                    continue;
                }
                let Some(step) = ctx.pipeline.get_step(step_id.as_str()) else {
                    continue;
                };

                // A dependency that failed or was skipped poisons this
                // step before it dispatches.
                if let Some(root) = step
                    .dependencies
                    .iter()
                    .find_map(|dep| unavailable.get(dep))
                    .cloned()
                {
                    skipped.push(step_id.clone());
                    unavailable.insert(step_id.clone(), root.clone());
                    ctx.bus
                        .publish(
                            Event::step(
                                ctx.clock.now(),
                                ctx.pipeline_id.clone(),
                                step_id.clone(),
                                StepState::Skipped,
                            )
                            .with_message(format!("skipped: upstream step `{}` failed", root)),
                        )
                        .await;
                    continue;
                }

                let ctx = Arc::clone(ctx);
                let step_id = step_id.clone();
                let semaphore = Arc::clone(&semaphore);
                let run_ctx = run_ctx.clone();
                join_set.spawn(async move {
                    let result = dispatch_step(&ctx, &step_id, semaphore, run_ctx).await;
                    (step_id, result)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                let (step_id, result) = match joined {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::error!(error = %e, "step task panicked or was aborted");
                        continue;
                    }
                };
                match result {
                    Ok(result) => {
                        for (name, path) in &result.artifacts {
                            ctx.artifacts
                                .insert(step_id.clone(), name.clone(), path.clone());
                        }
                        tokens_total += result.tokens;
                        durations.push(result.duration_ms);
                        done.insert(step_id.clone());
                        completed.push(step_id.clone());

                        let finished = completed.len() + failed.len() + skipped.len();
                        let mut progress = Event::pipeline(
                            ctx.clock.now(),
                            ctx.pipeline_id.clone(),
                            StepState::StepProgress,
                        )
                        .with_progress(finished, total_steps);
                        if let Some(estimate) = estimate_remaining(&durations, total_steps - finished)
                        {
                            progress = progress.with_estimated_time_ms(estimate);
                        }
                        ctx.bus.publish(progress).await;
                    }
                    Err(error) => {
                        unavailable.insert(step_id.clone(), step_id.clone());
                        failed.push((step_id, error.to_string()));
                    }
                }
            }
        }

        LayerOutcome {
            completed,
            failed,
            skipped,
            tokens_total,
        }
    }
}

struct LayerOutcome {
    completed: Vec<StepId>,
    failed: Vec<(StepId, String)>,
    skipped: Vec<StepId>,
    tokens_total: u64,
}

/// Moving-average estimate of remaining wall time.
fn estimate_remaining(durations: &[u64], remaining_steps: usize) -> Option<u64> {
    if durations.is_empty() || remaining_steps == 0 {
        return None;
    }
    let avg = durations.iter().sum::<u64>() / durations.len() as u64;
    Some(avg * remaining_steps as u64)
}

/// Re-emit synthetic events for steps completed in a prior run and
/// seed the artifact map from their surviving workspaces.
async fn replay_prior<A: wave_adapters::AdapterRunner, C: Clock>(
    ctx: &Arc<RunContext<A, C>>,
    prior: &ResumeReport,
) {
    if prior.completed.is_empty() && !prior.definition_changed {
        return;
    }

    let mut resuming = Event::pipeline(
        ctx.clock.now(),
        ctx.pipeline_id.clone(),
        StepState::Resuming,
    );
    resuming = if prior.definition_changed {
        resuming.with_message("pipeline definition changed since the prior run")
    } else {
        resuming.with_message(format!(
            "resuming: {} step(s) completed in prior run",
            prior.completed.len()
        ))
    };
    ctx.bus.publish(resuming).await;

    for ((step_id, name), path) in &prior.artifacts {
        ctx.artifacts
            .insert(step_id.clone(), name.clone(), path.clone());
    }
    for step_id in &prior.completed {
        ctx.bus
            .publish(
                Event::step(
                    ctx.clock.now(),
                    ctx.pipeline_id.clone(),
                    step_id.clone(),
                    StepState::Completed,
                )
                .with_duration_ms(0)
                .with_message("completed in prior run"),
            )
            .await;
    }
}

/// Run one step to a terminal state: simple, matrix, or worker pool.
async fn dispatch_step<A: wave_adapters::AdapterRunner, C: Clock>(
    ctx: &Arc<RunContext<A, C>>,
    step_id: &StepId,
    semaphore: Arc<Semaphore>,
    run_ctx: CancellationToken,
) -> Result<StepResult, StepError> {
    let step = ctx
        .pipeline
        .get_step(step_id.as_str())
        .ok_or_else(|| StepError::new(ErrorKind::Internal, format!("unknown step `{}`", step_id)))?;

    if step.matrix().is_some() {
        return dispatch_matrix(ctx, step, semaphore, run_ctx).await;
    }
    if let Some(width) = step.worker_pool() {
        return dispatch_pool(ctx, step, width, semaphore, run_ctx).await;
    }

    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| StepError::new(ErrorKind::Internal, "worker semaphore closed"))?;
    let env = ctx.step_env();
    run_step(
        &env,
        StepRun {
            step,
            worker: None,
            item: None,
            cancel: run_ctx,
            emit_lifecycle: true,
        },
    )
    .await
}

/// Matrix fan-out: one worker per item, bounded by the matrix cap and
/// the global worker cap. Worker results keep item order.
async fn dispatch_matrix<A: wave_adapters::AdapterRunner, C: Clock>(
    ctx: &Arc<RunContext<A, C>>,
    step: &StepDef,
    semaphore: Arc<Semaphore>,
    run_ctx: CancellationToken,
) -> Result<StepResult, StepError> {
    let Some(matrix_def) = step.matrix() else {
        return Err(StepError::new(ErrorKind::Internal, "matrix dispatch on plain step"));
    };

    emit_running(ctx, step).await;
    let started = std::time::Instant::now();

    let items = match matrix::resolve_items(step, &ctx.artifacts) {
        Ok(items) => items,
        Err(error) => {
            emit_failed(ctx, step, &error, started).await;
            return Err(error);
        }
    };
    let item_key = matrix_def.item_key.clone();
    let local_cap = Arc::new(Semaphore::new(matrix_def.max_concurrency));

    let worker_items = items.clone();
    let reports = run_workers(
        ctx,
        step,
        items.len(),
        semaphore,
        local_cap,
        run_ctx,
        move |index| {
            worker_items
                .get(index)
                .cloned()
                .map(|item| (item_key.clone(), item))
        },
    )
    .await;

    finish_fanout(ctx, step, items, reports, started).await
}

/// Worker pool: N workers over the same input.
async fn dispatch_pool<A: wave_adapters::AdapterRunner, C: Clock>(
    ctx: &Arc<RunContext<A, C>>,
    step: &StepDef,
    width: usize,
    semaphore: Arc<Semaphore>,
    run_ctx: CancellationToken,
) -> Result<StepResult, StepError> {
    emit_running(ctx, step).await;
    let started = std::time::Instant::now();

    // The manifest cap bounds pool width as well as global concurrency.
    let width = width.min(ctx.manifest.runtime.max_concurrent_workers);
    let local_cap = Arc::new(Semaphore::new(width));

    let reports = run_workers(ctx, step, width, semaphore, local_cap, run_ctx, |_| None).await;

    finish_fanout(ctx, step, Vec::new(), reports, started).await
}

/// Spawn `count` workers of `step`, each holding one global permit and
/// one local permit. Returns reports sorted by worker index.
async fn run_workers<A, C, F>(
    ctx: &Arc<RunContext<A, C>>,
    step: &StepDef,
    count: usize,
    global_cap: Arc<Semaphore>,
    local_cap: Arc<Semaphore>,
    run_ctx: CancellationToken,
    item_for: F,
) -> Vec<WorkerReport>
where
    A: wave_adapters::AdapterRunner,
    C: Clock,
    F: Fn(usize) -> Option<(String, Value)>,
{
    let mut join_set: JoinSet<WorkerReport> = JoinSet::new();
    let step_id = step.id.clone();

    for index in 0..count {
        let ctx = Arc::clone(ctx);
        let step_id = step_id.clone();
        let global_cap = Arc::clone(&global_cap);
        let local_cap = Arc::clone(&local_cap);
        let run_ctx = run_ctx.clone();
        let item = item_for(index);

        join_set.spawn(async move {
            let _local = local_cap.acquire_owned().await.ok();
            let _global = global_cap.acquire_owned().await.ok();

            let step = match ctx.pipeline.get_step(step_id.as_str()) {
                Some(step) => step,
                None => {
                    return WorkerReport {
                        index,
                        status: "failed".to_string(),
                        error: Some(format!("unknown step `{}`", step_id)),
                        artifacts: Vec::new(),
                        workspace: PathBuf::new(),
                        tokens: 0,
                    }
                }
            };
            let env = ctx.step_env();
            let result = run_step(
                &env,
                StepRun {
                    step,
                    worker: Some(index),
                    item: item.as_ref().map(|(key, value)| (key.as_str(), value)),
                    cancel: run_ctx,
                    emit_lifecycle: false,
                },
            )
            .await;

            match result {
                Ok(result) => WorkerReport {
                    index,
                    status: "completed".to_string(),
                    error: None,
                    artifacts: result.artifacts.iter().map(|(n, _)| n.clone()).collect(),
                    workspace: result.workspace_path,
                    tokens: result.tokens,
                },
                Err(error) => WorkerReport {
                    index,
                    status: "failed".to_string(),
                    error: Some(error.to_string()),
                    artifacts: Vec::new(),
                    workspace: ctx.workspaces.step_dir(
                        &ctx.pipeline_id,
                        &step_id,
                        Some(index),
                    ),
                    tokens: 0,
                },
            }
        });
    }

    let mut reports: Vec<WorkerReport> = Vec::with_capacity(count);
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => tracing::error!(error = %e, "worker task panicked or was aborted"),
        }
    }
    // Stable item order, independent of completion order.
    reports.sort_by_key(|r| r.index);
    reports
}

/// Aggregate worker reports, write `matrix-result.json`, and emit the
/// step's terminal event.
async fn finish_fanout<A: wave_adapters::AdapterRunner, C: Clock>(
    ctx: &Arc<RunContext<A, C>>,
    step: &StepDef,
    items: Vec<Value>,
    reports: Vec<WorkerReport>,
    started: std::time::Instant,
) -> Result<StepResult, StepError> {
    let step_dir = ctx.workspaces.step_dir(&ctx.pipeline_id, &step.id, None);
    let aggregate_path = matrix::write_aggregate(&step_dir, &items, &reports)?;

    let succeeded = reports.iter().filter(|r| r.status == "completed").count();
    let failed = reports.len() - succeeded;
    let tokens: u64 = reports.iter().map(|r| r.tokens).sum();
    let duration_ms = started.elapsed().as_millis() as u64;

    if succeeded == 0 {
        let error = StepError::new(
            ErrorKind::Adapter,
            format!("all {} workers failed", reports.len()),
        );
        emit_failed(ctx, step, &error, started).await;
        return Err(error);
    }

    ctx.bus
        .publish(
            Event::step(
                ctx.clock.now(),
                ctx.pipeline_id.clone(),
                step.id.clone(),
                StepState::Completed,
            )
            .with_persona(&step.persona)
            .with_duration_ms(duration_ms)
            .with_tokens(tokens)
            .with_message(format!("{} workers succeeded, {} failed", succeeded, failed))
            .with_workspace_path(step_dir.to_string_lossy()),
        )
        .await;

    Ok(StepResult {
        artifacts: vec![(MATRIX_RESULT.to_string(), aggregate_path)],
        tokens,
        workspace_path: step_dir,
        retries: 0,
        warnings: Vec::new(),
        duration_ms,
    })
}

async fn emit_running<A: wave_adapters::AdapterRunner, C: Clock>(
    ctx: &Arc<RunContext<A, C>>,
    step: &StepDef,
) {
    let mut event = Event::step(
        ctx.clock.now(),
        ctx.pipeline_id.clone(),
        step.id.clone(),
        StepState::Running,
    )
    .with_persona(&step.persona);
    if let Some(resolved) = ctx.manifest.resolve_persona(&step.persona) {
        event = event.with_adapter(resolved.adapter_name);
        if let Some(model) = &resolved.persona.model {
            event = event.with_model(model);
        }
    }
    ctx.bus.publish(event).await;
}

async fn emit_failed<A: wave_adapters::AdapterRunner, C: Clock>(
    ctx: &Arc<RunContext<A, C>>,
    step: &StepDef,
    error: &StepError,
    started: std::time::Instant,
) {
    ctx.bus
        .publish(
            Event::step(
                ctx.clock.now(),
                ctx.pipeline_id.clone(),
                step.id.clone(),
                StepState::Failed,
            )
            .with_persona(&step.persona)
            .with_duration_ms(started.elapsed().as_millis() as u64)
            .with_message(error.to_string()),
        )
        .await;
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
