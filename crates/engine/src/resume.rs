// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resume classification
//!
//! Decides which steps of a prior run can be skipped: a step counts as
//! completed only if its record says so, its workspace still exists,
//! and every required output artifact is still present. Anything less
//! demotes the step to pending and it re-runs.

use crate::matrix::MATRIX_RESULT;
use std::collections::HashMap;
use std::path::PathBuf;
use wave_core::{StepId, StepState};
use wave_pipeline::{PipelineDef, Plan};
use wave_storage::StepRecord;

/// What survived from the prior run.
#[derive(Debug, Default)]
pub struct ResumeReport {
    /// Steps to skip, in topological order.
    pub completed: Vec<StepId>,
    /// Steps recorded completed but demoted (workspace or artifacts gone).
    pub demoted: Vec<StepId>,
    /// Artifact map entries rebuilt from surviving workspaces.
    pub artifacts: Vec<((StepId, String), PathBuf)>,
    /// The pipeline definition hash no longer matches the record.
    pub definition_changed: bool,
}

/// Classify prior step records against the live filesystem.
///
/// With `from_step`, only steps strictly before it in topological order
/// are eligible to skip; everything at or after it re-runs.
pub(crate) fn classify(
    pipeline: &PipelineDef,
    plan: &Plan,
    prior_steps: &[StepRecord],
    from_step: Option<&StepId>,
    definition_changed: bool,
) -> ResumeReport {
    let records: HashMap<&StepId, &StepRecord> =
        prior_steps.iter().map(|r| (&r.step_id, r)).collect();
    let cutoff = from_step.and_then(|id| plan.position(id));

    let mut report = ResumeReport {
        definition_changed,
        ..ResumeReport::default()
    };

    for step_id in plan.topo_order() {
        let Some(record) = records.get(&step_id) else {
            continue;
        };
        if record.state != StepState::Completed {
            continue;
        }
        if let Some(cutoff) = cutoff {
            match plan.position(&step_id) {
                Some(position) if position < cutoff => {}
                _ => continue,
            }
        }

        let Some(step) = pipeline.get_step(step_id.as_str()) else {
            continue;
        };
        let Some(workspace) = record.workspace_path.as_ref().filter(|p| p.exists()) else {
            report.demoted.push(step_id.clone());
            continue;
        };

        // Matrix steps published only the synthetic aggregate.
        let mut recovered: Vec<(String, PathBuf)> = Vec::new();
        let mut intact = true;
        if step.matrix().is_some() {
            let aggregate = workspace.join(MATRIX_RESULT);
            if aggregate.exists() {
                recovered.push((MATRIX_RESULT.to_string(), aggregate));
            } else {
                intact = false;
            }
        } else {
            for output in &step.output_artifacts {
                let path = workspace.join(&output.path);
                if path.exists() {
                    recovered.push((output.path.clone(), path));
                } else if output.required {
                    intact = false;
                    break;
                }
            }
        }

        if !intact {
            report.demoted.push(step_id.clone());
            continue;
        }

        for (name, path) in recovered {
            report
                .artifacts
                .push(((step_id.clone(), name), path));
        }
        report.completed.push(step_id.clone());
    }

    report
}

#[cfg(test)]
#[path = "resume_tests.rs"]
mod tests;
