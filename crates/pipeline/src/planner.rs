// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DAG planner
//!
//! Validates a pipeline's step graph and produces a layered topological
//! plan. Each layer holds steps whose dependencies all lie in strictly
//! earlier layers, so everything in one layer may dispatch in parallel.
//! Within a layer, steps keep their declaration order so two plans of
//! the same document are byte-identical.

use crate::def::{PipelineDef, StepDef};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use wave_core::StepId;

/// One validation offense found while planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offense {
    /// Where the offense was found (step ID or `pipeline`).
    pub location: String,
    pub message: String,
}

impl Offense {
    fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Offense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Planner rejection carrying every offense found, not just the first.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid pipeline: {}", format_offenses(.0))]
    Invalid(Vec<Offense>),
}

impl PlanError {
    /// The full offense list.
    pub fn offenses(&self) -> &[Offense] {
        match self {
            PlanError::Invalid(offenses) => offenses,
        }
    }
}

fn format_offenses(offenses: &[Offense]) -> String {
    offenses
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A validated execution plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    layers: Vec<Vec<StepId>>,
    /// Reverse edges: step -> steps that depend on it directly.
    dependents: HashMap<StepId, Vec<StepId>>,
}

impl Plan {
    /// Topological layers; steps within a layer are dispatchable in parallel.
    pub fn layers(&self) -> &[Vec<StepId>] {
        &self.layers
    }

    /// Flattened topological order (layer by layer, declaration order within).
    pub fn topo_order(&self) -> Vec<StepId> {
        self.layers.iter().flatten().cloned().collect()
    }

    /// Position of a step in the flattened topological order.
    pub fn position(&self, id: &StepId) -> Option<usize> {
        self.layers.iter().flatten().position(|s| s == id)
    }

    /// Every step that transitively depends on `id`, in topological order.
    pub fn transitive_consumers(&self, id: &StepId) -> Vec<StepId> {
        let mut reached = HashSet::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(consumers) = self.dependents.get(&current) {
                for consumer in consumers {
                    if reached.insert(consumer.clone()) {
                        stack.push(consumer.clone());
                    }
                }
            }
        }
        self.topo_order()
            .into_iter()
            .filter(|s| reached.contains(s))
            .collect()
    }

    /// Total number of steps in the plan.
    pub fn step_count(&self) -> usize {
        self.layers.iter().map(|l| l.len()).sum()
    }
}

/// Validate a pipeline and produce its layered plan.
///
/// Rejections enumerate all offenses: duplicate step IDs, unknown
/// dependency references, cycles (named), structural rule violations,
/// and unreachable injected artifacts.
pub fn plan(def: &PipelineDef) -> Result<Plan, PlanError> {
    let mut offenses = Vec::new();

    // Duplicate step IDs
    let mut seen = HashSet::new();
    for step in &def.steps {
        if !seen.insert(step.id.clone()) {
            offenses.push(Offense::new(
                step.id.as_str(),
                "duplicate step ID".to_string(),
            ));
        }
    }

    let ids: HashSet<&StepId> = def.steps.iter().map(|s| &s.id).collect();

    // Unknown dependency references
    for step in &def.steps {
        for dep in &step.dependencies {
            if !ids.contains(dep) {
                offenses.push(Offense::new(
                    step.id.as_str(),
                    format!("dependency references unknown step `{}`", dep),
                ));
            }
        }
    }

    // Structural rules on individual steps
    for step in &def.steps {
        check_structure(step, &mut offenses);
    }

    // Cycle detection only makes sense on a well-formed edge set
    if offenses.is_empty() {
        if let Some(cycle) = find_cycle(def) {
            offenses.push(Offense::new("pipeline", format!("cycle: {}", cycle)));
        }
    }

    if offenses.is_empty() {
        check_artifact_reachability(def, &mut offenses);
    }

    if !offenses.is_empty() {
        return Err(PlanError::Invalid(offenses));
    }

    Ok(build_layers(def))
}

fn check_structure(step: &StepDef, offenses: &mut Vec<Offense>) {
    if step.concurrency < 0 {
        offenses.push(Offense::new(
            step.id.as_str(),
            format!("concurrency must not be negative (got {})", step.concurrency),
        ));
    }
    if step.matrix().is_some() && step.concurrency > 1 {
        offenses.push(Offense::new(
            step.id.as_str(),
            "strategy.matrix and concurrency > 1 are mutually exclusive",
        ));
    }
    if let Some(max) = step.max_concurrent_agents {
        if max > 10 {
            offenses.push(Offense::new(
                step.id.as_str(),
                format!("max_concurrent_agents must be <= 10 (got {})", max),
            ));
        }
    }
    if let Some(matrix) = step.matrix() {
        if matrix.items_source.is_empty() {
            offenses.push(Offense::new(
                step.id.as_str(),
                "strategy.matrix.items_source must not be empty",
            ));
        }
        if matrix.max_concurrency == 0 {
            offenses.push(Offense::new(
                step.id.as_str(),
                "strategy.matrix.max_concurrency must be at least 1",
            ));
        }
    }
    if let Some(contract) = step.contract() {
        if step.output(&contract.source).is_none() {
            offenses.push(Offense::new(
                step.id.as_str(),
                format!(
                    "contract source `{}` is not a declared output artifact",
                    contract.source
                ),
            ));
        }
    }
}

/// DFS with gray/black coloring; returns the cycle path when one exists.
fn find_cycle(def: &PipelineDef) -> Option<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let deps: HashMap<&StepId, &[StepId]> = def
        .steps
        .iter()
        .map(|s| (&s.id, s.dependencies.as_slice()))
        .collect();

    let mut color: HashMap<&StepId, Color> =
        def.steps.iter().map(|s| (&s.id, Color::White)).collect();

    // Iterative DFS so deep chains cannot blow the stack.
    for start in def.steps.iter().map(|s| &s.id) {
        if color.get(start) != Some(&Color::White) {
            continue;
        }
        let mut path: Vec<&StepId> = Vec::new();
        let mut stack: Vec<(&StepId, usize)> = vec![(start, 0)];
        while let Some((node, next_child)) = stack.pop() {
            if next_child == 0 {
                color.insert(node, Color::Gray);
                path.push(node);
            }
            let children = deps.get(node).copied().unwrap_or(&[]);
            if next_child < children.len() {
                stack.push((node, next_child + 1));
                let child = &children[next_child];
                match color.get(child) {
                    Some(Color::Gray) => {
                        // Found a back edge; name the cycle from the
                        // child's position in the current path.
                        let from = path.iter().position(|n| *n == child).unwrap_or(0);
                        let mut names: Vec<&str> =
                            path[from..].iter().map(|s| s.as_str()).collect();
                        names.push(child.as_str());
                        return Some(names.join(" -> "));
                    }
                    Some(Color::White) => stack.push((child, 0)),
                    _ => {}
                }
            } else {
                color.insert(node, Color::Black);
                path.pop();
            }
        }
    }
    None
}

/// Invariant: every injected artifact must be a declared output of a
/// transitive dependency, or the step would stall waiting for a file
/// nothing produces.
fn check_artifact_reachability(def: &PipelineDef, offenses: &mut Vec<Offense>) {
    let steps: HashMap<&StepId, &StepDef> = def.steps.iter().map(|s| (&s.id, s)).collect();

    for step in &def.steps {
        if step.memory.inject_artifacts.is_empty() {
            continue;
        }
        let upstream = transitive_deps(step, &steps);
        for inject in &step.memory.inject_artifacts {
            if !upstream.contains(&inject.step) {
                offenses.push(Offense::new(
                    step.id.as_str(),
                    format!(
                        "inject_artifacts references `{}` which is not a transitive dependency",
                        inject.step
                    ),
                ));
                continue;
            }
            let declared = steps
                .get(&inject.step)
                .map(|producer| producer.output(&inject.artifact).is_some())
                .unwrap_or(false);
            // The matrix aggregate is produced by the engine, not declared.
            let synthetic = inject.artifact == "matrix-result.json"
                && steps
                    .get(&inject.step)
                    .map(|producer| producer.matrix().is_some())
                    .unwrap_or(false);
            if !declared && !synthetic {
                offenses.push(Offense::new(
                    step.id.as_str(),
                    format!(
                        "artifact `{}` is not declared as an output of step `{}`",
                        inject.artifact, inject.step
                    ),
                ));
            }
        }
    }
}

fn transitive_deps(step: &StepDef, steps: &HashMap<&StepId, &StepDef>) -> HashSet<StepId> {
    let mut reached = HashSet::new();
    let mut stack: Vec<&StepId> = step.dependencies.iter().collect();
    while let Some(dep) = stack.pop() {
        if reached.insert(dep.clone()) {
            if let Some(upstream) = steps.get(dep) {
                stack.extend(upstream.dependencies.iter());
            }
        }
    }
    reached
}

/// Kahn-by-levels layering. Steps keep declaration order within a layer.
fn build_layers(def: &PipelineDef) -> Plan {
    let mut dependents: HashMap<StepId, Vec<StepId>> = HashMap::new();
    for step in &def.steps {
        for dep in &step.dependencies {
            dependents
                .entry(dep.clone())
                .or_default()
                .push(step.id.clone());
        }
    }

    let mut layers: Vec<Vec<StepId>> = Vec::new();
    let mut placed: HashSet<&StepId> = HashSet::new();

    while placed.len() < def.steps.len() {
        let layer: Vec<StepId> = def
            .steps
            .iter()
            .filter(|s| !placed.contains(&s.id))
            .filter(|s| s.dependencies.iter().all(|d| placed.contains(d)))
            .map(|s| s.id.clone())
            .collect();
        // plan() already rejected cycles, so every iteration places at
        // least one step.
        if layer.is_empty() {
            break;
        }
        for id in &layer {
            if let Some(step) = def.get_step(id.as_str()) {
                placed.insert(&step.id);
            }
        }
        layers.push(layer);
    }

    Plan { layers, dependents }
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
