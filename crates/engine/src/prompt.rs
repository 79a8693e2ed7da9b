// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt composition for adapter runs
//!
//! Section order: base protocol preamble, persona system prompt,
//! contract-compliance section, concurrency hint, tool restrictions,
//! then the step's task. On retries a validator-feedback section is
//! appended so the adapter sees exactly what failed.

use crate::contract::ValidationDetail;
use serde_json::Value;
use wave_pipeline::PermissionsDef;

const PREAMBLE: &str = "\
# Wave step protocol

You are one step of an automated pipeline. Work only inside the current \
workspace directory. Write every declared output artifact before \
exiting; downstream steps consume those files, not your chat output.";

/// Everything the composer needs for one attempt.
pub struct PromptContext<'a> {
    pub persona_name: &'a str,
    /// Contents of the persona's system prompt file, when it has one.
    pub persona_prompt: Option<&'a str>,
    /// Schema document of the handover contract, when declared.
    pub contract_schema: Option<&'a Value>,
    /// Artifact the contract validates.
    pub contract_source: Option<&'a str>,
    pub max_concurrent_agents: Option<u32>,
    pub permissions: &'a PermissionsDef,
    /// Rendered task prompt (the step's exec source after interpolation).
    pub task: &'a str,
    /// Validator details from the previous failed attempt.
    pub feedback: &'a [ValidationDetail],
}

/// Compose the full prompt for one adapter run.
pub fn compose(ctx: &PromptContext<'_>) -> String {
    let mut sections: Vec<String> = vec![PREAMBLE.to_string()];

    if let Some(persona_prompt) = ctx.persona_prompt {
        sections.push(format!(
            "# Persona: {}\n\n{}",
            ctx.persona_name,
            persona_prompt.trim_end()
        ));
    }

    if let (Some(schema), Some(source)) = (ctx.contract_schema, ctx.contract_source) {
        sections.push(contract_section(schema, source));
    }

    if let Some(max) = ctx.max_concurrent_agents.filter(|max| *max > 1) {
        sections.push(format!(
            "# Concurrency\n\nYou may coordinate up to {} concurrent sub-agents for this step.",
            max
        ));
    }

    if !ctx.permissions.is_empty() {
        sections.push(restriction_section(ctx.permissions));
    }

    sections.push(format!("# Task\n\n{}", ctx.task.trim_end()));

    if !ctx.feedback.is_empty() {
        let details = ctx
            .feedback
            .iter()
            .map(|d| format!("- {}", d))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!(
            "# Previous attempt failed validation\n\nFix these violations and rewrite the artifact:\n{}",
            details
        ));
    }

    sections.join("\n\n")
}

/// Schema summary the adapter can satisfy without reading the file.
fn contract_section(schema: &Value, source: &str) -> String {
    let mut lines = vec![format!(
        "# Handover contract\n\nThe artifact `{}` must validate against this schema.",
        source
    )];

    if let Some(title) = schema.get("title").and_then(Value::as_str) {
        lines.push(format!("Schema: {}", title));
    }
    if let Some(description) = schema.get("description").and_then(Value::as_str) {
        lines.push(description.to_string());
    }
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| fields.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if !required.is_empty() {
        lines.push(format!("Required fields: {}", required.join(", ")));
    }
    if let Ok(pretty) = serde_json::to_string_pretty(schema) {
        lines.push(format!("```json\n{}\n```", pretty));
    }
    lines.join("\n\n")
}

fn restriction_section(permissions: &PermissionsDef) -> String {
    let mut lines = vec!["# Tool restrictions".to_string()];
    if !permissions.allowed_tools.is_empty() {
        lines.push(format!(
            "Allowed tools: {}",
            permissions.allowed_tools.join(", ")
        ));
    }
    if !permissions.deny.is_empty() {
        lines.push(format!(
            "Denied tools (never use): {}",
            permissions.deny.join(", ")
        ));
    }
    lines.join("\n\n")
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
