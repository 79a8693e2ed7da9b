// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the adapters crate.

use crate::AdapterInvocation;
use std::time::Duration;

/// `WAVE_*` variables every adapter subprocess receives on top of the
/// inherited environment.
pub fn wave_env(invocation: &AdapterInvocation) -> Vec<(String, String)> {
    vec![
        (
            "WAVE_PIPELINE_ID".to_string(),
            invocation.pipeline_id.to_string(),
        ),
        ("WAVE_STEP_ID".to_string(), invocation.step_id.to_string()),
        (
            "WAVE_WORKSPACE".to_string(),
            invocation.workspace.to_string_lossy().into_owned(),
        ),
        ("WAVE_PERSONA".to_string(), invocation.persona.clone()),
        (
            "WAVE_RUN_ATTEMPT".to_string(),
            invocation.attempt.to_string(),
        ),
    ]
}

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Grace window between SIGINT and SIGKILL (default: 5000ms).
pub fn kill_grace() -> Duration {
    parse_duration_ms("WAVE_GRACE_MS").unwrap_or(Duration::from_secs(5))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
