// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NDJSON stream parsing for adapter stdout

use serde_json::Value;
use wave_core::TokenUsage;

/// A recognized line on the adapter's stdout stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Assistant turn: optional tool activity plus running usage totals.
    Assistant {
        activity: Option<String>,
        usage: Option<TokenUsage>,
    },
    /// Final result line carrying the authoritative usage.
    Result { usage: TokenUsage },
    /// Unparseable or unrecognized line; counted for the byte fallback only.
    Other,
}

/// Decode one stdout line.
pub fn parse_stream_line(line: &str) -> StreamEvent {
    let Ok(json) = serde_json::from_str::<Value>(line) else {
        return StreamEvent::Other;
    };
    match json.get("type").and_then(Value::as_str) {
        Some("assistant") => {
            let message = json.get("message").unwrap_or(&Value::Null);
            StreamEvent::Assistant {
                activity: first_tool_activity(message),
                usage: extract_usage(message).or_else(|| extract_usage(&json)),
            }
        }
        Some("result") => StreamEvent::Result {
            usage: extract_usage(&json)
                .or_else(|| extract_usage(json.get("message").unwrap_or(&Value::Null)))
                .unwrap_or_default(),
        },
        _ => StreamEvent::Other,
    }
}

fn extract_usage(value: &Value) -> Option<TokenUsage> {
    let usage = value.get("usage")?;
    serde_json::from_value(usage.clone()).ok()
}

/// Short human string for the first tool_use block of an assistant turn.
fn first_tool_activity(message: &Value) -> Option<String> {
    let content = message.get("content")?.as_array()?;
    content
        .iter()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
        .and_then(|block| {
            let name = block.get("name").and_then(Value::as_str)?;
            let input = block.get("input").unwrap_or(&Value::Null);
            Some(format_tool_activity(name, input))
        })
}

fn format_tool_activity(name: &str, input: &Value) -> String {
    let get = |key: &str| input.get(key).and_then(Value::as_str);
    match name {
        "Read" | "Write" | "Edit" => match get("file_path").or_else(|| get("path")) {
            Some(path) => format!("{} `{}`", name, path),
            None => name.to_string(),
        },
        "NotebookEdit" => match get("notebook_path") {
            Some(path) => format!("Edit `{}` (notebook)", path),
            None => name.to_string(),
        },
        "Bash" => match get("command") {
            Some(command) => format!("Bash `{}`", truncate(command, 60)),
            None => name.to_string(),
        },
        "Grep" | "Glob" => match get("pattern") {
            Some(pattern) => format!("{} `{}`", name, truncate(pattern, 60)),
            None => name.to_string(),
        },
        other => other.to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let prefix: String = s.chars().take(max).collect();
        format!("{}…", prefix)
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
