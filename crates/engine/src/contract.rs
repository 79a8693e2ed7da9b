// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handover contract validation
//!
//! Validates a step's source artifact against a JSON schema. LLM output
//! often wraps JSON in prose, so a recovery parser extracts the
//! outermost balanced `{...}`/`[...]` (string-aware) and strips
//! comments outside strings before giving up. Compiled schemas are
//! cached by absolute path + mtime. Schema paths resolve only inside
//! approved roots; anything escaping a root after symlink resolution is
//! rejected.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use wave_core::file_uri_path;

/// One structured validation failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationDetail {
    /// JSON pointer into the artifact.
    pub path: String,
    /// Violated schema keyword, or `parse` for recovery failures.
    pub kind: String,
    pub message: String,
    /// `file://` URI of the offending artifact.
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl std::fmt::Display for ValidationDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{} [{}]: {} ({})", path, self.kind, self.message, self.file)
    }
}

/// Result of a contract check that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractOutcome {
    Passed,
    /// Violations found but `must_pass=false`: success with warnings.
    Warned(Vec<ValidationDetail>),
    Failed(Vec<ValidationDetail>),
}

impl ContractOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ContractOutcome::Failed(_))
    }
}

/// Errors in the validation machinery itself (not artifact violations).
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("schema path `{path}` is outside the approved contract roots")]
    SchemaPathRejected { path: String },
    #[error("schema `{path}` not found under any approved root")]
    SchemaNotFound { path: String },
    #[error("schema read failed: {0}")]
    SchemaRead(String),
    #[error("schema compile failed: {0}")]
    SchemaCompile(String),
    #[error("artifact read failed: {0}")]
    ArtifactRead(String),
}

struct CachedSchema {
    mtime: SystemTime,
    validator: Arc<jsonschema::Validator>,
}

/// Schema-backed artifact validator with a compiled-schema cache.
pub struct ContractValidator {
    approved_roots: Vec<PathBuf>,
    cache: Mutex<HashMap<PathBuf, CachedSchema>>,
}

impl ContractValidator {
    /// Roots: `<project_root>/.wave/contracts` plus the manifest's
    /// trusted absolute paths.
    pub fn new(project_root: &Path, trusted_roots: &[PathBuf]) -> Self {
        let mut approved_roots = vec![project_root.join(".wave/contracts")];
        approved_roots.extend(trusted_roots.iter().cloned());
        Self {
            approved_roots,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Validate `artifact_path` against the named schema.
    pub fn validate(
        &self,
        schema_path: &str,
        artifact_path: &Path,
        must_pass: bool,
    ) -> Result<ContractOutcome, ContractError> {
        let resolved = self.resolve_schema(schema_path)?;
        let validator = self.compiled(&resolved)?;

        let text = std::fs::read_to_string(artifact_path)
            .map_err(|e| ContractError::ArtifactRead(format!("{}: {}", artifact_path.display(), e)))?;
        let file = file_uri_path(artifact_path);

        let instance = match recover_json(&text) {
            Ok(value) => value,
            Err(message) => {
                // Unrecoverable artifact: stop here with a parse detail.
                let detail = ValidationDetail {
                    path: String::new(),
                    kind: "parse".to_string(),
                    message,
                    file,
                    line: None,
                    column: None,
                };
                return Ok(if must_pass {
                    ContractOutcome::Failed(vec![detail])
                } else {
                    ContractOutcome::Warned(vec![detail])
                });
            }
        };

        let details: Vec<ValidationDetail> = validator
            .iter_errors(&instance)
            .map(|error| ValidationDetail {
                path: error.instance_path.to_string(),
                kind: keyword_of(&error),
                message: error.to_string(),
                file: file.clone(),
                line: None,
                column: None,
            })
            .collect();

        Ok(if details.is_empty() {
            ContractOutcome::Passed
        } else if must_pass {
            ContractOutcome::Failed(details)
        } else {
            ContractOutcome::Warned(details)
        })
    }

    /// Resolve and read a schema document (for prompt composition).
    pub fn load_schema(&self, schema_path: &str) -> Result<Value, ContractError> {
        let resolved = self.resolve_schema(schema_path)?;
        read_schema_value(&resolved)
    }

    /// Resolve a schema reference against the approved roots.
    ///
    /// Relative paths are tried under each root in order; absolute
    /// paths must land inside a root after symlink resolution.
    fn resolve_schema(&self, schema_path: &str) -> Result<PathBuf, ContractError> {
        let requested = Path::new(schema_path);

        let candidates: Vec<PathBuf> = if requested.is_absolute() {
            vec![requested.to_path_buf()]
        } else {
            self.approved_roots
                .iter()
                .map(|root| root.join(requested))
                .collect()
        };

        for candidate in &candidates {
            let Ok(canonical) = candidate.canonicalize() else {
                continue;
            };
            let approved = self.approved_roots.iter().any(|root| {
                root.canonicalize()
                    .map(|canonical_root| canonical.starts_with(&canonical_root))
                    .unwrap_or(false)
            });
            if approved {
                return Ok(canonical);
            }
            // Exists but escapes every approved root
            return Err(ContractError::SchemaPathRejected {
                path: schema_path.to_string(),
            });
        }
        Err(ContractError::SchemaNotFound {
            path: schema_path.to_string(),
        })
    }

    fn compiled(&self, path: &Path) -> Result<Arc<jsonschema::Validator>, ContractError> {
        let mtime = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| ContractError::SchemaRead(e.to_string()))?;

        {
            let cache = self.cache.lock();
            if let Some(cached) = cache.get(path) {
                if cached.mtime == mtime {
                    return Ok(Arc::clone(&cached.validator));
                }
            }
        }

        let schema = read_schema_value(path)?;
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| ContractError::SchemaCompile(e.to_string()))?;
        let validator = Arc::new(validator);
        self.cache.lock().insert(
            path.to_path_buf(),
            CachedSchema {
                mtime,
                validator: Arc::clone(&validator),
            },
        );
        Ok(validator)
    }
}

fn read_schema_value(path: &Path) -> Result<Value, ContractError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ContractError::SchemaRead(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| ContractError::SchemaCompile(format!("{}: {}", path.display(), e)))
}

fn keyword_of(error: &jsonschema::ValidationError<'_>) -> String {
    // Debug form starts with the keyword variant name
    let debug = format!("{:?}", error.kind);
    debug
        .split(|c: char| c == ' ' || c == '{' || c == '(')
        .next()
        .unwrap_or("schema")
        .to_lowercase()
}

/// Parse JSON out of LLM-ish text.
///
/// Tries a direct parse, then each balanced `{...}`/`[...]` region in
/// order of appearance (string-aware), with a comment-stripping retry.
pub fn recover_json(text: &str) -> Result<Value, String> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    let bytes = text.as_bytes();
    let mut search_from = 0;
    while let Some(start) = find_json_start(bytes, search_from) {
        if let Some(end) = balanced_end(bytes, start) {
            let slice = &text[start..=end];
            if let Ok(value) = serde_json::from_str::<Value>(slice) {
                return Ok(value);
            }
            let stripped = strip_comments(slice);
            if let Ok(value) = serde_json::from_str::<Value>(&stripped) {
                return Ok(value);
            }
        }
        search_from = start + 1;
    }

    Err("no parseable JSON object or array found in artifact".to_string())
}

fn find_json_start(bytes: &[u8], from: usize) -> Option<usize> {
    bytes[from..]
        .iter()
        .position(|&b| b == b'{' || b == b'[')
        .map(|pos| from + pos)
}

/// Index of the byte closing the balanced region opened at `start`.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let (open, close) = match bytes[start] {
        b'{' => (b'{', b'}'),
        _ => (b'[', b']'),
    };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove `//` and `/* */` comments outside strings.
fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut in_string = false;
    let mut escaped = false;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            out.push(b);
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' => {
                in_string = true;
                out.push(b);
                i += 1;
            }
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'*' => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
#[path = "contract_tests.rs"]
mod tests;
