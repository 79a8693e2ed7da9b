// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error classification shared across crates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of failure a step or pipeline can report.
///
/// Every error surfaced by the engine carries one of these kinds so
/// consumers can route failures without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected pipeline or manifest at load time
    Validation,
    /// Workspace create, mount, or lock failure
    Resource,
    /// Adapter subprocess failure: non-zero exit, timeout, bad output
    Adapter,
    /// Handover contract violation or missing required artifact
    Contract,
    /// Run context was cancelled; never retried
    Cancelled,
    /// Unexpected invariant violation
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Resource => "resource",
            ErrorKind::Adapter => "adapter",
            ErrorKind::Contract => "contract",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}
