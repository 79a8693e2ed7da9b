// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token usage accounting for adapter runs

use serde::{Deserialize, Serialize};

/// Token counts reported by an adapter subprocess.
///
/// Cache reads are tracked but never billed: re-reading cached prompt
/// prefix is not new work, so [`TokenUsage::billed`] excludes it.
/// Streaming and final counts use the same formula so displays never
/// inflate mid-run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

impl TokenUsage {
    /// Billed tokens: input + output + cache creation.
    pub fn billed(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_input_tokens
    }

    /// True when no tokens were observed at all.
    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0
            && self.output_tokens == 0
            && self.cache_creation_input_tokens == 0
            && self.cache_read_input_tokens == 0
    }

    /// Sum two usage reports field by field.
    pub fn add(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            cache_creation_input_tokens: self.cache_creation_input_tokens
                + other.cache_creation_input_tokens,
            cache_read_input_tokens: self.cache_read_input_tokens + other.cache_read_input_tokens,
        }
    }
}

#[cfg(test)]
#[path = "tokens_tests.rs"]
mod tests;
