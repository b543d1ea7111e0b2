// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use regex::Regex;

use super::error::ConfigError;

/// A regex compiled at load time, with its source text kept for display.
#[derive(Clone)]
pub struct CompiledPattern {
    pub pattern: String,
    pub regex: Regex,
}

impl CompiledPattern {
    /// Compile a regex pattern, returning `ConfigError::SecurityPattern` on failure.
    pub fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::SecurityPattern {
            pattern: pattern.to_string(),
            source: e,
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Byte ranges of every non-overlapping match in `text`.
    pub fn find_ranges(&self, text: &str) -> Vec<std::ops::Range<usize>> {
        self.regex.find_iter(text).map(|m| m.range()).collect()
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("pattern", &self.pattern)
            .finish()
    }
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

/// A compiled pattern with the human-readable label reported when it fires.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPattern {
    pub label: String,
    pub pattern: CompiledPattern,
}

impl LabeledPattern {
    pub fn compile(label: &str, pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            label: label.to_string(),
            pattern: CompiledPattern::compile(pattern)?,
        })
    }
}
