// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads sluice.yaml, validates structure, resolves variable interpolation,
// compiles the code security policy, and computes a policy hash.

mod defaults;
mod error;
mod interpolation;
mod loader;
mod pattern;
mod raw;
mod source;
mod types;

pub use defaults::{default_allowed_modules, default_breaker_components, default_security_policy};
pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::{compute_hash, load_config};
pub use pattern::{CompiledPattern, LabeledPattern};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::*;

#[cfg(test)]
mod tests;
