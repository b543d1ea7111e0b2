// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
//
// Kept apart from the public config structs: the public types hold compiled
// regexes and durations, and interpolation happens between the two.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub sluice: String,
    pub environment: Option<String>,
    pub generation: Option<RawGenerationConfig>,
    pub sandbox: Option<RawSandboxConfig>,
    pub security: Option<RawSecurityConfig>,
    pub recovery: Option<RawRecoveryConfig>,
    pub streaming: Option<RawStreamingConfig>,
    #[serde(default)]
    pub breakers: HashMap<String, RawBreakerConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RawGenerationConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub request_timeout_ms: Option<u64>,
    pub health_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawSandboxConfig {
    pub timeout_ms: Option<u64>,
    pub max_steps: Option<u64>,
    pub head_rows: Option<usize>,
    pub allowed_modules: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawSecurityConfig {
    /// If false, skip the embedded default policy. Default: true.
    pub use_default_policy: Option<bool>,
    #[serde(default)]
    pub denylist: Vec<RawLabeledPattern>,
    #[serde(default)]
    pub allowed_import_lines: Vec<String>,
    #[serde(default)]
    pub forbidden: Vec<RawLabeledPattern>,
    #[serde(default)]
    pub warnings: Vec<RawLabeledPattern>,
}

#[derive(Debug, Deserialize)]
pub struct RawLabeledPattern {
    pub label: String,
    pub pattern: String,
}

#[derive(Debug, Deserialize)]
pub struct RawRecoveryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawStreamingConfig {
    pub chunk_chars: Option<usize>,
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawBreakerConfig {
    pub failure_threshold: Option<u32>,
    pub failure_rate_threshold: Option<f64>,
    pub open_secs: Option<u64>,
    pub max_half_open_trials: Option<u32>,
    pub rate_window_secs: Option<u64>,
    pub minimum_requests: Option<u32>,
}
