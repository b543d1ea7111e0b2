// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::Duration;

use super::pattern::{CompiledPattern, LabeledPattern};

// ---------------------------------------------------------------------------
// Top-level config (combines policy + runtime)
// ---------------------------------------------------------------------------

/// Top-level parsed and validated sluice config.
#[derive(Debug, Clone)]
pub struct Config {
    /// What generated code may do. Hashed.
    pub policy: PolicyConfig,
    /// How the service talks to its collaborators. Not hashed.
    pub runtime: RuntimeConfig,
    /// SHA256 of the source YAML: "sha256:{hex}".
    pub policy_hash: String,
}

impl Config {
    pub fn version(&self) -> &str {
        &self.policy.version
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: PolicyConfig {
                version: "v1".to_string(),
                security: super::defaults::default_security_policy(),
                sandbox: SandboxConfig::default(),
            },
            runtime: RuntimeConfig::default(),
            policy_hash: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Config version. Always "v1".
    pub version: String,
    pub security: SecurityPolicy,
    pub sandbox: SandboxConfig,
}

/// Pattern sets applied to generated code before it may run.
#[derive(Debug, Clone, Default)]
pub struct SecurityPolicy {
    /// Rejected unless the match sits inside an allow-listed import line.
    pub denylist: Vec<LabeledPattern>,
    /// Full-line patterns for import statements that excuse denylist hits.
    pub allowed_import_lines: Vec<CompiledPattern>,
    /// Rejected unconditionally (filesystem mutation, network access).
    pub forbidden: Vec<LabeledPattern>,
    /// Reported as warnings only.
    pub warnings: Vec<LabeledPattern>,
}

/// Limits for the analysis interpreter.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub timeout: Duration,
    /// Interpreter steps (statements plus loop iterations) before aborting.
    pub max_steps: u64,
    /// Rows kept in serialized table and series previews.
    pub head_rows: usize,
    /// Modules the `import` statement may load.
    pub allowed_modules: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_steps: 2_000_000,
            head_rows: 10,
            allowed_modules: super::defaults::default_allowed_modules(),
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub generation: GenerationConfig,
    pub recovery: RecoveryConfig,
    pub streaming: StreamingConfig,
    pub breakers: BreakerSettings,
    /// Environment label (e.g. "development", "production").
    pub environment: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            recovery: RecoveryConfig::default(),
            streaming: StreamingConfig::default(),
            breakers: BreakerSettings::default(),
            environment: "development".to_string(),
        }
    }
}

/// OpenAI-compatible generation backend.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout_ms: u64,
    pub health_timeout_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234".to_string(),
            model: "local-model".to_string(),
            api_key: None,
            temperature: 0.3,
            max_tokens: 4000,
            request_timeout_ms: 120_000,
            health_timeout_ms: 5_000,
        }
    }
}

/// Bounded repair loop run after a failed validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryConfig {
    pub max_attempts: u32,
    /// Delay before the first attempt; doubles per attempt.
    pub base_delay: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Delta pacing on the client connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamingConfig {
    /// Characters per delta event.
    pub chunk_chars: usize,
    /// Pause between delta events. Zero disables pacing.
    pub delay: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 8,
            delay: Duration::from_millis(20),
        }
    }
}

/// Thresholds for one circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Failure fraction over the rate window that opens the circuit.
    pub failure_rate_threshold: f64,
    /// How long an open circuit rejects calls before admitting trials.
    pub open_duration: Duration,
    /// Trial calls admitted while recovering; this many successes close it.
    pub max_half_open_trials: u32,
    pub rate_window: Duration,
    /// Samples required in the window before the rate rule applies.
    pub minimum_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_rate_threshold: 0.5,
            open_duration: Duration::from_secs(60),
            max_half_open_trials: 3,
            rate_window: Duration::from_secs(60),
            minimum_requests: 10,
        }
    }
}

impl BreakerConfig {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            open_duration,
            ..Self::default()
        }
    }
}

/// Breaker thresholds keyed by component, plus the fallback used for
/// components first seen at runtime.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub components: HashMap<String, BreakerConfig>,
    pub default: BreakerConfig,
}

impl BreakerSettings {
    pub fn for_component(&self, name: &str) -> BreakerConfig {
        self.components.get(name).copied().unwrap_or(self.default)
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            components: super::defaults::default_breaker_components(),
            default: BreakerConfig::default(),
        }
    }
}
