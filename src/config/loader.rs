// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::Duration;

use sha2::{Digest, Sha256};

use super::defaults::{compile_policy, default_security_policy};
use super::error::ConfigError;
use super::interpolation::{resolve_optional, resolve_variables};
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a sluice config from the given source.
///
/// Steps:
/// 1. Read raw YAML from the source
/// 2. Compute the SHA256 policy hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate versions, ranges and durations
/// 5. Resolve `${VAR}` interpolation in generation settings
/// 6. Compile security patterns (defaults first, then user patterns)
/// 7. Build the typed Config
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let policy_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.sluice != "v1" {
        return Err(ConfigError::Invalid(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.sluice
        )));
    }

    let security = build_security_policy(raw.security)?;
    let sandbox = build_sandbox_config(raw.sandbox)?;
    let generation = build_generation_config(raw.generation)?;
    let recovery = build_recovery_config(raw.recovery)?;
    let streaming = build_streaming_config(raw.streaming)?;
    let breakers = build_breaker_settings(raw.breakers)?;

    Ok(Config {
        policy: PolicyConfig {
            version: raw.sluice,
            security,
            sandbox,
        },
        runtime: RuntimeConfig {
            generation,
            recovery,
            streaming,
            breakers,
            environment: raw.environment.unwrap_or_else(|| "development".to_string()),
        },
        policy_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}

fn build_security_policy(
    raw: Option<raw::RawSecurityConfig>,
) -> Result<SecurityPolicy, ConfigError> {
    let raw = raw.unwrap_or_default();

    let mut policy = if raw.use_default_policy != Some(false) {
        default_security_policy()
    } else {
        SecurityPolicy::default()
    };

    let user = compile_policy(&raw)?;
    policy.denylist.extend(user.denylist);
    policy.allowed_import_lines.extend(user.allowed_import_lines);
    policy.forbidden.extend(user.forbidden);
    policy.warnings.extend(user.warnings);

    Ok(policy)
}

fn build_sandbox_config(raw: Option<raw::RawSandboxConfig>) -> Result<SandboxConfig, ConfigError> {
    let defaults = SandboxConfig::default();
    let raw = match raw {
        Some(r) => r,
        None => return Ok(defaults),
    };

    if raw.timeout_ms == Some(0) {
        return Err(ConfigError::Invalid(
            "sandbox timeout_ms must be > 0".into(),
        ));
    }
    if raw.max_steps == Some(0) {
        return Err(ConfigError::Invalid(
            "sandbox max_steps must be > 0".into(),
        ));
    }
    if raw.head_rows == Some(0) {
        return Err(ConfigError::Invalid(
            "sandbox head_rows must be >= 1".into(),
        ));
    }

    Ok(SandboxConfig {
        timeout: raw
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeout),
        max_steps: raw.max_steps.unwrap_or(defaults.max_steps),
        head_rows: raw.head_rows.unwrap_or(defaults.head_rows),
        allowed_modules: raw.allowed_modules.unwrap_or(defaults.allowed_modules),
    })
}

fn build_generation_config(
    raw: Option<raw::RawGenerationConfig>,
) -> Result<GenerationConfig, ConfigError> {
    let defaults = GenerationConfig::default();
    let raw = match raw {
        Some(r) => r,
        None => return Ok(defaults),
    };

    let base_url = match raw.base_url {
        Some(url) => resolve_variables(&url)?,
        None => defaults.base_url,
    };
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Invalid(format!(
            "generation base_url must be an http(s) URL, got \"{base_url}\""
        )));
    }

    let api_key = match raw.api_key {
        Some(key) => resolve_optional(&key)?,
        None => None,
    };

    let temperature = raw.temperature.unwrap_or(defaults.temperature);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ConfigError::Invalid(format!(
            "generation temperature must be in [0.0, 2.0], got {temperature}"
        )));
    }

    Ok(GenerationConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        model: raw.model.unwrap_or(defaults.model),
        api_key,
        temperature,
        max_tokens: raw.max_tokens.unwrap_or(defaults.max_tokens),
        request_timeout_ms: raw.request_timeout_ms.unwrap_or(defaults.request_timeout_ms),
        health_timeout_ms: raw.health_timeout_ms.unwrap_or(defaults.health_timeout_ms),
    })
}

fn build_recovery_config(
    raw: Option<raw::RawRecoveryConfig>,
) -> Result<RecoveryConfig, ConfigError> {
    let defaults = RecoveryConfig::default();
    let raw = match raw {
        Some(r) => r,
        None => return Ok(defaults),
    };

    Ok(RecoveryConfig {
        max_attempts: raw.max_attempts.unwrap_or(defaults.max_attempts),
        base_delay: raw
            .base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_delay),
    })
}

fn build_streaming_config(
    raw: Option<raw::RawStreamingConfig>,
) -> Result<StreamingConfig, ConfigError> {
    let defaults = StreamingConfig::default();
    let raw = match raw {
        Some(r) => r,
        None => return Ok(defaults),
    };

    if raw.chunk_chars == Some(0) {
        return Err(ConfigError::Invalid(
            "streaming chunk_chars must be >= 1".into(),
        ));
    }

    Ok(StreamingConfig {
        chunk_chars: raw.chunk_chars.unwrap_or(defaults.chunk_chars),
        delay: raw
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.delay),
    })
}

fn build_breaker_settings(
    raw: HashMap<String, raw::RawBreakerConfig>,
) -> Result<BreakerSettings, ConfigError> {
    let mut settings = BreakerSettings::default();

    for (name, raw_breaker) in raw {
        let base = if name == "default" {
            settings.default
        } else {
            settings.for_component(&name)
        };
        let config = build_breaker_config(&name, &raw_breaker, base)?;
        if name == "default" {
            settings.default = config;
        } else {
            settings.components.insert(name, config);
        }
    }

    Ok(settings)
}

fn build_breaker_config(
    name: &str,
    raw: &raw::RawBreakerConfig,
    base: BreakerConfig,
) -> Result<BreakerConfig, ConfigError> {
    let config = BreakerConfig {
        failure_threshold: raw.failure_threshold.unwrap_or(base.failure_threshold),
        failure_rate_threshold: raw
            .failure_rate_threshold
            .unwrap_or(base.failure_rate_threshold),
        open_duration: raw
            .open_secs
            .map(Duration::from_secs)
            .unwrap_or(base.open_duration),
        max_half_open_trials: raw.max_half_open_trials.unwrap_or(base.max_half_open_trials),
        rate_window: raw
            .rate_window_secs
            .map(Duration::from_secs)
            .unwrap_or(base.rate_window),
        minimum_requests: raw.minimum_requests.unwrap_or(base.minimum_requests),
    };

    if config.failure_threshold < 1 {
        return Err(ConfigError::Invalid(format!(
            "breaker \"{name}\" failure_threshold must be >= 1"
        )));
    }
    if !(0.0..=1.0).contains(&config.failure_rate_threshold) || config.failure_rate_threshold == 0.0
    {
        return Err(ConfigError::Invalid(format!(
            "breaker \"{name}\" failure_rate_threshold must be in (0.0, 1.0], got {}",
            config.failure_rate_threshold
        )));
    }
    if config.max_half_open_trials < 1 {
        return Err(ConfigError::Invalid(format!(
            "breaker \"{name}\" max_half_open_trials must be >= 1"
        )));
    }

    Ok(config)
}
