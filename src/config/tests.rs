// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use super::*;
use std::sync::Mutex;
use std::time::Duration;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn with_env<F: FnOnce()>(name: &str, value: Option<&str>, f: F) {
    let _guard = ENV_MUTEX.lock().unwrap();
    let previous = std::env::var(name).ok();
    match value {
        Some(v) => std::env::set_var(name, v),
        None => std::env::remove_var(name),
    }
    f();
    match previous {
        Some(v) => std::env::set_var(name, v),
        None => std::env::remove_var(name),
    }
}

fn make_source(yaml: &str) -> StringSource {
    StringSource::new(yaml)
}

/// The shipped example config, inlined so tests do not depend on the
/// filesystem layout.
const EXAMPLE_YAML: &str = r#"sluice: v1
environment: staging

generation:
  base_url: "http://${SLUICE_TEST_GEN_HOST}:1234/"
  model: "qwen2.5-coder"
  api_key: "${SLUICE_TEST_MISSING_KEY}"
  temperature: 0.2
  max_tokens: 2048
  health_timeout_ms: 2500

sandbox:
  timeout_ms: 5000
  max_steps: 100000

security:
  denylist:
    - { label: "pickle", pattern: '\bpickle\b' }
  warnings:
    - { label: "sleep", pattern: '\bsleep\(' }

recovery:
  max_attempts: 2
  base_delay_ms: 50

streaming:
  chunk_chars: 16
  delay_ms: 0

breakers:
  generation:
    failure_threshold: 2
    open_secs: 10
  custom_component:
    failure_threshold: 7
  default:
    max_half_open_trials: 1
"#;

// ---------------------------------------------------------------------------
// Full example
// ---------------------------------------------------------------------------

#[test]
fn example_config_loads() {
    with_env("SLUICE_TEST_GEN_HOST", Some("gen.internal"), || {
        let config = load_config(&make_source(EXAMPLE_YAML)).unwrap();

        assert_eq!(config.version(), "v1");
        assert_eq!(config.runtime.environment, "staging");

        let generation = &config.runtime.generation;
        assert_eq!(generation.base_url, "http://gen.internal:1234");
        assert_eq!(generation.model, "qwen2.5-coder");
        assert_eq!(generation.api_key, None);
        assert_eq!(generation.max_tokens, 2048);
        assert_eq!(generation.health_timeout_ms, 2500);
        assert_eq!(generation.request_timeout_ms, 120_000);

        assert_eq!(config.policy.sandbox.timeout, Duration::from_millis(5000));
        assert_eq!(config.policy.sandbox.max_steps, 100_000);
        assert_eq!(config.policy.sandbox.head_rows, 10);

        assert_eq!(config.runtime.recovery.max_attempts, 2);
        assert_eq!(config.runtime.recovery.base_delay, Duration::from_millis(50));
        assert_eq!(config.runtime.streaming.chunk_chars, 16);
        assert_eq!(config.runtime.streaming.delay, Duration::ZERO);
    });
}

#[test]
fn user_patterns_append_to_defaults() {
    with_env("SLUICE_TEST_GEN_HOST", Some("localhost"), || {
        let config = load_config(&make_source(EXAMPLE_YAML)).unwrap();
        let defaults = default_security_policy();
        let security = &config.policy.security;

        assert_eq!(security.denylist.len(), defaults.denylist.len() + 1);
        assert_eq!(security.denylist.last().unwrap().label, "pickle");
        assert_eq!(security.warnings.len(), defaults.warnings.len() + 1);
    });
}

#[test]
fn breaker_overrides_merge_with_component_defaults() {
    with_env("SLUICE_TEST_GEN_HOST", Some("localhost"), || {
        let config = load_config(&make_source(EXAMPLE_YAML)).unwrap();
        let breakers = &config.runtime.breakers;

        let generation = breakers.for_component("generation");
        assert_eq!(generation.failure_threshold, 2);
        assert_eq!(generation.open_duration, Duration::from_secs(10));

        // untouched component keeps its registered thresholds
        let validation = breakers.for_component("validation");
        assert_eq!(validation.failure_threshold, 10);

        assert_eq!(breakers.for_component("custom_component").failure_threshold, 7);
        assert_eq!(breakers.default.max_half_open_trials, 1);
        assert_eq!(breakers.for_component("never_configured").max_half_open_trials, 1);
    });
}

// ---------------------------------------------------------------------------
// Minimal config and defaults
// ---------------------------------------------------------------------------

#[test]
fn minimal_config_uses_defaults() {
    let config = load_config(&make_source("sluice: v1\n")).unwrap();

    assert_eq!(config.runtime.environment, "development");
    assert_eq!(config.runtime.generation.base_url, "http://localhost:1234");
    assert_eq!(config.runtime.recovery.max_attempts, 3);
    assert_eq!(config.runtime.streaming.chunk_chars, 8);
    assert_eq!(
        config.policy.security.denylist.len(),
        default_security_policy().denylist.len()
    );
    assert!(config
        .policy
        .sandbox
        .allowed_modules
        .contains(&"pandas".to_string()));
}

#[test]
fn default_policy_can_be_disabled() {
    let yaml = r#"sluice: v1
security:
  use_default_policy: false
  forbidden:
    - { label: "network operation", pattern: 'socket' }
"#;
    let config = load_config(&make_source(yaml)).unwrap();
    assert!(config.policy.security.denylist.is_empty());
    assert_eq!(config.policy.security.forbidden.len(), 1);
}

#[test]
fn policy_hash_is_deterministic() {
    let a = load_config(&make_source("sluice: v1\n")).unwrap();
    let b = load_config(&make_source("sluice: v1\n")).unwrap();
    let c = load_config(&make_source("sluice: v1\nenvironment: prod\n")).unwrap();

    assert!(a.policy_hash.starts_with("sha256:"));
    assert_eq!(a.policy_hash, b.policy_hash);
    assert_ne!(a.policy_hash, c.policy_hash);
}

// ---------------------------------------------------------------------------
// Validation failures
// ---------------------------------------------------------------------------

#[test]
fn wrong_version_rejected() {
    let err = load_config(&make_source("sluice: v2\n")).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("v2")));
}

#[test]
fn malformed_yaml_rejected() {
    let err = load_config(&make_source("sluice: [v1\n")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn invalid_regex_rejected() {
    let yaml = r#"sluice: v1
security:
  denylist:
    - { label: "broken", pattern: '(unclosed' }
"#;
    let err = load_config(&make_source(yaml)).unwrap_err();
    assert!(matches!(err, ConfigError::SecurityPattern { ref pattern, .. } if pattern == "(unclosed"));
}

#[test]
fn undefined_base_url_variable_rejected() {
    with_env("SLUICE_TEST_UNSET_HOST", None, || {
        let yaml = "sluice: v1\ngeneration:\n  base_url: \"http://${SLUICE_TEST_UNSET_HOST}\"\n";
        let err = load_config(&make_source(yaml)).unwrap_err();
        assert!(
            matches!(err, ConfigError::UnsetEnvVar { ref name } if name == "SLUICE_TEST_UNSET_HOST")
        );
    });
}

#[test]
fn api_key_interpolated_when_set() {
    with_env("SLUICE_TEST_API_KEY", Some("sk-local"), || {
        let yaml = "sluice: v1\ngeneration:\n  api_key: \"${SLUICE_TEST_API_KEY}\"\n";
        let config = load_config(&make_source(yaml)).unwrap();
        assert_eq!(config.runtime.generation.api_key.as_deref(), Some("sk-local"));
    });
}

#[test]
fn non_http_base_url_rejected() {
    let yaml = "sluice: v1\ngeneration:\n  base_url: \"ftp://example\"\n";
    let err = load_config(&make_source(yaml)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn zero_limits_rejected() {
    for yaml in [
        "sluice: v1\nsandbox:\n  timeout_ms: 0\n",
        "sluice: v1\nsandbox:\n  max_steps: 0\n",
        "sluice: v1\nstreaming:\n  chunk_chars: 0\n",
        "sluice: v1\nbreakers:\n  generation:\n    failure_threshold: 0\n",
        "sluice: v1\nbreakers:\n  generation:\n    failure_rate_threshold: 1.5\n",
    ] {
        assert!(
            matches!(load_config(&make_source(yaml)), Err(ConfigError::Invalid(_))),
            "expected validation error for {yaml:?}"
        );
    }
}

// ---------------------------------------------------------------------------
// Interpolation
// ---------------------------------------------------------------------------

#[test]
fn interpolation_passes_through_malformed_references() {
    assert_eq!(resolve_variables("cost: $5").unwrap(), "cost: $5");
    assert_eq!(resolve_variables("${}").unwrap(), "${}");
    assert_eq!(resolve_variables("${UNCLOSED").unwrap(), "${UNCLOSED");
}

#[test]
fn file_source_reports_missing_file() {
    let source = FileSource {
        path: std::path::PathBuf::from("/nonexistent/sluice.yaml"),
    };
    assert!(matches!(load_config(&source), Err(ConfigError::Read(_))));
}
