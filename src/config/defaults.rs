// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::Duration;

use super::pattern::{CompiledPattern, LabeledPattern};
use super::raw::RawSecurityConfig;
use super::types::{BreakerConfig, SecurityPolicy};

/// The default code security policy, embedded at compile time.
const DEFAULT_POLICY_YAML: &str = include_str!("../../schema/default_policy.yaml");

/// Parse and compile the embedded default policy.
/// Panics on invalid regex (these are our own patterns).
pub fn default_security_policy() -> SecurityPolicy {
    let raw: RawSecurityConfig =
        serde_yaml::from_str(DEFAULT_POLICY_YAML).expect("default policy YAML is invalid");
    compile_policy(&raw).unwrap_or_else(|e| panic!("default policy failed to compile: {e}"))
}

pub(super) fn compile_policy(
    raw: &RawSecurityConfig,
) -> Result<SecurityPolicy, super::error::ConfigError> {
    let labeled = |list: &[super::raw::RawLabeledPattern]| {
        list.iter()
            .map(|p| LabeledPattern::compile(&p.label, &p.pattern))
            .collect::<Result<Vec<_>, _>>()
    };
    Ok(SecurityPolicy {
        denylist: labeled(&raw.denylist)?,
        allowed_import_lines: raw
            .allowed_import_lines
            .iter()
            .map(|p| CompiledPattern::compile(p))
            .collect::<Result<Vec<_>, _>>()?,
        forbidden: labeled(&raw.forbidden)?,
        warnings: labeled(&raw.warnings)?,
    })
}

/// Modules the interpreter can load.
pub fn default_allowed_modules() -> Vec<String> {
    [
        "pandas",
        "numpy",
        "plotly",
        "plotly.express",
        "plotly.graph_objects",
        "plotly.subplots",
        "math",
        "statistics",
        "json",
        "copy",
        "warnings",
        "datetime",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}

/// Components registered at startup and their thresholds.
pub fn default_breaker_components() -> HashMap<String, BreakerConfig> {
    let mut components = HashMap::new();
    components.insert(
        "generation".to_string(),
        BreakerConfig::new(3, Duration::from_secs(30)),
    );
    components.insert(
        "code_executor".to_string(),
        BreakerConfig::new(5, Duration::from_secs(60)),
    );
    components.insert(
        "validation".to_string(),
        BreakerConfig::new(10, Duration::from_secs(30)),
    );
    components.insert(
        "table_store".to_string(),
        BreakerConfig::new(5, Duration::from_secs(60)),
    );
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_compiles() {
        let policy = default_security_policy();
        assert!(policy.denylist.len() >= 20);
        assert!(!policy.allowed_import_lines.is_empty());
        assert!(!policy.forbidden.is_empty());
    }

    #[test]
    fn default_denylist_catches_dangerous_calls() {
        let policy = default_security_policy();
        let samples = [
            "import os",
            "os.system('ls')",
            "__import__('subprocess')",
            "eval('1+1')",
            "exec(code)",
            "open('/etc/passwd')",
            "getattr(df, 'x')",
            "df.__class__",
        ];
        for sample in &samples {
            assert!(
                policy.denylist.iter().any(|p| p.pattern.is_match(sample)),
                "expected denylist to catch {sample:?}"
            );
        }
    }

    #[test]
    fn default_forbidden_catches_network_and_fs() {
        let policy = default_security_policy();
        for sample in ["import requests", "socket.socket()", "shutil.rmtree('x')"] {
            assert!(
                policy.forbidden.iter().any(|p| p.pattern.is_match(sample)),
                "expected forbidden patterns to catch {sample:?}"
            );
        }
    }

    #[test]
    fn default_policy_allows_analysis_code() {
        let policy = default_security_policy();
        let benign = [
            "import pandas as pd",
            "result = df[df['country'] == 'Saudi Arabia'].shape[0]",
            "fig = px.bar(df, x='region', y='sales')",
            "profile = df.describe()",
            "summary = df.groupby('region')['sales'].mean()",
        ];
        for text in &benign {
            assert!(
                !policy.denylist.iter().any(|p| p.pattern.is_match(text)),
                "denylist should not flag {text:?}"
            );
            assert!(
                !policy.forbidden.iter().any(|p| p.pattern.is_match(text)),
                "forbidden patterns should not flag {text:?}"
            );
        }
    }

    #[test]
    fn default_breaker_components_registered() {
        let components = default_breaker_components();
        for name in ["generation", "code_executor", "validation", "table_store"] {
            assert!(components.contains_key(name), "missing breaker {name}");
        }
        assert_eq!(components["generation"].failure_threshold, 3);
    }
}
