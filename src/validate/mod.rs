// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Content validation
//
// Responsibilities:
// - Check generated code parses as the analysis language, applying
//   deterministic auto-fixes and re-parsing when it does not
// - Scan code against the configured denylist / forbidden / warning
//   pattern sets, excusing denylist hits on allow-listed import lines
// - Flag corruption indicators (literal escapes outside strings,
//   duplicated closing brackets) in every response field
// - Validate raw JSON responses against the three-field contract
// - Keep validation counters for the stats surface

mod json;
mod scan;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::config::SecurityPolicy;
use crate::lang::{parse_module, ParseError};
use crate::response::{Field, ResponseFields};

pub use json::{parse_lenient, RepairedJson};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Outcome of one validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Repaired content, present whenever an auto-fix changed the input.
    pub cleaned_content: Option<String>,
}

impl ValidationResult {
    fn valid() -> Self {
        Self {
            is_valid: true,
            ..Self::default()
        }
    }

    fn fail(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self.is_valid = false;
        self
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidatorStats {
    pub json_validations: u64,
    pub code_validations: u64,
    pub response_validations: u64,
    pub validation_failures: u64,
    pub auto_fixes_applied: u64,
}

#[derive(Debug, Default)]
struct Counters {
    json_validations: AtomicU64,
    code_validations: AtomicU64,
    response_validations: AtomicU64,
    validation_failures: AtomicU64,
    auto_fixes_applied: AtomicU64,
}

const REQUIRED_FIELDS: [Field; 3] = Field::ALL;

/// Prefix on structured-response errors and warnings raised by the code
/// field.
pub const CODE_MESSAGE_PREFIX: &str = "Code validation: ";

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Validates structured responses and generated analysis code.
#[derive(Debug)]
pub struct ContentValidator {
    policy: Arc<SecurityPolicy>,
    counters: Counters,
}

impl ContentValidator {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self {
            policy,
            counters: Counters::default(),
        }
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Validate every field of a response. Code errors are hard errors;
    /// corruption indicators are warnings. `cleaned_content` carries the
    /// repaired code, if any.
    pub fn validate_structured_response(&self, response: &ResponseFields) -> ValidationResult {
        self.counters.response_validations.fetch_add(1, Ordering::Relaxed);
        let mut result = ValidationResult::valid();

        for (field, content) in response.iter() {
            if field == Field::GeneratedCode && !content.trim().is_empty() {
                let code = self.validate_code(content);
                result
                    .errors
                    .extend(code.errors.iter().map(|e| format!("{CODE_MESSAGE_PREFIX}{e}")));
                result
                    .warnings
                    .extend(code.warnings.iter().map(|w| format!("{CODE_MESSAGE_PREFIX}{w}")));
                result.cleaned_content = code.cleaned_content;
            }

            let corrupted = if field == Field::GeneratedCode {
                scan::code_has_corruption(content)
            } else {
                scan::text_has_corruption(content)
            };
            if corrupted {
                result
                    .warnings
                    .push(format!("Potential corruption detected in {field}"));
            }
        }

        result.is_valid = result.errors.is_empty();
        if !result.is_valid {
            self.counters.validation_failures.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(
            valid = result.is_valid,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "structured response validated"
        );
        result
    }

    /// Validate analysis code: syntax (with auto-fixes), then security.
    pub fn validate_code(&self, code: &str) -> ValidationResult {
        self.counters.code_validations.fetch_add(1, Ordering::Relaxed);
        let result = self.check_code(code);
        if !result.is_valid {
            self.counters.validation_failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn check_code(&self, code: &str) -> ValidationResult {
        let mut result = ValidationResult::valid();
        if code.trim().is_empty() {
            return result;
        }

        let mut current = code.to_string();
        if let Some(body) = scan::strip_code_fences(&current) {
            current = body;
            result.warnings.push("Removed markdown code fences".to_string());
            self.count_fix();
        }
        if scan::code_has_corruption(&current) {
            let cleaned = scan::clean_escape_sequences(&current);
            if cleaned != current {
                current = cleaned;
                result.warnings.push("Cleaned escape sequences in code".to_string());
                self.count_fix();
            }
        }

        match parse_module(&current) {
            Ok(_) => {}
            Err(error) => match repair_syntax(&current, &error) {
                Some(fixed) => {
                    current = fixed;
                    result
                        .warnings
                        .push(format!("Auto-fixed syntax error: {error}"));
                    self.count_fix();
                }
                None => {
                    if current != code {
                        result.cleaned_content = Some(current);
                    }
                    return result.fail(format!("Syntax error: {error}"));
                }
            },
        }

        let security = self.scan_security(&current);
        result.warnings.extend(security.warnings);
        if current != code {
            result.cleaned_content = Some(current);
        }
        if !security.errors.is_empty() {
            result.errors.extend(security.errors);
            result.is_valid = false;
        }
        result
    }

    fn scan_security(&self, code: &str) -> ValidationResult {
        let masked = scan::mask_comments(code);
        let mut errors = BTreeSet::new();
        let mut warnings = BTreeSet::new();

        for entry in &self.policy.denylist {
            let unexplained = entry.pattern.find_ranges(&masked).into_iter().any(|range| {
                let line = scan::line_at(code, range.start);
                !self
                    .policy
                    .allowed_import_lines
                    .iter()
                    .any(|allowed| allowed.is_match(line))
            });
            if unexplained {
                errors.insert(format!("Dangerous operation detected: {}", entry.label));
            }
        }
        for entry in &self.policy.forbidden {
            if entry.pattern.is_match(&masked) {
                errors.insert(format!("Forbidden operation detected: {}", entry.label));
            }
        }
        for entry in &self.policy.warnings {
            if entry.pattern.is_match(&masked) {
                warnings.insert(format!("{} detected - ensure it's safe", entry.label));
            }
        }

        if !errors.is_empty() {
            tracing::warn!(violations = errors.len(), "code rejected by security scan");
        }
        ValidationResult {
            is_valid: errors.is_empty(),
            errors: errors.into_iter().collect(),
            warnings: warnings.into_iter().collect(),
            cleaned_content: None,
        }
    }

    /// Validate a raw JSON response: repairable structure, required
    /// string fields.
    pub fn validate_json_response(&self, text: &str) -> ValidationResult {
        self.counters.json_validations.fetch_add(1, Ordering::Relaxed);
        let result = self.check_json(text);
        if !result.is_valid {
            self.counters.validation_failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn check_json(&self, text: &str) -> ValidationResult {
        let mut result = ValidationResult::valid();
        if text.trim().is_empty() {
            return result.fail("Empty JSON response");
        }

        let repaired = match parse_lenient(text) {
            Ok(r) => r,
            Err(e) => return result.fail(format!("JSON parsing failed: {e}")),
        };
        if !repaired.fixes.is_empty() {
            self.count_fix();
            result
                .warnings
                .extend(repaired.fixes.iter().map(|f| f.to_string()));
        }
        if repaired.text != text {
            result.cleaned_content = Some(repaired.text.clone());
        }

        for field in REQUIRED_FIELDS {
            match repaired.object.get(field.as_str()) {
                None => result
                    .errors
                    .push(format!("Missing required field: {field}")),
                Some(v) if !v.is_string() => result
                    .errors
                    .push(format!("Field {field} must be a string")),
                Some(_) => {}
            }
        }
        result.is_valid = result.errors.is_empty();
        result
    }

    fn count_fix(&self) {
        self.counters.auto_fixes_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ValidatorStats {
        let c = &self.counters;
        ValidatorStats {
            json_validations: c.json_validations.load(Ordering::Relaxed),
            code_validations: c.code_validations.load(Ordering::Relaxed),
            response_validations: c.response_validations.load(Ordering::Relaxed),
            validation_failures: c.validation_failures.load(Ordering::Relaxed),
            auto_fixes_applied: c.auto_fixes_applied.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        let c = &self.counters;
        for counter in [
            &c.json_validations,
            &c.code_validations,
            &c.response_validations,
            &c.validation_failures,
            &c.auto_fixes_applied,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

// ---------------------------------------------------------------------------
// Syntax repair
// ---------------------------------------------------------------------------

/// Apply the deterministic fixes cumulatively, re-parsing after each one
/// that changes the text. Returns the first candidate that parses.
fn repair_syntax(code: &str, error: &ParseError) -> Option<String> {
    let mut candidate = code.to_string();
    let mut last_error = error.clone();

    let fixes: [fn(&str, &ParseError) -> String; 5] = [
        |c, _| scan::dedent(c),
        |c, _| scan::strip_trailing_continuation(c),
        |c, _| scan::collapse_duplicate_brackets(c),
        |c, _| scan::drop_junk_lines(c),
        |c, e| {
            if e.line >= scan::last_code_line(c) {
                scan::drop_line(c, scan::last_code_line(c))
            } else {
                c.to_string()
            }
        },
    ];

    for fix in fixes {
        let next = fix(&candidate, &last_error);
        if next == candidate || next.trim().is_empty() {
            continue;
        }
        candidate = next;
        match parse_module(&candidate) {
            Ok(_) => return Some(candidate),
            Err(e) => last_error = e,
        }
    }
    None
}

#[cfg(test)]
mod tests;
