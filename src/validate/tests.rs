// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use super::*;
use crate::config::default_security_policy;

fn validator() -> ContentValidator {
    ContentValidator::new(Arc::new(default_security_policy()))
}

// ---------------------------------------------------------------------------
// Syntax and auto-fix
// ---------------------------------------------------------------------------

#[test]
fn clean_code_passes_without_cleaned_content() {
    let r = validator().validate_code("import pandas as pd\nresult = len(df)\nprint(result)");
    assert!(r.is_valid, "{:?}", r.errors);
    assert!(r.errors.is_empty());
    assert_eq!(r.cleaned_content, None);
}

#[test]
fn empty_code_is_valid() {
    let r = validator().validate_code("   \n");
    assert!(r.is_valid);
    assert!(r.warnings.is_empty());
}

#[test]
fn literal_newlines_outside_strings_are_cleaned() {
    let r = validator().validate_code("x = 1\\ny = x + 1");
    assert!(r.is_valid, "{:?}", r.errors);
    assert_eq!(r.cleaned_content.as_deref(), Some("x = 1\ny = x + 1"));
    assert!(r.warnings.contains(&"Cleaned escape sequences in code".to_string()));
}

#[test]
fn escapes_inside_string_literals_are_left_alone() {
    let code = "x = 1\nprint(\"a\\nb\")";
    let r = validator().validate_code(code);
    assert!(r.is_valid, "{:?}", r.errors);
    assert_eq!(r.cleaned_content, None);
    assert!(r.warnings.is_empty());
}

#[test]
fn fully_escaped_code_is_unescaped() {
    let r = validator().validate_code("name = \\\"a\\\"\\nprint(name)");
    assert!(r.is_valid, "{:?}", r.errors);
    assert_eq!(r.cleaned_content.as_deref(), Some("name = \"a\"\nprint(name)"));
}

#[test]
fn trailing_continuation_backslash_is_stripped() {
    let r = validator().validate_code("total = sum([1, 2, 3]) \\");
    assert!(r.is_valid, "{:?}", r.errors);
    assert_eq!(r.cleaned_content.as_deref(), Some("total = sum([1, 2, 3])"));
    assert!(r
        .warnings
        .iter()
        .any(|w| w.starts_with("Auto-fixed syntax error:")));
}

#[test]
fn duplicated_closing_bracket_is_collapsed() {
    let r = validator().validate_code("x = df[df['a'] > 1] ]");
    assert!(r.is_valid, "{:?}", r.errors);
    assert_eq!(r.cleaned_content.as_deref(), Some("x = df[df['a'] > 1]"));
}

#[test]
fn truncated_final_line_is_dropped() {
    let r = validator().validate_code("a = 1\nb = (2 +");
    assert!(r.is_valid, "{:?}", r.errors);
    assert_eq!(r.cleaned_content.as_deref(), Some("a = 1"));
}

#[test]
fn uniformly_indented_code_is_dedented() {
    let r = validator().validate_code("    a = 1\n    b = a * 2");
    assert!(r.is_valid, "{:?}", r.errors);
    assert_eq!(r.cleaned_content.as_deref(), Some("a = 1\nb = a * 2"));
}

#[test]
fn unfixable_syntax_error_is_reported() {
    let r = validator().validate_code("def f(:\n    return 1\nz = 3");
    assert!(!r.is_valid);
    assert_eq!(r.errors.len(), 1);
    assert!(r.errors[0].starts_with("Syntax error:"), "{}", r.errors[0]);
}

#[test]
fn markdown_fences_are_removed() {
    let r = validator().validate_code("```python\nresult = 1 + 1\n```");
    assert!(r.is_valid);
    assert_eq!(r.cleaned_content.as_deref(), Some("result = 1 + 1"));
    assert!(r.warnings.contains(&"Removed markdown code fences".to_string()));
}

// ---------------------------------------------------------------------------
// Security scan
// ---------------------------------------------------------------------------

#[test]
fn import_os_is_rejected() {
    let r = validator().validate_code("import os\nprint(os.listdir('.'))");
    assert!(!r.is_valid);
    assert!(r
        .errors
        .contains(&"Dangerous operation detected: import os".to_string()));
    assert!(r
        .errors
        .contains(&"Dangerous operation detected: os access".to_string()));
}

#[test]
fn allowed_imports_pass() {
    let code = "import pandas as pd\nimport numpy as np\nimport plotly.express as px\n\
                from plotly.subplots import make_subplots\nimport math";
    let r = validator().validate_code(code);
    assert!(r.is_valid, "{:?}", r.errors);
}

#[test]
fn dangerous_names_in_comments_are_ignored() {
    let r = validator().validate_code("# never call open() or eval() here\nx = 1");
    assert!(r.is_valid, "{:?}", r.errors);
}

#[test]
fn dynamic_evaluation_is_rejected() {
    let r = validator().validate_code("x = eval('1 + 1')");
    assert!(!r.is_valid);
    assert_eq!(r.errors, vec!["Dangerous operation detected: eval()".to_string()]);
}

#[test]
fn network_import_is_forbidden() {
    let r = validator().validate_code("import requests\nrequests.get('http://x')");
    assert!(!r.is_valid);
    assert!(r
        .errors
        .contains(&"Forbidden operation detected: network operation".to_string()));
}

#[test]
fn file_writes_only_warn() {
    let r = validator().validate_code("df.to_csv('out.csv')");
    assert!(r.is_valid, "{:?}", r.errors);
    assert_eq!(
        r.warnings,
        vec!["file read/write detected - ensure it's safe".to_string()]
    );
}

#[test]
fn cleaned_content_survives_a_security_rejection() {
    let r = validator().validate_code("```python\nimport os\n```");
    assert!(!r.is_valid);
    assert_eq!(r.cleaned_content.as_deref(), Some("import os"));
}

// ---------------------------------------------------------------------------
// Structured responses
// ---------------------------------------------------------------------------

#[test]
fn structured_response_prefixes_code_errors() {
    let response = ResponseFields::new("Let me look.", "import os", "Done.");
    let r = validator().validate_structured_response(&response);
    assert!(!r.is_valid);
    assert!(r
        .errors
        .contains(&"Code validation: Dangerous operation detected: import os".to_string()));
}

#[test]
fn corruption_in_prose_is_a_warning() {
    let response = ResponseFields::new("First line\\nsecond line", "x = 1", "ok) )");
    let r = validator().validate_structured_response(&response);
    assert!(r.is_valid);
    assert!(r
        .warnings
        .contains(&"Potential corruption detected in initial_response".to_string()));
    assert!(r
        .warnings
        .contains(&"Potential corruption detected in result_commentary".to_string()));
}

#[test]
fn structured_response_carries_repaired_code() {
    let response = ResponseFields::new("a", "x = 1\\ny = 2", "c");
    let r = validator().validate_structured_response(&response);
    assert!(r.is_valid);
    assert_eq!(r.cleaned_content.as_deref(), Some("x = 1\ny = 2"));
    assert!(r
        .warnings
        .contains(&"Potential corruption detected in generated_code".to_string()));
    assert!(r
        .warnings
        .contains(&"Code validation: Cleaned escape sequences in code".to_string()));
}

#[test]
fn empty_code_field_skips_code_validation() {
    let v = validator();
    let r = v.validate_structured_response(&ResponseFields::new("hi", "", "bye"));
    assert!(r.is_valid);
    assert_eq!(v.stats().code_validations, 0);
}

// ---------------------------------------------------------------------------
// JSON responses
// ---------------------------------------------------------------------------

const GOOD_JSON: &str =
    r#"{"initial_response": "a", "generated_code": "x = 1", "result_commentary": "c"}"#;

#[test]
fn well_formed_json_passes() {
    let r = validator().validate_json_response(GOOD_JSON);
    assert!(r.is_valid, "{:?}", r.errors);
    assert_eq!(r.cleaned_content, None);
    assert!(r.warnings.is_empty());
}

#[test]
fn empty_json_fails() {
    let r = validator().validate_json_response("  ");
    assert_eq!(r.errors, vec!["Empty JSON response".to_string()]);
}

#[test]
fn missing_and_mistyped_fields_are_reported() {
    let r = validator()
        .validate_json_response(r#"{"initial_response": "a", "generated_code": 3}"#);
    assert!(!r.is_valid);
    assert_eq!(
        r.errors,
        vec![
            "Field generated_code must be a string".to_string(),
            "Missing required field: result_commentary".to_string(),
        ]
    );
}

#[test]
fn fenced_json_with_trailing_comma_is_repaired() {
    let text = "```json\n{\"initial_response\": \"a\", \"generated_code\": \"\", \
                \"result_commentary\": \"c\",}\n```";
    let r = validator().validate_json_response(text);
    assert!(r.is_valid, "{:?}", r.errors);
    assert_eq!(
        r.warnings,
        vec![
            "Removed markdown code fences".to_string(),
            "Removed trailing commas".to_string(),
        ]
    );
    let cleaned = r.cleaned_content.unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&cleaned).is_ok());
}

#[test]
fn prose_around_json_is_cut_away() {
    let text = format!("Here is the answer: {GOOD_JSON} hope it helps");
    let r = validator().validate_json_response(&text);
    assert!(r.is_valid, "{:?}", r.errors);
    assert_eq!(r.cleaned_content.as_deref(), Some(GOOD_JSON));
    assert_eq!(r.warnings, vec!["Auto-fixed JSON structure".to_string()]);
}

#[test]
fn raw_newlines_inside_strings_are_escaped() {
    let text = "{\"initial_response\": \"one\ntwo\", \"generated_code\": \"\", \
                \"result_commentary\": \"\"}";
    let repaired = parse_lenient(text).unwrap();
    assert_eq!(repaired.object["initial_response"], "one\ntwo");
    assert_eq!(repaired.fixes, vec!["Escaped control characters in strings"]);
}

#[test]
fn unparseable_json_fails() {
    let r = validator().validate_json_response("{\"a\": [1, 2");
    assert!(!r.is_valid);
    assert!(r.errors[0].starts_with("JSON parsing failed:"));
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[test]
fn stats_count_validations_failures_and_fixes() {
    let v = validator();
    v.validate_code("x = 1\\ny = 2");
    v.validate_code("import os");
    v.validate_json_response(GOOD_JSON);
    v.validate_structured_response(&ResponseFields::new("a", "", "c"));

    let stats = v.stats();
    assert_eq!(stats.code_validations, 2);
    assert_eq!(stats.json_validations, 1);
    assert_eq!(stats.response_validations, 1);
    assert_eq!(stats.validation_failures, 1);
    assert_eq!(stats.auto_fixes_applied, 1);

    v.reset_stats();
    assert_eq!(v.stats(), ValidatorStats::default());
}
