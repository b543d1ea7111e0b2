// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Lenient JSON object parsing for model output: markdown fences, text
// around the object, missing braces, trailing commas and raw control
// characters inside strings are repaired in that order.

use serde_json::{Map, Value};

/// A JSON object recovered from model output.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairedJson {
    pub object: Map<String, Value>,
    /// The text that finally parsed.
    pub text: String,
    /// Repairs applied, in order. Empty when the input parsed as-is.
    pub fixes: Vec<&'static str>,
}

/// Parse `text` as a JSON object, applying repairs until one parses.
/// On failure returns the error from the unrepaired input.
pub fn parse_lenient(text: &str) -> Result<RepairedJson, serde_json::Error> {
    let original = text.trim();
    let first_error = match parse_object(original) {
        Ok(object) => {
            return Ok(RepairedJson {
                object,
                text: original.to_string(),
                fixes: Vec::new(),
            })
        }
        Err(e) => e,
    };

    let mut fixes = Vec::new();
    let mut current = original.to_string();

    if let Some(body) = super::scan::strip_code_fences(&current) {
        current = body;
        fixes.push("Removed markdown code fences");
        if let Some(done) = attempt(&current, &fixes) {
            return Ok(done);
        }
    }

    let structured = fix_structure(&current);
    if structured != current {
        current = structured;
        fixes.push("Auto-fixed JSON structure");
        if let Some(done) = attempt(&current, &fixes) {
            return Ok(done);
        }
    }

    let without_commas = remove_trailing_commas(&current);
    if without_commas != current {
        current = without_commas;
        fixes.push("Removed trailing commas");
        if let Some(done) = attempt(&current, &fixes) {
            return Ok(done);
        }
    }

    let escaped = escape_string_controls(&current);
    if escaped != current {
        current = escaped;
        fixes.push("Escaped control characters in strings");
        if let Some(done) = attempt(&current, &fixes) {
            return Ok(done);
        }
    }

    Err(first_error)
}

fn attempt(text: &str, fixes: &[&'static str]) -> Option<RepairedJson> {
    parse_object(text).ok().map(|object| RepairedJson {
        object,
        text: text.to_string(),
        fixes: fixes.to_vec(),
    })
}

fn parse_object(text: &str) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => {
            // Re-run through the typed path to get a serde error for the
            // wrong top-level shape.
            serde_json::from_value::<Map<String, Value>>(other)
        }
    }
}

/// Cut the text down to the outermost object, adding braces it lacks.
fn fix_structure(text: &str) -> String {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e > s => text[s..=e].to_string(),
        (Some(s), _) => format!("{}}}", text[s..].trim_end()),
        (None, Some(e)) => format!("{{{}", &text[..=e]),
        (None, None) => format!("{{{}}}", text),
    }
}

/// Drop commas directly followed (modulo whitespace) by `}` or `]`,
/// outside string literals.
fn remove_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = text.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}' | ']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Escape raw newlines, carriage returns and tabs inside string literals.
fn escape_string_controls(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
