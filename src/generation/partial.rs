// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// SSE line parsing and cumulative field extraction from a JSON object
// that is still arriving.

use crate::response::{Field, FieldChunk};
use crate::validate::parse_lenient;

use super::GenerationError;

// ---------------------------------------------------------------------------
// SSE lines
// ---------------------------------------------------------------------------

/// What one line of an OpenAI-style chat completion stream carries.
#[derive(Debug, Clone, PartialEq)]
pub enum SseData {
    /// Text appended to the assistant message.
    Content(String),
    /// `data: [DONE]`
    Done,
    /// Blank lines, comments, role-only deltas, malformed payloads.
    Ignored,
}

/// Parse one SSE line. Lines without a `data:` prefix are read as bare
/// JSON, which some local servers emit.
pub fn parse_sse_data(line: &str) -> SseData {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') || trimmed.starts_with("event:") {
        return SseData::Ignored;
    }
    let payload = trimmed
        .strip_prefix("data:")
        .map(str::trim_start)
        .unwrap_or(trimmed);
    if payload == "[DONE]" {
        return SseData::Done;
    }

    let json: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(_) => return SseData::Ignored,
    };
    match json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
    {
        Some(content) => SseData::Content(content.to_string()),
        None => SseData::Ignored,
    }
}

// ---------------------------------------------------------------------------
// Partial JSON field extraction
// ---------------------------------------------------------------------------

/// Accumulates the assistant text and reports each field's value as it
/// grows.
#[derive(Debug, Default)]
pub struct FieldTracker {
    text: String,
    emitted: [Option<String>; 3],
}

impl FieldTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Append `delta` and return a chunk for every field whose partial
    /// value changed.
    pub fn push(&mut self, delta: &str) -> Vec<FieldChunk> {
        self.text.push_str(delta);
        let mut out = Vec::new();
        for field in Field::ALL {
            if let Some(value) = partial_value(&self.text, field.as_str()) {
                self.emit(field, value, &mut out);
            }
        }
        out
    }

    /// Parse the complete response and return the authoritative values.
    ///
    /// An empty response yields placeholder chunks. An unparseable one is
    /// an error only when no field was ever recognised.
    pub fn finish(mut self) -> Result<Vec<FieldChunk>, GenerationError> {
        if self.text.trim().is_empty() {
            return Ok(vec![
                FieldChunk::new(
                    Field::InitialResponse,
                    "No response received from the generation service",
                ),
                FieldChunk::new(Field::GeneratedCode, ""),
                FieldChunk::new(Field::ResultCommentary, "Unable to process request"),
            ]);
        }

        let parsed = match parse_lenient(&self.text) {
            Ok(parsed) => parsed,
            Err(e) if self.emitted.iter().any(Option::is_some) => {
                tracing::warn!(error = %e, "final response did not parse; keeping partial fields");
                return Ok(Vec::new());
            }
            Err(e) => return Err(GenerationError::Malformed(e.to_string())),
        };
        if !parsed.fixes.is_empty() {
            tracing::debug!(fixes = ?parsed.fixes, "repaired generated json");
        }

        let mut out = Vec::new();
        for field in Field::ALL {
            let value = match parsed.object.get(field.as_str()) {
                None | Some(serde_json::Value::Null) => continue,
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            self.emit(field, value, &mut out);
        }
        Ok(out)
    }

    fn emit(&mut self, field: Field, value: String, out: &mut Vec<FieldChunk>) {
        let last = &mut self.emitted[field.index()];
        if last.as_deref() == Some(value.as_str()) {
            return;
        }
        *last = Some(value.clone());
        out.push(FieldChunk::new(field, value));
    }
}

/// The decoded prefix of the string value for `key`, if the key and the
/// opening quote of its value have arrived.
fn partial_value(text: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\"");
    let mut from = 0;
    while let Some(found) = text[from..].find(&needle) {
        let after = from + found + needle.len();
        let rest = text[after..].trim_start();
        if let Some(rest) = rest.strip_prefix(':') {
            if let Some(body) = rest.trim_start().strip_prefix('"') {
                return Some(decode_prefix(body));
            }
        }
        from = after;
    }
    None
}

/// Decode JSON string content up to the closing quote or the end of the
/// text, dropping an escape sequence cut off by the end.
fn decode_prefix(body: &str) -> String {
    let mut out = String::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => {
                let Some(esc) = chars.next() else { break };
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    '/' => out.push('/'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    'u' => {
                        let Some(high) = hex4(&mut chars) else { break };
                        if (0xD800..0xDC00).contains(&high) {
                            let mut lookahead = chars.clone();
                            match (lookahead.next(), lookahead.next()) {
                                (Some('\\'), Some('u')) => {
                                    let Some(low) = hex4(&mut lookahead) else { break };
                                    chars = lookahead;
                                    let code = 0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
                                    out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                                }
                                // low half not here yet
                                (None, _) | (Some('\\'), None) => break,
                                _ => out.push(char::REPLACEMENT_CHARACTER),
                            }
                        } else {
                            out.push(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER));
                        }
                    }
                    other => out.push(other),
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn hex4(chars: &mut std::str::Chars<'_>) -> Option<u32> {
    let mut value = 0;
    for _ in 0..4 {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}
