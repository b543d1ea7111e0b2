// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::frame::{Cell, Table};
use crate::metadata::extract_metadata;
use crate::response::Field;

fn values(chunks: &[FieldChunk], field: Field) -> Vec<String> {
    chunks
        .iter()
        .filter(|c| c.field == field)
        .map(|c| c.content.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// SSE parsing
// ---------------------------------------------------------------------------

#[test]
fn sse_content_delta_is_extracted() {
    let line = r#"data: {"choices":[{"delta":{"content":"{\"init"}}]}"#;
    assert_eq!(parse_sse_data(line), SseData::Content("{\"init".to_string()));
}

#[test]
fn sse_done_marker() {
    assert_eq!(parse_sse_data("data: [DONE]"), SseData::Done);
    assert_eq!(parse_sse_data("data:[DONE]\n"), SseData::Done);
}

#[test]
fn sse_role_only_delta_and_noise_are_ignored() {
    assert_eq!(
        parse_sse_data(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
        SseData::Ignored
    );
    assert_eq!(parse_sse_data(""), SseData::Ignored);
    assert_eq!(parse_sse_data(": keep-alive"), SseData::Ignored);
    assert_eq!(parse_sse_data("data: {broken"), SseData::Ignored);
}

#[test]
fn sse_bare_json_line_is_accepted() {
    let line = r#"{"choices":[{"delta":{"content":"hi"}}]}"#;
    assert_eq!(parse_sse_data(line), SseData::Content("hi".to_string()));
}

// ---------------------------------------------------------------------------
// Field tracking
// ---------------------------------------------------------------------------

#[test]
fn partial_fields_grow_cumulatively() {
    let mut tracker = FieldTracker::new();
    let mut chunks = Vec::new();
    for delta in [
        "{\"initial_response\": \"I will",
        " count the rows\", \"generated_",
        "code\": \"result = len(df)\\nprint(",
        "result)\", \"result_commentary\": \"\"}",
    ] {
        chunks.extend(tracker.push(delta));
    }
    assert_eq!(
        values(&chunks, Field::InitialResponse),
        vec!["I will", "I will count the rows"]
    );
    let code = values(&chunks, Field::GeneratedCode);
    assert_eq!(code.last().unwrap(), "result = len(df)\nprint(result)");
    assert_eq!(values(&chunks, Field::ResultCommentary), vec![""]);
}

#[test]
fn unchanged_fields_are_not_re_emitted() {
    let mut tracker = FieldTracker::new();
    let first = tracker.push("{\"initial_response\": \"done\", ");
    assert_eq!(first.len(), 1);
    let second = tracker.push("\"generated_code\": \"");
    assert_eq!(second, vec![FieldChunk::new(Field::GeneratedCode, "")]);
}

#[test]
fn escape_cut_at_chunk_boundary_is_held_back() {
    let mut tracker = FieldTracker::new();
    let chunks = tracker.push("{\"initial_response\": \"a\\");
    assert_eq!(values(&chunks, Field::InitialResponse), vec!["a"]);
    let chunks = tracker.push("nb\\u00e9\"}");
    assert_eq!(values(&chunks, Field::InitialResponse), vec!["a\nbé"]);
}

#[test]
fn surrogate_pair_is_decoded() {
    let mut tracker = FieldTracker::new();
    let chunks = tracker.push(r#"{"initial_response": "ok \ud83d\ude00"}"#);
    assert_eq!(values(&chunks, Field::InitialResponse), vec!["ok \u{1F600}"]);
}

#[test]
fn finish_does_not_repeat_values_already_sent() {
    let mut tracker = FieldTracker::new();
    tracker.push("```json\n{\"initial_response\": \"hi\", \"generated_code\": \"x = 1\", \"result_commentary\": \"one\",}\n```");
    let chunks = tracker.finish().unwrap();
    // values already seen in full are not repeated
    assert!(values(&chunks, Field::InitialResponse).is_empty());
    assert!(values(&chunks, Field::ResultCommentary).is_empty());
    assert!(values(&chunks, Field::GeneratedCode).is_empty());
}

#[test]
fn finish_stringifies_non_string_fields() {
    let mut tracker = FieldTracker::new();
    tracker.push(r#"{"initial_response": "n", "generated_code": "", "result_commentary": 12}"#);
    let chunks = tracker.finish().unwrap();
    assert_eq!(values(&chunks, Field::ResultCommentary), vec!["12"]);
}

#[test]
fn empty_response_yields_placeholders() {
    let chunks = FieldTracker::new().finish().unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].field, Field::InitialResponse);
    assert!(chunks[0].content.contains("No response"));
    assert_eq!(chunks[1], FieldChunk::new(Field::GeneratedCode, ""));
}

#[test]
fn unparseable_response_without_fields_is_malformed() {
    let mut tracker = FieldTracker::new();
    tracker.push("I cannot help with that.");
    assert!(matches!(tracker.finish(), Err(GenerationError::Malformed(_))));
}

#[test]
fn unparseable_response_with_partial_fields_keeps_them() {
    let mut tracker = FieldTracker::new();
    let chunks = tracker.push("{\"initial_response\": \"partial");
    assert_eq!(chunks.len(), 1);
    // whether or not the repair succeeds, the partial field stands
    let done = tracker.finish().unwrap();
    assert!(done.iter().all(|c| c.field != Field::GeneratedCode));
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

#[test]
fn prompt_without_table_says_so() {
    let prompt = build_system_prompt(None, &[]);
    assert!(prompt.contains("No table is loaded"));
    assert!(prompt.contains("\"generated_code\""));
    assert!(!prompt.contains("USER RULES"));
}

#[test]
fn prompt_describes_table_and_rules() {
    let table = Table::new(vec![
        (
            "country".to_string(),
            vec![Cell::Str("Saudi Arabia".into()), Cell::Str("Egypt".into()), Cell::Str("Saudi Arabia".into())],
        ),
        ("amount".to_string(), vec![Cell::Int(1), Cell::Int(5), Cell::Int(9)]),
    ])
    .unwrap();
    let meta = extract_metadata(&table, "sales.csv");
    let prompt = build_system_prompt(Some(&meta), &["Answer in English".to_string()]);
    assert!(prompt.contains("File: sales.csv"));
    assert!(prompt.contains("Shape: 3 rows x 2 columns"));
    assert!(prompt.contains("most common 'Saudi Arabia'"));
    assert!(prompt.contains("range 1-9"));
    assert!(prompt.contains("- Answer in English"));
}

#[test]
fn generation_request_defaults() {
    let req = GenerationRequest::new("how many rows?");
    assert_eq!(req.user_message, "how many rows?");
    assert!(req.metadata.is_none());
    assert!(req.rules.is_empty());
}
