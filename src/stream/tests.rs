// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Tests cover:
//  1. Validated buffers stream in field order and reassemble exactly
//  2. Unvalidated and rolled-back buffers expose no content
//  3. Cursors never resend bytes; non-extensions become replace
//  4. Sink failures mark the stream failed and the buffer FAILED
//  5. Fallback responses are marked
//  6. Event wire format

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::*;
use crate::buffer::{BufferState, ResponseBuffer};
use crate::config::StreamingConfig;
use crate::response::{Field, FieldChunk, ResponseFields};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Records every event it is given.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<StreamEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().clone()
    }

    fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(StreamEvent::name).collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, event: StreamEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Accepts `limit` events, then reports the connection closed.
struct FailingSink {
    limit: usize,
    seen: AtomicUsize,
    inner: RecordingSink,
}

impl FailingSink {
    fn after(limit: usize) -> Self {
        Self {
            limit,
            seen: AtomicUsize::new(0),
            inner: RecordingSink::default(),
        }
    }
}

#[async_trait]
impl EventSink for FailingSink {
    async fn send(&self, event: StreamEvent) -> Result<(), SinkError> {
        if self.seen.fetch_add(1, Ordering::SeqCst) >= self.limit {
            return Err(SinkError::Closed);
        }
        self.inner.send(event).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn controller(chunk_chars: usize) -> StreamingController {
    StreamingController::new(StreamingConfig {
        chunk_chars,
        delay: Duration::ZERO,
    })
}

fn validated(initial: &str, code: &str, commentary: &str) -> ResponseBuffer {
    let mut buffer = ResponseBuffer::new("stream-1");
    buffer.transition(BufferState::Collecting).unwrap();
    buffer.apply(FieldChunk::new(Field::InitialResponse, initial));
    buffer.apply(FieldChunk::new(Field::GeneratedCode, code));
    buffer.apply(FieldChunk::new(Field::ResultCommentary, commentary));
    buffer.transition(BufferState::Validating).unwrap();
    buffer.transition(BufferState::Validated).unwrap();
    buffer
}

/// Concatenate deltas per field, honouring replace.
fn reassemble(events: &[StreamEvent], field: Field) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            StreamEvent::Delta { field: f, content } if *f == field => text.push_str(content),
            StreamEvent::Replace { field: f, content } if *f == field => text = content.clone(),
            _ => {}
        }
    }
    text
}

// ---------------------------------------------------------------------------
// Validated buffers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validated_buffer_streams_in_order() {
    let c = controller(4);
    let sink = RecordingSink::default();
    let mut buffer = validated("Counting rows.", "result = len(df)", "There are 20 rows.");

    c.stream(&sink, &mut buffer).await.unwrap();
    assert_eq!(buffer.state(), BufferState::Completed);

    let events = sink.events();
    let names = sink.names();
    assert_eq!(names.first(), Some(&"stream_start"));
    assert_eq!(&names[names.len() - 2..], ["end", "stream_complete"]);

    for field in Field::ALL {
        assert_eq!(reassemble(&events, field), buffer.fields().get(field));
    }
    // no delta is longer than the configured piece size
    assert!(events.iter().all(|e| match e {
        StreamEvent::Delta { content, .. } => content.chars().count() <= 4,
        _ => true,
    }));

    // every delta of a field precedes its field_complete, and fields go
    // in order
    let order: Vec<(Field, &'static str)> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Delta { field, .. } => Some((*field, "delta")),
            StreamEvent::FieldComplete { field, .. } => Some((*field, "complete")),
            _ => None,
        })
        .collect();
    let completes: Vec<usize> = order
        .iter()
        .enumerate()
        .filter(|(_, (_, kind))| *kind == "complete")
        .map(|(i, _)| i)
        .collect();
    assert_eq!(completes.len(), 3);
    assert_eq!(order[completes[0]].0, Field::InitialResponse);
    assert_eq!(order[completes[2]].0, Field::ResultCommentary);

    match events.last().unwrap() {
        StreamEvent::StreamComplete { stream_id, total_sent } => {
            assert_eq!(stream_id, "stream-1");
            assert_eq!(*total_sent, "Counting rows.result = len(df)There are 20 rows.".len());
        }
        other => panic!("unexpected last event {other:?}"),
    }
}

#[tokio::test]
async fn multibyte_text_is_split_on_char_boundaries() {
    let c = controller(3);
    let sink = RecordingSink::default();
    let mut buffer = validated("تحليل البيانات", "", "done ✓");
    c.stream(&sink, &mut buffer).await.unwrap();
    assert_eq!(reassemble(&sink.events(), Field::InitialResponse), "تحليل البيانات");
    assert_eq!(reassemble(&sink.events(), Field::ResultCommentary), "done ✓");
}

#[tokio::test]
async fn empty_code_field_sends_no_field_events() {
    let c = controller(8);
    let sink = RecordingSink::default();
    let mut buffer = validated("Hello.", "", "Nothing to run.");
    c.stream(&sink, &mut buffer).await.unwrap();
    assert!(!sink.events().iter().any(|e| matches!(
        e,
        StreamEvent::Delta { field: Field::GeneratedCode, .. }
            | StreamEvent::FieldComplete { field: Field::GeneratedCode, .. }
    )));
}

#[tokio::test]
async fn warnings_are_sent_before_end() {
    let c = controller(64);
    let sink = RecordingSink::default();
    let mut buffer = validated("a", "x = 1", "b");
    buffer.warn("Removed markdown code fences");
    c.stream(&sink, &mut buffer).await.unwrap();
    let names = sink.names();
    let warnings = names.iter().position(|n| *n == "warnings").unwrap();
    let end = names.iter().position(|n| *n == "end").unwrap();
    assert!(warnings < end);
}

#[tokio::test(start_paused = true)]
async fn pacing_delays_between_pieces() {
    let c = StreamingController::new(StreamingConfig {
        chunk_chars: 2,
        delay: Duration::from_millis(20),
    });
    let sink = RecordingSink::default();
    let mut state = StreamingState::new();
    let started = tokio::time::Instant::now();
    c.send_field(&sink, &mut state, Field::InitialResponse, "abcdef")
        .await
        .unwrap();
    // three pieces, two pauses
    assert_eq!(sink.events().len(), 3);
    assert!(started.elapsed() >= Duration::from_millis(40));
}

// ---------------------------------------------------------------------------
// Nothing before VALIDATED
// ---------------------------------------------------------------------------

#[tokio::test]
async fn collecting_buffer_is_refused() {
    let c = controller(8);
    let sink = RecordingSink::default();
    let mut buffer = ResponseBuffer::new("early");
    buffer.transition(BufferState::Collecting).unwrap();
    buffer.apply(FieldChunk::new(Field::InitialResponse, "secret partial"));

    c.stream(&sink, &mut buffer).await.unwrap();
    let events = sink.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Error { message, .. } => assert!(message.contains("collecting")),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(buffer.state(), BufferState::Collecting);
    assert!(!serde_json::to_string(&events).unwrap().contains("secret partial"));
}

#[tokio::test]
async fn rolled_back_buffer_yields_one_error_event() {
    let c = controller(8);
    let sink = RecordingSink::default();
    let mut buffer = ResponseBuffer::new("bad");
    buffer.transition(BufferState::Collecting).unwrap();
    buffer.transition(BufferState::Validating).unwrap();
    buffer.transition(BufferState::Failed).unwrap();
    buffer.errors.push("Code validation: Dangerous operation detected: import os".into());
    buffer.transition(BufferState::RolledBack).unwrap();

    c.stream(&sink, &mut buffer).await.unwrap();
    assert_eq!(
        sink.events(),
        vec![StreamEvent::Error {
            message: "Response validation failed".to_string(),
            errors: vec!["Code validation: Dangerous operation detected: import os".to_string()],
            warnings: vec![],
        }]
    );
    assert_eq!(c.stats().total_streams, 0);
}

// ---------------------------------------------------------------------------
// Cursors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cursor_sends_only_the_unsent_suffix() {
    let c = controller(100);
    let sink = RecordingSink::default();
    let mut state = StreamingState::new();

    c.send_field(&sink, &mut state, Field::InitialResponse, "I will")
        .await
        .unwrap();
    c.send_field(&sink, &mut state, Field::InitialResponse, "I will count")
        .await
        .unwrap();
    // re-sending the same content is a no-op
    c.send_field(&sink, &mut state, Field::InitialResponse, "I will count")
        .await
        .unwrap();

    assert_eq!(
        sink.events(),
        vec![
            StreamEvent::Delta {
                field: Field::InitialResponse,
                content: "I will".into()
            },
            StreamEvent::Delta {
                field: Field::InitialResponse,
                content: " count".into()
            },
        ]
    );
    assert_eq!(state.cursor(Field::InitialResponse), "I will count".len());
    assert_eq!(state.total_bytes(), "I will count".len());
}

#[tokio::test]
async fn correction_that_is_not_an_extension_is_a_replace() {
    let c = controller(100);
    let sink = RecordingSink::default();
    let mut state = StreamingState::new();

    c.send_field(&sink, &mut state, Field::GeneratedCode, "x = 1O")
        .await
        .unwrap();
    c.send_field(&sink, &mut state, Field::GeneratedCode, "x = 10")
        .await
        .unwrap();
    c.send_field(&sink, &mut state, Field::GeneratedCode, "x = 10\nprint(x)")
        .await
        .unwrap();

    let events = sink.events();
    assert_eq!(
        events[1],
        StreamEvent::Replace {
            field: Field::GeneratedCode,
            content: "x = 10".into()
        }
    );
    // the replace starts a new epoch; the next update is a plain delta
    assert_eq!(
        events[2],
        StreamEvent::Delta {
            field: Field::GeneratedCode,
            content: "\nprint(x)".into()
        }
    );
    assert_eq!(reassemble(&events, Field::GeneratedCode), "x = 10\nprint(x)");
    assert_eq!(state.last_event(), Some("delta"));
}

#[test]
fn diff_classifies_updates() {
    let mut state = StreamingState::new();
    assert_eq!(state.diff(Field::ResultCommentary, ""), FieldUpdate::Unchanged);
    state.commit(&StreamEvent::Delta {
        field: Field::ResultCommentary,
        content: "abc".into(),
    });
    assert_eq!(state.diff(Field::ResultCommentary, "abcd"), FieldUpdate::Delta("d"));
    assert_eq!(state.diff(Field::ResultCommentary, "abc"), FieldUpdate::Unchanged);
    assert_eq!(state.diff(Field::ResultCommentary, "ab"), FieldUpdate::Replace("ab"));
    assert_eq!(state.cursor(Field::InitialResponse), 0);
    assert!(!state.is_active());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sink_failure_fails_the_stream() {
    let c = controller(2);
    let sink = FailingSink::after(3);
    let mut buffer = validated("A long first answer", "x = 1", "ok");

    let err = c.stream(&sink, &mut buffer).await.unwrap_err();
    assert!(matches!(err, StreamError::Sink(SinkError::Closed)));
    assert_eq!(buffer.state(), BufferState::Failed);
    assert_eq!(sink.inner.events().len(), 3);

    let stats = c.stats();
    assert_eq!(stats.total_streams, 1);
    assert_eq!(stats.failed_streams, 1);
    assert_eq!(stats.successful_streams, 0);
    assert_eq!(stats.total_messages_sent, 3);
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fallback_is_marked() {
    let c = controller(16);
    let sink = RecordingSink::default();
    c.stream_fallback(&sink, "how many rows?", "Generation service not available")
        .await
        .unwrap();

    let events = sink.events();
    let expected = ResponseFields::fallback("how many rows?", "Generation service not available");
    for field in Field::ALL {
        assert_eq!(reassemble(&events, field), expected.get(field));
    }
    match events.last().unwrap() {
        StreamEvent::End {
            final_response,
            execution_results,
            fallback,
        } => {
            assert!(*fallback);
            assert_eq!(final_response, &expected);
            assert!(execution_results.is_none());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(c.stats().successful_streams, 1);
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[test]
fn events_serialize_with_a_type_tag() {
    let delta = StreamEvent::Delta {
        field: Field::InitialResponse,
        content: "Hi".into(),
    };
    assert_eq!(
        serde_json::to_value(&delta).unwrap(),
        json!({"type": "delta", "field": "initial_response", "content": "Hi"})
    );
    assert_eq!(serde_json::to_value(StreamEvent::Start).unwrap(), json!({"type": "start"}));

    let end = StreamEvent::End {
        final_response: ResponseFields::new("a", "", "c"),
        execution_results: None,
        fallback: false,
    };
    let value = serde_json::to_value(&end).unwrap();
    assert_eq!(value["type"], "end");
    assert_eq!(value["final"]["initial_response"], "a");
    assert!(value["execution_results"].is_null());
    assert!(value.get("fallback").is_none());

    let parsed: StreamEvent = serde_json::from_value(json!({
        "type": "stream_complete",
        "stream_id": "s",
        "total_sent": 5
    }))
    .unwrap();
    assert_eq!(
        parsed,
        StreamEvent::StreamComplete {
            stream_id: "s".into(),
            total_sent: 5
        }
    );
}

#[tokio::test]
async fn channel_sink_reports_closed_receiver() {
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    let sink = ChannelSink::new(tx);
    drop(rx);
    assert_eq!(sink.send(StreamEvent::Start).await, Err(SinkError::Closed));
}

#[tokio::test]
async fn stats_reset() {
    let c = controller(8);
    let sink = RecordingSink::default();
    let mut buffer = validated("a", "", "b");
    c.stream(&sink, &mut buffer).await.unwrap();
    assert!(c.stats().total_bytes_sent > 0);
    c.reset_stats();
    assert_eq!(c.stats(), StreamingStats::default());
}
