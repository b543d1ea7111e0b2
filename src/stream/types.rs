// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Client events, the sink they are written to, and the per-stream send
// cursors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::buffer::BufferError;
use crate::response::{Field, ResponseFields};
use crate::sandbox::ExecutionResult;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One client message. Serialized with a `type` tag, e.g.
/// `{"type":"delta","field":"initial_response","content":"I wi"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    StreamStart {
        stream_id: String,
    },
    /// The request was accepted and a response is being prepared.
    Start,
    Delta {
        field: Field,
        content: String,
    },
    FieldComplete {
        field: Field,
        content: String,
    },
    /// The field's content is not an extension of what was sent; the
    /// client discards its copy and keeps this one.
    Replace {
        field: Field,
        content: String,
    },
    Warnings {
        warnings: Vec<String>,
    },
    Error {
        message: String,
        errors: Vec<String>,
        warnings: Vec<String>,
    },
    End {
        #[serde(rename = "final")]
        final_response: ResponseFields,
        execution_results: Option<ExecutionResult>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        fallback: bool,
    },
    StreamComplete {
        stream_id: String,
        total_sent: usize,
    },
    StreamError {
        stream_id: String,
        error: String,
    },
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::StreamStart { .. } => "stream_start",
            StreamEvent::Start => "start",
            StreamEvent::Delta { .. } => "delta",
            StreamEvent::FieldComplete { .. } => "field_complete",
            StreamEvent::Replace { .. } => "replace",
            StreamEvent::Warnings { .. } => "warnings",
            StreamEvent::Error { .. } => "error",
            StreamEvent::End { .. } => "end",
            StreamEvent::StreamComplete { .. } => "stream_complete",
            StreamEvent::StreamError { .. } => "stream_error",
        }
    }

    /// Field content bytes carried by the event.
    pub fn content_len(&self) -> usize {
        match self {
            StreamEvent::Delta { content, .. } | StreamEvent::Replace { content, .. } => content.len(),
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("client connection closed")]
    Closed,

    #[error("send failed: {0}")]
    Transport(String),
}

/// Failures that end a stream early.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Where events go. The WebSocket handler provides one per connection.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: StreamEvent) -> Result<(), SinkError>;
}

/// Sink backed by a bounded channel; a dropped receiver reads as a
/// closed connection.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&self, event: StreamEvent) -> Result<(), SinkError> {
        self.tx.send(event).await.map_err(|_| SinkError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Streaming state
// ---------------------------------------------------------------------------

/// What to send for a field given its current cumulative content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUpdate<'a> {
    /// Nothing new.
    Unchanged,
    /// The unsent suffix.
    Delta(&'a str),
    /// The content no longer extends what was sent.
    Replace(&'a str),
}

/// Per-stream send cursors. The cursor of a field is the byte length of
/// what the client already holds for it; it only grows, except that a
/// replace starts a new epoch at the replacement's length.
#[derive(Debug, Default)]
pub struct StreamingState {
    sent: [String; 3],
    total_bytes: usize,
    active: bool,
    last_event: Option<&'static str>,
}

impl StreamingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self, field: Field) -> usize {
        self.sent[field.index()].len()
    }

    pub fn sent(&self, field: Field) -> &str {
        &self.sent[field.index()]
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_event(&self) -> Option<&'static str> {
        self.last_event
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Compare `content` against what was sent. Does not move the cursor;
    /// call [`StreamingState::commit`] once the event is delivered.
    pub fn diff<'a>(&self, field: Field, content: &'a str) -> FieldUpdate<'a> {
        let sent = &self.sent[field.index()];
        match content.strip_prefix(sent.as_str()) {
            Some("") => FieldUpdate::Unchanged,
            Some(suffix) => FieldUpdate::Delta(suffix),
            None => FieldUpdate::Replace(content),
        }
    }

    /// Record a delivered event.
    pub fn commit(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Delta { field, content } => {
                self.sent[field.index()].push_str(content);
            }
            StreamEvent::Replace { field, content } => {
                self.sent[field.index()] = content.clone();
            }
            _ => {}
        }
        self.total_bytes += event.content_len();
        self.last_event = Some(event.name());
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamingStats {
    pub total_streams: u64,
    pub successful_streams: u64,
    pub failed_streams: u64,
    pub total_bytes_sent: u64,
    pub total_messages_sent: u64,
}
