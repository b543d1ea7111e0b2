// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Streaming controller
//
// Turns a validated buffer, or a fallback response, into ordered client
// events. Each field goes out as append-only deltas of its unsent
// suffix; a correction that does not extend the sent text goes out as a
// replace.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer::{BufferState, ResponseBuffer};
use crate::config::StreamingConfig;
use crate::response::{Field, ResponseFields};

use super::types::{
    EventSink, FieldUpdate, SinkError, StreamError, StreamEvent, StreamingState, StreamingStats,
};

#[derive(Debug, Default)]
struct Counters {
    streams: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    bytes: AtomicU64,
    messages: AtomicU64,
}

pub struct StreamingController {
    config: StreamingConfig,
    counters: Counters,
}

/// Split `text` into pieces of at most `size` characters.
fn pieces(text: &str, size: usize) -> impl Iterator<Item = &str> {
    let size = size.max(1);
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let end = rest
            .char_indices()
            .nth(size)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(end);
        rest = tail;
        Some(head)
    })
}

impl StreamingController {
    pub fn new(config: StreamingConfig) -> Self {
        Self {
            config,
            counters: Counters::default(),
        }
    }

    /// Stream `buffer` if it is VALIDATED. A rolled-back buffer yields a
    /// single error event carrying its errors; any other state yields a
    /// not-ready error. Nothing else is ever sent for an unvalidated
    /// buffer.
    pub async fn stream(
        &self,
        sink: &dyn EventSink,
        buffer: &mut ResponseBuffer,
    ) -> Result<(), StreamError> {
        match buffer.state() {
            BufferState::Validated => {}
            BufferState::RolledBack => {
                let event = StreamEvent::Error {
                    message: "Response validation failed".to_string(),
                    errors: buffer.errors().to_vec(),
                    warnings: buffer.warnings().to_vec(),
                };
                return self.deliver(sink, event).await.map_err(StreamError::from);
            }
            other => {
                tracing::warn!(buffer_id = buffer.id(), state = %other, "refusing to stream unvalidated buffer");
                let event = StreamEvent::Error {
                    message: format!("Response is not ready for streaming (state: {other})"),
                    errors: Vec::new(),
                    warnings: Vec::new(),
                };
                return self.deliver(sink, event).await.map_err(StreamError::from);
            }
        }

        self.counters.streams.fetch_add(1, Ordering::Relaxed);
        buffer.transition(BufferState::Streaming)?;
        let mut state = StreamingState::new();
        state.set_active(true);
        let outcome = self.send_buffer(sink, &mut state, buffer).await;
        state.set_active(false);

        match outcome {
            Ok(()) => {
                buffer.transition(BufferState::Completed)?;
                self.counters.successes.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    stream_id = buffer.id(),
                    bytes = state.total_bytes(),
                    "stream completed"
                );
                Ok(())
            }
            Err(e) => {
                buffer.transition(BufferState::Failed)?;
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    stream_id = buffer.id(),
                    error = %e,
                    last_event = state.last_event().unwrap_or("none"),
                    "stream failed"
                );
                // best effort; the sink is usually what failed
                let _ = sink
                    .send(StreamEvent::StreamError {
                        stream_id: buffer.id().to_string(),
                        error: e.to_string(),
                    })
                    .await;
                Err(e.into())
            }
        }
    }

    async fn send_buffer(
        &self,
        sink: &dyn EventSink,
        state: &mut StreamingState,
        buffer: &ResponseBuffer,
    ) -> Result<(), SinkError> {
        let stream_id = buffer.id().to_string();
        self.send(sink, state, StreamEvent::StreamStart {
            stream_id: stream_id.clone(),
        })
        .await?;

        for field in Field::ALL {
            let content = buffer.fields().get(field);
            self.send_field(sink, state, field, content).await?;
            if !content.is_empty() {
                self.send(sink, state, StreamEvent::FieldComplete {
                    field,
                    content: content.to_string(),
                })
                .await?;
            }
        }

        if !buffer.warnings().is_empty() {
            self.send(sink, state, StreamEvent::Warnings {
                warnings: buffer.warnings().to_vec(),
            })
            .await?;
        }

        self.send(sink, state, StreamEvent::End {
            final_response: buffer.fields().clone(),
            execution_results: buffer.execution().cloned(),
            fallback: false,
        })
        .await?;

        let total_sent = state.total_bytes();
        self.send(sink, state, StreamEvent::StreamComplete {
            stream_id,
            total_sent,
        })
        .await
    }

    /// Bring the client's copy of `field` up to `content`.
    pub async fn send_field(
        &self,
        sink: &dyn EventSink,
        state: &mut StreamingState,
        field: Field,
        content: &str,
    ) -> Result<(), SinkError> {
        match state.diff(field, content) {
            FieldUpdate::Unchanged => Ok(()),
            FieldUpdate::Replace(content) => {
                tracing::debug!(%field, cursor = state.cursor(field), "field replaced");
                self.send(sink, state, StreamEvent::Replace {
                    field,
                    content: content.to_string(),
                })
                .await
            }
            FieldUpdate::Delta(suffix) => {
                let mut first = true;
                for piece in pieces(suffix, self.config.chunk_chars) {
                    if !first && !self.config.delay.is_zero() {
                        tokio::time::sleep(self.config.delay).await;
                    }
                    first = false;
                    self.send(sink, state, StreamEvent::Delta {
                        field,
                        content: piece.to_string(),
                    })
                    .await?;
                }
                Ok(())
            }
        }
    }

    /// Send the clearly marked fallback response.
    pub async fn stream_fallback(
        &self,
        sink: &dyn EventSink,
        user_message: &str,
        reason: &str,
    ) -> Result<(), SinkError> {
        self.counters.streams.fetch_add(1, Ordering::Relaxed);
        let fields = ResponseFields::fallback(user_message, reason);
        let mut state = StreamingState::new();
        state.set_active(true);

        let mut outcome = Ok(());
        for field in Field::ALL {
            outcome = self.send_field(sink, &mut state, field, fields.get(field)).await;
            if outcome.is_err() {
                break;
            }
        }
        if outcome.is_ok() {
            outcome = self
                .send(sink, &mut state, StreamEvent::End {
                    final_response: fields,
                    execution_results: None,
                    fallback: true,
                })
                .await;
        }
        state.set_active(false);

        match &outcome {
            Ok(()) => {
                self.counters.successes.fetch_add(1, Ordering::Relaxed);
                tracing::info!(reason, "fallback response sent");
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "fallback stream failed");
            }
        }
        outcome
    }

    /// Send one event outside any stream's cursors.
    pub async fn deliver(&self, sink: &dyn EventSink, event: StreamEvent) -> Result<(), SinkError> {
        sink.send(event).await?;
        self.counters.messages.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn send(
        &self,
        sink: &dyn EventSink,
        state: &mut StreamingState,
        event: StreamEvent,
    ) -> Result<(), SinkError> {
        sink.send(event.clone()).await?;
        state.commit(&event);
        self.counters.messages.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes
            .fetch_add(event.content_len() as u64, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> StreamingStats {
        let c = &self.counters;
        StreamingStats {
            total_streams: c.streams.load(Ordering::Relaxed),
            successful_streams: c.successes.load(Ordering::Relaxed),
            failed_streams: c.failures.load(Ordering::Relaxed),
            total_bytes_sent: c.bytes.load(Ordering::Relaxed),
            total_messages_sent: c.messages.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        let c = &self.counters;
        for counter in [&c.streams, &c.successes, &c.failures, &c.bytes, &c.messages] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
