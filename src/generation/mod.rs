// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Generation source
//
// Responsibilities:
// - Define the injection seam the pipeline consumes: an async sequence of
//   cumulative `(field, content)` chunks plus a health probe
// - Build the three-field system prompt from table metadata and user rules
// - Talk to an OpenAI-compatible streaming chat completions endpoint,
//   turning SSE deltas into cumulative field chunks as the JSON grows
// - Re-emit authoritative field values once the whole response has been
//   repaired and parsed

mod client;
mod partial;
mod prompt;

pub use client::OpenAiGenerationClient;
pub use partial::{parse_sse_data, FieldTracker, SseData};
pub use prompt::build_system_prompt;

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::metadata::TableMetadata;
use crate::response::FieldChunk;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Errors from the generation backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Transport(String),

    #[error("generation request timed out: {0}")]
    Timeout(String),

    #[error("generation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generation response could not be parsed: {0}")]
    Malformed(String),
}

/// Cumulative field chunks; each item carries the field's whole value so
/// far.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<FieldChunk, GenerationError>> + Send>>;

/// Everything the generator needs to answer one user message.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub user_message: String,
    pub metadata: Option<TableMetadata>,
    pub rules: Vec<String>,
}

impl GenerationRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Trait: GenerationSource (dependency injection point)
// ---------------------------------------------------------------------------

/// Produces a structured three-field response as a chunk stream.
///
/// Implementations must be Send + Sync so they can be shared across
/// connections via `Arc`.
#[async_trait]
pub trait GenerationSource: Send + Sync {
    /// Start generating. Errors before the first chunk are returned here;
    /// errors after it arrive in the stream.
    async fn generate(&self, request: &GenerationRequest) -> Result<ChunkStream, GenerationError>;

    /// Cheap availability probe.
    async fn health(&self) -> Result<(), GenerationError>;
}

#[cfg(test)]
mod tests;
