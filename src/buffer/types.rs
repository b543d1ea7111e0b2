// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Response buffer types
//
// The buffer owns one response from first chunk to terminal state. Its
// content is released for streaming only from VALIDATED.

use std::fmt;

use serde::Serialize;

use crate::response::{Field, FieldChunk, ResponseFields};
use crate::sandbox::ExecutionResult;
use crate::validate::ValidationResult;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Lifecycle of one buffered response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferState {
    Initializing,
    Collecting,
    Validating,
    Validated,
    Failed,
    Streaming,
    Completed,
    RolledBack,
}

impl BufferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferState::Initializing => "initializing",
            BufferState::Collecting => "collecting",
            BufferState::Validating => "validating",
            BufferState::Validated => "validated",
            BufferState::Failed => "failed",
            BufferState::Streaming => "streaming",
            BufferState::Completed => "completed",
            BufferState::RolledBack => "rolled_back",
        }
    }

    /// Whether `self -> next` is a legal edge.
    pub fn can_transition(self, next: BufferState) -> bool {
        use BufferState::*;
        matches!(
            (self, next),
            (Initializing, Collecting)
                | (Collecting, Validating)
                | (Collecting, Failed)
                | (Validating, Validated)
                | (Validating, Failed)
                | (Failed, Validated)
                | (Failed, RolledBack)
                | (Validated, Streaming)
                | (Streaming, Completed)
                | (Streaming, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BufferState::Completed | BufferState::RolledBack)
    }
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An illegal state change; always a bug in the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal buffer transition {from} -> {to}")]
pub struct BufferError {
    pub from: BufferState,
    pub to: BufferState,
}

// ---------------------------------------------------------------------------
// ResponseBuffer
// ---------------------------------------------------------------------------

/// One response being collected, validated and released.
#[derive(Debug, Clone)]
pub struct ResponseBuffer {
    id: String,
    fields: ResponseFields,
    state: BufferState,
    pub(crate) validation: Option<ValidationResult>,
    pub(crate) errors: Vec<String>,
    pub(crate) warnings: Vec<String>,
    pub(crate) execution: Option<ExecutionResult>,
    pub(crate) recovery_attempts: u32,
}

impl ResponseBuffer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: ResponseFields::default(),
            state: BufferState::Initializing,
            validation: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            execution: None,
            recovery_attempts: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn fields(&self) -> &ResponseFields {
        &self.fields
    }

    /// The most recent whole-buffer validation.
    pub fn validation(&self) -> Option<&ValidationResult> {
        self.validation.as_ref()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn execution(&self) -> Option<&ExecutionResult> {
        self.execution.as_ref()
    }

    pub fn recovery_attempts(&self) -> u32 {
        self.recovery_attempts
    }

    /// Both prose fields have content.
    pub fn is_complete(&self) -> bool {
        !self.fields.initial_response.trim().is_empty()
            && !self.fields.result_commentary.trim().is_empty()
    }

    pub fn has_code(&self) -> bool {
        !self.fields.generated_code.trim().is_empty()
    }

    pub fn transition(&mut self, next: BufferState) -> Result<(), BufferError> {
        if !self.state.can_transition(next) {
            return Err(BufferError {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(buffer_id = %self.id, from = %self.state, to = %next, "buffer transition");
        self.state = next;
        Ok(())
    }

    /// Cumulative chunks replace the field's value.
    pub fn apply(&mut self, chunk: FieldChunk) {
        self.fields.set(chunk.field, chunk.content);
    }

    pub(crate) fn set_field(&mut self, field: Field, content: impl Into<String>) {
        self.fields.set(field, content);
    }

    pub(crate) fn clear_fields(&mut self) {
        self.fields.clear();
    }

    pub(crate) fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}
