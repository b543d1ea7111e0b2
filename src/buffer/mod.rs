// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Response buffer manager
//
// Responsibilities:
// - Collect cumulative field chunks into one buffer per response
// - Validate the whole buffer once the stream ends
// - Run bounded recovery with doubling backoff when validation fails
// - Roll back (clear every field) when recovery cannot help
// - Execute validated code through the code_executor breaker
// - Keep response counters for the stats surface
//
// Nothing leaves the buffer before it reaches VALIDATED; the streaming
// controller refuses any other state.

mod types;

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio_stream::StreamExt;

use crate::breaker::{components, BreakerRegistry};
use crate::config::RecoveryConfig;
use crate::frame::Table;
use crate::generation::{ChunkStream, GenerationError};
use crate::response::Field;
use crate::sandbox::{CodeExecutor, ExecutionResult};
use crate::validate::{ContentValidator, ValidationResult, CODE_MESSAGE_PREFIX};

pub use types::{BufferError, BufferState, ResponseBuffer};

/// Reasons a response could not be turned into a buffer worth streaming.
/// The buffer has been rolled back whenever one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("generation stream failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("circuit breaker open for {component}")]
    Unavailable { component: String },

    #[error(transparent)]
    Transition(#[from] BufferError),
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub total_responses: u64,
    pub successful_responses: u64,
    pub failed_responses: u64,
    pub rollbacks: u64,
    pub validations_passed: u64,
    pub validations_failed: u64,
    pub recoveries: u64,
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    rollbacks: AtomicU64,
    validations_passed: AtomicU64,
    validations_failed: AtomicU64,
    recoveries: AtomicU64,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct ResponseBufferManager {
    validator: Arc<ContentValidator>,
    executor: Arc<CodeExecutor>,
    breakers: Arc<BreakerRegistry>,
    recovery: RecoveryConfig,
    counters: Counters,
}

impl ResponseBufferManager {
    pub fn new(
        validator: Arc<ContentValidator>,
        executor: Arc<CodeExecutor>,
        breakers: Arc<BreakerRegistry>,
        recovery: RecoveryConfig,
    ) -> Self {
        Self {
            validator,
            executor,
            breakers,
            recovery,
            counters: Counters::default(),
        }
    }

    /// Collect `chunks`, validate, recover, and execute any code.
    ///
    /// The returned buffer is either VALIDATED (ready to stream) or
    /// ROLLED_BACK with its errors recorded. An `Err` means the response
    /// was lost before validation could judge it.
    pub async fn process(
        &self,
        id: &str,
        mut chunks: ChunkStream,
        table: Option<Arc<Table>>,
    ) -> Result<ResponseBuffer, ProcessError> {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        let mut buffer = ResponseBuffer::new(id);
        buffer.transition(BufferState::Collecting)?;

        let mut received = 0usize;
        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    received += 1;
                    buffer.apply(chunk);
                }
                Err(e) => {
                    buffer.errors.push(e.to_string());
                    self.fail(&mut buffer)?;
                    return Err(e.into());
                }
            }
        }
        tracing::debug!(buffer_id = id, chunks = received, "generation stream collected");

        buffer.transition(BufferState::Validating)?;
        let validation = match self.validate(&mut buffer).await {
            Ok(v) => v,
            Err(e) => {
                self.fail(&mut buffer)?;
                return Err(e);
            }
        };

        if validation.is_valid {
            self.apply_cleaned(&mut buffer, &validation);
            buffer.transition(BufferState::Validated)?;
        } else {
            buffer.transition(BufferState::Failed)?;
            let recovered = match self.recover(&mut buffer).await {
                Ok(recovered) => recovered,
                Err(e) => {
                    self.rollback(&mut buffer)?;
                    return Err(e);
                }
            };
            if !recovered {
                self.rollback(&mut buffer)?;
                return Ok(buffer);
            }
        }

        if buffer.has_code() {
            self.execute(&mut buffer, table.as_deref()).await;
        }
        self.counters.successful.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            buffer_id = id,
            warnings = buffer.warnings.len(),
            recovery_attempts = buffer.recovery_attempts,
            executed = buffer.execution.is_some(),
            "response validated"
        );
        Ok(buffer)
    }

    /// Whole-buffer validation through the validation breaker. Errors and
    /// warnings accumulate on the buffer.
    async fn validate(&self, buffer: &mut ResponseBuffer) -> Result<ValidationResult, ProcessError> {
        let validator = Arc::clone(&self.validator);
        let fields = buffer.fields().clone();
        let result = self
            .breakers
            .execute(components::VALIDATION, || async move {
                Ok::<_, Infallible>(validator.validate_structured_response(&fields))
            })
            .await
            .map_err(|_| ProcessError::Unavailable {
                component: components::VALIDATION.to_string(),
            })?;

        if result.is_valid {
            self.counters.validations_passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.validations_failed.fetch_add(1, Ordering::Relaxed);
        }
        for error in &result.errors {
            if !buffer.errors.contains(error) {
                buffer.errors.push(error.clone());
            }
        }
        for warning in &result.warnings {
            buffer.warn(warning.clone());
        }
        buffer.validation = Some(result.clone());
        Ok(result)
    }

    /// Keep the repaired code when a passing validation produced one.
    fn apply_cleaned(&self, buffer: &mut ResponseBuffer, validation: &ValidationResult) {
        if let Some(cleaned) = &validation.cleaned_content {
            if cleaned != &buffer.fields().generated_code {
                buffer.set_field(Field::GeneratedCode, cleaned.clone());
            }
        }
    }

    /// Retry validation with the validator's repaired code. Stops as soon
    /// as a pass is reached, the attempt cap is hit, or no repair differs
    /// from the code already tried.
    async fn recover(&self, buffer: &mut ResponseBuffer) -> Result<bool, ProcessError> {
        let mut delay = self.recovery.base_delay;
        for attempt in 1..=self.recovery.max_attempts {
            let candidate = buffer
                .validation
                .as_ref()
                .and_then(|v| v.cleaned_content.clone())
                .filter(|c| c != &buffer.fields().generated_code);
            let Some(candidate) = candidate else {
                tracing::debug!(buffer_id = buffer.id(), attempt, "no repair candidate; recovery stops");
                break;
            };

            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);

            buffer.recovery_attempts = attempt;
            buffer.set_field(Field::GeneratedCode, candidate);
            buffer.warn(format!("Applied code recovery attempt {attempt}"));
            buffer.errors.retain(|e| !e.starts_with(CODE_MESSAGE_PREFIX));

            let result = self.validate(buffer).await?;
            if result.is_valid {
                buffer.transition(BufferState::Validated)?;
                self.counters.recoveries.fetch_add(1, Ordering::Relaxed);
                tracing::info!(buffer_id = buffer.id(), attempt, "response recovered");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Mark a collecting or validating buffer failed, then roll it back.
    fn fail(&self, buffer: &mut ResponseBuffer) -> Result<(), BufferError> {
        buffer.transition(BufferState::Failed)?;
        self.rollback(buffer)
    }

    fn rollback(&self, buffer: &mut ResponseBuffer) -> Result<(), BufferError> {
        buffer.transition(BufferState::RolledBack)?;
        buffer.clear_fields();
        buffer.execution = None;
        self.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            buffer_id = buffer.id(),
            errors = ?buffer.errors,
            recovery_attempts = buffer.recovery_attempts,
            "response rolled back"
        );
        Ok(())
    }

    async fn execute(&self, buffer: &mut ResponseBuffer, table: Option<&Table>) {
        let code = buffer.fields().generated_code.clone();
        let outcome = self
            .breakers
            .execute(components::CODE_EXECUTOR, || self.executor.execute(&code, table))
            .await;

        match outcome {
            Ok(result) => {
                if !result.success {
                    tracing::info!(buffer_id = buffer.id(), "generated code raised an error");
                }
                buffer.execution = Some(result);
            }
            Err(e) if e.is_circuit_open() => {
                buffer.warn(format!("Code execution skipped: {e}"));
            }
            Err(e) => {
                buffer.warn(format!("Code execution failed: {e}"));
                buffer.execution = Some(ExecutionResult::failed(&code, e.to_string()));
            }
        }
    }

    pub fn stats(&self) -> BufferStats {
        let c = &self.counters;
        BufferStats {
            total_responses: c.total.load(Ordering::Relaxed),
            successful_responses: c.successful.load(Ordering::Relaxed),
            failed_responses: c.failed.load(Ordering::Relaxed),
            rollbacks: c.rollbacks.load(Ordering::Relaxed),
            validations_passed: c.validations_passed.load(Ordering::Relaxed),
            validations_failed: c.validations_failed.load(Ordering::Relaxed),
            recoveries: c.recoveries.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        let c = &self.counters;
        for counter in [
            &c.total,
            &c.successful,
            &c.failed,
            &c.rollbacks,
            &c.validations_passed,
            &c.validations_failed,
            &c.recoveries,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests;
