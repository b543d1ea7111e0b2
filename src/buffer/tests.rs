// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde_json::json;

use super::*;
use crate::config::{default_security_policy, BreakerConfig, BreakerSettings, SandboxConfig};
use crate::frame::Cell;
use crate::response::FieldChunk;
use crate::serialize::ValueSerializer;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn manager_with(breakers: Arc<BreakerRegistry>) -> ResponseBufferManager {
    let validator = Arc::new(ContentValidator::new(Arc::new(default_security_policy())));
    let executor = Arc::new(CodeExecutor::new(
        SandboxConfig::default(),
        Arc::clone(&validator),
        Arc::new(ValueSerializer::default()),
    ));
    ResponseBufferManager::new(
        validator,
        executor,
        breakers,
        RecoveryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        },
    )
}

fn manager() -> ResponseBufferManager {
    manager_with(Arc::new(BreakerRegistry::new(BreakerSettings::default())))
}

fn chunks(items: Vec<(Field, &str)>) -> ChunkStream {
    let items: Vec<Result<FieldChunk, GenerationError>> = items
        .into_iter()
        .map(|(field, content)| Ok(FieldChunk::new(field, content)))
        .collect();
    Box::pin(tokio_stream::iter(items))
}

fn response(code: &str) -> ChunkStream {
    chunks(vec![
        (Field::InitialResponse, "Counting the Saudi customers."),
        (Field::GeneratedCode, code),
        (Field::ResultCommentary, "There are 12 customers in Saudi Arabia."),
    ])
}

fn customers() -> Arc<Table> {
    let countries = [
        "Saudi Arabia", "UAE", "Saudi Arabia", "Saudi Arabia", "Qatar", "Saudi Arabia", "Kuwait",
        "Saudi Arabia", "Saudi Arabia", "Oman", "Saudi Arabia", "Bahrain", "Saudi Arabia",
        "Saudi Arabia", "UAE", "Saudi Arabia", "Qatar", "Saudi Arabia", "Egypt", "Saudi Arabia",
    ];
    Arc::new(
        Table::new(vec![
            ("customer_id".to_string(), (1..=20).map(Cell::Int).collect()),
            (
                "country".to_string(),
                countries.iter().map(|c| Cell::Str(c.to_string())).collect(),
            ),
        ])
        .unwrap(),
    )
}

// ---------------------------------------------------------------------------
// Collection and validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn later_chunks_replace_earlier_values() {
    let stream = chunks(vec![
        (Field::InitialResponse, "I will"),
        (Field::InitialResponse, "I will look at the data."),
        (Field::GeneratedCode, ""),
        (Field::ResultCommentary, "Nothing to compute."),
    ]);
    let buffer = manager().process("r1", stream, None).await.unwrap();
    assert_eq!(buffer.state(), BufferState::Validated);
    assert_eq!(buffer.fields().initial_response, "I will look at the data.");
    assert!(buffer.is_complete());
    assert!(buffer.execution().is_none());
}

#[tokio::test]
async fn valid_code_is_executed_against_the_table() {
    let m = manager();
    let buffer = m
        .process(
            "r2",
            response("result = len(df[df['country'] == 'Saudi Arabia'])\nprint(result)"),
            Some(customers()),
        )
        .await
        .unwrap();

    assert_eq!(buffer.state(), BufferState::Validated);
    let execution = buffer.execution().unwrap();
    assert!(execution.success, "{}", execution.output);
    assert_eq!(execution.results.as_ref().unwrap()["result"], json!(12));
    assert_eq!(execution.output, "12\n");

    let stats = m.stats();
    assert_eq!(stats.total_responses, 1);
    assert_eq!(stats.successful_responses, 1);
    assert_eq!(stats.validations_passed, 1);
    assert_eq!(stats.rollbacks, 0);
}

#[tokio::test]
async fn passing_repairs_are_kept_in_the_buffer() {
    let buffer = manager()
        .process("r3", response("```python\nresult = 1\n```"), None)
        .await
        .unwrap();
    assert_eq!(buffer.state(), BufferState::Validated);
    assert_eq!(buffer.fields().generated_code, "result = 1");
    assert!(buffer
        .warnings()
        .contains(&"Code validation: Removed markdown code fences".to_string()));
    assert_eq!(buffer.recovery_attempts(), 0);
}

// ---------------------------------------------------------------------------
// Rollback and recovery
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn dangerous_code_rolls_back_without_running() {
    let m = manager();
    let buffer = m
        .process("r4", response("import os\nresult = 1"), Some(customers()))
        .await
        .unwrap();

    assert_eq!(buffer.state(), BufferState::RolledBack);
    assert_eq!(
        buffer.errors(),
        ["Code validation: Dangerous operation detected: import os".to_string()]
    );
    assert!(buffer.fields().is_empty());
    assert!(buffer.execution().is_none());
    // nothing new to try, so no attempt is spent
    assert_eq!(buffer.recovery_attempts(), 0);

    let stats = m.stats();
    assert_eq!(stats.rollbacks, 1);
    assert_eq!(stats.failed_responses, 1);
    assert_eq!(stats.validations_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn recovery_stops_once_repairs_run_out() {
    let m = manager();
    let started = tokio::time::Instant::now();
    let buffer = m
        .process("r5", response("```python\nimport os\n```"), None)
        .await
        .unwrap();

    assert_eq!(buffer.state(), BufferState::RolledBack);
    assert_eq!(buffer.recovery_attempts(), 1);
    assert!(buffer
        .warnings()
        .contains(&"Applied code recovery attempt 1".to_string()));
    assert_eq!(
        buffer.errors(),
        ["Code validation: Dangerous operation detected: import os".to_string()]
    );
    // one backoff step at the base delay
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(100) && waited < Duration::from_millis(200));
    assert_eq!(m.stats().validations_failed, 2);
    assert_eq!(m.stats().recoveries, 0);
}

#[tokio::test]
async fn generation_error_rolls_back() {
    let m = manager();
    let stream: ChunkStream = Box::pin(tokio_stream::iter(vec![
        Ok(FieldChunk::new(Field::InitialResponse, "Looking")),
        Err(GenerationError::Transport("connection reset".to_string())),
    ]));
    let err = m.process("r6", stream, None).await.unwrap_err();
    assert!(matches!(err, ProcessError::Generation(GenerationError::Transport(_))));

    let stats = m.stats();
    assert_eq!(stats.total_responses, 1);
    assert_eq!(stats.rollbacks, 1);
    assert_eq!(stats.successful_responses, 0);
}

// ---------------------------------------------------------------------------
// Breakers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn open_executor_circuit_skips_execution_with_a_warning() {
    let mut settings = BreakerSettings::default();
    settings.components.insert(
        components::CODE_EXECUTOR.to_string(),
        BreakerConfig {
            failure_threshold: 1,
            open_duration: Duration::from_secs(60),
            ..BreakerConfig::default()
        },
    );
    let breakers = Arc::new(BreakerRegistry::new(settings));
    let _ = breakers
        .execute(components::CODE_EXECUTOR, || async { Err::<(), _>("boom") })
        .await;

    let buffer = manager_with(Arc::clone(&breakers))
        .process("r7", response("result = 1"), None)
        .await
        .unwrap();

    assert_eq!(buffer.state(), BufferState::Validated);
    assert!(buffer.execution().is_none());
    assert!(buffer
        .warnings()
        .contains(&"Code execution skipped: circuit breaker open for code_executor".to_string()));
}

#[tokio::test]
async fn open_validation_circuit_is_an_error() {
    let mut settings = BreakerSettings::default();
    settings.components.insert(
        components::VALIDATION.to_string(),
        BreakerConfig {
            failure_threshold: 1,
            open_duration: Duration::from_secs(60),
            ..BreakerConfig::default()
        },
    );
    let breakers = Arc::new(BreakerRegistry::new(settings));
    let _ = breakers
        .execute(components::VALIDATION, || async { Err::<(), _>("boom") })
        .await;

    let m = manager_with(breakers);
    let err = m.process("r8", response("result = 1"), None).await.unwrap_err();
    assert!(matches!(err, ProcessError::Unavailable { ref component } if component == "validation"));
    assert_eq!(m.stats().rollbacks, 1);
}

#[tokio::test]
async fn stats_reset() {
    let m = manager();
    m.process("r9", response(""), None).await.unwrap();
    assert_eq!(m.stats().total_responses, 1);
    m.reset_stats();
    assert_eq!(m.stats(), BufferStats::default());
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[test]
fn illegal_transitions_are_rejected() {
    let mut buffer = ResponseBuffer::new("t");
    let err = buffer.transition(BufferState::Streaming).unwrap_err();
    assert_eq!(err.from, BufferState::Initializing);
    assert_eq!(err.to, BufferState::Streaming);
    assert_eq!(err.to_string(), "illegal buffer transition initializing -> streaming");
    assert!(BufferState::Failed.can_transition(BufferState::Validated));
    assert!(!BufferState::RolledBack.can_transition(BufferState::Validated));
    assert!(BufferState::Completed.is_terminal());
}
