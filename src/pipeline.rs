// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Request pipeline
//
// Wires the services together for one inbound client message:
// - Announce the request (`start`)
// - Probe the generator through the generation breaker
// - Generate, collect, validate, recover and execute in the buffer
//   manager
// - Stream the validated buffer, or the rolled-back buffer's error event
// - Fall back to the marked safe response when generation is unavailable
//   or processing fails outside validation

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::breaker::{components, BreakerRegistry};
use crate::buffer::{ProcessError, ResponseBufferManager};
use crate::config::Config;
use crate::generation::{GenerationRequest, GenerationSource};
use crate::metadata::TableStore;
use crate::sandbox::CodeExecutor;
use crate::serialize::ValueSerializer;
use crate::stream::{EventSink, SinkError, StreamError, StreamEvent, StreamingController};
use crate::validate::ContentValidator;

pub const FALLBACK_UNAVAILABLE: &str = "Generation service not available";
pub const FALLBACK_FAILED: &str = "Processing failed - using fallback";

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Process-wide services, built once at startup and shared by every
/// connection.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub generation: Arc<dyn GenerationSource>,
    pub breakers: Arc<BreakerRegistry>,
    pub validator: Arc<ContentValidator>,
    pub serializer: Arc<ValueSerializer>,
    pub buffers: Arc<ResponseBufferManager>,
    pub streaming: Arc<StreamingController>,
    pub tables: Arc<TableStore>,
}

impl Services {
    /// Build every service from `config` around an injected generator.
    pub fn from_config(config: Arc<Config>, generation: Arc<dyn GenerationSource>) -> Self {
        let breakers = Arc::new(BreakerRegistry::new(config.runtime.breakers.clone()));
        let validator = Arc::new(ContentValidator::new(Arc::new(
            config.policy.security.clone(),
        )));
        let serializer = Arc::new(ValueSerializer::new(config.policy.sandbox.head_rows));
        let executor = Arc::new(CodeExecutor::new(
            config.policy.sandbox.clone(),
            Arc::clone(&validator),
            Arc::clone(&serializer),
        ));
        let buffers = Arc::new(ResponseBufferManager::new(
            Arc::clone(&validator),
            executor,
            Arc::clone(&breakers),
            config.runtime.recovery,
        ));
        let streaming = Arc::new(StreamingController::new(config.runtime.streaming));

        Self {
            config,
            generation,
            breakers,
            validator,
            serializer,
            buffers,
            streaming,
            tables: Arc::new(TableStore::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    services: Services,
}

impl Pipeline {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Answer one user message on `sink`. Returns an error only when the
    /// sink itself failed, which ends the connection.
    pub async fn handle_message(
        &self,
        sink: &dyn EventSink,
        message: &str,
        rules: &[String],
    ) -> Result<(), SinkError> {
        let s = &self.services;
        let request_id = Uuid::new_v4().to_string();
        tracing::info!(request_id = %request_id, chars = message.len(), "message received");
        s.streaming.deliver(sink, StreamEvent::Start).await?;

        let health_timeout = Duration::from_millis(s.config.runtime.generation.health_timeout_ms);
        let health = s
            .breakers
            .execute_with_timeout(components::GENERATION, health_timeout, || s.generation.health())
            .await;
        if let Err(e) = health {
            tracing::warn!(request_id = %request_id, error = %e, "generation unavailable");
            return s.streaming.stream_fallback(sink, message, FALLBACK_UNAVAILABLE).await;
        }

        let loaded = s.tables.current();
        let request = GenerationRequest {
            user_message: message.to_string(),
            metadata: loaded.as_ref().map(|t| (*t.metadata).clone()),
            rules: rules.to_vec(),
        };
        let chunks = match s
            .breakers
            .execute(components::GENERATION, || s.generation.generate(&request))
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "generation request failed");
                return s.streaming.stream_fallback(sink, message, FALLBACK_FAILED).await;
            }
        };

        let table = loaded.map(|t| t.table);
        let mut buffer = match s.buffers.process(&request_id, chunks, table).await {
            Ok(buffer) => buffer,
            Err(e) => {
                if let ProcessError::Generation(inner) = &e {
                    s.breakers
                        .record_error(components::GENERATION, "stream_error", &inner.to_string(), None);
                }
                tracing::warn!(request_id = %request_id, error = %e, "processing failed");
                return s.streaming.stream_fallback(sink, message, FALLBACK_FAILED).await;
            }
        };

        match s.streaming.stream(sink, &mut buffer).await {
            Ok(()) => Ok(()),
            Err(StreamError::Sink(e)) => Err(e),
            Err(StreamError::Buffer(e)) => {
                tracing::error!(request_id = %request_id, error = %e, "buffer state error while streaming");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::frame::TableFormat;
    use crate::generation::{ChunkStream, GenerationError};
    use crate::response::{Field, FieldChunk};
    use crate::stream::ChannelSink;

    /// Replays a fixed response and records what it was asked.
    struct ScriptedGenerator {
        healthy: AtomicBool,
        response: Vec<Result<FieldChunk, GenerationError>>,
        calls: AtomicUsize,
        last_prompt_had_table: AtomicBool,
    }

    impl ScriptedGenerator {
        fn answering(code: &str) -> Self {
            Self {
                healthy: AtomicBool::new(true),
                response: vec![
                    Ok(FieldChunk::new(Field::InitialResponse, "Filtering by country.")),
                    Ok(FieldChunk::new(Field::GeneratedCode, code)),
                    Ok(FieldChunk::new(Field::ResultCommentary, "Done.")),
                ],
                calls: AtomicUsize::new(0),
                last_prompt_had_table: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl GenerationSource for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<ChunkStream, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_prompt_had_table
                .store(request.metadata.is_some(), Ordering::SeqCst);
            Ok(Box::pin(tokio_stream::iter(self.response.clone())))
        }

        async fn health(&self) -> Result<(), GenerationError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(GenerationError::Transport("connection refused".into()))
            }
        }
    }

    fn pipeline(generator: Arc<ScriptedGenerator>) -> Pipeline {
        let mut config = Config::default();
        config.runtime.streaming.delay = Duration::ZERO;
        config.runtime.recovery.base_delay = Duration::ZERO;
        Pipeline::new(Services::from_config(Arc::new(config), generator))
    }

    async fn run(p: &Pipeline, message: &str) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(1024);
        let sink = ChannelSink::new(tx);
        p.handle_message(&sink, message, &[]).await.unwrap();
        drop(sink);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn end_of(events: &[StreamEvent]) -> (&crate::response::ResponseFields, Option<&crate::sandbox::ExecutionResult>, bool) {
        events
            .iter()
            .find_map(|e| match e {
                StreamEvent::End {
                    final_response,
                    execution_results,
                    fallback,
                } => Some((final_response, execution_results.as_ref(), *fallback)),
                _ => None,
            })
            .expect("end event")
    }

    #[tokio::test]
    async fn message_is_answered_against_the_loaded_table() {
        let generator = Arc::new(ScriptedGenerator::answering(
            "result = len(df[df['country'] == 'Saudi Arabia'])",
        ));
        let p = pipeline(Arc::clone(&generator));
        p.services()
            .tables
            .load(
                "customers.csv",
                b"country,amount\nSaudi Arabia,1\nEgypt,2\nSaudi Arabia,3\n",
                TableFormat::Csv,
            )
            .unwrap();

        let events = run(&p, "how many Saudi customers?").await;
        assert_eq!(events[0], StreamEvent::Start);
        assert_eq!(events[1].name(), "stream_start");
        assert!(generator.last_prompt_had_table.load(Ordering::SeqCst));

        let (fields, execution, fallback) = end_of(&events);
        assert!(!fallback);
        assert_eq!(fields.initial_response, "Filtering by country.");
        let execution = execution.unwrap();
        assert!(execution.success, "{}", execution.output);
        assert_eq!(execution.results.as_ref().unwrap()["result"], json!(2));
        assert_eq!(events.last().unwrap().name(), "stream_complete");
    }

    #[tokio::test]
    async fn unhealthy_generator_gets_the_fallback() {
        let generator = Arc::new(ScriptedGenerator::answering("result = 1"));
        generator.healthy.store(false, Ordering::SeqCst);
        let p = pipeline(Arc::clone(&generator));

        let events = run(&p, "hello").await;
        let (fields, execution, fallback) = end_of(&events);
        assert!(fallback);
        assert!(execution.is_none());
        assert!(fields.initial_response.contains(FALLBACK_UNAVAILABLE));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);

        let health = p.services().breakers.get_health(components::GENERATION).unwrap();
        assert_eq!(health.stats.failed_requests, 1);
    }

    #[tokio::test]
    async fn stream_error_gets_the_fallback() {
        let generator = Arc::new(ScriptedGenerator {
            response: vec![
                Ok(FieldChunk::new(Field::InitialResponse, "Start")),
                Err(GenerationError::Malformed("not json".into())),
            ],
            ..ScriptedGenerator::answering("")
        });
        let p = pipeline(generator);

        let events = run(&p, "hello").await;
        let (fields, _, fallback) = end_of(&events);
        assert!(fallback);
        assert!(fields.initial_response.contains(FALLBACK_FAILED));
        // the partial "Start" never reaches the client
        assert!(!events.iter().any(|e| matches!(
            e,
            StreamEvent::Delta { content, .. } if content == "Start"
        )));
        assert_eq!(p.services().buffers.stats().rollbacks, 1);
        assert_eq!(p.services().breakers.error_summary(1).total_errors, 1);
    }

    #[tokio::test]
    async fn rejected_code_yields_one_error_event() {
        let generator = Arc::new(ScriptedGenerator::answering("import os\nos.system('ls')"));
        let p = pipeline(generator);

        let events = run(&p, "list files").await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::Start);
        match &events[1] {
            StreamEvent::Error { errors, .. } => {
                assert!(errors.iter().any(|e| e.contains("import os")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_sink_is_reported() {
        let p = pipeline(Arc::new(ScriptedGenerator::answering("")));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = ChannelSink::new(tx);
        assert_eq!(
            p.handle_message(&sink, "hi", &[]).await,
            Err(SinkError::Closed)
        );
    }
}
