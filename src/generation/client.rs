// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// OpenAI-compatible streaming chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::config::GenerationConfig;
use crate::response::FieldChunk;

use super::partial::{parse_sse_data, FieldTracker, SseData};
use super::prompt::build_system_prompt;
use super::{ChunkStream, GenerationError, GenerationRequest, GenerationSource};

const CHANNEL_CAPACITY: usize = 64;

fn transport_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout(e.to_string())
    } else {
        GenerationError::Transport(e.to_string())
    }
}

pub struct OpenAiGenerationClient {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl OpenAiGenerationClient {
    pub fn new(config: GenerationConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: GenerationConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let system = build_system_prompt(request.metadata.as_ref(), &request.rules);
        json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": request.user_message},
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "stream": true,
        })
    }
}

/// Forward chunks until the receiver goes away. Returns false once it has.
async fn forward(tx: &mpsc::Sender<Result<FieldChunk, GenerationError>>, chunks: Vec<FieldChunk>) -> bool {
    for chunk in chunks {
        if tx.send(Ok(chunk)).await.is_err() {
            return false;
        }
    }
    true
}

#[async_trait]
impl GenerationSource for OpenAiGenerationClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<ChunkStream, GenerationError> {
        let mut req = self
            .client
            .post(self.url("/v1/chat/completions"))
            .json(&self.request_body(request))
            .timeout(Duration::from_millis(self.config.request_timeout_ms));
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(model = %self.config.model, "generation stream opened");

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut body = Box::pin(resp.bytes_stream());

        tokio::spawn(async move {
            let mut tracker = FieldTracker::new();
            let mut pending: Vec<u8> = Vec::new();
            let mut done = false;

            while !done {
                let bytes = match body.next().await {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        let _ = tx.send(Err(transport_error(e))).await;
                        return;
                    }
                    None => break,
                };
                pending.extend_from_slice(&bytes);

                // Lines are decoded whole so multi-byte characters split
                // across reads survive.
                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    match parse_sse_data(&String::from_utf8_lossy(&line)) {
                        SseData::Content(delta) => {
                            if !forward(&tx, tracker.push(&delta)).await {
                                return;
                            }
                        }
                        SseData::Done => {
                            done = true;
                            break;
                        }
                        SseData::Ignored => {}
                    }
                }
            }
            if !done && !pending.is_empty() {
                if let SseData::Content(delta) = parse_sse_data(&String::from_utf8_lossy(&pending)) {
                    if !forward(&tx, tracker.push(&delta)).await {
                        return;
                    }
                }
            }

            tracing::debug!(chars = tracker.text().len(), "generation stream finished");
            match tracker.finish() {
                Ok(chunks) => {
                    forward(&tx, chunks).await;
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn health(&self) -> Result<(), GenerationError> {
        let mut req = self
            .client
            .get(self.url("/v1/models"))
            .timeout(Duration::from_millis(self.config.health_timeout_ms));
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(GenerationError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }
}
