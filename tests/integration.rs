// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Integration tests
//
// End-to-end through the public API:
// HTTP routes → services, and user message → generation client (SSE) →
// buffer → sandbox → streaming events.
//
// Uses wiremock as the generation backend, tower::ServiceExt::oneshot for
// in-process HTTP, and real services everywhere else.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use sluice::config::{load_config, StringSource};
use sluice::generation::{GenerationRequest, GenerationSource, OpenAiGenerationClient};
use sluice::pipeline::{Pipeline, Services};
use sluice::response::Field;
use sluice::server::build_router;
use sluice::stream::{ChannelSink, StreamEvent};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Infrastructure
// ---------------------------------------------------------------------------

fn config_yaml(base_url: &str) -> String {
    format!(
        r#"sluice: v1
environment: test

generation:
  base_url: "{base_url}"
  model: "test-model"
  health_timeout_ms: 1000
  request_timeout_ms: 5000

recovery:
  base_delay_ms: 0

streaming:
  chunk_chars: 16
  delay_ms: 0
"#
    )
}

fn pipeline_for(base_url: &str) -> Arc<Pipeline> {
    let config = Arc::new(load_config(&StringSource::new(config_yaml(base_url))).unwrap());
    let generation: Arc<dyn GenerationSource> =
        Arc::new(OpenAiGenerationClient::new(config.runtime.generation.clone()));
    Arc::new(Pipeline::new(Services::from_config(config, generation)))
}

/// An OpenAI-style SSE body delivering `answer` in `pieces`-sized deltas.
fn sse_body(answer: &Value, piece: usize) -> String {
    let text = answer.to_string();
    let chars: Vec<char> = text.chars().collect();
    let mut body = String::from(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    );
    for chunk in chars.chunks(piece) {
        let content: String = chunk.iter().collect();
        let event = json!({"choices": [{"index": 0, "delta": {"content": content}}]});
        body.push_str(&format!("data: {event}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

async fn mount_generator(server: &MockServer, answer: &Value) {
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(answer, 7)),
        )
        .mount(server)
        .await;
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn run_message(pipeline: &Pipeline, message: &str) -> Vec<StreamEvent> {
    let (tx, mut rx) = mpsc::channel(4096);
    let sink = ChannelSink::new(tx);
    pipeline.handle_message(&sink, message, &[]).await.unwrap();
    drop(sink);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

const CUSTOMERS_CSV: &str = "customer_id,country,amount\n\
1,Saudi Arabia,10\n2,UAE,20\n3,Saudi Arabia,30\n4,Saudi Arabia,40\n5,Qatar,50\n\
6,Saudi Arabia,60\n7,Kuwait,70\n8,Saudi Arabia,80\n9,Saudi Arabia,90\n10,Oman,100\n\
11,Saudi Arabia,110\n12,Bahrain,120\n13,Saudi Arabia,130\n14,Saudi Arabia,140\n\
15,UAE,150\n16,Saudi Arabia,160\n17,Qatar,170\n18,Saudi Arabia,180\n19,Egypt,190\n\
20,Saudi Arabia,200\n";

// ---------------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_responds() {
    let app = build_router(pipeline_for("http://127.0.0.1:9"));
    let (status, _) = send(app, get("/heartbeat")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn breaker_routes_inspect_and_reset() {
    let app = build_router(pipeline_for("http://127.0.0.1:9"));

    let (status, body) = send(app.clone(), get("/breakers/generation")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["component"], "generation");
    assert_eq!(body["state"], "healthy");

    let (status, _) = send(app.clone(), get("/breakers/no_such_component")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let reset = Request::builder()
        .method("POST")
        .uri("/breakers/code_executor/reset")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, reset).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"component": "code_executor", "reset": true}));
}

#[tokio::test]
async fn table_upload_metadata_and_clear() {
    let app = build_router(pipeline_for("http://127.0.0.1:9"));

    let upload = Request::builder()
        .method("POST")
        .uri("/table?filename=customers.csv")
        .body(Body::from(CUSTOMERS_CSV))
        .unwrap();
    let (status, body) = send(app.clone(), upload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "customers.csv");
    assert_eq!(body["metadata"]["basic_info"]["shape"]["rows"], 20);

    let (status, body) = send(app.clone(), get("/table/metadata")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["basic_info"]["shape"]["columns"], 3);
    assert_eq!(
        body["basic_info"]["column_names"],
        json!(["customer_id", "country", "amount"])
    );

    let delete = Request::builder()
        .method("DELETE")
        .uri("/table")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app.clone(), delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], true);

    let (status, _) = send(app, get("/table/metadata")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn json_upload_is_detected_from_content_type() {
    let app = build_router(pipeline_for("http://127.0.0.1:9"));
    let upload = Request::builder()
        .method("POST")
        .uri("/table")
        .header("content-type", "application/json")
        .body(Body::from(r#"[{"a": 1, "b": "x"}, {"a": 2, "b": "y"}]"#))
        .unwrap();
    let (status, body) = send(app, upload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["basic_info"]["shape"]["rows"], 2);
}

#[tokio::test]
async fn unsupported_upload_format_is_rejected() {
    let app = build_router(pipeline_for("http://127.0.0.1:9"));
    let upload = Request::builder()
        .method("POST")
        .uri("/table?filename=report.xlsx")
        .body(Body::from("PK..."))
        .unwrap();
    let (status, body) = send(app, upload).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["error"].as_str().unwrap().contains("unsupported"));
}

#[tokio::test]
async fn health_reports_generator_availability() {
    let server = MockServer::start().await;
    mount_generator(&server, &json!({})).await;

    let app = build_router(pipeline_for(&server.uri()));
    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generation"]["available"], true);
    assert_eq!(body["status"], "healthy");
    assert!(body["policy_hash"].as_str().unwrap().starts_with("sha256:"));

    // nothing listens on the discard port
    let app = build_router(pipeline_for("http://127.0.0.1:9"));
    let (_, body) = send(app, get("/health")).await;
    assert_eq!(body["generation"]["available"], false);
    assert_eq!(body["system"]["components"]["generation"]["state"], "failing");
}

#[tokio::test]
async fn stats_cover_every_subsystem() {
    let app = build_router(pipeline_for("http://127.0.0.1:9"));
    let (status, body) = send(app, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    for key in ["buffer", "streaming", "serializer", "validator", "errors"] {
        assert!(body.get(key).is_some(), "missing {key}");
    }
    assert_eq!(body["errors"]["time_period_hours"], 24);
}

// ---------------------------------------------------------------------------
// Generation client
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_turns_sse_into_cumulative_field_chunks() {
    let server = MockServer::start().await;
    let answer = json!({
        "initial_response": "I will count the Saudi customers.",
        "generated_code": "result = len(df[df['country'] == 'Saudi Arabia'])",
        "result_commentary": "There are 12 customers in Saudi Arabia."
    });
    mount_generator(&server, &answer).await;

    let config = load_config(&StringSource::new(config_yaml(&server.uri()))).unwrap();
    let client = OpenAiGenerationClient::new(config.runtime.generation.clone());
    client.health().await.unwrap();

    let mut stream = client
        .generate(&GenerationRequest::new("how many Saudi customers?"))
        .await
        .unwrap();
    let mut last = std::collections::HashMap::new();
    let mut updates = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        if let Some(previous) = last.get(&chunk.field) {
            let previous: &String = previous;
            assert!(chunk.content.starts_with(previous.as_str()));
        }
        last.insert(chunk.field, chunk.content);
        updates += 1;
    }
    assert!(updates > 3, "expected partial updates, got {updates}");
    assert_eq!(last[&Field::InitialResponse], answer["initial_response"]);
    assert_eq!(last[&Field::GeneratedCode], answer["generated_code"]);
    assert_eq!(last[&Field::ResultCommentary], answer["result_commentary"]);
}

#[tokio::test]
async fn client_reports_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let config = load_config(&StringSource::new(config_yaml(&server.uri()))).unwrap();
    let client = OpenAiGenerationClient::new(config.runtime.generation.clone());
    match client.generate(&GenerationRequest::new("hi")).await {
        Err(sluice::generation::GenerationError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("expected an error"),
    }
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn message_flows_from_generator_to_client_events() {
    let server = MockServer::start().await;
    let answer = json!({
        "initial_response": "I will count the Saudi customers.",
        "generated_code": "saudi = df[df['country'] == 'Saudi Arabia']\nresult = len(saudi)\nprint(result)",
        "result_commentary": "There are 12 customers in Saudi Arabia."
    });
    mount_generator(&server, &answer).await;

    let pipeline = pipeline_for(&server.uri());
    pipeline
        .services()
        .tables
        .load(
            "customers.csv",
            CUSTOMERS_CSV.as_bytes(),
            sluice::frame::TableFormat::Csv,
        )
        .unwrap();

    let events = run_message(&pipeline, "how many customers are in Saudi Arabia?").await;
    assert_eq!(events.first(), Some(&StreamEvent::Start));
    assert_eq!(events.last().map(StreamEvent::name), Some("stream_complete"));

    let end = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::End {
                final_response,
                execution_results,
                fallback,
            } => Some((final_response, execution_results, *fallback)),
            _ => None,
        })
        .expect("end event");
    assert!(!end.2);
    assert_eq!(end.0.generated_code, answer["generated_code"]);
    let execution = end.1.as_ref().expect("code ran");
    assert!(execution.success, "{}", execution.output);
    let results = execution.results.as_ref().unwrap();
    assert_eq!(results["result"], json!(12));
    assert_eq!(results["saudi"]["shape"], json!([12, 3]));

    // the uploaded table itself is unchanged for the next message
    let table = pipeline.services().tables.current().unwrap();
    assert_eq!(table.table.nrows(), 20);
}

#[tokio::test]
async fn unreachable_generator_yields_fallback_end() {
    let pipeline = pipeline_for("http://127.0.0.1:9");
    let events = run_message(&pipeline, "hello").await;
    match events.last() {
        Some(StreamEvent::End { fallback, final_response, .. }) => {
            assert!(*fallback);
            assert!(final_response
                .initial_response
                .contains("Generation service not available"));
        }
        other => panic!("unexpected last event {other:?}"),
    }
}
