// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

//! Latency benchmarks for the per-message hot path.
//!
//! Measures:
//! - Code validation (fence repair + denylist scan)
//! - Result serialization of a table preview
//! - Sandbox execution of a typical filter-and-count answer
//! - End-to-end buffer processing: collect, validate, execute
//!
//! Run: cargo bench --bench pipeline_latency

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use sluice::breaker::BreakerRegistry;
use sluice::buffer::ResponseBufferManager;
use sluice::config::Config;
use sluice::frame::{read_csv, Table};
use sluice::generation::GenerationError;
use sluice::response::{Field, FieldChunk, ResponseFields};
use sluice::sandbox::CodeExecutor;
use sluice::serialize::{Serializable, ValueSerializer};
use sluice::validate::ContentValidator;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const COUNTRIES: &[&str] = &["Saudi Arabia", "UAE", "Qatar", "Egypt", "Oman"];

const ANSWER_CODE: &str = "saudi = df[df['country'] == 'Saudi Arabia']\n\
result = {'count': len(saudi), 'total': saudi['amount'].sum()}\n\
print(result['count'])";

fn table(rows: usize) -> Table {
    let mut csv = String::from("customer_id,country,amount\n");
    for i in 0..rows {
        csv.push_str(&format!("{i},{},{}\n", COUNTRIES[i % COUNTRIES.len()], i * 3));
    }
    read_csv(csv.as_bytes()).expect("fixture table")
}

fn services() -> (Arc<ContentValidator>, Arc<ValueSerializer>, Arc<CodeExecutor>) {
    let config = Config::default();
    let validator = Arc::new(ContentValidator::new(Arc::new(config.policy.security.clone())));
    let serializer = Arc::new(ValueSerializer::new(config.policy.sandbox.head_rows));
    let executor = Arc::new(CodeExecutor::new(
        config.policy.sandbox.clone(),
        Arc::clone(&validator),
        Arc::clone(&serializer),
    ));
    (validator, serializer, executor)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_validation(c: &mut Criterion) {
    let (validator, _, _) = services();
    let fenced = format!("```python\n{ANSWER_CODE}\n```");
    let response = ResponseFields {
        initial_response: "Counting customers in Saudi Arabia.".into(),
        generated_code: fenced.clone(),
        result_commentary: "The count is shown above.".into(),
    };

    let mut group = c.benchmark_group("validation");
    group.bench_function("clean_code", |b| {
        b.iter(|| validator.validate_code(black_box(ANSWER_CODE)))
    });
    group.bench_function("fenced_code", |b| {
        b.iter(|| validator.validate_code(black_box(&fenced)))
    });
    group.bench_function("structured_response", |b| {
        b.iter(|| validator.validate_structured_response(black_box(&response)))
    });
    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let (_, serializer, _) = services();
    let mut group = c.benchmark_group("serialization");
    for rows in [100, 10_000] {
        let value = Serializable::Table(table(rows));
        group.bench_with_input(BenchmarkId::new("table", rows), &value, |b, value| {
            b.iter(|| serializer.serialize(black_box(value)))
        });
    }
    group.finish();
}

fn bench_execution(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let (_, _, executor) = services();
    let mut group = c.benchmark_group("sandbox");
    for rows in [100, 10_000] {
        let data = table(rows);
        group.bench_with_input(BenchmarkId::new("filter_count", rows), &data, |b, data| {
            b.to_async(&rt)
                .iter(|| executor.execute(black_box(ANSWER_CODE), Some(data)))
        });
    }
    group.finish();
}

fn bench_buffer(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let config = Config::default();
    let (validator, _, executor) = services();
    let manager = ResponseBufferManager::new(
        validator,
        executor,
        Arc::new(BreakerRegistry::new(config.runtime.breakers.clone())),
        config.runtime.recovery,
    );
    let data = Arc::new(table(1_000));
    let chunks = vec![
        FieldChunk::new(Field::InitialResponse, "Counting customers in Saudi Arabia."),
        FieldChunk::new(Field::GeneratedCode, ANSWER_CODE),
        FieldChunk::new(Field::ResultCommentary, "The count is shown above."),
    ];

    c.bench_function("buffer_process_1k_rows", |b| {
        b.to_async(&rt).iter(|| {
            let stream = Box::pin(tokio_stream::iter(
                chunks.clone().into_iter().map(Ok::<_, GenerationError>),
            ));
            manager.process("bench", stream, Some(Arc::clone(&data)))
        })
    });
}

criterion_group!(
    benches,
    bench_validation,
    bench_serialization,
    bench_execution,
    bench_buffer
);
criterion_main!(benches);
