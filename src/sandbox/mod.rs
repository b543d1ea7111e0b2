// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Code sandbox executor
//
// Responsibilities:
// - Pre-flight generated code through the content validator
// - Run it in the capability-restricted interpreter on a dedicated
//   large-stack thread, bounded by a step budget and a wall-clock timeout
// - Bind a private copy of the caller's table as `df`, plus the usual
//   module aliases (`pd`, `np`, `px`, `go`, `make_subplots`, `json`)
// - Capture stdout/stderr and format uncaught exceptions as a traceback
// - Extract result variables and hand them to the value serializer
//
// The interpreter has no file, process or network primitives; the
// namespace is discarded after every run.

mod builtins;
mod extract;
mod format;
mod interp;
mod methods;
mod numpy;
mod pandas;
mod plotly;
mod stdlib;
mod value;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::config::SandboxConfig;
use crate::frame::Table;
use crate::lang::parse_module;
use crate::serialize::ValueSerializer;
use crate::validate::ContentValidator;

use extract::{extract_results, Extracted, INPUT_TABLE};
use interp::{Interpreter, Limits};
use value::{Exception, Value};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Outcome of one run. `results` is `None` when the run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub results: Option<Map<String, Json>>,
    /// The code that actually ran, after validator repairs.
    pub code: String,
}

impl ExecutionResult {
    pub fn failed(code: &str, output: String) -> Self {
        Self {
            success: false,
            output,
            results: None,
            code: code.to_string(),
        }
    }
}

/// Failures of the executor itself, as opposed to exceptions raised by
/// the code it runs. These count against the `code_executor` breaker.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("code execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("code execution exceeded its budget of {max_steps} steps")]
    StepBudget { max_steps: u64 },

    #[error("code execution task failed: {0}")]
    Join(String),
}

/// Stack of the interpreter thread. Deeply nested values are dropped and
/// parsed recursively, well past the default thread stack.
const SANDBOX_STACK_BYTES: usize = 256 * 1024 * 1024;

/// What the interpreter thread hands back.
enum RunOutcome {
    Finished {
        success: bool,
        output: String,
        results: Vec<Extracted>,
    },
    StepBudget,
    Cancelled,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct CodeExecutor {
    config: SandboxConfig,
    validator: Arc<ContentValidator>,
    serializer: Arc<ValueSerializer>,
}

impl CodeExecutor {
    pub fn new(
        config: SandboxConfig,
        validator: Arc<ContentValidator>,
        serializer: Arc<ValueSerializer>,
    ) -> Self {
        Self {
            config,
            validator,
            serializer,
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Validate and run `code` against an optional table.
    pub async fn execute(&self, code: &str, table: Option<&Table>) -> Result<ExecutionResult, SandboxError> {
        let started = Instant::now();

        let validation = self.validator.validate_code(code);
        if !validation.is_valid {
            tracing::warn!(errors = validation.errors.len(), "code rejected before execution");
            return Ok(ExecutionResult::failed(
                code,
                format!("Code validation failed: {}", validation.errors.join("; ")),
            ));
        }
        let runnable = validation.cleaned_content.unwrap_or_else(|| code.to_string());

        let cancel = Arc::new(AtomicBool::new(false));
        let limits = Limits {
            max_steps: self.config.max_steps,
            allowed_modules: self.config.allowed_modules.clone(),
        };
        let input = table.cloned();
        let job = {
            let code = runnable.clone();
            let cancel = cancel.clone();
            move || run(&code, input, limits, cancel)
        };

        let (tx, rx) = tokio::sync::oneshot::channel();
        std::thread::Builder::new()
            .name("sluice-sandbox".into())
            .stack_size(SANDBOX_STACK_BYTES)
            .spawn(move || {
                let _ = tx.send(job());
            })
            .map_err(|e| SandboxError::Join(e.to_string()))?;
        let outcome = match tokio::time::timeout(self.config.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                return Err(SandboxError::Join("interpreter thread exited without a result".into()))
            }
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                let timeout_ms = self.config.timeout.as_millis() as u64;
                tracing::warn!(timeout_ms, "code execution timed out");
                return Err(SandboxError::Timeout { timeout_ms });
            }
        };

        let (success, output, extracted) = match outcome {
            RunOutcome::Finished {
                success,
                output,
                results,
            } => (success, output, results),
            RunOutcome::StepBudget => {
                tracing::warn!(max_steps = self.config.max_steps, "code execution step budget exceeded");
                return Err(SandboxError::StepBudget {
                    max_steps: self.config.max_steps,
                });
            }
            RunOutcome::Cancelled => {
                return Err(SandboxError::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                })
            }
        };

        let results = success.then(|| self.serialize(extracted));
        tracing::info!(
            success,
            results = results.as_ref().map_or(0, Map::len),
            latency_ms = started.elapsed().as_millis() as u64,
            "code executed"
        );
        Ok(ExecutionResult {
            success,
            output,
            results,
            code: runnable,
        })
    }

    fn serialize(&self, extracted: Vec<Extracted>) -> Map<String, Json> {
        let mut html = Vec::new();
        let mut pairs = Vec::with_capacity(extracted.len());
        for entry in extracted {
            if let Some(page) = entry.html {
                html.push((entry.name.clone(), page));
            }
            pairs.push((entry.name, entry.value));
        }
        let serialized = self.serializer.serialize_results(&pairs);
        let Json::Object(mut map) = serialized.value else {
            return Map::new();
        };
        for (name, page) in html {
            if let Some(Json::Object(figure)) = map.get_mut(&name) {
                figure.insert("html".to_string(), Json::String(page));
            }
        }
        map
    }
}

// ---------------------------------------------------------------------------
// Blocking run
// ---------------------------------------------------------------------------

fn bind_prelude(interp: &mut Interpreter) {
    for (alias, module) in [
        ("pd", "pandas"),
        ("np", "numpy"),
        ("px", "plotly.express"),
        ("go", "plotly.graph_objects"),
        ("json", "json"),
    ] {
        interp.set_global(alias, Value::Module(module.into()));
    }
    interp.set_global("make_subplots", Value::builtin("plotly.subplots.make_subplots"));
}

fn traceback(e: &Exception) -> String {
    let detail = if e.message.is_empty() {
        e.kind.clone()
    } else {
        format!("{}: {}", e.kind, e.message)
    };
    format!(
        "Execution Error: {}\nTraceback (most recent call last):\n  File \"<analysis>\", line {}, in <module>\n{detail}\n",
        e.message, e.line
    )
}

fn run(code: &str, table: Option<Table>, limits: Limits, cancel: Arc<AtomicBool>) -> RunOutcome {
    let body = match parse_module(code) {
        Ok(body) => body,
        Err(e) => {
            let exc = Exception::new("SyntaxError", e.message.clone()).with_line(e.line);
            return RunOutcome::Finished {
                success: false,
                output: traceback(&exc),
                results: Vec::new(),
            };
        }
    };

    let max_steps = limits.max_steps;
    let mut interp = Interpreter::new(limits, cancel.clone());
    bind_prelude(&mut interp);
    let input = table.map(Value::frame);
    if let Some(df) = &input {
        interp.set_global(INPUT_TABLE, df.clone());
    }

    match interp.run_module(&body) {
        Ok(()) => {
            let mut output = interp.stdout().to_string();
            if !interp.stderr().is_empty() {
                output.push_str("\nErrors/Warnings:\n");
                output.push_str(interp.stderr());
            }
            RunOutcome::Finished {
                success: true,
                output,
                results: extract_results(&interp, input.as_ref()),
            }
        }
        Err(e) if e.fatal && interp.steps() > max_steps => RunOutcome::StepBudget,
        Err(e) if e.fatal && cancel.load(Ordering::Relaxed) => RunOutcome::Cancelled,
        Err(e) => RunOutcome::Finished {
            success: false,
            output: traceback(&e),
            results: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests;
