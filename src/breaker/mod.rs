// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Circuit breaker registry
//
// Responsibilities:
// - Wrap any fallible async call for a named component
// - Track per-component request statistics and a rolling failure window
// - Walk the HEALTHY -> FAILING -> DEGRADED -> CIRCUIT_OPEN -> RECOVERING
//   state machine, lazily re-evaluating the open duration on the next call
// - Report per-component and aggregate system health
//
// Each breaker owns its own lock; no call ever holds two breaker locks.

mod history;

pub use history::{ErrorHistory, ErrorRecord, ErrorSummary, MAX_HISTORY};

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::{BreakerConfig, BreakerSettings};

/// Component names used by the service.
pub mod components {
    pub const GENERATION: &str = "generation";
    pub const CODE_EXECUTOR: &str = "code_executor";
    pub const VALIDATION: &str = "validation";
    pub const TABLE_STORE: &str = "table_store";
}

/// Window used for the recent-error count in system health.
const RECENT_ERROR_WINDOW_MINUTES: i64 = 5;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Health state of one component, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Healthy,
    Recovering,
    Failing,
    Degraded,
    CircuitOpen,
}

impl ComponentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentState::Healthy => "healthy",
            ComponentState::Recovering => "recovering",
            ComponentState::Failing => "failing",
            ComponentState::Degraded => "degraded",
            ComponentState::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request statistics for one component.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub consecutive_failures: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub circuit_open_time: Option<DateTime<Utc>>,
}

impl ErrorStats {
    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.failed_requests as f64 / self.total_requests as f64
    }

    pub fn success_rate(&self) -> f64 {
        1.0 - self.failure_rate()
    }
}

/// Errors returned by a breaker-wrapped call.
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The call was rejected without being invoked.
    #[error("circuit breaker open for {component}")]
    CircuitOpen { component: String },

    #[error("{component} timed out after {timeout_ms}ms")]
    Timeout { component: String, timeout_ms: u64 },

    #[error("{0}")]
    Failed(E),
}

impl<E> BreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, BreakerError::CircuitOpen { .. })
    }

    fn error_type(&self) -> &'static str {
        match self {
            BreakerError::CircuitOpen { .. } => "circuit_open",
            BreakerError::Timeout { .. } => "timeout",
            BreakerError::Failed(_) => "call_failed",
        }
    }
}

/// Snapshot of one breaker for the health surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub component: String,
    pub state: ComponentState,
    pub stats: ErrorStats,
    pub failure_rate: f64,
    pub success_rate: f64,
}

/// Aggregate health across every registered breaker.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    /// The most severe component state.
    pub overall_health: ComponentState,
    pub components: BTreeMap<String, ComponentHealth>,
    pub recent_errors: usize,
    pub total_errors: usize,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ComponentCircuitBreaker
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BreakerInner {
    state: ComponentState,
    stats: ErrorStats,
    opened_at: Option<Instant>,
    /// Half-open calls let through since entering RECOVERING.
    trials_admitted: u32,
    trials_in_flight: u32,
    trial_successes: u32,
    /// (completion time, succeeded) for the rolling failure rate.
    window: VecDeque<(Instant, bool)>,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: ComponentState::Healthy,
            stats: ErrorStats::default(),
            opened_at: None,
            trials_admitted: 0,
            trials_in_flight: 0,
            trial_successes: 0,
            window: VecDeque::new(),
        }
    }
}

/// Ticket handed out when a call is admitted.
#[derive(Debug, Clone, Copy)]
struct Admission {
    trial: bool,
}

/// Circuit breaker for one named component.
#[derive(Debug)]
pub struct ComponentCircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl ComponentCircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ComponentState {
        self.lock().state
    }

    pub fn health(&self) -> ComponentHealth {
        let inner = self.lock();
        ComponentHealth {
            component: self.name.clone(),
            state: inner.state,
            stats: inner.stats.clone(),
            failure_rate: inner.stats.failure_rate(),
            success_rate: inner.stats.success_rate(),
        }
    }

    /// Decide whether a call may proceed, moving an expired open circuit
    /// into RECOVERING.
    fn admit(&self) -> Option<Admission> {
        let mut inner = self.lock();

        if inner.state == ComponentState::CircuitOpen {
            let elapsed = inner
                .opened_at
                .map(|t| t.elapsed() >= self.config.open_duration)
                .unwrap_or(true);
            if !elapsed {
                return None;
            }
            inner.state = ComponentState::Recovering;
            inner.trials_admitted = 0;
            inner.trials_in_flight = 0;
            inner.trial_successes = 0;
            tracing::info!(component = %self.name, state = "recovering", "circuit half-open");
        }

        let trial = inner.state == ComponentState::Recovering;
        if trial {
            if inner.trials_admitted >= self.config.max_half_open_trials {
                return None;
            }
            inner.trials_admitted += 1;
            inner.trials_in_flight += 1;
        }

        inner.stats.total_requests += 1;
        Some(Admission { trial })
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();
        let now = Instant::now();

        inner.stats.successful_requests += 1;
        inner.stats.consecutive_failures = 0;
        inner.window.push_back((now, true));
        self.prune_window(&mut inner, now);

        if admission.trial {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
            if inner.state == ComponentState::Recovering {
                inner.trial_successes += 1;
                if inner.trial_successes >= self.config.max_half_open_trials {
                    inner.state = ComponentState::Healthy;
                    inner.opened_at = None;
                    inner.stats.circuit_open_time = None;
                    inner.trials_admitted = 0;
                    inner.trial_successes = 0;
                    tracing::info!(component = %self.name, state = "healthy", "circuit closed");
                } else {
                    self.reopen_if_quota_missed(&mut inner, now);
                }
            }
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        let now = Instant::now();

        inner.stats.failed_requests += 1;
        inner.stats.consecutive_failures += 1;
        inner.stats.last_failure_time = Some(Utc::now());
        inner.window.push_back((now, false));
        self.prune_window(&mut inner, now);

        if admission.trial {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }

        if inner.state == ComponentState::CircuitOpen {
            return;
        }

        let should_open = inner.stats.consecutive_failures >= self.config.failure_threshold
            || self.window_rate_exceeded(&inner);

        if should_open {
            self.open(&mut inner, now);
            return;
        }

        if inner.state == ComponentState::Recovering {
            self.reopen_if_quota_missed(&mut inner, now);
            return;
        }

        let next = if inner.stats.consecutive_failures >= 2 {
            ComponentState::Degraded
        } else {
            ComponentState::Failing
        };
        inner.state = inner.state.max(next);
    }

    fn open(&self, inner: &mut BreakerInner, now: Instant) {
        inner.state = ComponentState::CircuitOpen;
        inner.opened_at = Some(now);
        inner.stats.circuit_open_time = Some(Utc::now());
        inner.trials_admitted = 0;
        inner.trials_in_flight = 0;
        inner.trial_successes = 0;
        tracing::warn!(
            component = %self.name,
            state = "circuit_open",
            consecutive_failures = inner.stats.consecutive_failures,
            "circuit opened"
        );
    }

    /// Every trial slot was used and has settled without the success
    /// quota: start a new open period.
    fn reopen_if_quota_missed(&self, inner: &mut BreakerInner, now: Instant) {
        if inner.trials_admitted >= self.config.max_half_open_trials
            && inner.trials_in_flight == 0
            && inner.trial_successes < self.config.max_half_open_trials
        {
            self.open(inner, now);
        }
    }

    fn prune_window(&self, inner: &mut BreakerInner, now: Instant) {
        while let Some(&(at, _)) = inner.window.front() {
            if now.duration_since(at) > self.config.rate_window {
                inner.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn window_rate_exceeded(&self, inner: &BreakerInner) -> bool {
        let samples = inner.window.len();
        if samples == 0 || (samples as u32) < self.config.minimum_requests {
            return false;
        }
        let failures = inner.window.iter().filter(|(_, ok)| !ok).count();
        failures as f64 / samples as f64 >= self.config.failure_rate_threshold
    }

    /// Back to HEALTHY with the failure streak and open timestamp cleared.
    /// Lifetime totals are kept.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = ComponentState::Healthy;
        inner.stats.consecutive_failures = 0;
        inner.stats.circuit_open_time = None;
        inner.opened_at = None;
        inner.trials_admitted = 0;
        inner.trials_in_flight = 0;
        inner.trial_successes = 0;
        inner.window.clear();
        tracing::info!(component = %self.name, state = "healthy", "circuit manually reset");
    }

    /// Run `operation` under this breaker.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit().ok_or_else(|| BreakerError::CircuitOpen {
            component: self.name.clone(),
        })?;

        match operation().await {
            Ok(value) => {
                self.on_success(admission);
                Ok(value)
            }
            Err(e) => {
                self.on_failure(admission);
                Err(BreakerError::Failed(e))
            }
        }
    }

    /// Run `operation` under this breaker with a deadline. Expiry counts
    /// as a failure.
    pub async fn call_with_timeout<T, E, F, Fut>(
        &self,
        timeout: Duration,
        operation: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit().ok_or_else(|| BreakerError::CircuitOpen {
            component: self.name.clone(),
        })?;

        match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(value)) => {
                self.on_success(admission);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.on_failure(admission);
                Err(BreakerError::Failed(e))
            }
            Err(_) => {
                self.on_failure(admission);
                Err(BreakerError::Timeout {
                    component: self.name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// BreakerRegistry
// ---------------------------------------------------------------------------

/// Shared registry of per-component breakers plus the error history.
///
/// Constructed once at startup and injected; components not configured up
/// front get a breaker with default thresholds on first use.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<ComponentCircuitBreaker>>,
    settings: BreakerSettings,
    history: ErrorHistory,
}

impl BreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        let breakers = DashMap::new();
        for (name, config) in &settings.components {
            breakers.insert(
                name.clone(),
                Arc::new(ComponentCircuitBreaker::new(name.clone(), *config)),
            );
        }
        Self {
            breakers,
            settings,
            history: ErrorHistory::new(),
        }
    }

    /// The breaker for `component`, created on first use.
    pub fn breaker(&self, component: &str) -> Arc<ComponentCircuitBreaker> {
        if let Some(existing) = self.breakers.get(component) {
            return existing.clone();
        }
        self.breakers
            .entry(component.to_string())
            .or_insert_with(|| {
                Arc::new(ComponentCircuitBreaker::new(
                    component,
                    self.settings.for_component(component),
                ))
            })
            .clone()
    }

    pub async fn execute<T, E, F, Fut>(&self, component: &str, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let breaker = self.breaker(component);
        let result = breaker.call(operation).await;
        self.note_outcome(component, &result);
        result
    }

    pub async fn execute_with_timeout<T, E, F, Fut>(
        &self,
        component: &str,
        timeout: Duration,
        operation: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let breaker = self.breaker(component);
        let result = breaker.call_with_timeout(timeout, operation).await;
        self.note_outcome(component, &result);
        result
    }

    fn note_outcome<T, E: fmt::Display>(&self, component: &str, result: &Result<T, BreakerError<E>>) {
        match result {
            Ok(_) | Err(BreakerError::CircuitOpen { .. }) => {}
            Err(e) => self.record_error(component, e.error_type(), &e.to_string(), None),
        }
    }

    /// Append an error to the bounded history.
    pub fn record_error(
        &self,
        component: &str,
        error_type: &str,
        message: &str,
        context: Option<serde_json::Value>,
    ) {
        tracing::error!(component, error_type, error = %message, "component error");
        self.history.push(ErrorRecord {
            timestamp: Utc::now(),
            component: component.to_string(),
            error_type: error_type.to_string(),
            message: message.to_string(),
            context,
        });
    }

    /// Health of one component, or `None` if it has never been registered.
    pub fn get_health(&self, component: &str) -> Option<ComponentHealth> {
        self.breakers.get(component).map(|b| b.health())
    }

    pub fn get_system_health(&self) -> SystemHealth {
        let mut components = BTreeMap::new();
        let mut overall = ComponentState::Healthy;
        for entry in self.breakers.iter() {
            let health = entry.value().health();
            overall = overall.max(health.state);
            components.insert(entry.key().clone(), health);
        }

        let now = Utc::now();
        SystemHealth {
            overall_health: overall,
            components,
            recent_errors: self
                .history
                .count_since(now, chrono::Duration::minutes(RECENT_ERROR_WINDOW_MINUTES)),
            total_errors: self.history.len(),
            timestamp: now,
        }
    }

    /// Manually close a breaker. Returns false for unknown components.
    pub fn reset(&self, component: &str) -> bool {
        match self.breakers.get(component) {
            Some(b) => {
                b.reset();
                true
            }
            None => false,
        }
    }

    pub fn error_summary(&self, hours: u32) -> ErrorSummary {
        self.history.summary(Utc::now(), hours)
    }
}

#[cfg(test)]
mod tests;
