// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use super::*;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(threshold: u32, open_secs: u64, trials: u32) -> BreakerConfig {
    BreakerConfig {
        failure_threshold: threshold,
        failure_rate_threshold: 0.5,
        open_duration: Duration::from_secs(open_secs),
        max_half_open_trials: trials,
        rate_window: Duration::from_secs(60),
        minimum_requests: 10,
    }
}

fn registry_with(name: &str, cfg: BreakerConfig) -> BreakerRegistry {
    let mut settings = BreakerSettings::default();
    settings.components.insert(name.to_string(), cfg);
    BreakerRegistry::new(settings)
}

async fn fail(registry: &BreakerRegistry, name: &str) -> BreakerError<&'static str> {
    registry
        .execute(name, || async { Err::<(), _>("boom") })
        .await
        .unwrap_err()
}

async fn succeed(registry: &BreakerRegistry, name: &str) -> Result<u32, BreakerError<&'static str>> {
    registry.execute(name, || async { Ok(7) }).await
}

// ---------------------------------------------------------------------------
// State progression
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failures_walk_states_toward_open() {
    let registry = registry_with("generation", config(3, 30, 1));
    let breaker = registry.breaker("generation");

    assert_eq!(breaker.state(), ComponentState::Healthy);
    fail(&registry, "generation").await;
    assert_eq!(breaker.state(), ComponentState::Failing);
    fail(&registry, "generation").await;
    assert_eq!(breaker.state(), ComponentState::Degraded);
    fail(&registry, "generation").await;
    assert_eq!(breaker.state(), ComponentState::CircuitOpen);

    let health = registry.get_health("generation").unwrap();
    assert_eq!(health.stats.total_requests, 3);
    assert_eq!(health.stats.failed_requests, 3);
    assert!(health.stats.circuit_open_time.is_some());
    assert!(health.stats.last_failure_time.is_some());
}

#[tokio::test]
async fn success_resets_streak_without_leaving_failure_state() {
    let registry = registry_with("validation", config(3, 30, 1));
    fail(&registry, "validation").await;
    fail(&registry, "validation").await;
    assert_eq!(succeed(&registry, "validation").await.unwrap(), 7);

    let health = registry.get_health("validation").unwrap();
    assert_eq!(health.state, ComponentState::Degraded);
    assert_eq!(health.stats.consecutive_failures, 0);

    // a fresh streak of one does not downgrade the recorded severity
    fail(&registry, "validation").await;
    assert_eq!(registry.breaker("validation").state(), ComponentState::Degraded);
}

#[tokio::test]
async fn open_circuit_rejects_without_invoking() {
    let registry = registry_with("generation", config(3, 30, 1));
    for _ in 0..3 {
        fail(&registry, "generation").await;
    }

    let invoked = AtomicBool::new(false);
    let err = registry
        .execute("generation", || async {
            invoked.store(true, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await
        .unwrap_err();

    assert!(err.is_circuit_open());
    assert!(!invoked.load(Ordering::SeqCst));
    // rejected calls are not counted as requests
    assert_eq!(registry.get_health("generation").unwrap().stats.total_requests, 3);
}

// ---------------------------------------------------------------------------
// Half-open behaviour
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn half_open_admits_exactly_the_trial_cap() {
    let registry = Arc::new(registry_with("generation", config(3, 30, 1)));
    for _ in 0..3 {
        fail(&registry, "generation").await;
    }

    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(succeed(&registry, "generation").await.unwrap_err().is_circuit_open());

    tokio::time::advance(Duration::from_secs(2)).await;

    let (started_tx, started_rx) = oneshot::channel::<()>();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let trial_registry = registry.clone();
    let trial = tokio::spawn(async move {
        trial_registry
            .execute("generation", move || async move {
                let _ = started_tx.send(());
                release_rx.await.map_err(|_| "released early")
            })
            .await
    });

    started_rx.await.unwrap();
    assert_eq!(registry.breaker("generation").state(), ComponentState::Recovering);

    // the single trial slot is taken by the pending call
    let invoked = AtomicBool::new(false);
    let rejected = registry
        .execute("generation", || async {
            invoked.store(true, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await
        .unwrap_err();
    assert!(rejected.is_circuit_open());
    assert!(!invoked.load(Ordering::SeqCst));

    release_tx.send(()).unwrap();
    trial.await.unwrap().unwrap();

    assert_eq!(registry.breaker("generation").state(), ComponentState::Healthy);
    assert!(succeed(&registry, "generation").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn quota_requires_every_trial_to_succeed() {
    let registry = registry_with("code_executor", config(3, 10, 2));
    for _ in 0..3 {
        fail(&registry, "code_executor").await;
    }
    tokio::time::advance(Duration::from_secs(11)).await;

    succeed(&registry, "code_executor").await.unwrap();
    assert_eq!(registry.breaker("code_executor").state(), ComponentState::Recovering);
    succeed(&registry, "code_executor").await.unwrap();
    assert_eq!(registry.breaker("code_executor").state(), ComponentState::Healthy);
}

#[tokio::test(start_paused = true)]
async fn failed_trial_does_not_free_its_slot() {
    let registry = registry_with("generation", config(5, 10, 2));
    for _ in 0..5 {
        fail(&registry, "generation").await;
    }
    tokio::time::advance(Duration::from_secs(11)).await;

    let calls = AtomicU32::new(0);
    for i in 0..20 {
        let _ = registry
            .execute("generation", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                if i % 2 == 0 {
                    Ok(())
                } else {
                    Err("boom")
                }
            })
            .await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // the spent quota without all successes starts a new open period
    let breaker = registry.breaker("generation");
    assert_eq!(breaker.state(), ComponentState::CircuitOpen);
    assert!(succeed(&registry, "generation").await.unwrap_err().is_circuit_open());

    tokio::time::advance(Duration::from_secs(11)).await;
    succeed(&registry, "generation").await.unwrap();
    succeed(&registry, "generation").await.unwrap();
    assert_eq!(breaker.state(), ComponentState::Healthy);
}

#[tokio::test(start_paused = true)]
async fn trial_cap_holds_after_a_failed_trial() {
    let registry = registry_with("code_executor", config(5, 10, 3));
    for _ in 0..5 {
        fail(&registry, "code_executor").await;
    }
    tokio::time::advance(Duration::from_secs(11)).await;

    succeed(&registry, "code_executor").await.unwrap();
    fail(&registry, "code_executor").await;
    assert_eq!(registry.breaker("code_executor").state(), ComponentState::Recovering);
    succeed(&registry, "code_executor").await.unwrap();

    let invoked = AtomicBool::new(false);
    let rejected = registry
        .execute("code_executor", || async {
            invoked.store(true, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await
        .unwrap_err();
    assert!(rejected.is_circuit_open());
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn recovering_failure_counts_toward_threshold() {
    let registry = registry_with("generation", config(2, 10, 3));
    fail(&registry, "generation").await;
    fail(&registry, "generation").await;
    assert_eq!(registry.breaker("generation").state(), ComponentState::CircuitOpen);

    tokio::time::advance(Duration::from_secs(11)).await;

    // a success first resets the streak, so one failure alone stays recovering
    succeed(&registry, "generation").await.unwrap();
    fail(&registry, "generation").await;
    assert_eq!(registry.breaker("generation").state(), ComponentState::Recovering);

    // the second consecutive failure reaches the threshold
    fail(&registry, "generation").await;
    assert_eq!(registry.breaker("generation").state(), ComponentState::CircuitOpen);
}

// ---------------------------------------------------------------------------
// Rolling failure rate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failure_rate_opens_after_minimum_samples() {
    let cfg = BreakerConfig {
        failure_threshold: 100,
        failure_rate_threshold: 0.5,
        minimum_requests: 4,
        ..config(100, 30, 1)
    };
    let registry = registry_with("serialization", cfg);

    fail(&registry, "serialization").await;
    succeed(&registry, "serialization").await.unwrap();
    fail(&registry, "serialization").await;
    // three samples: below the minimum, rate rule inactive
    assert_ne!(registry.breaker("serialization").state(), ComponentState::CircuitOpen);

    succeed(&registry, "serialization").await.unwrap();
    fail(&registry, "serialization").await;
    assert_eq!(registry.breaker("serialization").state(), ComponentState::CircuitOpen);
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn timeout_counts_as_failure() {
    let registry = registry_with("generation", config(3, 30, 1));
    let err = registry
        .execute_with_timeout("generation", Duration::from_millis(50), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, &str>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BreakerError::Timeout { timeout_ms: 50, .. }));
    let health = registry.get_health("generation").unwrap();
    assert_eq!(health.stats.failed_requests, 1);
    assert_eq!(health.state, ComponentState::Failing);

    let summary = registry.error_summary(1);
    assert_eq!(summary.errors_by_type["timeout"], 1);
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_component_gets_default_breaker() {
    let registry = BreakerRegistry::new(BreakerSettings::default());
    assert!(registry.get_health("table_cache").is_none());

    let calls = AtomicU32::new(0);
    registry
        .execute("table_cache", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let breaker = registry.breaker("table_cache");
    assert_eq!(*breaker.config(), BreakerConfig::default());
    assert_eq!(registry.get_health("table_cache").unwrap().stats.total_requests, 1);
}

#[tokio::test]
async fn components_are_isolated() {
    let registry = BreakerRegistry::new(BreakerSettings::default());
    for _ in 0..3 {
        fail(&registry, "generation").await;
    }
    assert_eq!(registry.breaker("generation").state(), ComponentState::CircuitOpen);
    assert_eq!(registry.breaker("serialization").state(), ComponentState::Healthy);
    assert!(registry
        .execute("serialization", || async { Ok::<_, &str>(1) })
        .await
        .is_ok());
}

#[tokio::test]
async fn system_health_reports_worst_state_and_recent_errors() {
    let registry = BreakerRegistry::new(BreakerSettings::default());
    let health = registry.get_system_health();
    assert_eq!(health.overall_health, ComponentState::Healthy);
    assert_eq!(health.recent_errors, 0);
    assert!(health.components.contains_key("code_executor"));

    fail(&registry, "validation").await;
    for _ in 0..3 {
        fail(&registry, "generation").await;
    }

    let health = registry.get_system_health();
    assert_eq!(health.overall_health, ComponentState::CircuitOpen);
    assert_eq!(health.components["validation"].state, ComponentState::Failing);
    assert_eq!(health.recent_errors, 4);
    assert_eq!(health.total_errors, 4);
}

#[tokio::test]
async fn manual_reset_closes_circuit_and_keeps_totals() {
    let registry = BreakerRegistry::new(BreakerSettings::default());
    for _ in 0..3 {
        fail(&registry, "generation").await;
    }
    assert!(registry.reset("generation"));
    assert!(!registry.reset("never_seen"));

    let health = registry.get_health("generation").unwrap();
    assert_eq!(health.state, ComponentState::Healthy);
    assert_eq!(health.stats.consecutive_failures, 0);
    assert_eq!(health.stats.circuit_open_time, None);
    assert_eq!(health.stats.failed_requests, 3);
    assert!(succeed(&registry, "generation").await.is_ok());
}

#[test]
fn states_serialize_snake_case() {
    assert_eq!(
        serde_json::to_value(ComponentState::CircuitOpen).unwrap(),
        serde_json::json!("circuit_open")
    );
    assert_eq!(ComponentState::Recovering.to_string(), "recovering");
}
