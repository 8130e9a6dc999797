//! Circuit state and attempt records persisted in sled.

use crate::integration::test_utils::{engine, ScriptedProvider};
use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;
use tileboard::circuit::{
    provider_circuit_id, CircuitBreaker, CircuitConfig, CircuitKind, CircuitState,
    SledCircuitStore, SwitchPosition, MASTER_SWITCH, SLEEP_MODE,
};
use tileboard::generator::{
    GeneratorRegistration, GeneratorRegistry, PriorityTier, PromptGeneratorFactory,
    StaticFallbackFactory,
};
use tileboard::orchestrator::{CycleOutcome, CycleRequest, Orchestrator, SledAttemptLog};

fn sled_breaker(db: &sled::Db, failure_threshold: u32) -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(
        SledCircuitStore::shared(db).unwrap(),
        CircuitConfig {
            failure_threshold,
            persistent: true,
        },
    ))
}

#[test]
fn test_open_circuit_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state");
    let circuit_id = provider_circuit_id("alpha");

    {
        let db = sled::open(&path).unwrap();
        let breaker = sled_breaker(&db, 2);
        breaker.record_failure(&circuit_id, "status 503");
        breaker.record_failure(&circuit_id, "status 503");
        assert!(!breaker.is_available(&circuit_id));
        breaker
            .set_manual_circuit(SLEEP_MODE, SwitchPosition::Off)
            .unwrap();
        db.flush().unwrap();
    }

    let db = sled::open(&path).unwrap();
    let breaker = sled_breaker(&db, 2);
    let record = breaker.get_status(&circuit_id).unwrap();
    assert_eq!(record.state, CircuitState::Open);
    assert_eq!(record.failure_count, 2);
    assert_eq!(record.kind, CircuitKind::Provider);
    assert_eq!(record.last_error.as_deref(), Some("status 503"));
    assert!(!breaker.is_available(SLEEP_MODE));
    assert!(breaker.is_available(MASTER_SWITCH));
}

#[test]
fn test_reset_closes_persisted_circuit() {
    let temp_dir = TempDir::new().unwrap();
    let db = sled::open(temp_dir.path().join("state")).unwrap();
    let breaker = sled_breaker(&db, 1);
    let circuit_id = provider_circuit_id("beta");

    breaker.record_failure(&circuit_id, "status 500");
    assert!(!breaker.is_available(&circuit_id));

    let record = breaker.reset_circuit(&circuit_id).unwrap();
    assert_eq!(record.state, CircuitState::Closed);
    assert_eq!(record.failure_count, 0);
    assert!(record.last_error.is_none());
    assert!(breaker.is_available(&circuit_id));

    let listed = breaker.list_circuits().unwrap();
    let ids: Vec<&str> = listed.iter().map(|r| r.circuit_id.as_str()).collect();
    assert_eq!(ids, vec![MASTER_SWITCH, "PROVIDER_BETA", SLEEP_MODE]);
}

#[tokio::test]
async fn test_attempt_log_records_major_cycles() {
    let temp_dir = TempDir::new().unwrap();
    let db = sled::open(temp_dir.path().join("state")).unwrap();
    let breaker = sled_breaker(&db, 5);
    let log = SledAttemptLog::shared(&db).unwrap();

    let mut registry = GeneratorRegistry::new();
    registry
        .register(
            GeneratorRegistration::new("haiku", "Haiku", PriorityTier::Normal),
            Arc::new(PromptGeneratorFactory::new("sys", "user")),
        )
        .unwrap();
    registry
        .register(
            GeneratorRegistration::new("static_fallback", "Static", PriorityTier::Fallback),
            Arc::new(StaticFallbackFactory::new(vec!["STAY TUNED".to_string()])),
        )
        .unwrap();

    let (engine, _sleeper) = engine(&breaker);
    let orchestrator = Orchestrator::new(
        Arc::new(registry),
        engine,
        Arc::clone(&breaker),
        ScriptedProvider::ok("alpha", "Fresh news"),
        ScriptedProvider::ok("beta", "UNUSED"),
    )
    .with_persistence(log.clone());

    let outcome = orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()))
        .await
        .unwrap();
    assert!(matches!(outcome, CycleOutcome::Sent { .. }));
    orchestrator
        .generate_and_send(CycleRequest::minor(Utc::now()))
        .await
        .unwrap();

    assert_eq!(log.len(), 1);
    let recent = log.recent(10).unwrap();
    assert!(recent[0].success);
    assert_eq!(recent[0].text.as_deref(), Some("FRESH NEWS"));
    let failover = recent[0].failover.as_ref().unwrap();
    assert_eq!(failover.final_provider, "alpha");
    assert_eq!(failover.total_attempts, 1);
}
