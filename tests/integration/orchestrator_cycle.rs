//! End-to-end cycles through the orchestrator with scripted collaborators.

use crate::integration::test_utils::{
    circuits, engine, open_provider_circuit, rate_limited, RecordingDelivery, RecordingSink,
    ScriptedProvider,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tileboard::circuit::{
    provider_circuit_id, CircuitBreaker, SwitchPosition, MASTER_SWITCH, SLEEP_MODE,
};
use tileboard::content::OutputMode;
use tileboard::error::{PipelineError, ProviderError};
use tileboard::generator::{
    GeneratorFactory, GeneratorRegistration, GeneratorRegistry, GeneratorSelector,
    NotificationEntry, NotificationTable, PriorityTier, PromptGeneratorFactory,
    StaticFallbackFactory, TemplateFormatter, TriggerEvent, TriggerPattern,
};
use tileboard::orchestrator::{
    ClockFrame, CycleOutcome, CycleRequest, FrameConfig, Orchestrator, SkipReason,
};

struct Harness {
    orchestrator: Orchestrator,
    alpha: Arc<ScriptedProvider>,
    beta: Arc<ScriptedProvider>,
    circuits: Arc<CircuitBreaker>,
    delivery: Arc<RecordingDelivery>,
    sink: Arc<RecordingSink>,
}

fn registry_with(
    prompt: Option<PromptGeneratorFactory>,
    fallback_messages: Vec<&str>,
) -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    if let Some(prompt) = prompt {
        registry
            .register(
                GeneratorRegistration::new("haiku", "Haiku", PriorityTier::Normal),
                Arc::new(prompt) as Arc<dyn GeneratorFactory>,
            )
            .unwrap();
    }

    let mut table = NotificationTable::new();
    table.push(NotificationEntry::new(
        "doorbell",
        "Doorbell",
        TriggerPattern::new("^doorbell$").unwrap(),
        Arc::new(TemplateFormatter::new("{payload.who} AT THE DOOR")),
    ));
    table.register_into(&mut registry).unwrap();

    registry
        .register(
            GeneratorRegistration::new("static_fallback", "Static", PriorityTier::Fallback),
            Arc::new(StaticFallbackFactory::new(
                fallback_messages.into_iter().map(str::to_string).collect(),
            )),
        )
        .unwrap();
    registry
}

fn harness_with(
    registry: GeneratorRegistry,
    alpha: Arc<ScriptedProvider>,
    beta: Arc<ScriptedProvider>,
) -> Harness {
    let circuits = circuits(5);
    let (engine, _sleeper) = engine(&circuits);
    let delivery = Arc::new(RecordingDelivery::default());
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Orchestrator::new(
        Arc::new(registry),
        engine,
        Arc::clone(&circuits),
        alpha.clone(),
        beta.clone(),
    )
    .with_selector(GeneratorSelector::with_seed(1))
    .with_frame(Arc::new(ClockFrame::new(FrameConfig {
        time_format: "%H:%M".to_string(),
        center: false,
    })))
    .with_delivery(delivery.clone())
    .with_persistence(sink.clone());

    Harness {
        orchestrator,
        alpha,
        beta,
        circuits,
        delivery,
        sink,
    }
}

fn harness(alpha: Arc<ScriptedProvider>, beta: Arc<ScriptedProvider>) -> Harness {
    let prompt = PromptGeneratorFactory::new("Write for a split-flap board.", "Greet {weekday}");
    harness_with(registry_with(Some(prompt), vec!["HAVE A NICE DAY"]), alpha, beta)
}

#[tokio::test]
async fn test_major_cycle_sends_and_caches() {
    let h = harness(
        ScriptedProvider::ok("alpha", "Good morning\nfriends"),
        ScriptedProvider::ok("beta", "UNUSED"),
    );

    let outcome = h
        .orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Sent {
            generator_id: "haiku".to_string(),
            used_fallback: false
        }
    );
    let sent = h.delivery.sent();
    assert_eq!(sent.len(), 1);
    let rows = sent[0].render_rows();
    assert!(rows[0].starts_with("GOOD MORNING"));
    assert!(rows[1].starts_with("FRIENDS"));

    let records = h.sink.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].generator_id.as_deref(), Some("haiku"));
    assert_eq!(records[0].provider.as_deref(), Some("alpha"));
    assert_eq!(records[0].text.as_deref(), Some("GOOD MORNING\nFRIENDS"));

    let cached = h.orchestrator.get_cached_content().unwrap();
    assert_eq!(cached.metadata.generator_id.as_deref(), Some("haiku"));
    assert!(cached.metadata.validation.unwrap().valid);
    assert_eq!(h.beta.calls(), 0);
}

#[tokio::test]
async fn test_exhausted_providers_fall_back_to_static_message() {
    let h = harness(
        ScriptedProvider::failing("alpha", rate_limited()),
        ScriptedProvider::failing("beta", ProviderError::Overloaded("busy".to_string())),
    );

    let outcome = h
        .orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Sent {
            generator_id: "static_fallback".to_string(),
            used_fallback: true
        }
    );
    assert_eq!(h.alpha.calls(), 2);
    assert_eq!(h.beta.calls(), 2);
    assert!(h.delivery.sent()[0].render_rows()[0].starts_with("HAVE A NICE DAY"));

    let records = h.sink.records();
    assert_eq!(records.len(), 2);
    assert!(!records[0].success);
    assert_eq!(records[0].generator_id.as_deref(), Some("haiku"));
    assert!(records[0].error.as_deref().unwrap().contains("attempts failed"));
    assert_eq!(records[0].provider.as_deref(), Some("beta"));

    let history = records[0].failover.as_ref().unwrap();
    assert_eq!(history.total_attempts, 4);
    assert_eq!(history.attempts_by_provider["alpha"], 2);
    assert_eq!(history.attempts_by_provider["beta"], 2);
    assert!(history.failover_occurred);
    assert_eq!(history.final_provider, "beta");
    let tried: Vec<(&str, u32)> = history
        .failures
        .iter()
        .map(|f| (f.provider.as_str(), f.attempt))
        .collect();
    assert_eq!(tried, vec![("alpha", 1), ("alpha", 2), ("beta", 1), ("beta", 2)]);
    assert!(history.failures[0].error.contains("slow down"));
    assert!(history.failures[3].error.contains("busy"));

    assert!(records[1].success);
    assert!(records[1].used_fallback);
    assert!(records[1].failover.is_none());
}

#[tokio::test]
async fn test_undisplayable_output_falls_back() {
    let h = harness(
        ScriptedProvider::ok("alpha", "PRICE ~5"),
        ScriptedProvider::ok("beta", "UNUSED"),
    );

    let outcome = h
        .orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()))
        .await
        .unwrap();

    assert!(matches!(outcome, CycleOutcome::Sent { used_fallback: true, .. }));
    // Validation happens after the provider succeeded; no retry on the alternate.
    assert_eq!(h.alpha.calls(), 1);
    assert_eq!(h.beta.calls(), 0);
    assert_eq!(h.sink.records().len(), 2);
}

#[tokio::test]
async fn test_auth_failure_falls_back() {
    let h = harness(
        ScriptedProvider::failing("alpha", ProviderError::AuthFailed("bad key".to_string())),
        ScriptedProvider::ok("beta", "UNUSED"),
    );

    let outcome = h
        .orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()))
        .await
        .unwrap();

    assert!(matches!(outcome, CycleOutcome::Sent { used_fallback: true, .. }));
    assert_eq!(h.alpha.calls(), 1);
    assert_eq!(h.beta.calls(), 0);
}

#[tokio::test]
async fn test_minor_cycle_refreshes_cached_content() {
    let h = harness(
        ScriptedProvider::ok("alpha", "Hello"),
        ScriptedProvider::ok("beta", "UNUSED"),
    );

    let before = h
        .orchestrator
        .generate_and_send(CycleRequest::minor(Utc::now()))
        .await
        .unwrap();
    assert_eq!(before, CycleOutcome::Skipped(SkipReason::NoCachedContent));

    h.orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()))
        .await
        .unwrap();
    let after = h
        .orchestrator
        .generate_and_send(CycleRequest::minor(Utc::now()))
        .await
        .unwrap();

    assert_eq!(after, CycleOutcome::Refreshed);
    assert_eq!(h.alpha.calls(), 1);
    assert_eq!(h.delivery.sent().len(), 2);
    // Minor cycles are not recorded.
    assert_eq!(h.sink.records().len(), 1);
}

#[tokio::test]
async fn test_manual_switches_skip_cycles() {
    let h = harness(
        ScriptedProvider::ok("alpha", "Hello"),
        ScriptedProvider::ok("beta", "UNUSED"),
    );

    h.orchestrator
        .set_manual_circuit(MASTER_SWITCH, SwitchPosition::Off)
        .unwrap();
    let outcome = h
        .orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()))
        .await
        .unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::MasterSwitchOff));

    h.orchestrator
        .set_manual_circuit(MASTER_SWITCH, SwitchPosition::On)
        .unwrap();
    h.orchestrator
        .set_manual_circuit(SLEEP_MODE, SwitchPosition::Off)
        .unwrap();
    let outcome = h
        .orchestrator
        .generate_and_send(CycleRequest::minor(Utc::now()))
        .await
        .unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::SleepMode));

    assert_eq!(h.alpha.calls(), 0);
    assert!(h.delivery.sent().is_empty());
    assert!(h.sink.records().is_empty());
}

#[tokio::test]
async fn test_manual_switch_rejects_provider_circuit() {
    let h = harness(
        ScriptedProvider::ok("alpha", "Hello"),
        ScriptedProvider::ok("beta", "UNUSED"),
    );
    let result = h
        .orchestrator
        .set_manual_circuit(&provider_circuit_id("alpha"), SwitchPosition::Off);
    assert!(matches!(result, Err(PipelineError::Config(_))));
}

#[tokio::test]
async fn test_notification_trigger_skips_providers() {
    let h = harness(
        ScriptedProvider::ok("alpha", "UNUSED"),
        ScriptedProvider::ok("beta", "UNUSED"),
    );

    let request = CycleRequest::major(Utc::now())
        .with_trigger(TriggerEvent::new("doorbell", json!({"who": "Courier"})));
    let outcome = h.orchestrator.generate_and_send(request).await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Sent {
            generator_id: "doorbell".to_string(),
            used_fallback: false
        }
    );
    assert_eq!(h.alpha.calls() + h.beta.calls(), 0);
    assert!(h.delivery.sent()[0].render_rows()[0].starts_with("COURIER AT THE DOOR"));
}

#[tokio::test]
async fn test_unmatched_trigger_runs_normal_generator() {
    let h = harness(
        ScriptedProvider::ok("alpha", "GARAGE IS OPEN"),
        ScriptedProvider::ok("beta", "UNUSED"),
    );

    let request =
        CycleRequest::major(Utc::now()).with_trigger(TriggerEvent::new("garage", json!(null)));
    let outcome = h.orchestrator.generate_and_send(request).await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Sent {
            generator_id: "haiku".to_string(),
            used_fallback: false
        }
    );
    assert_eq!(h.alpha.calls(), 1);
    assert!(h.delivery.sent()[0].render_rows()[0].starts_with("GARAGE IS OPEN"));
}

#[tokio::test]
async fn test_fallback_failure_aborts_cycle() {
    let prompt = PromptGeneratorFactory::new("sys", "user");
    let h = harness_with(
        registry_with(Some(prompt), Vec::new()),
        ScriptedProvider::failing("alpha", rate_limited()),
        ScriptedProvider::failing("beta", rate_limited()),
    );

    let result = h
        .orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()))
        .await;

    assert!(matches!(
        result,
        Err(PipelineError::Provider(ProviderError::EmptyResponse))
    ));
    assert!(h.delivery.sent().is_empty());
    assert!(h.orchestrator.get_cached_content().is_none());

    let records = h.sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.success));
    assert!(records[1].used_fallback);
}

#[tokio::test]
async fn test_layout_content_is_not_reframed() {
    let mut grid = vec![vec![0i64; 22]; 6];
    grid[0][0] = 8; // H
    grid[0][1] = 9; // I
    let prompt =
        PromptGeneratorFactory::new("sys", "Draw a board").with_output_mode(OutputMode::Layout);
    let h = harness_with(
        registry_with(Some(prompt), vec!["FALLBACK"]),
        ScriptedProvider::ok("alpha", &serde_json::to_string(&grid).unwrap()),
        ScriptedProvider::ok("beta", "UNUSED"),
    );

    let outcome = h
        .orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()))
        .await
        .unwrap();
    assert!(matches!(outcome, CycleOutcome::Sent { used_fallback: false, .. }));
    assert!(h.delivery.sent()[0].render_rows()[0].starts_with("HI"));

    let minor = h
        .orchestrator
        .generate_and_send(CycleRequest::minor(Utc::now()))
        .await
        .unwrap();
    assert_eq!(minor, CycleOutcome::Skipped(SkipReason::Unframed));
    assert_eq!(h.delivery.sent().len(), 1);
}

#[tokio::test]
async fn test_probe_closes_open_circuit() {
    let h = harness(
        ScriptedProvider::ok("alpha", "Hello"),
        ScriptedProvider::ok("beta", "UNUSED"),
    );
    open_provider_circuit(&h.circuits, "alpha");
    assert!(!h.circuits.is_available("PROVIDER_ALPHA"));

    h.alpha.set_probe_ok(false);
    let check = h.orchestrator.probe_provider("alpha").await.unwrap();
    assert!(!check.success);
    assert!(!h.circuits.is_available("PROVIDER_ALPHA"));

    h.alpha.set_probe_ok(true);
    let check = h.orchestrator.probe_provider("alpha").await.unwrap();
    assert!(check.success);
    assert!(h.circuits.is_available("PROVIDER_ALPHA"));
    assert_eq!(
        h.circuits.get_status("PROVIDER_ALPHA").unwrap().failure_count,
        0
    );

    assert!(matches!(
        h.orchestrator.probe_provider("gamma").await,
        Err(PipelineError::Config(_))
    ));
}

#[tokio::test]
async fn test_delivery_failure_is_not_cached() {
    let h = harness(
        ScriptedProvider::ok("alpha", "Hello"),
        ScriptedProvider::ok("beta", "UNUSED"),
    );
    h.delivery.set_failing(true);

    let result = h
        .orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()))
        .await;

    assert!(matches!(result, Err(PipelineError::Delivery(_))));
    assert!(h.orchestrator.get_cached_content().is_none());
    let records = h.sink.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
}

#[tokio::test]
async fn test_persistence_failure_does_not_fail_cycle() {
    let h = harness(
        ScriptedProvider::ok("alpha", "Hello"),
        ScriptedProvider::ok("beta", "UNUSED"),
    );
    h.sink.set_failing(true);

    let outcome = h
        .orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()))
        .await
        .unwrap();

    assert!(matches!(outcome, CycleOutcome::Sent { used_fallback: false, .. }));
    assert_eq!(h.delivery.sent().len(), 1);
    assert!(h.orchestrator.get_cached_content().is_some());
}

#[tokio::test]
async fn test_explicit_generator_request() {
    let h = harness(
        ScriptedProvider::ok("alpha", "UNUSED"),
        ScriptedProvider::ok("beta", "UNUSED"),
    );

    let outcome = h
        .orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()).with_generator("static_fallback"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Sent {
            generator_id: "static_fallback".to_string(),
            used_fallback: false
        }
    );

    let missing = h
        .orchestrator
        .generate_and_send(CycleRequest::major(Utc::now()).with_generator("nope"))
        .await;
    assert!(matches!(missing, Err(PipelineError::GeneratorNotFound(_))));
}

#[tokio::test]
async fn test_overlapping_cycles_are_serialized() {
    let h = Arc::new(harness(
        ScriptedProvider::ok("alpha", "Hello"),
        ScriptedProvider::ok("beta", "UNUSED"),
    ));

    let first = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.orchestrator
                .generate_and_send(CycleRequest::major(Utc::now()))
                .await
        })
    };
    let second = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.orchestrator
                .generate_and_send(CycleRequest::major(Utc::now()))
                .await
        })
    };

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert_eq!(h.delivery.sent().len(), 2);
    assert_eq!(h.sink.records().len(), 2);
}

#[tokio::test]
async fn test_probe_all_reports_each_provider() {
    let h = harness(
        ScriptedProvider::ok("alpha", "Hello"),
        ScriptedProvider::ok("beta", "UNUSED"),
    );
    open_provider_circuit(&h.circuits, "beta");
    h.alpha.set_probe_ok(false);

    let checks = h.orchestrator.probe_all().await;
    let names: Vec<&str> = checks.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert!(!checks[0].1.success);
    assert!(checks[1].1.success);
    assert!(h.circuits.is_available("PROVIDER_BETA"));
}
