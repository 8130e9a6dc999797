//! Scheduler cadence under paused tokio time.

use crate::integration::test_utils::{
    circuits, engine, RecordingDelivery, RecordingSink, ScriptedProvider,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tileboard::generator::{
    GeneratorRegistration, GeneratorRegistry, NotificationEntry, NotificationTable, PriorityTier,
    PromptGeneratorFactory, StaticFallbackFactory, TemplateFormatter, TriggerEvent,
    TriggerPattern,
};
use tileboard::orchestrator::Orchestrator;
use tileboard::scheduler::{ScheduleConfig, Scheduler};

struct Board {
    orchestrator: Arc<Orchestrator>,
    alpha: Arc<ScriptedProvider>,
    delivery: Arc<RecordingDelivery>,
    sink: Arc<RecordingSink>,
}

fn board() -> Board {
    let mut registry = GeneratorRegistry::new();
    registry
        .register(
            GeneratorRegistration::new("haiku", "Haiku", PriorityTier::Normal),
            Arc::new(PromptGeneratorFactory::new("sys", "user")),
        )
        .unwrap();
    let mut table = NotificationTable::new();
    table.push(NotificationEntry::new(
        "doorbell",
        "Doorbell",
        TriggerPattern::new("^doorbell$").unwrap(),
        Arc::new(TemplateFormatter::new("DING DONG")),
    ));
    table.register_into(&mut registry).unwrap();
    registry
        .register(
            GeneratorRegistration::new("static_fallback", "Static", PriorityTier::Fallback),
            Arc::new(StaticFallbackFactory::new(vec!["HELLO".to_string()])),
        )
        .unwrap();

    let circuits = circuits(5);
    let (engine, _sleeper) = engine(&circuits);
    let alpha = ScriptedProvider::ok("alpha", "Morning");
    let delivery = Arc::new(RecordingDelivery::default());
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Orchestrator::new(
        Arc::new(registry),
        engine,
        circuits,
        alpha.clone(),
        ScriptedProvider::ok("beta", "UNUSED"),
    )
    .with_delivery(delivery.clone())
    .with_persistence(sink.clone());

    Board {
        orchestrator: Arc::new(orchestrator),
        alpha,
        delivery,
        sink,
    }
}

#[tokio::test(start_paused = true)]
async fn test_ticks_alternate_major_and_minor_cycles() {
    let board = board();
    let (scheduler, handle) = Scheduler::new(
        Arc::clone(&board.orchestrator),
        ScheduleConfig {
            minor_interval_secs: 60,
            major_interval_secs: 300,
            major_on_start: true,
        },
    );
    let task = tokio::spawn(scheduler.run());

    // Ticks at 0s (major), 60s and 120s (minor).
    tokio::time::sleep(Duration::from_secs(125)).await;
    assert_eq!(board.alpha.calls(), 1);
    assert_eq!(board.delivery.sent().len(), 3);
    assert_eq!(board.sink.records().len(), 1);

    handle
        .trigger(TriggerEvent::new("doorbell", json!({})))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(board.alpha.calls(), 1);
    assert_eq!(board.delivery.sent().len(), 4);
    assert!(board.delivery.sent()[3].render_rows()[0].contains("DING DONG"));
    let records = board.sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].generator_id.as_deref(), Some("doorbell"));

    // Next major is due at 300s.
    tokio::time::sleep(Duration::from_secs(200)).await;
    assert_eq!(board.alpha.calls(), 2);

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("scheduler stops after shutdown")
        .unwrap();
    assert!(handle.trigger(TriggerEvent::new("doorbell", json!({}))).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_first_major_when_not_on_start() {
    let board = board();
    let (scheduler, handle) = Scheduler::new(
        Arc::clone(&board.orchestrator),
        ScheduleConfig {
            minor_interval_secs: 10,
            major_interval_secs: 30,
            major_on_start: false,
        },
    );
    let task = tokio::spawn(scheduler.run());

    // Minor ticks before any major have nothing cached and send nothing.
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(board.alpha.calls(), 0);
    assert!(board.delivery.sent().is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(board.alpha.calls(), 1);
    assert_eq!(board.delivery.sent().len(), 1);

    handle.shutdown();
    task.await.unwrap();
}
