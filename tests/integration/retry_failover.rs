//! Retry/failover engine behavior against scripted providers.

use crate::integration::test_utils::{
    circuits, engine, engine_with, open_provider_circuit, overloaded, rate_limited,
    ScriptedProvider,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tileboard::circuit::{provider_circuit_id, CircuitState};
use tileboard::error::{PipelineError, ProviderError};
use tileboard::generator::{GenerationContext, PromptGeneratorFactory};
use tileboard::provider::AiProvider;
use tileboard::retry::RetryConfig;

fn factory() -> PromptGeneratorFactory {
    PromptGeneratorFactory::new("You write short board messages.", "Say hello")
}

fn context() -> GenerationContext {
    GenerationContext::new(Utc::now())
}

#[tokio::test]
async fn test_first_attempt_success_has_no_failover() {
    let circuits = circuits(5);
    let (engine, sleeper) = engine(&circuits);
    let alpha = ScriptedProvider::ok("alpha", "HELLO");
    let beta = ScriptedProvider::ok("beta", "UNUSED");

    let content = engine
        .run(&factory(), &context(), alpha.clone(), beta.clone())
        .await
        .unwrap();

    assert_eq!(content.text.as_deref(), Some("HELLO"));
    assert_eq!(content.metadata.provider.as_deref(), Some("alpha"));
    let failover = content.metadata.failover.unwrap();
    assert_eq!(failover.total_attempts, 1);
    assert!(!failover.failover_occurred);
    assert!(!failover.circuit_tripped);
    assert_eq!(failover.final_provider, "alpha");
    assert!(failover.failures.is_empty());
    assert_eq!(beta.calls(), 0);
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_failover_to_alternate_after_preferred_attempts() {
    let circuits = circuits(5);
    let (engine, sleeper) = engine(&circuits);
    let alpha = ScriptedProvider::failing("alpha", rate_limited());
    let beta = ScriptedProvider::ok("beta", "FROM BETA");

    let content = engine
        .run(&factory(), &context(), alpha.clone(), beta.clone())
        .await
        .unwrap();

    let failover = content.metadata.failover.unwrap();
    assert_eq!(failover.total_attempts, 3);
    assert!(failover.failover_occurred);
    assert_eq!(failover.final_provider, "beta");
    assert_eq!(failover.attempts_by_provider.get("alpha"), Some(&2));
    assert_eq!(failover.attempts_by_provider.get("beta"), Some(&1));
    assert_eq!(failover.failures.len(), 2);
    assert!(failover.failures.iter().all(|f| f.provider == "alpha"));
    assert_eq!(alpha.calls(), 2);
    assert_eq!(beta.calls(), 1);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(1000), Duration::from_millis(2000)]
    );

    let alpha_circuit = circuits.get_status(&provider_circuit_id("alpha")).unwrap();
    assert_eq!(alpha_circuit.failure_count, 2);
    assert_eq!(alpha_circuit.state, CircuitState::Closed);
}

#[tokio::test]
async fn test_retry_on_same_provider_recovers() {
    let circuits = circuits(5);
    let (engine, sleeper) = engine(&circuits);
    let alpha = ScriptedProvider::scripted("alpha", vec![Err(overloaded())], "SECOND TRY");
    let beta = ScriptedProvider::ok("beta", "UNUSED");

    let content = engine
        .run(&factory(), &context(), alpha.clone(), beta.clone())
        .await
        .unwrap();

    let failover = content.metadata.failover.unwrap();
    assert_eq!(failover.total_attempts, 2);
    assert!(!failover.failover_occurred);
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(1000)]);
    assert_eq!(beta.calls(), 0);
}

#[tokio::test]
async fn test_any_shorter_retryable_failure_run_succeeds() {
    // Four attempts in total; up to three retryable failures still end in success.
    for failures in 0..4usize {
        let circuits = circuits(5);
        let (engine, sleeper) = engine(&circuits);
        let alpha_failures = failures.min(2);
        let beta_failures = failures - alpha_failures;
        let alpha = ScriptedProvider::scripted(
            "alpha",
            (0..alpha_failures).map(|_| Err(rate_limited())).collect(),
            "FROM ALPHA",
        );
        let beta = ScriptedProvider::scripted(
            "beta",
            (0..beta_failures).map(|_| Err(overloaded())).collect(),
            "FROM BETA",
        );

        let content = engine
            .run(&factory(), &context(), alpha.clone(), beta.clone())
            .await
            .unwrap();

        let failover = content.metadata.failover.unwrap();
        assert_eq!(failover.total_attempts as usize, failures + 1, "failures={}", failures);
        assert_eq!(failover.failures.len(), failures);
        assert_eq!(alpha.calls() + beta.calls(), failures + 1);
        assert_eq!(sleeper.delays().len(), failures);
        let expected = if failures < 2 { "alpha" } else { "beta" };
        assert_eq!(failover.final_provider, expected);
        assert_eq!(content.metadata.provider.as_deref(), Some(expected));
    }
}

#[tokio::test]
async fn test_non_retryable_error_stops_immediately() {
    let circuits = circuits(5);
    let (engine, sleeper) = engine(&circuits);
    let alpha = ScriptedProvider::failing(
        "alpha",
        ProviderError::AuthFailed("status 401: bad key".to_string()),
    );
    let beta = ScriptedProvider::ok("beta", "UNUSED");

    let result = engine
        .run(&factory(), &context(), alpha.clone(), beta.clone())
        .await;

    assert!(matches!(
        result,
        Err(PipelineError::Provider(ProviderError::AuthFailed(_)))
    ));
    assert_eq!(alpha.calls(), 1);
    assert_eq!(beta.calls(), 0);
    assert!(sleeper.delays().is_empty());
    assert_eq!(
        circuits
            .get_status(&provider_circuit_id("alpha"))
            .unwrap()
            .failure_count,
        1
    );
}

#[tokio::test]
async fn test_exhaustion_carries_every_attempt() {
    let circuits = circuits(10);
    let (engine, sleeper) = engine(&circuits);
    let alpha = ScriptedProvider::failing("alpha", rate_limited());
    let beta = ScriptedProvider::failing("beta", ProviderError::EmptyResponse);

    let result = engine
        .run(&factory(), &context(), alpha.clone(), beta.clone())
        .await;

    let Err(PipelineError::RetryExhausted { attempts }) = result else {
        panic!("expected RetryExhausted, got {:?}", result);
    };
    assert_eq!(attempts.len(), 4);
    let order: Vec<(&str, u32)> = attempts
        .iter()
        .map(|a| (a.provider.as_str(), a.attempt))
        .collect();
    assert_eq!(
        order,
        vec![("alpha", 1), ("alpha", 2), ("beta", 1), ("beta", 2)]
    );
    assert_eq!(
        sleeper.delays(),
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(4000)
        ]
    );
}

#[tokio::test]
async fn test_open_preferred_circuit_only_invokes_alternate() {
    let circuits = circuits(3);
    open_provider_circuit(&circuits, "alpha");
    let (engine, sleeper) = engine(&circuits);
    let alpha = ScriptedProvider::ok("alpha", "UNUSED");
    let beta = ScriptedProvider::ok("beta", "FROM BETA");

    let content = engine
        .run(&factory(), &context(), alpha.clone(), beta.clone())
        .await
        .unwrap();

    assert_eq!(alpha.calls(), 0);
    assert_eq!(beta.calls(), 1);
    let failover = content.metadata.failover.unwrap();
    assert!(failover.circuit_tripped);
    assert!(failover.failover_occurred);
    assert_eq!(failover.total_attempts, 1);
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_both_circuits_open_fails_without_attempts() {
    let circuits = circuits(2);
    open_provider_circuit(&circuits, "alpha");
    open_provider_circuit(&circuits, "beta");
    let (engine, sleeper) = engine(&circuits);
    let alpha = ScriptedProvider::ok("alpha", "UNUSED");
    let beta = ScriptedProvider::ok("beta", "UNUSED");

    let result = engine
        .run(&factory(), &context(), alpha.clone(), beta.clone())
        .await;

    let Err(PipelineError::CircuitUnavailable { circuits: blocked }) = result else {
        panic!("expected CircuitUnavailable, got {:?}", result);
    };
    assert_eq!(blocked, vec!["PROVIDER_ALPHA", "PROVIDER_BETA"]);
    assert_eq!(alpha.calls() + beta.calls(), 0);
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_skipped_provider_reduces_attempt_count() {
    let circuits = circuits(3);
    open_provider_circuit(&circuits, "alpha");
    let (engine, _sleeper) = engine(&circuits);
    let alpha = ScriptedProvider::ok("alpha", "UNUSED");
    let beta = ScriptedProvider::failing("beta", overloaded());

    let result = engine
        .run(&factory(), &context(), alpha.clone(), beta.clone())
        .await;

    assert_eq!(result.unwrap_err().attempts().len(), 2);
    assert_eq!(alpha.calls(), 0);
}

#[tokio::test]
async fn test_preferred_circuit_opens_during_run() {
    let circuits = circuits(2);
    let (engine, _sleeper) = engine(&circuits);
    let alpha = ScriptedProvider::failing("alpha", rate_limited());
    let beta = ScriptedProvider::ok("beta", "FROM BETA");

    engine
        .run(&factory(), &context(), alpha.clone(), beta.clone())
        .await
        .unwrap();

    assert!(!circuits.is_available(&provider_circuit_id("alpha")));

    // The next run skips alpha entirely.
    let content = engine
        .run(&factory(), &context(), alpha.clone(), beta.clone())
        .await
        .unwrap();
    assert_eq!(alpha.calls(), 2);
    assert!(content.metadata.failover.unwrap().circuit_tripped);
}

#[tokio::test]
async fn test_failure_details_are_redacted() {
    let circuits = circuits(5);
    let (engine, _sleeper) = engine_with(
        &circuits,
        RetryConfig {
            attempts_per_provider: 1,
            ..RetryConfig::default()
        },
    );
    let alpha = ScriptedProvider::failing(
        "alpha",
        ProviderError::RequestFailed("proxy rejected api_key=supersecret".to_string()),
    );
    let beta = ScriptedProvider::ok("beta", "OK");

    let content = engine
        .run(&factory(), &context(), alpha.clone(), beta.clone())
        .await
        .unwrap();

    let failover = content.metadata.failover.unwrap();
    assert_eq!(failover.failures.len(), 1);
    assert!(!failover.failures[0].error.contains("supersecret"));
    assert!(failover.failures[0].error.contains("[REDACTED]"));
}

#[tokio::test]
async fn test_generator_rebuilt_per_provider() {
    let circuits = circuits(5);
    let (engine, _sleeper) = engine(&circuits);
    let alpha = ScriptedProvider::failing("alpha", rate_limited());
    let beta = ScriptedProvider::ok("beta", "FROM BETA");
    let context = GenerationContext::new(Utc::now())
        .with_model_tier(tileboard::provider::ModelTier::Heavy);

    let content = engine
        .run(
            &factory(),
            &context,
            alpha.clone() as Arc<dyn AiProvider>,
            beta.clone() as Arc<dyn AiProvider>,
        )
        .await
        .unwrap();

    assert_eq!(content.metadata.model.as_deref(), Some("beta-model"));
    let request = &beta.requests()[0];
    assert_eq!(request.user_prompt, "Say hello");
    assert_eq!(request.model_tier, tileboard::provider::ModelTier::Heavy);
}
