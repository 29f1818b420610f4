//! Remediation scenarios against an HTTP double of the target

use std::sync::Arc;

use warden_autofix::{AutoFixEngine, KnowledgeStore};
use warden_common::config::AutoFixConfig;
use warden_common::{
    BreakerConfig, BreakerRegistry, BreakerStatus, FixActionKind, PatternMetadata, ProbeOutcome,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn failing_outcome(endpoint: &str, status: u16) -> ProbeOutcome {
    ProbeOutcome {
        endpoint: endpoint.to_string(),
        healthy: false,
        status: Some(status),
        latency_ms: 1,
        content_length: 0,
        content_type: None,
        error: None,
        error_kind: Some(warden_common::ProbeErrorKind::StatusMismatch),
        breaker_state: BreakerStatus::Closed,
    }
}

fn engine(base_url: &str, config: AutoFixConfig) -> AutoFixEngine {
    AutoFixEngine::new(base_url, config, Arc::new(KnowledgeStore::ephemeral())).unwrap()
}

#[tokio::test]
async fn fallback_success_becomes_a_learned_pattern() {
    let server = MockServer::start().await;
    // the forced re-probe answers cleanly
    Mock::given(method("GET"))
        .and(path("/api/v1/analytics/status"))
        .and(query_param("force", "true"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let engine = engine(&server.uri(), AutoFixConfig::default());
    let breakers = BreakerRegistry::new(BreakerConfig::default());

    let report = engine
        .remediate(&[failing_outcome("/api/v1/analytics/status", 503)], &breakers)
        .await;

    assert_eq!(report.successes(), 1);
    assert!(!report.engine_gated);
    assert_eq!(report.records[0].action, FixActionKind::ForceHealthCheck);

    let pattern = engine.store().get("service-unavailable").expect("learned");
    assert_eq!(pattern.applied_count, 1);
    assert_eq!(pattern.success_rate, 1.0);
    assert_eq!(pattern.action, FixActionKind::ForceHealthCheck);
}

#[tokio::test]
async fn learned_pattern_above_bar_is_applied_directly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/admin/clear-cache"))
        .and(header("X-Auto-Fix", "true"))
        .and(header("X-Fix-Pattern", "bad-gateway"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(KnowledgeStore::ephemeral());
    store.record(
        "bad-gateway",
        FixActionKind::ClearCache,
        true,
        PatternMetadata::default(),
    );

    let engine = AutoFixEngine::new(server.uri(), AutoFixConfig::default(), store).unwrap();
    let breakers = BreakerRegistry::new(BreakerConfig::default());

    let report = engine
        .remediate(&[failing_outcome("/api/v1/campaigns", 502)], &breakers)
        .await;

    // one record: the learned action, no ladder walk
    assert_eq!(report.records.len(), 1);
    assert!(report.records[0].success);
    assert_eq!(report.records[0].action, FixActionKind::ClearCache);

    let pattern = engine.store().get("bad-gateway").unwrap();
    assert_eq!(pattern.applied_count, 2);
    assert_eq!(pattern.success_rate, 1.0);
}

#[tokio::test]
async fn failed_application_decays_the_success_rate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/admin/clear-cache"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    // everything else 404s so the ladder fails too
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = Arc::new(KnowledgeStore::ephemeral());
    store.record(
        "bad-gateway",
        FixActionKind::ClearCache,
        true,
        PatternMetadata::default(),
    );

    let engine = AutoFixEngine::new(server.uri(), AutoFixConfig::default(), store).unwrap();
    let breakers = BreakerRegistry::new(BreakerConfig::default());

    let report = engine
        .remediate(&[failing_outcome("/api/v1/campaigns", 502)], &breakers)
        .await;
    assert_eq!(report.successes(), 0);

    let pattern = engine.store().get("bad-gateway").unwrap();
    assert_eq!(pattern.applied_count, 2);
    assert!((pattern.success_rate - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn reset_breaker_fallback_repairs_an_open_gate() {
    let server = MockServer::start().await;
    // force check, cache clear and warm-up all fail; the root is slow
    // enough that the warm-up test can never beat the baseline
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500).set_delay(std::time::Duration::from_millis(20)))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let engine = engine(&server.uri(), AutoFixConfig::default());
    let breakers = BreakerRegistry::new(BreakerConfig::default());
    let breaker = breakers.get_or_create("/api/v1/monitoring");
    for _ in 0..3 {
        let _ = breaker
            .execute(|| async { Err::<(), &str>("down") })
            .await;
    }
    assert_eq!(breaker.status().await, BreakerStatus::Open);

    let mut outcome = ProbeOutcome::breaker_rejected("/api/v1/monitoring");
    outcome.latency_ms = 1; // warm-up baseline cannot be beaten
    let report = engine.remediate(&[outcome], &breakers).await;

    assert_eq!(report.successes(), 1);
    let last = report.records.last().unwrap();
    assert_eq!(last.action, FixActionKind::ResetCircuitBreaker);
    assert_eq!(breaker.status().await, BreakerStatus::Closed);

    let pattern = engine.store().get("circuit-breaker-open").unwrap();
    assert_eq!(pattern.action, FixActionKind::ResetCircuitBreaker);
}

#[tokio::test]
async fn engine_breaker_gates_a_remediation_storm() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500).set_delay(std::time::Duration::from_millis(20)))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = AutoFixConfig {
        breaker_failure_threshold: 2,
        ..Default::default()
    };
    let engine = engine(&server.uri(), config);
    // no breakers registered, so the reset fallback fails as well
    let breakers = BreakerRegistry::new(BreakerConfig::default());

    let failing = [
        failing_outcome("/api/v1/campaigns", 500),
        failing_outcome("/api/v1/monitoring", 500),
        failing_outcome("/api/v1/alerts", 500),
    ];
    let report = engine.remediate(&failing, &breakers).await;

    assert_eq!(report.successes(), 0);
    assert!(report.engine_gated);
    // the third outcome was rejected without attempts: two ladder walks only
    assert_eq!(report.records.len(), 8);
}
