//! Probe-session step helpers: performance sampling, mock-data
//! verification, and critical-issue derivation

use crate::prober::Prober;
use crate::scoring;
use chrono::Utc;
use std::time::Duration;
use tracing::debug;
use warden_common::{
    CriticalIssue, EndpointsSummary, IssueKind, IssueSeverity, MockDataCheck, MockEndpointResult,
    PerformanceCheck, PerformanceSample, SiteCheck, UiCheck, UiOutcome,
};

const MOCK_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Sequential latency samples against the root document.
pub(crate) async fn sample_performance(
    prober: &Prober,
    samples: u32,
    spacing: Duration,
    sla_ms: u64,
) -> PerformanceCheck {
    let mut collected = Vec::with_capacity(samples as usize);
    for i in 0..samples {
        if i > 0 {
            tokio::time::sleep(spacing).await;
        }
        let url = format!("{}/", prober.base_url());
        let started = std::time::Instant::now();
        let result = prober
            .client()
            .get(&url)
            .timeout(Duration::from_millis(sla_ms.saturating_mul(4).max(10_000)))
            .send()
            .await;
        let (status, content_length, success) = match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let length = response.bytes().await.map(|b| b.len() as u64).unwrap_or(0);
                (Some(status), length, (200..400).contains(&status))
            }
            Err(_) => (None, 0, false),
        };
        let latency_ms = started.elapsed().as_millis() as u64;
        collected.push(PerformanceSample {
            timestamp: Utc::now(),
            endpoint: "/".to_string(),
            latency_ms,
            within_sla: success && latency_ms <= sla_ms,
            status,
            content_length,
        });
    }

    summarize_samples(collected, sla_ms)
}

/// Aggregate samples into the performance dimension.
pub(crate) fn summarize_samples(samples: Vec<PerformanceSample>, sla_ms: u64) -> PerformanceCheck {
    let total = samples.len();
    let successful: Vec<&PerformanceSample> =
        samples.iter().filter(|s| s.status.is_some()).collect();
    let succeeded = successful
        .iter()
        .filter(|s| s.status.map(|c| (200..400).contains(&c)).unwrap_or(false))
        .count();
    let average_ms = if succeeded > 0 {
        successful
            .iter()
            .filter(|s| s.status.map(|c| (200..400).contains(&c)).unwrap_or(false))
            .map(|s| s.latency_ms as f64)
            .sum::<f64>()
            / succeeded as f64
    } else {
        0.0
    };
    let sla_violations = samples.iter().filter(|s| !s.within_sla).count() as u32;
    let availability_pct = if total == 0 {
        0.0
    } else {
        succeeded as f64 / total as f64 * 100.0
    };
    let grade = scoring::performance_grade(sla_violations, average_ms, availability_pct, sla_ms);

    PerformanceCheck {
        samples,
        average_ms,
        sla_violations,
        availability_pct,
        grade,
    }
}

/// Verify each mock endpoint returns a parsable body of the right shape.
pub(crate) async fn verify_mock_data(
    prober: &Prober,
    endpoints: &[String],
) -> MockDataCheck {
    let mut results = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        results.push(check_mock_endpoint(prober, endpoint).await);
    }
    MockDataCheck::from_results(results)
}

async fn check_mock_endpoint(prober: &Prober, endpoint: &str) -> MockEndpointResult {
    let url = format!("{}{}", prober.base_url(), endpoint);
    let response = match prober
        .client()
        .get(&url)
        .header("X-Mock-Mode", "true")
        .timeout(MOCK_PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            return MockEndpointResult {
                endpoint: endpoint.to_string(),
                working: false,
                status: None,
                error: Some(e.to_string()),
            }
        }
    };

    let status = response.status().as_u16();
    if !(200..400).contains(&status) {
        return MockEndpointResult {
            endpoint: endpoint.to_string(),
            working: false,
            status: Some(status),
            error: Some(format!("unexpected status {}", status)),
        };
    }

    let body: serde_json::Value = match response.json().await {
        Ok(body) => body,
        Err(e) => {
            return MockEndpointResult {
                endpoint: endpoint.to_string(),
                working: false,
                status: Some(status),
                error: Some(format!("unparsable body: {}", e)),
            }
        }
    };

    let (working, error) = if mock_shape_ok(endpoint, &body) {
        (true, None)
    } else {
        (false, Some("body failed shape check".to_string()))
    };
    debug!("mock endpoint {} working={}", endpoint, working);
    MockEndpointResult {
        endpoint: endpoint.to_string(),
        working,
        status: Some(status),
        error,
    }
}

/// Endpoint-specific shape rules. Analytics payloads must carry a
/// `metrics` field or be an array; everything else just has to be a
/// non-empty JSON value.
fn mock_shape_ok(endpoint: &str, body: &serde_json::Value) -> bool {
    if endpoint.contains("analytics") {
        return body.is_array() || body.get("metrics").is_some();
    }
    match body {
        serde_json::Value::Null => false,
        serde_json::Value::Object(map) => !map.is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Derive the session's critical and warning issues.
#[allow(clippy::too_many_arguments)]
pub(crate) fn derive_issues(
    site: &SiteCheck,
    endpoints: &EndpointsSummary,
    ui: &UiCheck,
    performance: &PerformanceCheck,
    mock_data: &MockDataCheck,
    open_breakers: &[String],
    prior_consecutive_failures: u32,
    instability_threshold: u32,
) -> Vec<CriticalIssue> {
    let mut issues = Vec::new();

    if !site.available || endpoints.percent < 50.0 {
        let affected: Vec<String> = endpoints
            .results
            .iter()
            .filter(|r| !r.healthy)
            .map(|r| r.endpoint.clone())
            .collect();
        issues.push(critical(
            IssueKind::SiteDown,
            format!(
                "site unavailable or endpoint health below half ({:.0}% healthy)",
                endpoints.percent
            ),
            affected,
        ));
    }

    if matches!(ui.outcome, UiOutcome::Failed | UiOutcome::Error) {
        issues.push(critical(
            IssueKind::UiFailure,
            match ui.exit_code {
                Some(code) => format!("ui harness finished with exit code {}", code),
                None => "ui harness could not run".to_string(),
            },
            Vec::new(),
        ));
    }

    if performance.sla_violations > 3 || performance.availability_pct < 60.0 {
        issues.push(critical(
            IssueKind::PerformanceCritical,
            format!(
                "{} SLA violations, {:.0}% availability",
                performance.sla_violations, performance.availability_pct
            ),
            vec!["/".to_string()],
        ));
    }

    if prior_consecutive_failures >= instability_threshold {
        issues.push(critical(
            IssueKind::SystemicInstability,
            format!(
                "{} consecutive failing sessions",
                prior_consecutive_failures
            ),
            Vec::new(),
        ));
    }

    if !open_breakers.is_empty() {
        issues.push(warning(
            IssueKind::CircuitBreakersOpen,
            format!("{} circuit breaker(s) open", open_breakers.len()),
            open_breakers.to_vec(),
        ));
    }

    if mock_data.percent < 50.0 {
        let affected: Vec<String> = mock_data
            .results
            .iter()
            .filter(|r| !r.working)
            .map(|r| r.endpoint.clone())
            .collect();
        issues.push(warning(
            IssueKind::MockDataFailure,
            format!("only {:.0}% of mock endpoints working", mock_data.percent),
            affected,
        ));
    }

    issues
}

fn critical(kind: IssueKind, message: String, affected: Vec<String>) -> CriticalIssue {
    CriticalIssue {
        kind,
        severity: IssueSeverity::Critical,
        message,
        requires_human_intervention: true,
        affected_endpoints: affected,
        suggested_actions: suggested_actions(kind),
    }
}

fn warning(kind: IssueKind, message: String, affected: Vec<String>) -> CriticalIssue {
    CriticalIssue {
        kind,
        severity: IssueSeverity::Warning,
        message,
        requires_human_intervention: false,
        affected_endpoints: affected,
        suggested_actions: suggested_actions(kind),
    }
}

/// Fixed copy keyed by issue kind.
pub(crate) fn suggested_actions(kind: IssueKind) -> Vec<String> {
    let copy: &[&str] = match kind {
        IssueKind::SiteDown => &[
            "Check the hosting provider status page",
            "Verify the most recent deployment",
            "Roll back if the outage follows a release",
        ],
        IssueKind::UiFailure => &[
            "Open the UI harness report",
            "Re-run the harness locally against the target",
        ],
        IssueKind::PerformanceCritical => &[
            "Inspect origin resource usage",
            "Check for slow upstream dependencies",
            "Consider scaling the service",
        ],
        IssueKind::SystemicInstability => &[
            "Escalate to the on-call engineer",
            "Review recent deployments and infrastructure changes",
        ],
        IssueKind::CircuitBreakersOpen => &[
            "Wait for half-open recovery probes",
            "Reset breakers manually once the endpoints recover",
        ],
        IssueKind::MockDataFailure => &[
            "Verify the mock data routes are deployed",
            "Check mock fixtures for schema drift",
        ],
        IssueKind::SystemFailure => &[
            "Inspect supervisor logs",
            "Restart the monitor after resolving the fault",
        ],
        _ => &["Investigate the affected dimension"],
    };
    copy.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_common::PerformanceGrade;

    fn base_dimensions() -> (SiteCheck, EndpointsSummary, UiCheck, PerformanceCheck, MockDataCheck)
    {
        (
            SiteCheck {
                available: true,
                status: Some(200),
                latency_ms: 200,
                error: None,
            },
            EndpointsSummary {
                healthy: 7,
                total: 7,
                percent: 100.0,
                results: Vec::new(),
            },
            UiCheck::skipped(),
            PerformanceCheck {
                samples: Vec::new(),
                average_ms: 500.0,
                sla_violations: 0,
                availability_pct: 100.0,
                grade: PerformanceGrade::A,
            },
            MockDataCheck {
                working: 4,
                total: 4,
                percent: 100.0,
                results: Vec::new(),
            },
        )
    }

    #[test]
    fn healthy_session_derives_no_issues() {
        let (site, endpoints, ui, perf, mock) = base_dimensions();
        let issues = derive_issues(&site, &endpoints, &ui, &perf, &mock, &[], 0, 5);
        assert!(issues.is_empty());
    }

    #[test]
    fn sla_breach_scenario_raises_performance_critical() {
        let (site, endpoints, ui, mut perf, mock) = base_dimensions();
        perf.sla_violations = 4;
        perf.grade = PerformanceGrade::D;
        let issues = derive_issues(&site, &endpoints, &ui, &perf, &mock, &[], 0, 5);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::PerformanceCritical);
        assert!(issues[0].requires_human_intervention);
    }

    #[test]
    fn open_breakers_are_a_warning_not_critical() {
        let (site, endpoints, ui, perf, mock) = base_dimensions();
        let issues = derive_issues(
            &site,
            &endpoints,
            &ui,
            &perf,
            &mock,
            &["/api/v1/analytics/status".to_string()],
            0,
            5,
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::CircuitBreakersOpen);
        assert_eq!(issues[0].severity, IssueSeverity::Warning);
        assert!(!issues[0].requires_human_intervention);
        assert_eq!(issues[0].affected_endpoints.len(), 1);
    }

    #[test]
    fn instability_fires_at_threshold() {
        let (site, endpoints, ui, perf, mock) = base_dimensions();
        let quiet = derive_issues(&site, &endpoints, &ui, &perf, &mock, &[], 4, 5);
        assert!(quiet.is_empty());
        let fired = derive_issues(&site, &endpoints, &ui, &perf, &mock, &[], 5, 5);
        assert_eq!(fired[0].kind, IssueKind::SystemicInstability);
    }

    #[test]
    fn mock_shape_rules() {
        let metrics = serde_json::json!({"metrics": {"visits": 10}});
        assert!(mock_shape_ok("/api/v1/analytics/mock", &metrics));
        let list = serde_json::json!([1, 2, 3]);
        assert!(mock_shape_ok("/api/v1/analytics/mock", &list));
        let plain = serde_json::json!({"something": "else"});
        assert!(!mock_shape_ok("/api/v1/analytics/mock", &plain));

        assert!(mock_shape_ok("/api/v1/campaigns/mock", &plain));
        assert!(!mock_shape_ok("/api/v1/campaigns/mock", &serde_json::json!({})));
        assert!(!mock_shape_ok("/api/v1/campaigns/mock", &serde_json::Value::Null));
    }

    #[test]
    fn zero_successful_samples_grade_f_and_critical() {
        let samples = vec![
            PerformanceSample {
                timestamp: chrono::Utc::now(),
                endpoint: "/".to_string(),
                latency_ms: 30,
                within_sla: false,
                status: None,
                content_length: 0,
            };
            5
        ];
        let perf = summarize_samples(samples, 3000);
        assert_eq!(perf.grade, PerformanceGrade::F);
        assert_eq!(perf.availability_pct, 0.0);

        let (site, endpoints, ui, _, mock) = base_dimensions();
        let issues = derive_issues(&site, &endpoints, &ui, &perf, &mock, &[], 0, 5);
        assert!(issues.iter().any(|i| i.kind == IssueKind::PerformanceCritical));
    }

    #[test]
    fn sla_breach_sample_arithmetic() {
        // latencies from the breach scenario against a 3000ms SLA
        let latencies = [1800u64, 3200, 3400, 3100, 3500];
        let samples: Vec<PerformanceSample> = latencies
            .iter()
            .map(|&latency_ms| PerformanceSample {
                timestamp: chrono::Utc::now(),
                endpoint: "/".to_string(),
                latency_ms,
                within_sla: latency_ms <= 3000,
                status: Some(200),
                content_length: 128,
            })
            .collect();
        let perf = summarize_samples(samples, 3000);
        assert_eq!(perf.sla_violations, 4);
        assert_eq!(perf.average_ms, 3000.0);
        assert_eq!(perf.availability_pct, 100.0);
        assert_eq!(perf.grade, PerformanceGrade::D);
    }
}
