//! Shared data model for the Warden supervisor
//!
//! Everything that crosses a subsystem boundary lives here: endpoint
//! descriptors, probe outcomes, health verdicts, critical issues, fix
//! patterns, and performance samples. All externally visible JSON uses
//! camelCase field names.

use crate::circuit_breaker::{BreakerSnapshot, BreakerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a probe session
pub type CheckId = Uuid;

/// Immutable configuration for one monitored endpoint.
///
/// Paths must be unique within a run; duplicates are rejected at
/// configuration load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointDescriptor {
    pub path: String,
    pub name: String,
    pub critical: bool,
    pub timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<Vec<u16>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
}

impl Default for EndpointDescriptor {
    fn default() -> Self {
        EndpointDescriptor {
            path: "/".to_string(),
            name: "root".to_string(),
            critical: false,
            timeout_ms: 10_000,
            expected_status: None,
            headers: Vec::new(),
        }
    }
}

impl EndpointDescriptor {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        EndpointDescriptor {
            path: path.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Whether `status` counts as healthy for this endpoint.
    /// Defaults to 2xx/3xx when no explicit set is configured.
    pub fn status_is_expected(&self, status: u16) -> bool {
        match &self.expected_status {
            Some(expected) => expected.contains(&status),
            None => (200..400).contains(&status),
        }
    }
}

/// Classification of a failed probe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProbeErrorKind {
    Network,
    Timeout,
    StatusMismatch,
    BreakerOpen,
}

/// Result of probing a single endpoint once
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub endpoint: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub latency_ms: u64,
    pub content_length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ProbeErrorKind>,
    pub breaker_state: BreakerStatus,
}

impl ProbeOutcome {
    /// Outcome for a call rejected by an open breaker, with no request issued.
    pub fn breaker_rejected(endpoint: impl Into<String>) -> Self {
        ProbeOutcome {
            endpoint: endpoint.into(),
            healthy: false,
            status: None,
            latency_ms: 0,
            content_length: 0,
            content_type: None,
            error: Some("circuit breaker open".to_string()),
            error_kind: Some(ProbeErrorKind::BreakerOpen),
            breaker_state: BreakerStatus::Open,
        }
    }
}

/// One latency measurement against the SLA threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub latency_ms: u64,
    pub within_sla: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub content_length: u64,
}

/// Severity attached to fix-pattern metadata
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// The remediation actions the auto-fix engine can apply
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FixActionKind {
    ForceHealthCheck,
    ClearCache,
    WarmUpApplication,
    ResetCircuitBreaker,
    RestartService,
}

impl FixActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixActionKind::ForceHealthCheck => "force-health-check",
            FixActionKind::ClearCache => "clear-cache",
            FixActionKind::WarmUpApplication => "warm-up-application",
            FixActionKind::ResetCircuitBreaker => "reset-circuit-breaker",
            FixActionKind::RestartService => "restart-service",
        }
    }
}

/// Context recorded alongside a learned fix pattern
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PatternMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// A learned association between a failure class and a fix action.
///
/// The success rate is an incremental mean over every application of
/// the pattern, so `success_rate * applied_count` is always a whole
/// number of successes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixPattern {
    pub key: String,
    pub action: FixActionKind,
    pub applied_count: u32,
    pub success_rate: f64,
    pub last_applied_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: PatternMetadata,
}

impl FixPattern {
    pub fn first_application(
        key: impl Into<String>,
        action: FixActionKind,
        success: bool,
        metadata: PatternMetadata,
    ) -> Self {
        FixPattern {
            key: key.into(),
            action,
            applied_count: 1,
            success_rate: if success { 1.0 } else { 0.0 },
            last_applied_at: Utc::now(),
            tags: vec!["auto-fix".to_string(), "health-check".to_string()],
            metadata,
        }
    }

    /// Fold one more observed outcome into the running success rate.
    pub fn record_outcome(&mut self, success: bool) {
        let n = self.applied_count as f64;
        let bit = if success { 1.0 } else { 0.0 };
        self.success_rate = (self.success_rate * n + bit) / (n + 1.0);
        self.applied_count += 1;
        self.last_applied_at = Utc::now();
    }
}

/// One fix application recorded in a verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixRecord {
    pub pattern_key: String,
    pub endpoint: String,
    pub action: FixActionKind,
    pub success: bool,
    pub message: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Graded overall result of a probe session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
    Error,
}

impl OverallHealth {
    /// Bands: >=95 excellent, >=85 good, >=70 fair, >=50 poor, else critical.
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            OverallHealth::Excellent
        } else if score >= 85.0 {
            OverallHealth::Good
        } else if score >= 70.0 {
            OverallHealth::Fair
        } else if score >= 50.0 {
            OverallHealth::Poor
        } else {
            OverallHealth::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverallHealth::Excellent => "excellent",
            OverallHealth::Good => "good",
            OverallHealth::Fair => "fair",
            OverallHealth::Poor => "poor",
            OverallHealth::Critical => "critical",
            OverallHealth::Error => "error",
        }
    }
}

/// Letter grade for the performance dimension
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PerformanceGrade {
    A,
    B,
    C,
    D,
    F,
}

impl PerformanceGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceGrade::A => "A",
            PerformanceGrade::B => "B",
            PerformanceGrade::C => "C",
            PerformanceGrade::D => "D",
            PerformanceGrade::F => "F",
        }
    }
}

/// Baseline reachability of the target origin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteCheck {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Endpoint sweep rollup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointsSummary {
    pub healthy: usize,
    pub total: usize,
    pub percent: f64,
    pub results: Vec<ProbeOutcome>,
}

impl EndpointsSummary {
    pub fn from_results(results: Vec<ProbeOutcome>) -> Self {
        let total = results.len();
        let healthy = results.iter().filter(|r| r.healthy).count();
        let percent = if total == 0 {
            100.0
        } else {
            healthy as f64 / total as f64 * 100.0
        };
        EndpointsSummary {
            healthy,
            total,
            percent,
            results,
        }
    }
}

/// Outcome of the external UI test harness
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UiOutcome {
    Passed,
    Failed,
    Error,
    Skipped,
}

/// One rule of the accessibility rubric
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityRule {
    pub name: String,
    pub passed: bool,
}

/// Accessibility rubric evaluation over the root document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityCheck {
    pub score: f64,
    pub passed: bool,
    pub checks: Vec<AccessibilityRule>,
}

/// UI dimension of a verdict: harness outcome plus accessibility rubric
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiCheck {
    pub outcome: UiOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<AccessibilityCheck>,
}

impl UiCheck {
    pub fn skipped() -> Self {
        UiCheck {
            outcome: UiOutcome::Skipped,
            exit_code: None,
            timed_out: false,
            report: None,
            accessibility: None,
        }
    }
}

/// Performance dimension of a verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceCheck {
    pub samples: Vec<PerformanceSample>,
    pub average_ms: f64,
    pub sla_violations: u32,
    pub availability_pct: f64,
    pub grade: PerformanceGrade,
}

/// One mock endpoint verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockEndpointResult {
    pub endpoint: String,
    pub working: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Mock-data dimension of a verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockDataCheck {
    pub working: usize,
    pub total: usize,
    pub percent: f64,
    pub results: Vec<MockEndpointResult>,
}

impl MockDataCheck {
    pub fn from_results(results: Vec<MockEndpointResult>) -> Self {
        let total = results.len();
        let working = results.iter().filter(|r| r.working).count();
        let percent = if total == 0 {
            100.0
        } else {
            working as f64 / total as f64 * 100.0
        };
        MockDataCheck {
            working,
            total,
            percent,
            results,
        }
    }
}

/// Kinds of derived issues
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    SiteDown,
    UiFailure,
    PerformanceCritical,
    SystemicInstability,
    CircuitBreakersOpen,
    MockDataFailure,
    SystemFailure,
    SlaViolation,
    DegradedService,
    PerformanceRecovered,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::SiteDown => "site-down",
            IssueKind::UiFailure => "ui-failure",
            IssueKind::PerformanceCritical => "performance-critical",
            IssueKind::SystemicInstability => "systemic-instability",
            IssueKind::CircuitBreakersOpen => "circuit-breakers-open",
            IssueKind::MockDataFailure => "mock-data-failure",
            IssueKind::SystemFailure => "system-failure",
            IssueKind::SlaViolation => "sla-violation",
            IssueKind::DegradedService => "degraded-service",
            IssueKind::PerformanceRecovered => "performance-recovered",
        }
    }
}

/// Issue severity in a verdict
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Warning,
    Critical,
}

/// A derived issue attached to a verdict; not stored long-term
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalIssue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub message: String,
    pub requires_human_intervention: bool,
    pub affected_endpoints: Vec<String>,
    pub suggested_actions: Vec<String>,
}

/// The immutable result of one complete probe session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthVerdict {
    pub check_id: CheckId,
    pub timestamp: DateTime<Utc>,
    pub overall: OverallHealth,
    pub score: f64,
    pub site: SiteCheck,
    pub endpoints: EndpointsSummary,
    pub ui: UiCheck,
    pub performance: PerformanceCheck,
    pub mock_data: MockDataCheck,
    pub auto_fixes: Vec<FixRecord>,
    pub critical_issues: Vec<CriticalIssue>,
    pub recommendations: Vec<String>,
    pub breaker_snapshots: Vec<BreakerSnapshot>,
}

/// Compact projection of the latest verdict, published alongside it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictSummary {
    pub timestamp: DateTime<Utc>,
    pub overall: OverallHealth,
    pub score: f64,
    pub site_available: bool,
    pub endpoints_healthy: f64,
    pub performance_grade: PerformanceGrade,
    pub critical_issues: usize,
    pub auto_fixes_applied: usize,
}

impl From<&HealthVerdict> for VerdictSummary {
    fn from(v: &HealthVerdict) -> Self {
        VerdictSummary {
            timestamp: v.timestamp,
            overall: v.overall,
            score: v.score,
            site_available: v.site.available,
            endpoints_healthy: v.endpoints.percent,
            performance_grade: v.performance.grade,
            critical_issues: v.critical_issues.len(),
            auto_fixes_applied: v.auto_fixes.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_expected_status_is_2xx_3xx() {
        let ep = EndpointDescriptor::new("/api/health", "health");
        assert!(ep.status_is_expected(200));
        assert!(ep.status_is_expected(304));
        assert!(!ep.status_is_expected(404));
        assert!(!ep.status_is_expected(500));
    }

    #[test]
    fn explicit_expected_status_wins() {
        let mut ep = EndpointDescriptor::new("/auth", "auth");
        ep.expected_status = Some(vec![401]);
        assert!(ep.status_is_expected(401));
        assert!(!ep.status_is_expected(200));
    }

    #[test]
    fn score_band_mapping() {
        assert_eq!(OverallHealth::from_score(100.0), OverallHealth::Excellent);
        assert_eq!(OverallHealth::from_score(95.0), OverallHealth::Excellent);
        assert_eq!(OverallHealth::from_score(94.9), OverallHealth::Good);
        assert_eq!(OverallHealth::from_score(85.0), OverallHealth::Good);
        assert_eq!(OverallHealth::from_score(70.0), OverallHealth::Fair);
        assert_eq!(OverallHealth::from_score(50.0), OverallHealth::Poor);
        assert_eq!(OverallHealth::from_score(49.9), OverallHealth::Critical);
    }

    #[test]
    fn success_rate_is_incremental_mean() {
        let mut p = FixPattern::first_application(
            "service-unavailable",
            FixActionKind::ForceHealthCheck,
            true,
            PatternMetadata::default(),
        );
        assert_eq!(p.applied_count, 1);
        assert_eq!(p.success_rate, 1.0);

        p.record_outcome(false);
        assert_eq!(p.applied_count, 2);
        assert!((p.success_rate - 0.5).abs() < f64::EPSILON);

        p.record_outcome(true);
        assert_eq!(p.applied_count, 3);
        // 2 successes out of 3
        assert!((p.success_rate * 3.0 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn issue_kind_wire_names_are_kebab_case() {
        let json = serde_json::to_string(&IssueKind::CircuitBreakersOpen).unwrap();
        assert_eq!(json, "\"circuit-breakers-open\"");
        let json = serde_json::to_string(&FixActionKind::ForceHealthCheck).unwrap();
        assert_eq!(json, "\"force-health-check\"");
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // success_rate * applied_count stays a whole number of
        // successes no matter the outcome sequence
        #[test]
        fn success_rate_never_drifts(outcomes in proptest::collection::vec(any::<bool>(), 1..64)) {
            let mut iter = outcomes.iter().copied();
            let first = iter.next().unwrap();
            let mut pattern = FixPattern::first_application(
                "timeout-error",
                FixActionKind::WarmUpApplication,
                first,
                PatternMetadata::default(),
            );
            let mut successes = u32::from(first);
            for outcome in iter {
                pattern.record_outcome(outcome);
                successes += u32::from(outcome);
            }

            prop_assert_eq!(pattern.applied_count as usize, outcomes.len());
            let reconstructed = pattern.success_rate * pattern.applied_count as f64;
            prop_assert!((reconstructed - successes as f64).abs() < 1e-6);
            prop_assert!((0.0..=1.0).contains(&pattern.success_rate));
        }
    }
}
