//! Failure classification into stable pattern keys
//!
//! The key identifies the class of failure for fix selection. The
//! ladder is ordered; the first matching rule wins.

use warden_common::{BreakerStatus, PatternMetadata, ProbeErrorKind, ProbeOutcome, Severity};

/// Derive the pattern key for a failed probe outcome.
pub fn pattern_key(outcome: &ProbeOutcome) -> &'static str {
    match outcome.status {
        Some(503) => return "service-unavailable",
        Some(502) => return "bad-gateway",
        Some(500) => return "internal-server-error",
        Some(429) => return "rate-limit-exceeded",
        Some(404) => return "not-found",
        _ => {}
    }

    if let Some(error) = &outcome.error {
        let error = error.to_ascii_lowercase();
        if error.contains("timeout") {
            return "timeout-error";
        }
        if error.contains("econnrefused") || error.contains("connection refused") {
            return "connection-refused";
        }
        if error.contains("enotfound") || error.contains("dns") {
            return "dns-resolution-error";
        }
    }

    if outcome.latency_ms > 10_000 {
        return "slow-response";
    }
    if outcome.breaker_state == BreakerStatus::Open {
        return "circuit-breaker-open";
    }
    "unknown-error"
}

/// Severity attached to a pattern's metadata, keyed off the failure class.
pub fn severity_for_key(key: &str) -> Severity {
    match key {
        "service-unavailable" | "bad-gateway" | "internal-server-error" => Severity::Critical,
        "connection-refused" | "dns-resolution-error" | "timeout-error" => Severity::High,
        "rate-limit-exceeded" | "slow-response" | "circuit-breaker-open" => Severity::Medium,
        _ => Severity::Low,
    }
}

/// Build pattern metadata from the outcome that triggered remediation.
pub fn pattern_metadata(key: &str, outcome: &ProbeOutcome) -> PatternMetadata {
    PatternMetadata {
        severity: Some(severity_for_key(key)),
        endpoint: Some(outcome.endpoint.clone()),
        error_type: outcome.error_kind.map(|kind| {
            match kind {
                ProbeErrorKind::Network => "network",
                ProbeErrorKind::Timeout => "timeout",
                ProbeErrorKind::StatusMismatch => "status-mismatch",
                ProbeErrorKind::BreakerOpen => "breaker-open",
            }
            .to_string()
        }),
        latency_ms: Some(outcome.latency_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_common::BreakerStatus;

    fn outcome(status: Option<u16>, error: Option<&str>, latency_ms: u64) -> ProbeOutcome {
        ProbeOutcome {
            endpoint: "/api/v1/analytics/status".to_string(),
            healthy: false,
            status,
            latency_ms,
            content_length: 0,
            content_type: None,
            error: error.map(str::to_string),
            error_kind: None,
            breaker_state: BreakerStatus::Closed,
        }
    }

    #[test]
    fn status_codes_take_priority() {
        assert_eq!(pattern_key(&outcome(Some(503), None, 0)), "service-unavailable");
        assert_eq!(pattern_key(&outcome(Some(502), None, 0)), "bad-gateway");
        assert_eq!(pattern_key(&outcome(Some(500), None, 0)), "internal-server-error");
        assert_eq!(pattern_key(&outcome(Some(429), None, 0)), "rate-limit-exceeded");
        assert_eq!(pattern_key(&outcome(Some(404), None, 0)), "not-found");
        // status wins even when an error string is present
        assert_eq!(
            pattern_key(&outcome(Some(503), Some("timeout after 10s"), 0)),
            "service-unavailable"
        );
    }

    #[test]
    fn error_text_classification() {
        assert_eq!(
            pattern_key(&outcome(None, Some("request Timeout elapsed"), 100)),
            "timeout-error"
        );
        assert_eq!(
            pattern_key(&outcome(None, Some("tcp connect: ECONNREFUSED"), 100)),
            "connection-refused"
        );
        assert_eq!(
            pattern_key(&outcome(None, Some("dns lookup failed"), 100)),
            "dns-resolution-error"
        );
    }

    #[test]
    fn slow_response_and_breaker_fallbacks() {
        assert_eq!(pattern_key(&outcome(Some(200), None, 10_001)), "slow-response");

        let mut rejected = outcome(None, None, 0);
        rejected.breaker_state = BreakerStatus::Open;
        assert_eq!(pattern_key(&rejected), "circuit-breaker-open");

        assert_eq!(pattern_key(&outcome(Some(418), None, 50)), "unknown-error");
    }

    #[test]
    fn severity_mapping_covers_every_key() {
        assert_eq!(severity_for_key("service-unavailable"), Severity::Critical);
        assert_eq!(severity_for_key("timeout-error"), Severity::High);
        assert_eq!(severity_for_key("slow-response"), Severity::Medium);
        assert_eq!(severity_for_key("unknown-error"), Severity::Low);
    }
}
