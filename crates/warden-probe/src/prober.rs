//! Single-endpoint HTTP prober
//!
//! One GET per call, no retries; retry policy belongs to the caller.
//! Failures are captured in the outcome, never propagated.

use std::time::{Duration, Instant};
use tracing::debug;
use warden_common::{
    BreakerStatus, EndpointDescriptor, Error, ProbeErrorKind, ProbeOutcome, Result,
};

/// Issues probes against one target origin
pub struct Prober {
    client: reqwest::Client,
    base_url: String,
}

impl Prober {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(warden_common::config::USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        Ok(Prober {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe one endpoint. Latency is wall-clock from issue to final
    /// body byte; on error it is elapsed-until-error.
    pub async fn probe(&self, endpoint: &EndpointDescriptor) -> ProbeOutcome {
        let url = format!("{}{}", self.base_url, endpoint.path);
        let mut request = self
            .client
            .get(&url)
            .timeout(Duration::from_millis(endpoint.timeout_ms));
        for (name, value) in &endpoint.headers {
            request = request.header(name, value);
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return self.error_outcome(endpoint, started, e),
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return self.error_outcome(endpoint, started, e),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let healthy = endpoint.status_is_expected(status);
        debug!(
            "probe {} -> {} in {}ms ({} bytes)",
            endpoint.path, status, latency_ms, body.len()
        );

        ProbeOutcome {
            endpoint: endpoint.path.clone(),
            healthy,
            status: Some(status),
            latency_ms,
            content_length: body.len() as u64,
            content_type,
            error: (!healthy).then(|| format!("unexpected status {}", status)),
            error_kind: (!healthy).then_some(ProbeErrorKind::StatusMismatch),
            breaker_state: BreakerStatus::Closed,
        }
    }

    fn error_outcome(
        &self,
        endpoint: &EndpointDescriptor,
        started: Instant,
        error: reqwest::Error,
    ) -> ProbeOutcome {
        let latency_ms = started.elapsed().as_millis() as u64;
        let kind = if error.is_timeout() {
            ProbeErrorKind::Timeout
        } else {
            ProbeErrorKind::Network
        };
        let message = match kind {
            ProbeErrorKind::Timeout => {
                format!("timeout after {}ms", endpoint.timeout_ms)
            }
            _ => error.to_string(),
        };
        debug!("probe {} failed: {}", endpoint.path, message);
        ProbeOutcome {
            endpoint: endpoint.path.clone(),
            healthy: false,
            status: None,
            latency_ms,
            content_length: 0,
            content_type: None,
            error: Some(message),
            error_kind: Some(kind),
            breaker_state: BreakerStatus::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(p: &str, timeout_ms: u64) -> EndpointDescriptor {
        let mut ep = EndpointDescriptor::new(p, "test");
        ep.timeout_ms = timeout_ms;
        ep
    }

    #[tokio::test]
    async fn healthy_probe_records_status_and_length() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .and(header("user-agent", "Warden-HealthMonitor/2.0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("{\"ok\":true}", "application/json"),
            )
            .mount(&server)
            .await;

        let prober = Prober::new(server.uri()).unwrap();
        let outcome = prober.probe(&endpoint("/api/health", 5000)).await;

        assert!(outcome.healthy);
        assert_eq!(outcome.status, Some(200));
        assert_eq!(outcome.content_length, 11);
        assert_eq!(outcome.content_type.as_deref(), Some("application/json"));
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn unexpected_status_is_a_mismatch_not_a_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/status"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let prober = Prober::new(server.uri()).unwrap();
        let outcome = prober.probe(&endpoint("/api/v1/status", 5000)).await;

        assert!(!outcome.healthy);
        assert_eq!(outcome.status, Some(503));
        assert_matches!(outcome.error_kind, Some(ProbeErrorKind::StatusMismatch));
    }

    #[tokio::test]
    async fn slow_response_classifies_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;

        let prober = Prober::new(server.uri()).unwrap();
        let outcome = prober.probe(&endpoint("/slow", 50)).await;

        assert!(!outcome.healthy);
        assert_eq!(outcome.status, None);
        assert_matches!(outcome.error_kind, Some(ProbeErrorKind::Timeout));
        assert!(outcome.error.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        // no server on this port
        let prober = Prober::new("http://127.0.0.1:1").unwrap();
        let outcome = prober.probe(&endpoint("/", 2000)).await;

        assert!(!outcome.healthy);
        assert_matches!(outcome.error_kind, Some(ProbeErrorKind::Network));
    }

    #[tokio::test]
    async fn custom_expected_status_set_is_honored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut ep = endpoint("/auth/me", 5000);
        ep.expected_status = Some(vec![401]);
        let prober = Prober::new(server.uri()).unwrap();
        let outcome = prober.probe(&ep).await;
        assert!(outcome.healthy);
    }
}
