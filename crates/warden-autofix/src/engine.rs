//! Fix selection, application, and learning
//!
//! For each failing outcome the engine derives the pattern key, prefers
//! a stored pattern whose track record clears the success bar, and
//! otherwise walks a fixed fallback ladder. Every application is folded
//! back into the knowledge store. The whole engine runs behind its own
//! circuit breaker so a remediation storm trips the gate instead of
//! hammering the target's admin surface.

use crate::actions::{self, FixContext};
use crate::patterns::{pattern_key, pattern_metadata};
use crate::store::KnowledgeStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use warden_common::config::AutoFixConfig;
use warden_common::{
    BreakerConfig, BreakerError, BreakerRegistry, CircuitBreaker, Error, FixActionKind, FixRecord,
    ProbeOutcome, Result,
};

/// Actions tried in order when no learned pattern clears the bar
pub const FALLBACK_LADDER: [FixActionKind; 4] = [
    FixActionKind::ForceHealthCheck,
    FixActionKind::ClearCache,
    FixActionKind::WarmUpApplication,
    FixActionKind::ResetCircuitBreaker,
];

/// What a remediation pass did
#[derive(Debug, Default)]
pub struct RemediationReport {
    pub records: Vec<FixRecord>,
    /// The fix-engine breaker was open and at least one failing
    /// outcome went unremediated
    pub engine_gated: bool,
}

impl RemediationReport {
    pub fn successes(&self) -> usize {
        self.records.iter().filter(|r| r.success).count()
    }
}

/// Pattern-matched remediation engine
pub struct AutoFixEngine {
    client: reqwest::Client,
    base_url: String,
    config: AutoFixConfig,
    store: Arc<KnowledgeStore>,
    guard: CircuitBreaker,
}

impl AutoFixEngine {
    pub fn new(
        base_url: impl Into<String>,
        config: AutoFixConfig,
        store: Arc<KnowledgeStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(warden_common::config::USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        let guard = CircuitBreaker::new(
            "auto-fix-engine",
            BreakerConfig {
                failure_threshold: config.breaker_failure_threshold,
                recovery_timeout: Duration::from_secs(config.breaker_recovery_secs),
                success_threshold: 2,
            },
        );
        Ok(AutoFixEngine {
            client,
            base_url: base_url.into(),
            config,
            store,
            guard,
        })
    }

    pub fn store(&self) -> Arc<KnowledgeStore> {
        self.store.clone()
    }

    /// Attempt remediation for every failing outcome in the sweep.
    pub async fn remediate(
        &self,
        outcomes: &[ProbeOutcome],
        breakers: &BreakerRegistry,
    ) -> RemediationReport {
        let mut report = RemediationReport::default();
        for outcome in outcomes.iter().filter(|o| !o.healthy) {
            let guarded = self
                .guard
                .execute(|| async {
                    let records = self.attempt_fix(outcome, breakers).await;
                    if records.iter().any(|r| r.success) {
                        Ok(records)
                    } else {
                        Err(records)
                    }
                })
                .await;

            match guarded {
                Ok(records) => report.records.extend(records),
                Err(BreakerError::Operation(records)) => report.records.extend(records),
                Err(BreakerError::Open) => {
                    warn!(
                        "fix engine breaker open; skipping remediation for {}",
                        outcome.endpoint
                    );
                    report.engine_gated = true;
                }
            }
        }
        report
    }

    /// One endpoint's remediation: learned pattern first, then ladder.
    async fn attempt_fix(
        &self,
        outcome: &ProbeOutcome,
        breakers: &BreakerRegistry,
    ) -> Vec<FixRecord> {
        let key = pattern_key(outcome);
        let metadata = pattern_metadata(key, outcome);
        let ctx = FixContext {
            client: &self.client,
            base_url: &self.base_url,
            endpoint: &outcome.endpoint,
            baseline_latency_ms: outcome.latency_ms,
            breakers,
            config: &self.config,
            pattern_key: key,
        };

        if let Some(pattern) = self.store.get(key) {
            if pattern.success_rate > self.config.min_success_rate && pattern.applied_count >= 1 {
                info!(
                    "applying learned fix {} for '{}' ({:.0}% over {} runs)",
                    pattern.action.as_str(),
                    key,
                    pattern.success_rate * 100.0,
                    pattern.applied_count
                );
                let started = Instant::now();
                let applied = actions::apply(pattern.action, &ctx).await;
                self.store
                    .record(key, pattern.action, applied.success, metadata);
                return vec![FixRecord {
                    pattern_key: key.to_string(),
                    endpoint: outcome.endpoint.clone(),
                    action: pattern.action,
                    success: applied.success,
                    message: applied.message,
                    duration_ms: started.elapsed().as_millis() as u64,
                    timestamp: Utc::now(),
                }];
            }
            debug!(
                "stored pattern for '{}' below success bar ({:.0}%), using ladder",
                key,
                pattern.success_rate * 100.0
            );
        }

        let mut records = Vec::new();
        for action in FALLBACK_LADDER {
            let started = Instant::now();
            let applied = actions::apply(action, &ctx).await;
            let success = applied.success;
            records.push(FixRecord {
                pattern_key: key.to_string(),
                endpoint: outcome.endpoint.clone(),
                action,
                success,
                message: applied.message,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
            if success {
                info!("fallback {} fixed '{}' on {}", action.as_str(), key, outcome.endpoint);
                self.store.record(key, action, true, metadata);
                break;
            }
        }
        records
    }
}
