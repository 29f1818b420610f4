//! The health monitor: owns one target's probe sessions
//!
//! One session runs at a time; coincident triggers fail fast with
//! `CheckInFlight` rather than queueing. The latest verdict always
//! reflects the last completed session.

use crate::prober::Prober;
use crate::reports::ReportWriter;
use crate::scoring::{self, ScoreInputs};
use crate::session;
use crate::ui;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;
use warden_alerts::AlertDispatcher;
use warden_autofix::AutoFixEngine;
use warden_bus::{CoordinationBus, Envelope, FixAppliedEvent, MessageKind, CORE_AGENT_ID};
use warden_common::{
    BreakerConfig, BreakerError, BreakerRegistry, BreakerStatus, Config, EndpointDescriptor,
    EndpointsSummary, Error, HealthVerdict, IssueKind, IssueSeverity, MockDataCheck,
    OverallHealth, PerformanceCheck, PerformanceGrade, PerformanceSample, ProbeOutcome, Result,
    SiteCheck, UiCheck,
};

/// Samples retained in the in-memory performance ring
const RING_CAPACITY: usize = 200;

pub struct HealthMonitor {
    config: Config,
    prober: Prober,
    breakers: Arc<BreakerRegistry>,
    autofix: Option<Arc<AutoFixEngine>>,
    dispatcher: Arc<AlertDispatcher>,
    bus: Arc<CoordinationBus>,
    reports: ReportWriter,
    in_flight: AtomicBool,
    consecutive_failures: AtomicU32,
    latest: parking_lot::RwLock<Option<HealthVerdict>>,
    samples: parking_lot::Mutex<VecDeque<PerformanceSample>>,
}

impl HealthMonitor {
    pub fn new(
        config: Config,
        bus: Arc<CoordinationBus>,
        dispatcher: Arc<AlertDispatcher>,
        autofix: Option<Arc<AutoFixEngine>>,
    ) -> Result<Self> {
        let prober = Prober::new(config.target.base_url.clone())?;
        let reports = ReportWriter::new(&config.paths.reports_dir)?;

        // breakers exist for the life of the run, one per endpoint
        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
        for endpoint in &config.target.endpoints {
            breakers.get_or_create(&endpoint.path);
        }

        Ok(HealthMonitor {
            config,
            prober,
            breakers,
            autofix,
            dispatcher,
            bus,
            reports,
            in_flight: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            latest: parking_lot::RwLock::new(None),
            samples: parking_lot::Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
        })
    }

    pub fn breakers(&self) -> Arc<BreakerRegistry> {
        self.breakers.clone()
    }

    /// The last completed verdict; readers never see a partial one.
    pub fn latest(&self) -> Option<HealthVerdict> {
        self.latest.read().clone()
    }

    pub fn recent_samples(&self) -> Vec<PerformanceSample> {
        self.samples.lock().iter().cloned().collect()
    }

    /// Run one probe session now. Fails fast when a session is already
    /// in flight; coincident triggers are dropped, never queued.
    pub async fn force_check(&self) -> Result<HealthVerdict> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(Error::CheckInFlight);
        }
        let verdict = self.run_session().await;
        self.in_flight.store(false, Ordering::SeqCst);
        Ok(verdict)
    }

    /// One full session. Step failures degrade their dimension; only a
    /// session-wide fault produces an error verdict.
    async fn run_session(&self) -> HealthVerdict {
        let check_id = Uuid::new_v4();
        info!("probe session {} starting", check_id);

        match self.run_steps(check_id).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!("probe session {} failed: {}", check_id, e);
                let verdict = self.error_verdict(check_id, &e);
                self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
                // publish dispatches the system-failure issue
                self.publish(&verdict);
                verdict
            }
        }
    }

    async fn run_steps(&self, check_id: Uuid) -> Result<HealthVerdict> {
        let monitor_config = &self.config.monitor;

        // 1. baseline reachability
        let site = self.site_check().await;

        // 2. endpoint sweep, each call through its breaker
        let endpoints = self.endpoint_sweep().await;

        // 3. external UI harness
        let mut ui_check = ui::run_ui_probe(&monitor_config.ui).await;

        // 4. accessibility rubric over the root document
        ui_check.accessibility = self.accessibility_check().await;

        // 5. performance sampling
        let performance = session::sample_performance(
            &self.prober,
            monitor_config.performance_samples,
            Duration::from_millis(monitor_config.sample_spacing_ms),
            monitor_config.sla_ms,
        )
        .await;
        self.extend_ring(&performance.samples);

        // 6. mock-data verification
        let mock_data =
            session::verify_mock_data(&self.prober, &self.config.target.mock_endpoints).await;

        // 7. automated remediation for endpoints whose breaker tripped
        let (auto_fixes, engine_gated) = self.remediate(&endpoints.results).await;
        if engine_gated {
            warn!("fix engine breaker open; remediation skipped this session");
        }

        // 8. issue derivation
        let breaker_snapshots = self.breakers.snapshots().await;
        let open_breakers: Vec<String> = breaker_snapshots
            .iter()
            .filter(|s| s.status == BreakerStatus::Open)
            .map(|s| s.name.clone())
            .collect();
        let prior_failures = self.consecutive_failures.load(Ordering::SeqCst);
        let critical_issues = session::derive_issues(
            &site,
            &endpoints,
            &ui_check,
            &performance,
            &mock_data,
            &open_breakers,
            prior_failures,
            monitor_config.instability_threshold,
        );

        // 9. scoring
        let inputs = ScoreInputs {
            site: &site,
            endpoints: &endpoints,
            ui: &ui_check,
            performance: &performance,
            mock_data: &mock_data,
            open_breakers: open_breakers.len(),
            total_breakers: breaker_snapshots.len(),
            sla_ms: monitor_config.sla_ms,
        };
        let score = scoring::composite_score(&inputs);
        let overall = OverallHealth::from_score(score);
        let recommendations = scoring::recommendations(&inputs);

        if matches!(overall, OverallHealth::Critical | OverallHealth::Error) {
            self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
        } else {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }

        let verdict = HealthVerdict {
            check_id,
            timestamp: Utc::now(),
            overall,
            score,
            site,
            endpoints,
            ui: ui_check,
            performance,
            mock_data,
            auto_fixes,
            critical_issues,
            recommendations,
            breaker_snapshots,
        };

        info!(
            "probe session {} complete: {} ({:.1})",
            check_id,
            verdict.overall.as_str(),
            verdict.score
        );

        // 10. publish
        self.publish(&verdict);
        Ok(verdict)
    }

    async fn site_check(&self) -> SiteCheck {
        let root = EndpointDescriptor::new("/", "site");
        let outcome = self.prober.probe(&root).await;
        SiteCheck {
            available: outcome.healthy,
            status: outcome.status,
            latency_ms: outcome.latency_ms,
            error: outcome.error,
        }
    }

    async fn endpoint_sweep(&self) -> EndpointsSummary {
        let mut results = Vec::with_capacity(self.config.target.endpoints.len());
        for endpoint in &self.config.target.endpoints {
            let breaker = self.breakers.get_or_create(&endpoint.path);
            let guarded = breaker
                .execute(|| async {
                    let outcome = self.prober.probe(endpoint).await;
                    if outcome.healthy {
                        Ok(outcome)
                    } else {
                        Err(outcome)
                    }
                })
                .await;
            let outcome = match guarded {
                Ok(mut outcome) | Err(BreakerError::Operation(mut outcome)) => {
                    outcome.breaker_state = breaker.status().await;
                    outcome
                }
                Err(BreakerError::Open) => ProbeOutcome::breaker_rejected(&endpoint.path),
            };
            results.push(outcome);
        }
        EndpointsSummary::from_results(results)
    }

    async fn accessibility_check(&self) -> Option<warden_common::AccessibilityCheck> {
        let url = format!("{}/", self.prober.base_url());
        let response = self
            .prober
            .client()
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .ok()?;
        let html = response.text().await.ok()?;
        Some(crate::accessibility::evaluate(&html))
    }

    /// Remediation engages once an endpoint's breaker has tripped;
    /// one-off failures are left to the next sweep.
    async fn remediate(
        &self,
        results: &[ProbeOutcome],
    ) -> (Vec<warden_common::FixRecord>, bool) {
        let engine = match &self.autofix {
            Some(engine) if self.config.autofix.enabled => engine,
            _ => return (Vec::new(), false),
        };
        let tripped: Vec<ProbeOutcome> = results
            .iter()
            .filter(|o| !o.healthy && o.breaker_state == BreakerStatus::Open)
            .cloned()
            .collect();
        if tripped.is_empty() {
            return (Vec::new(), false);
        }
        let report = engine.remediate(&tripped, &self.breakers).await;
        (report.records, report.engine_gated)
    }

    fn extend_ring(&self, samples: &[PerformanceSample]) {
        let mut ring = self.samples.lock();
        for sample in samples {
            if ring.len() == RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(sample.clone());
        }
    }

    /// Write, cache, broadcast, and alert. Failures here never fail
    /// the session.
    fn publish(&self, verdict: &HealthVerdict) {
        if let Err(e) = self.reports.write_verdict(verdict) {
            warn!("verdict write failed: {}", e);
        }
        *self.latest.write() = Some(verdict.clone());

        let summary = warden_common::VerdictSummary::from(verdict);
        match serde_json::to_value(&summary) {
            Ok(data) => {
                self.bus
                    .broadcast(&Envelope::new(MessageKind::HealthUpdate, CORE_AGENT_ID, data));
            }
            Err(e) => warn!("health update serialization failed: {}", e),
        }

        for fix in &verdict.auto_fixes {
            let event = FixAppliedEvent {
                pattern: fix.pattern_key.clone(),
                action: fix.action,
                success: fix.success,
                endpoint: Some(fix.endpoint.clone()),
                message: Some(fix.message.clone()),
            };
            if let Ok(data) = serde_json::to_value(&event) {
                self.bus
                    .broadcast(&Envelope::new(MessageKind::FixApplied, CORE_AGENT_ID, data));
            }
        }

        self.dispatcher.dispatch_issues(&verdict.critical_issues);
        self.dispatcher.settle(verdict.overall);
    }

    fn error_verdict(&self, check_id: Uuid, error: &Error) -> HealthVerdict {
        HealthVerdict {
            check_id,
            timestamp: Utc::now(),
            overall: OverallHealth::Error,
            score: 0.0,
            site: SiteCheck {
                available: false,
                status: None,
                latency_ms: 0,
                error: Some(error.to_string()),
            },
            endpoints: EndpointsSummary {
                healthy: 0,
                total: self.config.target.endpoints.len(),
                percent: 0.0,
                results: Vec::new(),
            },
            ui: UiCheck::skipped(),
            performance: PerformanceCheck {
                samples: Vec::new(),
                average_ms: 0.0,
                sla_violations: 0,
                availability_pct: 0.0,
                grade: PerformanceGrade::F,
            },
            mock_data: MockDataCheck {
                working: 0,
                total: self.config.target.mock_endpoints.len(),
                percent: 0.0,
                results: Vec::new(),
            },
            auto_fixes: Vec::new(),
            critical_issues: vec![warden_common::CriticalIssue {
                kind: IssueKind::SystemFailure,
                severity: IssueSeverity::Critical,
                message: format!("probe session aborted: {}", error),
                requires_human_intervention: true,
                affected_endpoints: Vec::new(),
                suggested_actions: session::suggested_actions(IssueKind::SystemFailure),
            }],
            recommendations: Vec::new(),
            breaker_snapshots: Vec::new(),
        }
    }
}
