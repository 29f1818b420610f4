//! The SLA monitor loop: burst sampling, compliance transitions,
//! edge-triggered alerts, and daily rollups

use crate::stats::{aggregate, LatencyStats};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use warden_alerts::{Alert, AlertDispatcher, AlertSeverity};
use warden_bus::{CoordinationBus, Envelope, MessageKind, Priority, CORE_AGENT_ID};
use warden_common::config::SlaConfig;
use warden_common::{Error, IssueKind, PerformanceSample, Result};

/// Samples retained in the in-memory ring
const RING_CAPACITY: usize = 200;

/// Tri-valued compliance state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceState {
    Compliant,
    Degraded,
    Violated,
}

/// Edge-triggered alert bits; each latches on entry and clears only
/// on compliant recovery.
#[derive(Debug, Default, Clone, Copy)]
struct AlertBits {
    sla_violation: bool,
    critical_performance: bool,
    degraded_service: bool,
}

impl AlertBits {
    fn any(&self) -> bool {
        self.sla_violation || self.critical_performance || self.degraded_service
    }
}

/// Result of one monitor tick
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaTickReport {
    pub timestamp: DateTime<Utc>,
    pub compliance: ComplianceState,
    pub stats: LatencyStats,
    pub endpoints: Vec<String>,
}

/// Aggregated rollup for a report window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaRollup {
    pub generated_at: DateTime<Utc>,
    pub window_hours: u64,
    pub stats: LatencyStats,
}

/// Per-day accumulation appended under `reports/performance/`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailySummary {
    date: NaiveDate,
    ticks: u64,
    samples: u64,
    successful: u64,
    violations: u64,
    average_ms: f64,
    compliant_ticks: u64,
    degraded_ticks: u64,
    violated_ticks: u64,
}

pub struct SlaMonitor {
    client: reqwest::Client,
    base_url: String,
    config: SlaConfig,
    dispatcher: Arc<AlertDispatcher>,
    bus: Arc<CoordinationBus>,
    performance_dir: PathBuf,
    ring: Mutex<VecDeque<PerformanceSample>>,
    window: Mutex<VecDeque<Vec<PerformanceSample>>>,
    bits: Mutex<AlertBits>,
}

impl SlaMonitor {
    pub fn new(
        base_url: impl Into<String>,
        config: SlaConfig,
        reports_dir: &Path,
        dispatcher: Arc<AlertDispatcher>,
        bus: Arc<CoordinationBus>,
    ) -> Result<Self> {
        let performance_dir = reports_dir.join("performance");
        std::fs::create_dir_all(&performance_dir)?;
        let client = reqwest::Client::builder()
            .user_agent(warden_common::config::USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        Ok(SlaMonitor {
            client,
            base_url: base_url.into(),
            config,
            dispatcher,
            bus,
            performance_dir,
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            window: Mutex::new(VecDeque::new()),
            bits: Mutex::new(AlertBits::default()),
        })
    }

    /// Spawn the periodic loop. Shutdown is observed between ticks, so
    /// an in-flight tick always completes.
    pub fn spawn(
        self: Arc<Self>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_secs(self.config.interval_minutes * 60);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.tick().await;
                        debug!(
                            "sla tick: {:?}, {} violations over {} samples",
                            report.compliance, report.stats.violations, report.stats.total
                        );
                    }
                    _ = shutdown.changed() => {
                        info!("sla monitor stopping");
                        break;
                    }
                }
            }
        })
    }

    /// One monitor tick: sample every endpoint, aggregate the window,
    /// update compliance, fire edge-triggered alerts, write reports.
    pub async fn tick(&self) -> SlaTickReport {
        let mut collected = Vec::new();
        for endpoint in &self.config.endpoints {
            collected.extend(self.sample_endpoint(endpoint).await);
        }

        {
            let mut ring = self.ring.lock();
            for sample in &collected {
                if ring.len() == RING_CAPACITY {
                    ring.pop_front();
                }
                ring.push_back(sample.clone());
            }
        }

        let window_samples: Vec<PerformanceSample> = {
            let mut window = self.window.lock();
            window.push_back(collected);
            while window.len() > self.config.rolling_window_ticks as usize {
                window.pop_front();
            }
            window.iter().flatten().cloned().collect()
        };

        let stats = aggregate(&window_samples);
        let compliance = self.apply_compliance(&stats);
        let report = SlaTickReport {
            timestamp: Utc::now(),
            compliance,
            stats,
            endpoints: self.config.endpoints.clone(),
        };

        if let Err(e) = self.write_reports(&report) {
            warn!("performance report write failed: {}", e);
        }
        report
    }

    /// Sequential burst against one endpoint.
    async fn sample_endpoint(&self, endpoint: &str) -> Vec<PerformanceSample> {
        let mut samples = Vec::with_capacity(self.config.samples_per_tick as usize);
        for i in 0..self.config.samples_per_tick {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.sample_spacing_ms)).await;
            }
            let url = format!("{}{}", self.base_url, endpoint);
            let started = std::time::Instant::now();
            let result = self
                .client
                .get(&url)
                .timeout(Duration::from_millis(self.config.sla_ms.saturating_mul(4).max(10_000)))
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
            samples.push(PerformanceSample {
                timestamp: Utc::now(),
                endpoint: endpoint.to_string(),
                latency_ms,
                within_sla: success && latency_ms <= self.config.sla_ms,
                status,
                content_length,
            });
        }
        samples
    }

    /// Compliance classification plus the edge-triggered alert latch.
    fn apply_compliance(&self, stats: &LatencyStats) -> ComplianceState {
        let violation_rate = if stats.total == 0 {
            1.0
        } else {
            stats.violations as f64 / stats.total as f64
        };
        let compliance = if violation_rate <= self.config.tolerance {
            ComplianceState::Compliant
        } else if violation_rate <= self.config.critical_threshold {
            ComplianceState::Degraded
        } else {
            ComplianceState::Violated
        };

        let mut bits = self.bits.lock();
        match compliance {
            ComplianceState::Violated => {
                if !bits.sla_violation {
                    bits.sla_violation = true;
                    self.dispatcher.dispatch(Alert::new(
                        IssueKind::SlaViolation,
                        AlertSeverity::Critical,
                        "sla-violation",
                        format!(
                            "{:.0}% of samples over the {}ms SLA",
                            violation_rate * 100.0,
                            self.config.sla_ms
                        ),
                    ));
                    self.broadcast_violation(stats, compliance);
                }
            }
            ComplianceState::Degraded => {
                if !bits.degraded_service {
                    bits.degraded_service = true;
                    self.dispatcher.dispatch(Alert::new(
                        IssueKind::DegradedService,
                        AlertSeverity::Warning,
                        "degraded-service",
                        format!("{:.0}% of samples over the SLA", violation_rate * 100.0),
                    ));
                    self.broadcast_violation(stats, compliance);
                }
            }
            ComplianceState::Compliant => {
                if bits.any() {
                    info!("sla compliance recovered; clearing alert latch");
                    *bits = AlertBits::default();
                    self.dispatcher.dispatch(Alert::new(
                        IssueKind::PerformanceRecovered,
                        AlertSeverity::Info,
                        "performance-recovered",
                        "all SLA alert conditions cleared".to_string(),
                    ));
                }
            }
        }

        let critical_avg = self.config.sla_ms as f64 * self.config.critical_avg_factor;
        if compliance != ComplianceState::Compliant
            && stats.average_ms > critical_avg
            && !bits.critical_performance
        {
            bits.critical_performance = true;
            self.dispatcher.dispatch(Alert::new(
                IssueKind::PerformanceCritical,
                AlertSeverity::Critical,
                "performance-critical",
                format!(
                    "average latency {:.0}ms exceeds {:.0}ms",
                    stats.average_ms, critical_avg
                ),
            ));
        }

        compliance
    }

    fn broadcast_violation(&self, stats: &LatencyStats, compliance: ComplianceState) {
        let data = serde_json::json!({
            "compliance": compliance,
            "violations": stats.violations,
            "totalSamples": stats.total,
            "averageMs": stats.average_ms,
            "p95Ms": stats.p95_ms,
            "slaMs": self.config.sla_ms,
        });
        self.bus.broadcast(
            &Envelope::new(MessageKind::PerformanceViolation, CORE_AGENT_ID, data)
                .with_priority(Priority::High),
        );
    }

    fn write_reports(&self, report: &SlaTickReport) -> Result<()> {
        let latest = self.performance_dir.join("latest.json");
        let raw = serde_json::to_string_pretty(report)?;
        let tmp = latest.with_extension("json.tmp");
        std::fs::write(&tmp, &raw).map_err(|e| Error::SinkWrite(e.to_string()))?;
        std::fs::rename(&tmp, &latest).map_err(|e| Error::SinkWrite(e.to_string()))?;

        self.roll_daily(report)
    }

    /// Merge this tick into the per-day summary file.
    fn roll_daily(&self, report: &SlaTickReport) -> Result<()> {
        let date = report.timestamp.date_naive();
        let path = self
            .performance_dir
            .join(format!("daily-summary-{}.json", date.format("%Y-%m-%d")));

        let mut summary = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str::<DailySummary>(&raw).unwrap_or_else(|_| empty_summary(date))
        } else {
            empty_summary(date)
        };

        let new_samples = report.stats.total as u64;
        let combined = summary.samples + new_samples;
        if combined > 0 {
            summary.average_ms = (summary.average_ms * summary.samples as f64
                + report.stats.average_ms * new_samples as f64)
                / combined as f64;
        }
        summary.ticks += 1;
        summary.samples = combined;
        summary.successful += report.stats.successful as u64;
        summary.violations += report.stats.violations as u64;
        match report.compliance {
            ComplianceState::Compliant => summary.compliant_ticks += 1,
            ComplianceState::Degraded => summary.degraded_ticks += 1,
            ComplianceState::Violated => summary.violated_ticks += 1,
        }

        std::fs::write(&path, serde_json::to_string_pretty(&summary)?)
            .map_err(|e| Error::SinkWrite(e.to_string()))?;
        Ok(())
    }

    /// Rollup over the in-memory ring for the given window.
    pub fn report_window(&self, hours: u64) -> SlaRollup {
        let cutoff = Utc::now() - chrono::Duration::hours(hours as i64);
        let samples: Vec<PerformanceSample> = self
            .ring
            .lock()
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect();
        SlaRollup {
            generated_at: Utc::now(),
            window_hours: hours,
            stats: aggregate(&samples),
        }
    }
}

fn empty_summary(date: NaiveDate) -> DailySummary {
    DailySummary {
        date,
        ticks: 0,
        samples: 0,
        successful: 0,
        violations: 0,
        average_ms: 0.0,
        compliant_ticks: 0,
        degraded_ticks: 0,
        violated_ticks: 0,
    }
}

/// Offline rollup for the CLI: merge the daily summaries covering the
/// window into one aggregate.
pub fn offline_report(reports_dir: &Path, hours: u64) -> Result<serde_json::Value> {
    let performance_dir = reports_dir.join("performance");
    let days = (hours + 23) / 24;
    let today = Utc::now().date_naive();

    let mut merged: Vec<DailySummary> = Vec::new();
    for offset in 0..=days {
        let date = today - chrono::Duration::days(offset as i64);
        let path = performance_dir.join(format!("daily-summary-{}.json", date.format("%Y-%m-%d")));
        if !path.exists() {
            continue;
        }
        let raw = std::fs::read_to_string(&path)?;
        if let Ok(summary) = serde_json::from_str::<DailySummary>(&raw) {
            merged.push(summary);
        }
    }

    let samples: u64 = merged.iter().map(|s| s.samples).sum();
    let average_ms = if samples > 0 {
        merged
            .iter()
            .map(|s| s.average_ms * s.samples as f64)
            .sum::<f64>()
            / samples as f64
    } else {
        0.0
    };

    Ok(serde_json::json!({
        "generatedAt": Utc::now(),
        "windowHours": hours,
        "daysCovered": merged.len(),
        "ticks": merged.iter().map(|s| s.ticks).sum::<u64>(),
        "samples": samples,
        "successful": merged.iter().map(|s| s.successful).sum::<u64>(),
        "violations": merged.iter().map(|s| s.violations).sum::<u64>(),
        "averageMs": average_ms,
        "compliantTicks": merged.iter().map(|s| s.compliant_ticks).sum::<u64>(),
        "degradedTicks": merged.iter().map(|s| s.degraded_ticks).sum::<u64>(),
        "violatedTicks": merged.iter().map(|s| s.violated_ticks).sum::<u64>(),
    }))
}
