//! Alert dispatch with latching dedup
//!
//! Alerts are keyed by issue kind. A kind that has already fired stays
//! latched, and nothing with that kind is dispatched again, until a
//! verdict comes back good or excellent, at which point the whole set
//! clears. Dispatch itself is best-effort: a fire-and-forget hand-off
//! to an external notification script plus a `criticalAlert` broadcast
//! on the coordination bus. A failed dispatch never affects the
//! session that raised it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_bus::{CoordinationBus, Envelope, MessageKind, Priority, CORE_AGENT_ID};
use warden_common::config::AlertsConfig;
use warden_common::{CriticalIssue, IssueKind, IssueSeverity, OverallHealth};

/// Alert severity ladder
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl From<IssueSeverity> for AlertSeverity {
    fn from(severity: IssueSeverity) -> Self {
        match severity {
            IssueSeverity::Warning => AlertSeverity::Warning,
            IssueSeverity::Critical => AlertSeverity::Critical,
        }
    }
}

/// A formatted alert payload handed to the external sink and the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: IssueKind,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub affected_endpoints: Vec<String>,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

impl Alert {
    pub fn new(
        kind: IssueKind,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Alert {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            severity,
            title: title.into(),
            message: message.into(),
            affected_endpoints: Vec::new(),
            suggested_actions: Vec::new(),
        }
    }

    pub fn from_issue(issue: &CriticalIssue) -> Self {
        Alert {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind: issue.kind,
            severity: issue.severity.into(),
            title: issue.kind.as_str().to_string(),
            message: issue.message.clone(),
            affected_endpoints: issue.affected_endpoints.clone(),
            suggested_actions: issue.suggested_actions.clone(),
        }
    }

    fn bus_priority(&self) -> Priority {
        match self.severity {
            AlertSeverity::Critical => Priority::Critical,
            AlertSeverity::Warning => Priority::High,
            AlertSeverity::Info => Priority::Low,
        }
    }
}

/// Severity-gated, deduplicating alert fanout
pub struct AlertDispatcher {
    active: Mutex<HashSet<IssueKind>>,
    notify_command: Option<PathBuf>,
    bus: Arc<CoordinationBus>,
}

impl AlertDispatcher {
    pub fn new(config: &AlertsConfig, bus: Arc<CoordinationBus>) -> Self {
        AlertDispatcher {
            active: Mutex::new(HashSet::new()),
            notify_command: config.notify_command.clone(),
            bus,
        }
    }

    /// Dispatch an alert unless its kind is already latched.
    /// Returns whether the alert actually went out.
    pub fn dispatch(&self, alert: Alert) -> bool {
        {
            let mut active = self.active.lock();
            if !active.insert(alert.kind) {
                debug!("alert '{}' already active, deduped", alert.kind.as_str());
                return false;
            }
        }

        info!(
            "dispatching {:?} alert '{}': {}",
            alert.severity,
            alert.kind.as_str(),
            alert.message
        );

        self.notify_external(&alert);

        let envelope = Envelope::new(
            MessageKind::CriticalAlert,
            CORE_AGENT_ID,
            serde_json::to_value(&alert).unwrap_or_default(),
        )
        .with_priority(alert.bus_priority());
        self.bus.broadcast(&envelope);

        true
    }

    /// Dispatch every issue from a session, one alert per kind.
    pub fn dispatch_issues(&self, issues: &[CriticalIssue]) -> usize {
        issues
            .iter()
            .filter(|issue| self.dispatch(Alert::from_issue(issue)))
            .count()
    }

    /// Clear the latch set when a verdict is good enough.
    pub fn settle(&self, overall: OverallHealth) {
        if matches!(overall, OverallHealth::Good | OverallHealth::Excellent) {
            let mut active = self.active.lock();
            if !active.is_empty() {
                info!("verdict {}; clearing {} active alerts", overall.as_str(), active.len());
                active.clear();
            }
        }
    }

    pub fn active_kinds(&self) -> Vec<IssueKind> {
        self.active.lock().iter().copied().collect()
    }

    /// Hand the payload to the external notification script, if one is
    /// configured. The child is never awaited.
    fn notify_external(&self, alert: &Alert) {
        let Some(command) = &self.notify_command else {
            return;
        };
        let payload = match serde_json::to_string(alert) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to serialize alert payload: {}", e);
                return;
            }
        };
        match tokio::process::Command::new(command).arg(payload).spawn() {
            Ok(_child) => debug!("notification script spawned for '{}'", alert.kind.as_str()),
            Err(e) => warn!("failed to spawn notification script: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use warden_common::config::BusConfig;

    fn dispatcher() -> AlertDispatcher {
        let (events_tx, _events_rx) = mpsc::channel(8);
        let bus = Arc::new(CoordinationBus::new(BusConfig::default(), events_tx));
        AlertDispatcher::new(&AlertsConfig::default(), bus)
    }

    fn site_down_alert() -> Alert {
        Alert::new(
            IssueKind::SiteDown,
            AlertSeverity::Critical,
            "site-down",
            "site unreachable",
        )
    }

    #[tokio::test]
    async fn same_kind_dispatches_once() {
        let dispatcher = dispatcher();
        assert!(dispatcher.dispatch(site_down_alert()));
        assert!(!dispatcher.dispatch(site_down_alert()));
        assert_eq!(dispatcher.active_kinds(), vec![IssueKind::SiteDown]);
    }

    #[tokio::test]
    async fn distinct_kinds_both_dispatch() {
        let dispatcher = dispatcher();
        assert!(dispatcher.dispatch(site_down_alert()));
        assert!(dispatcher.dispatch(Alert::new(
            IssueKind::MockDataFailure,
            AlertSeverity::Warning,
            "mock-data-failure",
            "half the mock endpoints are broken",
        )));
        assert_eq!(dispatcher.active_kinds().len(), 2);
    }

    #[tokio::test]
    async fn good_verdict_clears_the_latch() {
        let dispatcher = dispatcher();
        assert!(dispatcher.dispatch(site_down_alert()));

        dispatcher.settle(OverallHealth::Fair);
        assert!(!dispatcher.dispatch(site_down_alert()));

        dispatcher.settle(OverallHealth::Good);
        assert!(dispatcher.active_kinds().is_empty());
        assert!(dispatcher.dispatch(site_down_alert()));
    }

    #[tokio::test]
    async fn issues_dedupe_within_one_batch() {
        let dispatcher = dispatcher();
        let issue = CriticalIssue {
            kind: IssueKind::PerformanceCritical,
            severity: IssueSeverity::Critical,
            message: "SLA violations past threshold".to_string(),
            requires_human_intervention: true,
            affected_endpoints: vec!["/".to_string()],
            suggested_actions: vec!["check origin load".to_string()],
        };
        let dispatched = dispatcher.dispatch_issues(&[issue.clone(), issue]);
        assert_eq!(dispatched, 1);
    }
}
