//! Supervisor wiring: builds every engine, routes bus events, and
//! owns the background task lifecycle
//!
//! The bus stays a pure relay; all routing policy lives here. A peer's
//! `fixApplied` feeds the knowledge store, a `performanceViolation`
//! becomes an ordinary force-check request, and everything else is
//! presence and telemetry logging.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use warden_alerts::AlertDispatcher;
use warden_autofix::{patterns::severity_for_key, AutoFixEngine, KnowledgeStore};
use warden_bus::{BusEvent, CoordinationBus};
use warden_common::{Config, Error, PatternMetadata, Result};
use warden_probe::{spawn_scheduler, HealthMonitor};
use warden_sla::SlaMonitor;

pub struct Supervisor {
    config: Config,
    bus: Arc<CoordinationBus>,
    monitor: Arc<HealthMonitor>,
    sla: Arc<SlaMonitor>,
    dispatcher: Arc<AlertDispatcher>,
    store: Arc<KnowledgeStore>,
    events_rx: Option<mpsc::Receiver<BusEvent>>,
}

impl Supervisor {
    pub fn new(config: Config) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::channel(256);
        let bus = Arc::new(CoordinationBus::new(config.bus.clone(), events_tx));
        let dispatcher = Arc::new(AlertDispatcher::new(&config.alerts, bus.clone()));

        let store = Arc::new(KnowledgeStore::open(
            &config.paths.knowledge_base_dir,
            config.autofix.pieces_enabled,
        )?);
        let engine = Arc::new(AutoFixEngine::new(
            config.target.base_url.clone(),
            config.autofix.clone(),
            store.clone(),
        )?);

        let monitor = Arc::new(HealthMonitor::new(
            config.clone(),
            bus.clone(),
            dispatcher.clone(),
            Some(engine),
        )?);
        let sla = Arc::new(SlaMonitor::new(
            config.target.base_url.clone(),
            config.sla.clone(),
            &config.paths.reports_dir,
            dispatcher.clone(),
            bus.clone(),
        )?);

        Ok(Supervisor {
            config,
            bus,
            monitor,
            sla,
            dispatcher,
            store,
            events_rx: Some(events_rx),
        })
    }

    pub fn monitor(&self) -> Arc<HealthMonitor> {
        self.monitor.clone()
    }

    pub fn sla(&self) -> Arc<SlaMonitor> {
        self.sla.clone()
    }

    pub fn store(&self) -> Arc<KnowledgeStore> {
        self.store.clone()
    }

    pub fn dispatcher(&self) -> Arc<AlertDispatcher> {
        self.dispatcher.clone()
    }

    pub fn bus(&self) -> Arc<CoordinationBus> {
        self.bus.clone()
    }

    /// Spawn the event router. Consumes the inbound event stream; can
    /// only be done once per supervisor.
    pub fn spawn_router(&mut self) -> Result<tokio::task::JoinHandle<()>> {
        let events_rx = self
            .events_rx
            .take()
            .ok_or_else(|| Error::Config("event router already running".to_string()))?;
        Ok(tokio::spawn(route_events(
            events_rx,
            self.monitor.clone(),
            self.store.clone(),
        )))
    }

    /// Run everything until ctrl-c or SIGTERM. Cooperative shutdown:
    /// the loops stop between sessions, in-flight work finishes, the
    /// bus listener closes and peers learn of it by socket close.
    pub async fn run(mut self) -> Result<()> {
        let (listener, addr) = self.bus.bind().await?;
        info!("warden supervising {} (bus on {})", self.config.target.base_url, addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let bus_task = tokio::spawn(self.bus.clone().serve(listener));
        let scheduler_task = spawn_scheduler(
            self.monitor.clone(),
            Duration::from_secs(self.config.monitor.interval_minutes * 60),
            shutdown_rx.clone(),
        );
        let sla_task = self.sla.clone().spawn(shutdown_rx.clone());

        let router_task = self.spawn_router()?;

        wait_for_shutdown().await;
        info!("shutdown requested");

        let _ = shutdown_tx.send(true);
        // the loops observe shutdown between sessions; wait for them
        let _ = scheduler_task.await;
        let _ = sla_task.await;
        bus_task.abort();
        router_task.abort();

        info!("warden stopped");
        Ok(())
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(term) => term,
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

/// Route inbound peer events. The bus has no callback into session
/// internals; everything flows through here.
async fn route_events(
    mut events: mpsc::Receiver<BusEvent>,
    monitor: Arc<HealthMonitor>,
    store: Arc<KnowledgeStore>,
) {
    while let Some(event) = events.recv().await {
        match event {
            BusEvent::PeerConnected {
                agent_id,
                name,
                capabilities,
            } => {
                info!("peer '{}' ({}) online, capabilities: {:?}", agent_id, name, capabilities);
            }
            BusEvent::PeerDisconnected { agent_id } => {
                info!("peer '{}' offline", agent_id);
            }
            BusEvent::FixApplied { agent_id, event } => {
                // peer-contributed fix knowledge; no new session
                info!(
                    "peer '{}' applied {} for '{}' (success: {})",
                    agent_id,
                    event.action.as_str(),
                    event.pattern,
                    event.success
                );
                store.record(
                    &event.pattern,
                    event.action,
                    event.success,
                    PatternMetadata {
                        severity: Some(severity_for_key(&event.pattern)),
                        endpoint: event.endpoint.clone(),
                        error_type: None,
                        latency_ms: None,
                    },
                );
            }
            BusEvent::PerformanceViolation { agent_id, .. } => {
                info!("peer '{}' reported a performance violation; forcing a check", agent_id);
                match monitor.force_check().await {
                    Ok(verdict) => {
                        debug!("forced session verdict: {}", verdict.overall.as_str())
                    }
                    Err(Error::CheckInFlight) => {
                        debug!("session already in flight; violation absorbed")
                    }
                    Err(e) => warn!("forced session failed: {}", e),
                }
            }
            BusEvent::StatusReport { agent_id, report } => {
                debug!(
                    "status from '{}': {} (uptime {}s, healthy: {})",
                    agent_id, report.status, report.uptime_sec, report.health_check_passed
                );
            }
            BusEvent::TaskUpdate { agent_id, update } => {
                debug!(
                    "task {} from '{}': {:?} at {:.0}%",
                    update.task_id,
                    agent_id,
                    update.status,
                    update.progress * 100.0
                );
            }
            BusEvent::PerformanceMetric { agent_id, metric } => {
                if !metric.sla_compliant {
                    debug!(
                        "peer '{}' metric over SLA: {} on {} took {:.0}ms",
                        agent_id, metric.operation, metric.endpoint, metric.response_time
                    );
                }
            }
            BusEvent::HookEvent { agent_id, event } => {
                debug!("hook {:?} from '{}'", event.event, agent_id);
            }
            BusEvent::ErrorReport { agent_id, report } => {
                warn!(
                    "peer '{}' error: {} ({}); recovery: {}",
                    agent_id, report.error_message, report.error_type, report.recovery_action
                );
            }
        }
    }
}
