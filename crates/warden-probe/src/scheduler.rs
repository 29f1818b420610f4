//! Periodic session trigger with a single-flight guard
//!
//! The interval's first tick fires immediately, giving the one initial
//! session at startup. Ticks that land while a session is in flight
//! are dropped, not queued; the monitor's own guard enforces this.
//! Shutdown is observed between sessions, so an in-flight session
//! always runs to completion.

use crate::monitor::HealthMonitor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use warden_common::Error;

/// Spawn the scheduler loop.
pub fn spawn_scheduler(
    monitor: Arc<HealthMonitor>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match monitor.force_check().await {
                        Ok(verdict) => {
                            debug!(
                                "scheduled session finished: {} ({:.1})",
                                verdict.overall.as_str(),
                                verdict.score
                            );
                        }
                        Err(Error::CheckInFlight) => {
                            debug!("tick dropped; session already in flight");
                        }
                        Err(e) => error!("scheduled session failed: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    info!("scheduler stopping");
                    break;
                }
            }
        }
    })
}
