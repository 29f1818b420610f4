//! Circuit breaker implementation for resilient probe and fix calls

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerStatus {
    /// Requests flow normally
    Closed,
    /// Requests fail fast until the recovery timeout elapses
    Open,
    /// A limited number of calls test whether the target recovered
    HalfOpen,
}

impl BreakerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerStatus::Closed => "closed",
            BreakerStatus::Open => "open",
            BreakerStatus::HalfOpen => "half-open",
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before a recovery probe is allowed
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes required to close the circuit
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    status: BreakerStatus,
    failures: u32,
    success_streak: u32,
    last_failure_at: Option<DateTime<Utc>>,
    next_probe_at: Option<Instant>,
    next_probe_at_utc: Option<DateTime<Utc>>,
}

/// Serializable view of a breaker at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub name: String,
    pub status: BreakerStatus,
    pub failures: u32,
    pub success_streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_probe_allowed_at: Option<DateTime<Utc>>,
}

/// Rejection or passthrough error from a guarded call
#[derive(Debug)]
pub enum BreakerError<E> {
    /// Circuit is open, the call was rejected without running
    Open,
    /// The wrapped operation ran and failed
    Operation(E),
}

impl<E: std::fmt::Display> std::fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerError::Open => write!(f, "circuit breaker is open"),
            BreakerError::Operation(e) => write!(f, "operation failed: {}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BreakerError::Open => None,
            BreakerError::Operation(e) => Some(e),
        }
    }
}

/// Tri-state gate protecting one call site from repeated failures.
///
/// The breaker is generic over the wrapped operation; probes, admin
/// calls, and the fix engine itself all run behind one.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: Arc<RwLock<BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        CircuitBreaker {
            name: name.into(),
            config,
            state: Arc::new(RwLock::new(BreakerState {
                status: BreakerStatus::Closed,
                failures: 0,
                success_streak: 0,
                last_failure_at: None,
                next_probe_at: None,
                next_probe_at_utc: None,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `op` behind the gate.
    ///
    /// An open circuit rejects the call without running it. A rejected
    /// call does not count as a failure. When the recovery timeout has
    /// elapsed the call is forwarded and the circuit moves to half-open.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut state = self.state.write().await;
            if state.status == BreakerStatus::Open {
                let due = state
                    .next_probe_at
                    .map(|at| Instant::now() >= at)
                    .unwrap_or(true);
                if !due {
                    debug!("breaker '{}' rejecting call while open", self.name);
                    return Err(BreakerError::Open);
                }
                info!("breaker '{}' transitioning to half-open", self.name);
                state.status = BreakerStatus::HalfOpen;
                state.success_streak = 0;
            }
        }

        let result = op().await;
        match &result {
            Ok(_) => self.record_success().await,
            Err(_) => self.record_failure().await,
        }
        result.map_err(BreakerError::Operation)
    }

    async fn record_success(&self) {
        let mut state = self.state.write().await;
        match state.status {
            BreakerStatus::Closed => {
                state.failures = 0;
            }
            BreakerStatus::HalfOpen => {
                state.success_streak += 1;
                if state.success_streak >= self.config.success_threshold {
                    info!(
                        "breaker '{}' closing after {} consecutive successes",
                        self.name, state.success_streak
                    );
                    state.status = BreakerStatus::Closed;
                    state.failures = 0;
                    state.success_streak = 0;
                    state.next_probe_at = None;
                    state.next_probe_at_utc = None;
                }
            }
            BreakerStatus::Open => {}
        }
    }

    async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.last_failure_at = Some(Utc::now());
        match state.status {
            BreakerStatus::Closed => {
                state.failures += 1;
                if state.failures >= self.config.failure_threshold {
                    warn!(
                        "breaker '{}' opening after {} failures",
                        self.name, state.failures
                    );
                    Self::trip(&mut state, &self.config);
                }
            }
            BreakerStatus::HalfOpen => {
                warn!("breaker '{}' reopening on half-open failure", self.name);
                Self::trip(&mut state, &self.config);
            }
            BreakerStatus::Open => {}
        }
    }

    fn trip(state: &mut BreakerState, config: &BreakerConfig) {
        state.status = BreakerStatus::Open;
        state.success_streak = 0;
        state.next_probe_at = Some(Instant::now() + config.recovery_timeout);
        state.next_probe_at_utc = Some(
            Utc::now()
                + chrono::Duration::from_std(config.recovery_timeout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30)),
        );
    }

    /// Force-transition to closed with all counters zeroed. Idempotent.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        info!("resetting breaker '{}'", self.name);
        state.status = BreakerStatus::Closed;
        state.failures = 0;
        state.success_streak = 0;
        state.last_failure_at = None;
        state.next_probe_at = None;
        state.next_probe_at_utc = None;
    }

    pub async fn status(&self) -> BreakerStatus {
        self.state.read().await.status
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.read().await;
        BreakerSnapshot {
            name: self.name.clone(),
            status: state.status,
            failures: state.failures,
            success_streak: state.success_streak,
            last_failure_at: state.last_failure_at,
            next_probe_allowed_at: state.next_probe_at_utc,
        }
    }
}

/// One breaker per endpoint path, created at startup and never
/// destroyed while the monitor runs.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: parking_lot::RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        BreakerRegistry {
            config,
            breakers: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return breaker.clone();
        }
        let mut breakers = self.breakers.write();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    pub async fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.read().values().cloned().collect();
        let mut snapshots = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            snapshots.push(breaker.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub async fn open_count(&self) -> usize {
        self.snapshots()
            .await
            .iter()
            .filter(|s| s.status == BreakerStatus::Open)
            .count()
    }

    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }
}
