//! Bus listener and peer session handling

use crate::envelope::{
    Envelope, ErrorReport, FixAppliedEvent, Handshake, HookEvent, MessageKind, PerformanceMetric,
    StatusReport, TaskUpdate,
};
use crate::CORE_AGENT_ID;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use warden_common::config::BusConfig;
use warden_common::{Error, Result};

/// Inbound peer activity surfaced to the supervisor.
///
/// The bus never acts on these itself; routing is the supervisor's
/// job, which keeps the bus a pure relay.
#[derive(Debug)]
pub enum BusEvent {
    PeerConnected {
        agent_id: String,
        name: String,
        capabilities: Vec<String>,
    },
    PeerDisconnected {
        agent_id: String,
    },
    StatusReport {
        agent_id: String,
        report: StatusReport,
    },
    TaskUpdate {
        agent_id: String,
        update: TaskUpdate,
    },
    PerformanceMetric {
        agent_id: String,
        metric: PerformanceMetric,
    },
    PerformanceViolation {
        agent_id: String,
        data: Value,
    },
    HookEvent {
        agent_id: String,
        event: HookEvent,
    },
    ErrorReport {
        agent_id: String,
        report: ErrorReport,
    },
    FixApplied {
        agent_id: String,
        event: FixAppliedEvent,
    },
}

/// Live peer session metadata
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub agent_id: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub connected_at: DateTime<Utc>,
}

struct Peer {
    info: PeerInfo,
    outbound: mpsc::Sender<String>,
}

/// The coordination bus: one loopback listener, a set of live peer
/// sessions, and best-effort fanout.
pub struct CoordinationBus {
    config: BusConfig,
    peers: RwLock<HashMap<String, Peer>>,
    events_tx: mpsc::Sender<BusEvent>,
}

impl CoordinationBus {
    pub fn new(config: BusConfig, events_tx: mpsc::Sender<BusEvent>) -> Self {
        CoordinationBus {
            config,
            peers: RwLock::new(HashMap::new()),
            events_tx,
        }
    }

    /// Bind the listener. Split from [`serve`] so callers can learn
    /// the bound address before the accept loop starts.
    pub async fn bind(&self) -> Result<(TcpListener, SocketAddr)> {
        let address = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| Error::Network(format!("failed to bind bus to {}: {}", address, e)))?;
        let local = listener
            .local_addr()
            .map_err(|e| Error::Network(e.to_string()))?;
        info!("coordination bus listening on {}", local);
        Ok((listener, local))
    }

    /// Accept loop. Runs until the listener errors or the task is aborted.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("bus connection from {}", addr);
                    let bus = self.clone();
                    tokio::spawn(async move {
                        bus.handle_connection(stream, addr).await;
                    });
                }
                Err(e) => {
                    warn!("bus accept error: {}", e);
                }
            }
        }
    }

    /// Fan an envelope out to every live peer. Sends that would block
    /// are dropped for that peer only.
    pub fn broadcast(&self, envelope: &Envelope) {
        let line = envelope.to_line();
        let peers = self.peers.read();
        for (agent_id, peer) in peers.iter() {
            if peer.outbound.try_send(line.clone()).is_err() {
                debug!("dropping {} broadcast for slow peer {}", envelope.kind, agent_id);
            }
        }
    }

    /// Send an envelope to one peer. Returns false when the peer is
    /// unknown or its queue is full.
    pub fn send_to(&self, agent_id: &str, envelope: &Envelope) -> bool {
        let peers = self.peers.read();
        match peers.get(agent_id) {
            Some(peer) => peer.outbound.try_send(envelope.to_line()).is_ok(),
            None => false,
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    pub fn peers_snapshot(&self) -> Vec<PeerInfo> {
        self.peers.read().values().map(|p| p.info.clone()).collect()
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let idle = self.config.connection_timeout();
        let (read_half, write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(self.config.outbound_queue);
        let writer = tokio::spawn(write_loop(write_half, outbound_rx));

        // The first well-formed frame must be the handshake.
        let handshake = loop {
            let line = match timeout(idle, lines.next_line()).await {
                Ok(Ok(Some(line))) => line,
                _ => {
                    debug!("bus connection {} closed before handshake", addr);
                    writer.abort();
                    return;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Handshake>(&line) {
                Ok(handshake) => break handshake,
                Err(e) => {
                    warn!("malformed handshake from {}: {}", addr, e);
                    let _ = outbound_tx.try_send(error_line("malformed handshake"));
                }
            }
        };

        let agent_id = handshake.agent_id.clone();
        info!(
            "peer '{}' ({} v{}) connected from {}",
            agent_id, handshake.name, handshake.version, addr
        );

        let info = PeerInfo {
            agent_id: agent_id.clone(),
            name: handshake.name,
            capabilities: handshake.capabilities,
            connected_at: Utc::now(),
        };
        self.peers.write().insert(
            agent_id.clone(),
            Peer {
                info: info.clone(),
                outbound: outbound_tx.clone(),
            },
        );
        self.emit(BusEvent::PeerConnected {
            agent_id: agent_id.clone(),
            name: info.name.clone(),
            capabilities: info.capabilities.clone(),
        })
        .await;

        // Messages from one peer are processed in arrival order.
        loop {
            let line = match timeout(idle, lines.next_line()).await {
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => {
                    debug!("peer '{}' disconnected", agent_id);
                    break;
                }
                Ok(Err(e)) => {
                    warn!("read error from peer '{}': {}", agent_id, e);
                    break;
                }
                Err(_) => {
                    info!("closing idle peer '{}' after {:?}", agent_id, idle);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let envelope: Envelope = match serde_json::from_str(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("malformed frame from peer '{}': {}", agent_id, e);
                    let _ = outbound_tx.try_send(error_line("malformed JSON"));
                    continue;
                }
            };

            self.route_inbound(&agent_id, &outbound_tx, envelope).await;
        }

        self.peers.write().remove(&agent_id);
        self.emit(BusEvent::PeerDisconnected {
            agent_id: agent_id.clone(),
        })
        .await;
        writer.abort();
    }

    async fn route_inbound(
        &self,
        agent_id: &str,
        outbound: &mpsc::Sender<String>,
        envelope: Envelope,
    ) {
        let kind = match envelope.message_kind() {
            Some(kind) => kind,
            None => {
                warn!("dropping unknown message type '{}' from peer '{}'", envelope.kind, agent_id);
                return;
            }
        };

        match kind {
            MessageKind::Ping => {
                let pong = Envelope::new(MessageKind::Pong, CORE_AGENT_ID, Value::Null);
                let _ = outbound.try_send(pong.to_line());
            }
            MessageKind::Pong => {}
            MessageKind::StatusReport => {
                self.decode_and_emit(agent_id, envelope.data, |agent_id, report| {
                    BusEvent::StatusReport { agent_id, report }
                })
                .await;
            }
            MessageKind::TaskUpdate => {
                self.decode_and_emit(agent_id, envelope.data, |agent_id, update| {
                    BusEvent::TaskUpdate { agent_id, update }
                })
                .await;
            }
            MessageKind::PerformanceMetric => {
                self.decode_and_emit(agent_id, envelope.data, |agent_id, metric| {
                    BusEvent::PerformanceMetric { agent_id, metric }
                })
                .await;
            }
            MessageKind::HookEvent => {
                self.decode_and_emit(agent_id, envelope.data, |agent_id, event| {
                    BusEvent::HookEvent { agent_id, event }
                })
                .await;
            }
            MessageKind::ErrorReport => {
                self.decode_and_emit(agent_id, envelope.data, |agent_id, report| {
                    BusEvent::ErrorReport { agent_id, report }
                })
                .await;
            }
            MessageKind::FixApplied => {
                self.decode_and_emit(agent_id, envelope.data, |agent_id, event| {
                    BusEvent::FixApplied { agent_id, event }
                })
                .await;
            }
            MessageKind::PerformanceViolation => {
                self.emit(BusEvent::PerformanceViolation {
                    agent_id: agent_id.to_string(),
                    data: envelope.data,
                })
                .await;
            }
            // core-originated types arriving inbound are noise
            MessageKind::CoordinationCommand
            | MessageKind::HealthUpdate
            | MessageKind::CriticalAlert => {
                debug!(
                    "ignoring core-directional message '{}' from peer '{}'",
                    envelope.kind, agent_id
                );
            }
        }
    }

    async fn decode_and_emit<T, F>(&self, agent_id: &str, data: Value, build: F)
    where
        T: serde::de::DeserializeOwned,
        F: FnOnce(String, T) -> BusEvent,
    {
        match serde_json::from_value::<T>(data) {
            Ok(payload) => self.emit(build(agent_id.to_string(), payload)).await,
            Err(e) => warn!("invalid payload from peer '{}': {}", agent_id, e),
        }
    }

    async fn emit(&self, event: BusEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!("bus event receiver gone; dropping event");
        }
    }
}

async fn write_loop(mut half: OwnedWriteHalf, mut outbound: mpsc::Receiver<String>) {
    while let Some(line) = outbound.recv().await {
        if half.write_all(line.as_bytes()).await.is_err() {
            break;
        }
    }
}

fn error_line(message: &str) -> String {
    Envelope::new(
        MessageKind::ErrorReport,
        CORE_AGENT_ID,
        serde_json::json!({
            "errorType": "protocol",
            "errorMessage": message,
            "recoveryAction": "resend as one JSON object per line",
            "estimatedImpact": "message dropped",
        }),
    )
    .to_line()
}
