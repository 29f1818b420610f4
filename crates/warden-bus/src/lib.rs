//! Coordination bus for the Warden supervisor
//!
//! A single loopback TCP listener speaking newline-delimited JSON
//! envelopes. Peer agents connect as clients, announce themselves with
//! a handshake, and exchange a closed set of typed messages. The bus
//! is a pure relay: inbound peer events surface as [`BusEvent`] values
//! on an mpsc channel and outbound core messages are broadcast
//! best-effort to every live peer.

pub mod envelope;
pub mod server;

pub use envelope::{
    CommandKind, CoordinationCommand, Envelope, ErrorReport, FixAppliedEvent, Handshake,
    HookEvent, HookEventKind, MessageKind, PerformanceMetric, Priority, StatusReport, TaskStatus,
    TaskUpdate,
};
pub use server::{BusEvent, CoordinationBus, PeerInfo};

/// Agent id the core uses on the wire
pub const CORE_AGENT_ID: &str = "warden-core";
