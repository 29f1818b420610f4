//! Peer session tests against a live loopback listener

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use warden_bus::{BusEvent, CoordinationBus, Envelope, MessageKind, Priority};
use warden_common::config::BusConfig;

struct TestPeer {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl TestPeer {
    async fn connect(addr: std::net::SocketAddr, agent_id: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to bus");
        let (read_half, writer) = stream.into_split();
        let mut peer = TestPeer {
            reader: BufReader::new(read_half),
            writer,
        };
        peer.send_raw(&format!(
            "{{\"agentId\":\"{}\",\"name\":\"test peer\",\"version\":\"1.0\",\"capabilities\":[\"fixes\"]}}\n",
            agent_id
        ))
        .await;
        peer
    }

    async fn send_raw(&mut self, raw: &str) {
        self.writer.write_all(raw.as_bytes()).await.expect("write");
    }

    async fn send(&mut self, envelope: &Envelope) {
        self.send_raw(&envelope.to_line()).await;
    }

    async fn read_envelope(&mut self) -> Envelope {
        let mut line = String::new();
        timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
            .await
            .expect("read timed out")
            .expect("read");
        serde_json::from_str(line.trim()).expect("valid envelope")
    }
}

async fn start_bus() -> (
    Arc<CoordinationBus>,
    std::net::SocketAddr,
    mpsc::Receiver<BusEvent>,
) {
    let config = BusConfig {
        port: 0,
        ..Default::default()
    };
    let (events_tx, events_rx) = mpsc::channel(32);
    let bus = Arc::new(CoordinationBus::new(config, events_tx));
    let (listener, addr) = bus.bind().await.expect("bind");
    tokio::spawn(bus.clone().serve(listener));
    (bus, addr, events_rx)
}

async fn expect_connected(events: &mut mpsc::Receiver<BusEvent>, expected: &str) {
    let event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event timed out")
        .expect("event");
    assert_matches!(event, BusEvent::PeerConnected { agent_id, .. } if agent_id == expected);
}

#[tokio::test]
async fn handshake_then_fix_applied_event_is_routed() {
    let (bus, addr, mut events) = start_bus().await;

    let mut peer = TestPeer::connect(addr, "agent-fixer").await;
    expect_connected(&mut events, "agent-fixer").await;
    assert_eq!(bus.peer_count(), 1);

    let envelope = Envelope::new(
        MessageKind::FixApplied,
        "agent-fixer",
        serde_json::json!({
            "pattern": "bad-gateway",
            "action": "clear-cache",
            "success": true
        }),
    )
    .with_priority(Priority::High);
    peer.send(&envelope).await;

    let event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event timed out")
        .expect("event");
    assert_matches!(
        event,
        BusEvent::FixApplied { agent_id, event }
            if agent_id == "agent-fixer"
                && event.pattern == "bad-gateway"
                && event.success
    );
}

#[tokio::test]
async fn malformed_json_gets_one_error_response_and_preserves_connection() {
    let (_bus, addr, mut events) = start_bus().await;

    let mut peer = TestPeer::connect(addr, "agent-sloppy").await;
    expect_connected(&mut events, "agent-sloppy").await;

    peer.send_raw("this is not json\n").await;
    let response = peer.read_envelope().await;
    assert_eq!(response.kind, "errorReport");

    // the session survives: ping still answers
    let ping = Envelope::new(MessageKind::Ping, "agent-sloppy", serde_json::Value::Null);
    peer.send(&ping).await;
    let pong = peer.read_envelope().await;
    assert_eq!(pong.message_kind(), Some(MessageKind::Pong));
}

#[tokio::test]
async fn unknown_message_type_is_dropped_without_event() {
    let (_bus, addr, mut events) = start_bus().await;

    let mut peer = TestPeer::connect(addr, "agent-novel").await;
    expect_connected(&mut events, "agent-novel").await;

    peer.send_raw(
        "{\"type\":\"telepathy\",\"agentId\":\"agent-novel\",\"timestamp\":\"2025-01-01T00:00:00Z\",\"data\":{}}\n",
    )
    .await;

    // ping after the unknown frame; the only thing that comes back is pong,
    // and no bus event was emitted for the unknown type
    let ping = Envelope::new(MessageKind::Ping, "agent-novel", serde_json::Value::Null);
    peer.send(&ping).await;
    let pong = peer.read_envelope().await;
    assert_eq!(pong.message_kind(), Some(MessageKind::Pong));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn broadcast_reaches_every_peer() {
    let (bus, addr, mut events) = start_bus().await;

    let mut first = TestPeer::connect(addr, "agent-one").await;
    expect_connected(&mut events, "agent-one").await;
    let mut second = TestPeer::connect(addr, "agent-two").await;
    expect_connected(&mut events, "agent-two").await;

    let alert = Envelope::new(
        MessageKind::CriticalAlert,
        "warden-core",
        serde_json::json!({"kind": "site-down", "severity": "critical"}),
    );
    bus.broadcast(&alert);

    let got_first = first.read_envelope().await;
    let got_second = second.read_envelope().await;
    assert_eq!(got_first.message_kind(), Some(MessageKind::CriticalAlert));
    assert_eq!(got_second.message_kind(), Some(MessageKind::CriticalAlert));
}

#[tokio::test]
async fn status_report_processes_in_arrival_order() {
    let (_bus, addr, mut events) = start_bus().await;

    let mut peer = TestPeer::connect(addr, "agent-seq").await;
    expect_connected(&mut events, "agent-seq").await;

    for i in 0..3 {
        let report = Envelope::new(
            MessageKind::TaskUpdate,
            "agent-seq",
            serde_json::json!({
                "taskId": format!("task-{}", i),
                "title": "migration",
                "status": "in_progress",
                "progress": 0.5,
                "priority": "medium"
            }),
        );
        peer.send(&report).await;
    }

    for i in 0..3 {
        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event timed out")
            .expect("event");
        assert_matches!(
            event,
            BusEvent::TaskUpdate { update, .. } if update.task_id == format!("task-{}", i)
        );
    }
}
