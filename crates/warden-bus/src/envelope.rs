//! Wire-level message envelope and typed payloads
//!
//! Every frame on the bus is one JSON object per line with camelCase
//! fields. The `type` value comes from a closed set; unknown types are
//! logged and dropped by the server without killing the connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of message types carried on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    StatusReport,
    TaskUpdate,
    PerformanceMetric,
    HookEvent,
    ErrorReport,
    CoordinationCommand,
    HealthUpdate,
    FixApplied,
    CriticalAlert,
    PerformanceViolation,
    Ping,
    Pong,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::StatusReport => "statusReport",
            MessageKind::TaskUpdate => "taskUpdate",
            MessageKind::PerformanceMetric => "performanceMetric",
            MessageKind::HookEvent => "hookEvent",
            MessageKind::ErrorReport => "errorReport",
            MessageKind::CoordinationCommand => "coordinationCommand",
            MessageKind::HealthUpdate => "healthUpdate",
            MessageKind::FixApplied => "fixApplied",
            MessageKind::CriticalAlert => "criticalAlert",
            MessageKind::PerformanceViolation => "performanceViolation",
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "statusReport" => MessageKind::StatusReport,
            "taskUpdate" => MessageKind::TaskUpdate,
            "performanceMetric" => MessageKind::PerformanceMetric,
            "hookEvent" => MessageKind::HookEvent,
            "errorReport" => MessageKind::ErrorReport,
            "coordinationCommand" => MessageKind::CoordinationCommand,
            "healthUpdate" => MessageKind::HealthUpdate,
            "fixApplied" => MessageKind::FixApplied,
            "criticalAlert" => MessageKind::CriticalAlert,
            "performanceViolation" => MessageKind::PerformanceViolation,
            "ping" => MessageKind::Ping,
            "pong" => MessageKind::Pong,
            _ => return None,
        })
    }
}

/// Message priority on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

/// The JSON envelope every bus frame uses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Envelope {
    pub fn new(kind: MessageKind, agent_id: impl Into<String>, data: Value) -> Self {
        Envelope {
            kind: kind.as_str().to_string(),
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            data,
            priority: None,
            correlation_id: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// The message kind, when the `type` value is in the closed set.
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::parse(&self.kind)
    }

    /// Serialize as one newline-terminated frame.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        line
    }
}

/// First message from a peer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub agent_id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Peer resource usage inside a status report
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceUsage {
    pub cpu_pct: f64,
    pub mem_mb: f64,
    pub disk_mb: f64,
}

/// Peer-side performance counters inside a status report
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerPerfMetrics {
    pub avg_response_time: f64,
    pub requests_processed: u64,
    pub errors: u64,
}

/// `statusReport` payload (peer → core)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    #[serde(default)]
    pub resource_usage: ResourceUsage,
    #[serde(default)]
    pub perf_metrics: PeerPerfMetrics,
    pub last_activity: DateTime<Utc>,
    pub uptime_sec: u64,
    pub health_check_passed: bool,
}

/// Task lifecycle states reported by peers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Error,
}

/// `taskUpdate` payload (peer → core)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub task_id: String,
    pub title: String,
    pub status: TaskStatus,
    /// Completion fraction in [0, 1]
    pub progress: f64,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(default)]
    pub blocking_issues: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// `performanceMetric` payload (peer → core)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub operation: String,
    pub response_time: f64,
    pub success: bool,
    pub endpoint: String,
    pub payload_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub sla_compliant: bool,
}

/// Lifecycle hook events peers emit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HookEventKind {
    Start,
    Stop,
    Progress,
    Error,
    HealthCheck,
}

/// `hookEvent` payload (peer → core)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookEvent {
    pub event: HookEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default)]
    pub hook_data: Value,
}

/// `errorReport` payload (peer → core)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error_type: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub recovery_action: String,
    #[serde(default)]
    pub affected_endpoints: Vec<String>,
    pub estimated_impact: String,
}

/// Commands the core can issue to peers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Restart,
    Pause,
    Resume,
    Scale,
    Migrate,
}

/// `coordinationCommand` payload (core → peers)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationCommand {
    pub command: CommandKind,
    #[serde(default)]
    pub target_agents: Vec<String>,
    #[serde(default)]
    pub parameters: Value,
}

/// `fixApplied` payload (core ↔ peer)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixAppliedEvent {
    pub pattern: String,
    pub action: warden_common::FixActionKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
