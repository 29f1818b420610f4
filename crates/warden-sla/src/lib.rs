//! SLA compliance monitoring for the Warden supervisor
//!
//! An independent loop from the probe session: bursts of sequential
//! requests per endpoint, latency distribution aggregation, tri-state
//! compliance, and edge-triggered alerts that latch on entry to a
//! failure state and clear only on compliant recovery.

pub mod monitor;
pub mod stats;

pub use monitor::{offline_report, ComplianceState, SlaMonitor, SlaRollup, SlaTickReport};
pub use stats::{aggregate, percentile, LatencyStats};
