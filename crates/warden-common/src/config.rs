//! Configuration management for the Warden supervisor
//!
//! Defaults cover a full deployment; an optional TOML file overrides
//! sections, and a small set of environment variables overrides the
//! file. Configuration errors at startup are fatal.

use crate::error::{Error, Result};
use crate::types::EndpointDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Identifying user-agent attached to every probe request
pub const USER_AGENT: &str = "Warden-HealthMonitor/2.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub monitor: MonitorConfig,
    pub sla: SlaConfig,
    pub bus: BusConfig,
    pub autofix: AutoFixConfig,
    pub alerts: AlertsConfig,
    pub paths: PathsConfig,
}

/// The origin under supervision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub base_url: String,
    pub endpoints: Vec<EndpointDescriptor>,
    pub mock_endpoints: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            base_url: "http://localhost:3000".to_string(),
            endpoints: vec![
                EndpointDescriptor::new("/", "home").critical(),
                EndpointDescriptor::new("/api/health", "health").critical(),
                EndpointDescriptor::new("/api/v1/status", "status").critical(),
                EndpointDescriptor::new("/api/v1/analytics/status", "analytics"),
                EndpointDescriptor::new("/api/v1/campaigns", "campaigns"),
                EndpointDescriptor::new("/api/v1/monitoring", "monitoring"),
                EndpointDescriptor::new("/api/v1/alerts", "alerts"),
            ],
            mock_endpoints: vec![
                "/api/v1/analytics/mock".to_string(),
                "/api/v1/campaigns/mock".to_string(),
                "/api/v1/monitoring/mock".to_string(),
                "/api/v1/alerts/mock".to_string(),
            ],
        }
    }
}

/// Probe session cadence and sampling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Scheduler cadence in minutes
    pub interval_minutes: u64,
    /// SLA latency threshold in milliseconds
    pub sla_ms: u64,
    /// Sequential performance samples per session
    pub performance_samples: u32,
    /// Spacing between performance samples in milliseconds
    pub sample_spacing_ms: u64,
    /// Consecutive failing sessions before the instability issue fires
    pub instability_threshold: u32,
    pub ui: UiProbeConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            interval_minutes: 30,
            sla_ms: 3000,
            performance_samples: 5,
            sample_spacing_ms: 1000,
            instability_threshold: 5,
            ui: UiProbeConfig::default(),
        }
    }
}

/// External UI test harness invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiProbeConfig {
    pub enabled: bool,
    /// Program and arguments; stdout must end with a JSON report line
    pub command: Vec<String>,
    /// Hard wall-clock ceiling in seconds; the process is killed on overrun
    pub timeout_secs: u64,
}

impl Default for UiProbeConfig {
    fn default() -> Self {
        UiProbeConfig {
            enabled: false,
            command: vec!["npx".to_string(), "playwright".to_string(), "test".to_string()],
            timeout_secs: 600,
        }
    }
}

/// SLA monitor loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaConfig {
    pub interval_minutes: u64,
    pub endpoints: Vec<String>,
    pub sla_ms: u64,
    /// Violation fraction tolerated while still compliant
    pub tolerance: f64,
    /// Violation fraction beyond which compliance is violated outright
    pub critical_threshold: f64,
    /// Average latency above `critical_avg_factor * sla_ms` raises the
    /// critical-performance alert
    pub critical_avg_factor: f64,
    pub samples_per_tick: u32,
    pub sample_spacing_ms: u64,
    /// Ticks aggregated when computing percentiles; 1 means per-tick only
    pub rolling_window_ticks: u32,
}

impl Default for SlaConfig {
    fn default() -> Self {
        SlaConfig {
            interval_minutes: 5,
            endpoints: vec![
                "/".to_string(),
                "/dashboard".to_string(),
                "/api/health".to_string(),
                "/api/v1/status".to_string(),
            ],
            sla_ms: 3000,
            tolerance: 0.10,
            critical_threshold: 0.20,
            critical_avg_factor: 1.5,
            samples_per_tick: 3,
            sample_spacing_ms: 100,
            rolling_window_ticks: 1,
        }
    }
}

/// Coordination bus listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub bind_address: String,
    pub port: u16,
    pub heartbeat_interval_secs: u64,
    /// Idle seconds before a peer session is closed; defaults to twice
    /// the heartbeat interval
    pub connection_timeout_secs: Option<u64>,
    /// Outbound messages queued per peer before broadcasts are dropped
    pub outbound_queue: usize,
}

impl BusConfig {
    pub fn connection_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.connection_timeout_secs
                .unwrap_or(self.heartbeat_interval_secs * 2),
        )
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            heartbeat_interval_secs: 30,
            connection_timeout_secs: None,
            outbound_queue: 64,
        }
    }
}

/// Auto-fix engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoFixConfig {
    pub enabled: bool,
    /// Stored patterns below this success rate fall back to the ladder
    pub min_success_rate: f64,
    /// Failures before the fix-engine breaker opens
    pub breaker_failure_threshold: u32,
    /// Seconds the fix-engine breaker stays open
    pub breaker_recovery_secs: u64,
    /// Admin route for the clear-cache action
    pub clear_cache_path: String,
    /// Paths hit in parallel by the warm-up action
    pub warm_up_paths: Vec<String>,
    /// Publish learned patterns to the external knowledge sink
    pub pieces_enabled: bool,
}

impl Default for AutoFixConfig {
    fn default() -> Self {
        AutoFixConfig {
            enabled: true,
            min_success_rate: 0.7,
            breaker_failure_threshold: 5,
            breaker_recovery_secs: 60,
            clear_cache_path: "/api/v1/admin/clear-cache".to_string(),
            warm_up_paths: vec![
                "/".to_string(),
                "/api/health".to_string(),
                "/api/v1/status".to_string(),
            ],
            pieces_enabled: true,
        }
    }
}

/// Alert dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AlertsConfig {
    /// External notification script invoked fire-and-forget with the
    /// alert payload as its single argument
    pub notify_command: Option<PathBuf>,
}

/// Well-known filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub reports_dir: PathBuf,
    pub knowledge_base_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub pid_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            reports_dir: PathBuf::from("reports"),
            knowledge_base_dir: PathBuf::from("knowledge-base"),
            logs_dir: PathBuf::from("logs"),
            pid_file: PathBuf::from("warden.pid"),
        }
    }
}

impl Config {
    /// Load configuration: file (when given), then environment
    /// overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
            }
            None => Config::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the recognized environment variables on top of the
    /// current values.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("TARGET_URL") {
            self.target.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(port) = std::env::var("WEBSOCKET_PORT") {
            self.bus.port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid WEBSOCKET_PORT: {}", port)))?;
        }
        if let Ok(sla) = std::env::var("PERFORMANCE_SLA") {
            let sla_ms = sla
                .parse()
                .map_err(|_| Error::Config(format!("invalid PERFORMANCE_SLA: {}", sla)))?;
            self.monitor.sla_ms = sla_ms;
            self.sla.sla_ms = sla_ms;
        }
        if let Ok(interval) = std::env::var("MONITORING_INTERVAL") {
            self.monitor.interval_minutes = interval
                .parse()
                .map_err(|_| Error::Config(format!("invalid MONITORING_INTERVAL: {}", interval)))?;
        }
        if let Ok(pieces) = std::env::var("PIECES_INTEGRATION_ENABLED") {
            self.autofix.pieces_enabled = parse_bool(&pieces)
                .ok_or_else(|| Error::Config(format!("invalid PIECES_INTEGRATION_ENABLED: {}", pieces)))?;
        }
        if let Ok(autofix) = std::env::var("AUTO_FIX_ENABLED") {
            self.autofix.enabled = parse_bool(&autofix)
                .ok_or_else(|| Error::Config(format!("invalid AUTO_FIX_ENABLED: {}", autofix)))?;
        }
        Ok(())
    }

    /// Reject configurations that violate run invariants.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for endpoint in &self.target.endpoints {
            if !seen.insert(endpoint.path.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate endpoint path: {}",
                    endpoint.path
                )));
            }
        }
        if self.target.base_url.is_empty() {
            return Err(Error::Config("target base URL is empty".to_string()));
        }
        if self.monitor.performance_samples == 0 {
            return Err(Error::Config("performance_samples must be > 0".to_string()));
        }
        if self.sla.samples_per_tick == 0 || self.sla.rolling_window_ticks == 0 {
            return Err(Error::Config(
                "sla samples_per_tick and rolling_window_ticks must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Bus listener address in host:port form.
    pub fn bus_address(&self) -> String {
        format!("{}:{}", self.bus.bind_address, self.bus.port)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target.endpoints.len(), 7);
        assert_eq!(config.target.mock_endpoints.len(), 4);
        assert_eq!(config.monitor.sla_ms, 3000);
        assert_eq!(config.bus.port, 8080);
        assert_eq!(config.bus.connection_timeout().as_secs(), 60);
    }

    #[test]
    fn duplicate_endpoint_paths_rejected() {
        let mut config = Config::default();
        config
            .target
            .endpoints
            .push(EndpointDescriptor::new("/", "duplicate"));
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        std::env::set_var("TARGET_URL", "https://example.org/");
        std::env::set_var("PERFORMANCE_SLA", "1500");
        std::env::set_var("AUTO_FIX_ENABLED", "false");

        let mut config = Config::default();
        config.apply_env().unwrap();

        assert_eq!(config.target.base_url, "https://example.org");
        assert_eq!(config.monitor.sla_ms, 1500);
        assert_eq!(config.sla.sla_ms, 1500);
        assert!(!config.autofix.enabled);

        std::env::remove_var("TARGET_URL");
        std::env::remove_var("PERFORMANCE_SLA");
        std::env::remove_var("AUTO_FIX_ENABLED");
    }

    #[test]
    #[serial]
    fn invalid_env_value_is_fatal() {
        std::env::set_var("WEBSOCKET_PORT", "not-a-port");
        let mut config = Config::default();
        assert!(matches!(config.apply_env(), Err(Error::Config(_))));
        std::env::remove_var("WEBSOCKET_PORT");
    }

    #[test]
    fn partial_toml_round_trip() {
        let raw = r#"
            [monitor]
            interval_minutes = 5

            [bus]
            port = 9100
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.monitor.interval_minutes, 5);
        assert_eq!(config.bus.port, 9100);
        // untouched sections keep their defaults
        assert_eq!(config.sla.interval_minutes, 5);
        assert_eq!(config.target.endpoints.len(), 7);
    }
}
