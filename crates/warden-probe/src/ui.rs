//! External UI test harness invocation
//!
//! The harness is an opaque subprocess with a hard wall-clock ceiling.
//! Output is only parsed after the process has exited; a run that
//! overruns the ceiling is killed and surfaced as exit code 124 with
//! the timeout flag set.

use std::process::Stdio;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use warden_common::config::UiProbeConfig;
use warden_common::{UiCheck, UiOutcome};

/// Exit code reported for a killed, overrunning harness
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Run the configured UI harness once.
pub async fn run_ui_probe(config: &UiProbeConfig) -> UiCheck {
    if !config.enabled || config.command.is_empty() {
        debug!("ui probe disabled");
        return UiCheck::skipped();
    }

    let mut command = tokio::process::Command::new(&config.command[0]);
    command
        .args(&config.command[1..])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    info!("running ui harness: {}", config.command.join(" "));
    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("ui harness failed to start: {}", e);
            return UiCheck {
                outcome: UiOutcome::Error,
                exit_code: None,
                timed_out: false,
                report: None,
                accessibility: None,
            };
        }
    };

    let ceiling = Duration::from_secs(config.timeout_secs);
    let output = match timeout(ceiling, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("ui harness wait failed: {}", e);
            return UiCheck {
                outcome: UiOutcome::Error,
                exit_code: None,
                timed_out: false,
                report: None,
                accessibility: None,
            };
        }
        Err(_) => {
            // kill_on_drop delivers SIGKILL when the future is dropped
            warn!("ui harness exceeded {}s ceiling, killed", config.timeout_secs);
            return UiCheck {
                outcome: UiOutcome::Error,
                exit_code: Some(TIMEOUT_EXIT_CODE),
                timed_out: true,
                report: None,
                accessibility: None,
            };
        }
    };

    let exit_code = output.status.code();
    let report = parse_report(&output.stdout);
    let outcome = if output.status.success() {
        UiOutcome::Passed
    } else {
        UiOutcome::Failed
    };
    info!("ui harness finished with code {:?}", exit_code);

    UiCheck {
        outcome,
        exit_code,
        timed_out: false,
        report,
        accessibility: None,
    }
}

/// The harness prints a JSON report as its last non-empty stdout line.
fn parse_report(stdout: &[u8]) -> Option<serde_json::Value> {
    let text = String::from_utf8_lossy(stdout);
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| serde_json::from_str(line).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: Vec<&str>, timeout_secs: u64) -> UiProbeConfig {
        UiProbeConfig {
            enabled: true,
            command: command.into_iter().map(str::to_string).collect(),
            timeout_secs,
        }
    }

    #[tokio::test]
    async fn disabled_probe_is_skipped() {
        let check = run_ui_probe(&UiProbeConfig::default()).await;
        assert_eq!(check.outcome, UiOutcome::Skipped);
    }

    #[tokio::test]
    async fn passing_harness_yields_report() {
        let check = run_ui_probe(&config(
            vec!["sh", "-c", "echo '{\"passed\": 12, \"failed\": 0}'"],
            30,
        ))
        .await;
        assert_eq!(check.outcome, UiOutcome::Passed);
        assert_eq!(check.exit_code, Some(0));
        assert!(!check.timed_out);
        let report = check.report.unwrap();
        assert_eq!(report["passed"], 12);
    }

    #[tokio::test]
    async fn failing_harness_is_failed_not_error() {
        let check = run_ui_probe(&config(vec!["sh", "-c", "exit 3"], 30)).await;
        assert_eq!(check.outcome, UiOutcome::Failed);
        assert_eq!(check.exit_code, Some(3));
    }

    #[tokio::test]
    async fn overrun_is_killed_with_exit_124() {
        let check = run_ui_probe(&config(vec!["sleep", "30"], 1)).await;
        assert_eq!(check.outcome, UiOutcome::Error);
        assert_eq!(check.exit_code, Some(124));
        assert!(check.timed_out);
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let check = run_ui_probe(&config(vec!["warden-no-such-harness"], 30)).await;
        assert_eq!(check.outcome, UiOutcome::Error);
        assert_eq!(check.exit_code, None);
    }
}
