//! Warden main executable

use clap::{Arg, Command};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;
use warden_common::{Config, OverallHealth};
use warden_supervisor::Supervisor;

fn main() {
    let matches = Command::new("warden")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Active health-monitoring and self-healing supervisor")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .global(true),
        )
        .subcommand(Command::new("start").about("Run the supervisor in the foreground"))
        .subcommand(Command::new("stop").about("Stop a running supervisor via its pid file"))
        .subcommand(Command::new("status").about("Emit a JSON snapshot of the latest verdict"))
        .subcommand(
            Command::new("check").about("Run one forced probe session; exit 1 when critical"),
        )
        .subcommand(
            Command::new("report")
                .about("Emit an aggregated SLA rollup for the given window")
                .arg(
                    Arg::new("hours")
                        .value_name("HOURS")
                        .default_value("24")
                        .help("Window size in hours"),
                ),
        )
        .subcommand_required(true)
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(2);
        }
    };

    let exit_code = match matches.subcommand() {
        Some(("start", _)) => run_start(config),
        Some(("stop", _)) => run_stop(&config),
        Some(("status", _)) => run_status(&config),
        Some(("check", _)) => run_check(config),
        Some(("report", submatches)) => {
            let hours: u64 = submatches
                .get_one::<String>("hours")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(24);
            run_report(&config, hours)
        }
        _ => unreachable!("subcommand required"),
    };
    std::process::exit(exit_code);
}

fn init_tracing(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warden=info,warden_probe=info,warden_sla=info,warden_bus=info,warden_autofix=info,warden_alerts=info,warden_supervisor=info"));

    match log_file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    }) {
        Some(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stdout.and(std::sync::Arc::new(file)))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
        }
    }
}

fn run_start(config: Config) -> i32 {
    if let Err(e) = std::fs::create_dir_all(&config.paths.logs_dir) {
        eprintln!("cannot create logs directory: {}", e);
        return 2;
    }
    init_tracing(Some(&config.paths.logs_dir.join("warden.log")));

    if let Err(e) = write_pid_file(&config.paths.pid_file) {
        error!("cannot write pid file: {}", e);
        return 2;
    }
    info!("warden v{} starting", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("runtime start failed: {}", e);
            let _ = std::fs::remove_file(&config.paths.pid_file);
            return 2;
        }
    };

    let pid_file = config.paths.pid_file.clone();
    let result = runtime.block_on(async move {
        let supervisor = Supervisor::new(config)?;
        supervisor.run().await
    });
    let _ = std::fs::remove_file(&pid_file);

    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("supervisor failed: {}", e);
            1
        }
    }
}

fn run_stop(config: &Config) -> i32 {
    init_tracing(None);
    let pid = match read_pid_file(&config.paths.pid_file) {
        Some(pid) => pid,
        None => {
            eprintln!("no pid file at {}; is warden running?", config.paths.pid_file.display());
            return 1;
        }
    };

    match nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid),
        nix::sys::signal::Signal::SIGTERM,
    ) {
        Ok(()) => {
            println!("sent SIGTERM to warden (pid {})", pid);
            0
        }
        Err(nix::errno::Errno::ESRCH) => {
            eprintln!("stale pid file (no process {}); removing", pid);
            let _ = std::fs::remove_file(&config.paths.pid_file);
            1
        }
        Err(e) => {
            eprintln!("failed to signal pid {}: {}", pid, e);
            1
        }
    }
}

fn run_status(config: &Config) -> i32 {
    let summary_path = config.paths.reports_dir.join("summary.json");
    let summary: serde_json::Value = match std::fs::read_to_string(&summary_path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
    {
        Some(summary) => summary,
        None => {
            eprintln!("no summary at {}; no completed session yet", summary_path.display());
            return 1;
        }
    };

    let running = read_pid_file(&config.paths.pid_file)
        .map(|pid| {
            nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
        })
        .unwrap_or(false);

    let snapshot = serde_json::json!({
        "running": running,
        "target": config.target.base_url,
        "summary": summary,
    });
    println!("{}", serde_json::to_string_pretty(&snapshot).unwrap_or_default());
    0
}

fn run_check(config: Config) -> i32 {
    init_tracing(None);
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("runtime start failed: {}", e);
            return 2;
        }
    };

    let verdict = runtime.block_on(async move {
        let supervisor = Supervisor::new(config)?;
        supervisor.monitor().force_check().await
    });

    match verdict {
        Ok(verdict) => {
            match serde_json::to_string_pretty(&verdict) {
                Ok(raw) => println!("{}", raw),
                Err(e) => error!("verdict serialization failed: {}", e),
            }
            if matches!(verdict.overall, OverallHealth::Critical) {
                1
            } else {
                0
            }
        }
        Err(e) => {
            error!("forced session failed: {}", e);
            1
        }
    }
}

fn run_report(config: &Config, hours: u64) -> i32 {
    match warden_sla::offline_report(&config.paths.reports_dir, hours) {
        Ok(rollup) => {
            println!("{}", serde_json::to_string_pretty(&rollup).unwrap_or_default());
            0
        }
        Err(e) => {
            eprintln!("report failed: {}", e);
            1
        }
    }
}

fn write_pid_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, std::process::id().to_string())
}

fn read_pid_file(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}
