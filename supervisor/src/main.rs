//! Main entry point for the supervisor binary
//!
//! Loads a TOML manifest, registers its processes with the built-in
//! command handlers and runs until Ctrl+C or a `shutdown` command.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

use shared::{logging, process_debug};
use supervisor::{handlers, Manifest, Supervisor};

/// Supervise worker processes and route their messages
#[derive(Parser)]
#[command(name = "supervisor")]
#[command(about = "Launches, monitors and restarts worker processes")]
pub struct Args {
    /// Manifest describing the supervisor and its processes
    #[arg(long, default_value = "supervisor.toml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Override the directory used for file-exchange channels
    #[arg(long)]
    pub ipc_dir: Option<PathBuf>,

    /// Override the monitor tick in milliseconds
    #[arg(long)]
    pub monitor_interval_ms: Option<u64>,

    /// Per-process inbound message limit
    #[arg(long)]
    pub max_messages_per_second: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_tracing(Some(&args.log_level));

    let manifest = Manifest::load(&args.config)
        .with_context(|| format!("failed to load manifest {}", args.config.display()))?;

    let mut settings = manifest.supervisor;
    if let Some(ipc_dir) = args.ipc_dir {
        settings = settings.with_ipc_dir(ipc_dir);
    }
    if let Some(ms) = args.monitor_interval_ms {
        settings = settings.with_monitor_interval(Duration::from_millis(ms));
    }
    if args.max_messages_per_second.is_some() {
        settings = settings.with_rate_limit(args.max_messages_per_second);
    }

    let supervisor = Supervisor::new(settings);
    handlers::register_builtin_handlers(&supervisor);

    for process in manifest.processes {
        let name = process.name.clone();
        supervisor
            .register(process)
            .await
            .with_context(|| format!("failed to register {name}"))?;
    }
    let registered = supervisor.len().await;
    process_debug!(supervisor.settings().supervisor_name, "Registered {} process(es)", registered);

    // Set up graceful shutdown
    let on_signal = supervisor.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                logging::log_shutdown(&on_signal.settings().supervisor_name, "Received Ctrl+C signal");
                on_signal.shutdown().await;
            }
            Err(err) => {
                logging::log_error(&on_signal.settings().supervisor_name, "Signal handling", &err);
            }
        }
    });

    let outcome = supervisor.run().await;
    supervisor.shutdown().await;
    outcome?;

    logging::log_success(&supervisor.settings().supervisor_name, "Supervisor stopped gracefully");
    Ok(())
}
