//! Node process supervisor.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ─▶ NodeConfig ─▶ Kernel ─▶ launch table ─▶ Supervisor::start
//!                                                               │
//!        ┌──────────────────────────────────────────────────────┘
//!        ▼
//!   Profiling → Database → NoConsensusExecution | Consensus → StartupAnnouncer
//!     → rpc/web3 → rpc/info → rpc/metrics → rpc/query → Bridges
//!
//!   Trigger (signal / POST /debug/shutdown / fatal report)
//!        ▼
//!   Supervisor::shutdown: reverse order, one grace deadline
//! ```
//!
//! Exit status: 2 when the configuration is invalid, 1 when startup fails
//! (the failing subsystem is named) or a process reported a fatal error. A
//! shutdown with failures is logged and still exits zero.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use node_supervisor::config::{load_config, NodeConfig};
use node_supervisor::kernel::Kernel;
use node_supervisor::lifecycle::{fatal_channel, BoxError, Shutdown, ShutdownTrigger, Supervisor};
use node_supervisor::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "node-supervisor")]
#[command(about = "Run a node under lifecycle supervision", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overriding config and RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("configuration error in {}: {e}", path.display());
                std::process::exit(2);
            }
        },
        None => NodeConfig::default(),
    };

    logging::init(&config.observability, args.log_level.as_deref())?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "node-supervisor starting");

    let metrics_handle = if config.rpc.metrics.enabled {
        match metrics::install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install metrics recorder");
                None
            }
        }
    } else {
        None
    };

    let shutdown = Shutdown::new();
    let (fatal, mut fatal_rx) = fatal_channel();
    let kernel = Arc::new(Kernel::from_config(config, shutdown.clone(), fatal, metrics_handle));

    let mut supervisor = match kernel.boot(kernel.launchers()).await {
        Ok(supervisor) => supervisor,
        Err(e) => {
            let subsystem = e.subsystem().unwrap_or("configuration");
            tracing::error!(subsystem, error = %e, "Startup failed");
            eprintln!("startup failed in {subsystem}: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let trigger = Supervisor::wait_for_trigger(&shutdown, &mut fatal_rx).await;
    if let Err(e) = supervisor.shutdown().await {
        tracing::error!(error = %e, "Some subsystems did not stop cleanly");
    }
    tracing::info!("Shutdown complete");

    if let ShutdownTrigger::Fatal(fatal) = trigger {
        eprintln!("stopped after fatal error in {}: {}", fatal.process, fatal.message);
        std::process::exit(1);
    }
    Ok(())
}
