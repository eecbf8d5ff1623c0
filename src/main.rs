//! Relay Worker - peer relay with per-peer compute fan-out
//!
//! This is the main entry point for the relay worker binary.
//! The relay accepts WebSocket peers (and dials configured upstream relays),
//! validates every inbound message, and sends each other open peer the
//! result of its own compute task.

mod cli;
mod compute;
mod config;
mod error;
mod logging;
mod protocol;
mod relay;
mod validator;
mod version;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::cli::{Cli, Commands};
use crate::compute::{BackendFactory, BackendType, Operands};
use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::relay::{ConnectionRegistry, Dialer, DialerConfig, RelayBroadcaster, RelayServer};

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    let (config_path, listen) = match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone());
        }
        Commands::Compute { a, b, backend } => {
            logging::init_simple(if cli.verbose > 0 {
                tracing::Level::DEBUG
            } else {
                tracing::Level::WARN
            })?;
            if let Err(e) = run_compute(a.clone(), b.clone(), backend) {
                eprint!("{}", e.format_for_terminal());
                std::process::exit(e.exit_code());
            }
            return Ok(());
        }
        Commands::Run { config, listen } => (config.clone(), listen.clone()),
    };

    let config = match load_run_config(config_path.as_deref(), listen) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprint!("{}", e.format_for_terminal());
            std::process::exit(e.exit_code());
        }
    };

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting Relay Worker"
    );

    run_relay(config)
}

/// Load configuration and apply command-line overrides
fn load_run_config(path: Option<&str>, listen: Option<String>) -> Result<RelayConfig> {
    let mut config = RelayConfig::load(path)?;
    if let Some(addr) = listen {
        config.server.listen_addr = addr;
        config.validate()?;
    }
    Ok(config)
}

/// Run the relay until Ctrl+C
fn run_relay(config: RelayConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().min(8))
        .thread_name("relay-worker")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async_relay_main(config))
}

async fn async_relay_main(config: RelayConfig) -> Result<()> {
    let node_id = config
        .node
        .id
        .clone()
        .unwrap_or_else(|| format!("relay-{}", &uuid::Uuid::new_v4().to_string()[..8]));
    let node_name = config.node.name.clone().unwrap_or_else(|| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "relay".to_string())
    });

    let registry = Arc::new(ConnectionRegistry::new());
    let broadcaster = Arc::new(RelayBroadcaster::from_config(&config, Arc::clone(&registry))?);
    let stats = Arc::clone(broadcaster.stats());

    let capabilities = broadcaster.backend().capabilities();
    info!(
        node_id = %node_id,
        node_name = %node_name,
        backend = capabilities.name,
        parallelism = capabilities.parallelism,
        offloads_blocking = capabilities.offloads_blocking,
        upstreams = config.peers.upstream.len(),
        "Relay configured"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = RelayServer::bind(config.listen_addr()?, Arc::clone(&broadcaster), &config.server).await?;
    let server_handle = tokio::spawn(server.run(shutdown_rx.clone()));

    let mut dialer_handles = Vec::new();
    for url in &config.peers.upstream {
        let dialer_config = DialerConfig::from_settings(url, &config.peers, config.server.outbound_queue_size);
        let dialer = Dialer::new(dialer_config, Arc::clone(&broadcaster));
        let rx = shutdown_rx.clone();
        let url = url.clone();
        dialer_handles.push(tokio::spawn(async move {
            if let Err(e) = dialer.run(rx).await {
                error!(url = %url, error = %e.format_for_log(), "Upstream dialer stopped");
            }
        }));
    }

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    let stats_enabled = config.server.stats_interval_ms > 0;
    let mut stats_timer = tokio::time::interval(Duration::from_millis(config.server.stats_interval_ms.max(1)));
    stats_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            result = &mut shutdown_signal => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Shutdown signal received");
                break;
            }

            _ = stats_timer.tick(), if stats_enabled => {
                let snap = stats.snapshot();
                info!(
                    connections = registry.len(),
                    open = registry.open_count(),
                    received = snap.received,
                    rejected = snap.rejected,
                    delivered = snap.delivered,
                    dropped = snap.dropped,
                    send_failed = snap.send_failed,
                    compute_failed = snap.compute_failed,
                    "Relay stats"
                );
            }
        }
    }

    let _ = shutdown_tx.send(true);
    match server_handle.await {
        Ok(Err(e)) => warn!(error = %e.format_for_log(), "Listener ended with error"),
        Err(e) => warn!(error = %e, "Listener task failed"),
        Ok(Ok(())) => {}
    }
    for handle in dialer_handles {
        let _ = handle.await;
    }

    let closed = registry.close_all();
    let snap = stats.snapshot();
    info!(
        closed_connections = closed,
        received = snap.received,
        rejected = snap.rejected,
        delivered = snap.delivered,
        "Relay shutting down"
    );

    Ok(())
}

/// One-shot local difference, printed as JSON
fn run_compute(a: Vec<f64>, b: Vec<f64>, backend: &str) -> Result<()> {
    let backend_type = BackendType::from_name(backend).ok_or_else(|| {
        Error::NotSupported(format!("Unknown compute backend '{}'. Must be one of: cpu, mock", backend))
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create runtime: {}", e)))?;

    let values = runtime.block_on(async {
        let backend = BackendFactory::create(backend_type, 0)?;
        backend.difference(Arc::new(Operands::new(a, b))).await
    })?;

    println!("{}", serde_json::json!({ "values": values }));
    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: cli::ConfigSubcommand) -> Result<()> {
    use cli::ConfigSubcommand;

    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = RelayConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let created = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", created.display());
        }
        ConfigSubcommand::Validate { config } => match RelayConfig::load(config.as_deref()) {
            Ok(_) => {
                println!("Configuration is valid.");
            }
            Err(e) => {
                eprint!("{}", e.format_for_terminal());
                std::process::exit(e.exit_code());
            }
        },
    }

    Ok(())
}
