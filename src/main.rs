//! Exit kiosk - payment terminal for a parking lot exit gate
//!
//! Drives one exit at a time from ticket scan to barrier release or
//! attendant hand-off. Ticket lookup and payment settlement are delegated to
//! the parking backend over HTTP.
//!
//! Module structure:
//! - `domain/` - Core business types (session, ticket, card, UPI, errors)
//! - `io/` - External interfaces (backend, attendant, journal, metrics, terminal)
//! - `services/` - Business logic (controller, countdown, kiosk runtime, barrier)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use exit_kiosk::infra::{Config, Metrics};
use exit_kiosk::io::terminal::{parse_line, render_view, Input, HELP};
use exit_kiosk::io::{create_attendant_channel, HttpAttendantNotifier, HttpBackend, Journal};
use exit_kiosk::services::{
    create_barrier_worker, BarrierController, ControllerSettings, ExitController, Kiosk,
    KioskCommand, KioskIo,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Exit kiosk - parking exit payment terminal
#[derive(Parser, Debug)]
#[command(name = "exit-kiosk", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for every state transition and tick
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "exit-kiosk starting");

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        gate_id = %config.gate_id(),
        backend_url = %config.backend_url(),
        payment_timeout_secs = %config.payment_timeout_secs(),
        barrier_enabled = !config.barrier_url().is_empty(),
        attendant_enabled = !config.attendant_url().is_empty(),
        journal_file = %config.journal_file(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    let backend = Arc::new(
        HttpBackend::new(config.backend_url(), config.backend_timeout())
            .context("Failed to build backend client")?,
    );

    // Barrier worker
    let barrier = Arc::new(BarrierController::new(&config));
    let (barrier_tx, barrier_worker) = create_barrier_worker(barrier, metrics.clone(), 8);
    tokio::spawn(barrier_worker.run());

    // Attendant worker
    let notifier =
        Arc::new(HttpAttendantNotifier::new(config.attendant_url(), config.backend_timeout()));
    let (attendant, attendant_worker) = create_attendant_channel(notifier, 16);
    tokio::spawn(attendant_worker.run());

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_gate = config.gate_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = exit_kiosk::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_gate,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let controller = ExitController::new(ControllerSettings::from(&config), metrics.clone());
    let io = KioskIo {
        validator: backend.clone(),
        gateway: backend,
        barrier_tx,
        attendant,
        journal: Journal::new(config.journal_file()),
    };
    let (kiosk, mut view_rx) =
        Kiosk::new(controller, io, metrics, config.gate_id(), config.tick_interval());

    // Display: print every new view
    tokio::spawn(async move {
        println!("{}\n", render_view(&view_rx.borrow_and_update()));
        while view_rx.changed().await.is_ok() {
            let text = render_view(&view_rx.borrow_and_update());
            println!("{text}\n");
        }
    });

    let (cmd_tx, cmd_rx) = mpsc::channel(32);

    // Terminal input
    let input_tx = cmd_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin_read_failed");
                    break;
                }
            };
            match parse_line(&line) {
                Ok(Input::Empty) => {}
                Ok(Input::Commands) => println!("{HELP}\n"),
                Ok(Input::Kiosk(commands)) => {
                    for cmd in commands {
                        if input_tx.send(cmd).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => println!("{e}\n"),
            }
        }
        let _ = input_tx.send(KioskCommand::Shutdown).await;
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = cmd_tx.send(KioskCommand::Shutdown).await;
    });

    // Run kiosk - consumes commands until shutdown
    kiosk.run(cmd_rx).await;

    let _ = shutdown_tx.send(true);
    info!("exit-kiosk shutdown complete");
    Ok(())
}
