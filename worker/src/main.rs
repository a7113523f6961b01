//! Notification worker binary.
//!
//! Exit codes:
//! - `0` graceful shutdown (Ctrl+C or SIGTERM)
//! - `1` fatal broker error; the supervisor is expected to restart the process
//! - `2` invalid configuration, nothing was consumed

use anyhow::Context;
use notification_worker::config::Config;
use notification_worker::{
    build_consumer, build_event_bus, exit_code, metrics as domain_metrics, startup_failure_code,
};
use notification_worker_core::environment::SystemClock;
use notification_worker_runtime::{MetricsServer, PrometheusSink};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Notification Worker");

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = match prepare(&config, shutdown_rx) {
        Ok(consumer) => consumer,
        Err(e) => {
            error!(error = ?e, "Startup failed");
            return startup_failure_code();
        }
    };

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let result = consumer.run().await;
    match &result {
        Ok(report) => info!(
            dispatched = report.dispatched,
            uptime_seconds = report.lifecycle.uptime_seconds,
            "Notification Worker stopped"
        ),
        Err(e) => error!(error = %e, "Notification Worker stopped on a fatal error"),
    }
    exit_code(&result)
}

/// Validate configuration, start the exporter and assemble the consumer loop.
fn prepare(
    config: &Config,
    shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<notification_worker_runtime::ConsumerLoop> {
    config.validate().context("Invalid configuration")?;
    info!(
        brokers = %config.brokers(),
        group_id = %config.kafka.group_id,
        auto_offset_reset = %config.kafka.auto_offset_reset,
        "Configuration loaded"
    );

    let mut metrics_server = MetricsServer::new(config.metrics_addr()?);
    metrics_server
        .start()
        .context("Failed to start metrics server")?;
    domain_metrics::register_domain_metrics();

    let event_bus = build_event_bus(config).context("Failed to create event bus")?;
    info!(brokers = %event_bus.brokers(), "Event bus created");

    let consumer = build_consumer(
        config,
        Arc::new(event_bus),
        Arc::new(PrometheusSink),
        Arc::new(SystemClock),
        shutdown,
    )
    .context("Invalid handler registry")?;
    info!(
        topics = ?notification_worker::topics::KnownTopic::names(),
        "Handlers registered"
    );

    Ok(consumer)
}

/// Resolve when the process receives Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
