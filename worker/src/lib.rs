//! # Notification Worker
//!
//! Consumes order, user, stock, security and chaos events from Kafka/Redpanda
//! and turns them into (simulated) notifications.
//!
//! The dispatch machinery lives in `notification-worker-runtime`; this crate
//! supplies the pieces specific to this deployment:
//!
//! - [`config`]: environment-driven configuration
//! - [`topics`]: the fixed topic set
//! - [`handlers`]: one handler per topic
//! - [`metrics`]: domain metrics recorded by the handlers
//!
//! [`build_consumer`] wires them together for the binary and for tests;
//! [`exit_code`] maps how the loop ended to the process exit status.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod topics;

use config::Config;
use notification_worker_core::environment::Clock;
use notification_worker_core::{EventBus, EventBusError, MetricsSink};
use notification_worker_redpanda::RedpandaEventBus;
use notification_worker_runtime::{
    ConsumerError, ConsumerLoop, ConsumerSettings, Dispatcher, HandlerRegistry, RegistryError,
    RunReport,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast;
use topics::KnownTopic;

/// Consumer name used in logs.
pub const CONSUMER_NAME: &str = "notification-worker";

/// Exit status after a graceful shutdown.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit status after a fatal broker error; the supervisor restarts the process.
pub const EXIT_FATAL: u8 = 1;
/// Exit status when startup fails before anything is consumed.
pub const EXIT_CONFIG: u8 = 2;

/// Exit status for a finished consumer loop.
#[must_use]
pub const fn exit_status(result: &Result<RunReport, ConsumerError>) -> u8 {
    match result {
        Ok(_) => EXIT_SUCCESS,
        Err(
            ConsumerError::Subscribe(_) | ConsumerError::Transport(_) | ConsumerError::StreamClosed,
        ) => EXIT_FATAL,
    }
}

/// Process exit code for a finished consumer loop.
#[must_use]
pub fn exit_code(result: &Result<RunReport, ConsumerError>) -> ExitCode {
    ExitCode::from(exit_status(result))
}

/// Process exit code when configuration or startup fails.
#[must_use]
pub fn startup_failure_code() -> ExitCode {
    ExitCode::from(EXIT_CONFIG)
}

/// Build the registry holding [`handlers::notification_handlers`].
///
/// # Errors
///
/// Returns [`RegistryError`] if two handlers claim the same topic.
pub fn build_registry() -> Result<HandlerRegistry, RegistryError> {
    HandlerRegistry::new(handlers::notification_handlers())
}

/// Consumer settings for [`KnownTopic::ALL`] and the configured group.
#[must_use]
pub fn consumer_settings(config: &Config) -> ConsumerSettings {
    ConsumerSettings::new(CONSUMER_NAME, KnownTopic::names(), &config.kafka.group_id)
}

/// Build the Redpanda event bus from configuration.
///
/// # Errors
///
/// Returns [`EventBusError::ConnectionFailed`] if the client configuration is rejected.
pub fn build_event_bus(config: &Config) -> Result<RedpandaEventBus, EventBusError> {
    RedpandaEventBus::builder()
        .brokers(config.brokers())
        .auto_offset_reset(&config.kafka.auto_offset_reset)
        .session_timeout(config.session_timeout())
        .auto_commit_interval(config.auto_commit_interval())
        .startup_timeout(config.startup_timeout())
        .build()
}

/// Assemble the consumer loop over any event bus, sink and clock.
///
/// # Errors
///
/// Returns [`RegistryError`] if the handler set is misconfigured.
pub fn build_consumer(
    config: &Config,
    event_bus: Arc<dyn EventBus>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    shutdown: broadcast::Receiver<()>,
) -> Result<ConsumerLoop, RegistryError> {
    let registry = build_registry()?;
    let dispatcher = Dispatcher::new(Arc::new(registry), metrics);
    Ok(ConsumerLoop::new(
        consumer_settings(config),
        event_bus,
        dispatcher,
        clock,
        shutdown,
    ))
}
