//! Structured logging.
//!
//! # Responsibilities
//! - Install the process-wide `tracing` subscriber
//! - Forward log events into the OpenTelemetry log pipeline
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured level
//! - Events from the exporters' own HTTP stack are not fed back into the
//!   log pipeline

use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

const BRIDGE_FILTER: &str = "info,hyper=off,hyper_util=off,h2=off,tonic=off,reqwest=off,opentelemetry=off";

/// Install the global subscriber.
///
/// With a logger provider, events are also emitted as OpenTelemetry log
/// records. Fails if a subscriber is already installed.
pub fn init(
    config: &LoggingConfig,
    logger_provider: Option<&SdkLoggerProvider>,
) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let fmt = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    let bridge = logger_provider.map(|provider| {
        OpenTelemetryTracingBridge::new(provider).with_filter(EnvFilter::new(BRIDGE_FILTER))
    });

    tracing_subscriber::registry()
        .with(fmt.with_filter(filter))
        .with(bridge)
        .try_init()
}
