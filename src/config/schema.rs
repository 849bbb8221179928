//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the dice service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Read/write timeouts and the drain period.
    pub timeouts: TimeoutConfig,

    /// Telemetry pipelines and their exporters.
    pub telemetry: TelemetryConfig,

    /// Local log output.
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for a client to deliver request headers, in seconds.
    pub read_secs: u64,

    /// Time allowed to produce a response, in seconds.
    pub write_secs: u64,

    /// Time in-flight requests get to finish once shutdown starts, in seconds.
    pub drain_secs: u64,
}

impl TimeoutConfig {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 1,
            write_secs: 10,
            drain_secs: 10,
        }
    }
}

/// Which exporters the telemetry pipelines write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    /// Print to stdout (development).
    Stdout,
    /// OTLP over HTTP; endpoint from `OTEL_EXPORTER_OTLP_*` variables.
    Otlp,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `service.name` resource attribute.
    pub service_name: String,

    /// Exporter backend for all three pipelines.
    pub exporter: ExporterKind,

    /// Metric export interval in seconds.
    pub metric_interval_secs: u64,

    /// Additionally print metrics to stdout.
    pub print_metrics: bool,
}

impl TelemetryConfig {
    pub fn metric_interval(&self) -> Duration {
        Duration::from_secs(self.metric_interval_secs)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "dice".to_string(),
            exporter: ExporterKind::Stdout,
            metric_interval_secs: 3,
            print_metrics: false,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (e.g. "info", "dice_server=debug").
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "dice_server=info,tower_http=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
