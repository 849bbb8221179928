//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! exporters.rs (stdout or OTLP, one per signal)
//!     → telemetry.rs (tracer, meter and logger providers)
//!         → http::instrument (spans + metrics.rs instruments per request)
//!         → logging.rs (tracing events bridged into log records)
//! propagation.rs: incoming traceparent → parent span context
//! ```
//!
//! # Design Decisions
//! - Providers are owned by one `Telemetry` value, never installed globally
//! - Every provider is flushed and closed at shutdown, failures aggregated

pub mod exporters;
pub mod logging;
pub mod metrics;
pub mod propagation;
pub mod telemetry;

pub use exporters::{ExporterFactory, OtlpExporters, StdoutExporters};
pub use metrics::HttpServerMetrics;
pub use telemetry::{PipelineError, PipelineKind, Telemetry, TelemetryError};
