//! Exporter construction for the three telemetry pipelines.
//!
//! The bundle in [`super::telemetry`] never names a concrete exporter; it asks
//! an [`ExporterFactory`] for one per pipeline. Construction may fail (an OTLP
//! exporter can reject its environment), which is reported per pipeline so
//! the bundle can tear down whatever it already built.

use opentelemetry_sdk::logs::LogExporter;
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::trace::SpanExporter;

/// Error returned by exporter construction.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Source of exporters for the trace, metric and log pipelines.
pub trait ExporterFactory {
    type Spans: SpanExporter + 'static;
    type Metrics: PushMetricExporter + 'static;
    type Logs: LogExporter + 'static;

    fn spans(&self) -> Result<Self::Spans, BoxError>;
    fn metrics(&self) -> Result<Self::Metrics, BoxError>;
    fn logs(&self) -> Result<Self::Logs, BoxError>;
}

/// Exporters that print every batch to stdout. Used for local development.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutExporters;

impl ExporterFactory for StdoutExporters {
    type Spans = opentelemetry_stdout::SpanExporter;
    type Metrics = opentelemetry_stdout::MetricExporter;
    type Logs = opentelemetry_stdout::LogExporter;

    fn spans(&self) -> Result<Self::Spans, BoxError> {
        Ok(opentelemetry_stdout::SpanExporter::default())
    }

    fn metrics(&self) -> Result<Self::Metrics, BoxError> {
        Ok(opentelemetry_stdout::MetricExporter::default())
    }

    fn logs(&self) -> Result<Self::Logs, BoxError> {
        Ok(opentelemetry_stdout::LogExporter::default())
    }
}

/// OTLP/HTTP exporters.
///
/// Endpoint, headers and protocol come from the standard
/// `OTEL_EXPORTER_OTLP_*` environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtlpExporters;

impl ExporterFactory for OtlpExporters {
    type Spans = opentelemetry_otlp::SpanExporter;
    type Metrics = opentelemetry_otlp::MetricExporter;
    type Logs = opentelemetry_otlp::LogExporter;

    fn spans(&self) -> Result<Self::Spans, BoxError> {
        Ok(opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .build()?)
    }

    fn metrics(&self) -> Result<Self::Metrics, BoxError> {
        Ok(opentelemetry_otlp::MetricExporter::builder()
            .with_http()
            .build()?)
    }

    fn logs(&self) -> Result<Self::Logs, BoxError> {
        Ok(opentelemetry_otlp::LogExporter::builder()
            .with_http()
            .build()?)
    }
}
