//! Telemetry provider bundle.
//!
//! # Responsibilities
//! - Build the trace, metric and log providers with their exporters
//! - Hand tracers, meters and the logger provider to code built afterwards
//! - Shut every provider down exactly once, collecting all failures
//!
//! # Design Decisions
//! - Nothing is registered globally; the bundle is passed explicitly
//! - Batching span/log processors and periodic metric readers run on their
//!   own threads, so shutdown is a blocking flush
//! - A failure while building tears down every provider already built

use std::fmt;

use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use thiserror::Error;

use crate::config::{ExporterKind, TelemetryConfig};
use crate::lifecycle::RunContext;
use crate::observability::exporters::{BoxError, ExporterFactory, OtlpExporters, StdoutExporters};

/// Instrumentation scope for everything this crate records.
pub const SCOPE: &str = "dice-server";

/// One of the three telemetry pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Traces,
    Metrics,
    Logs,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineKind::Traces => "trace",
            PipelineKind::Metrics => "metric",
            PipelineKind::Logs => "log",
        })
    }
}

/// Error building the bundle.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("run context stopped before the {0} pipeline was built")]
    Cancelled(PipelineKind),
    #[error("failed to build the {pipeline} exporter")]
    Exporter {
        pipeline: PipelineKind,
        #[source]
        source: BoxError,
    },
}

/// Every failure from one flush or shutdown pass over the pipelines.
#[derive(Debug)]
pub struct PipelineError {
    operation: &'static str,
    failures: Vec<(PipelineKind, OTelSdkError)>,
}

impl PipelineError {
    /// The pipelines that failed, in the order they were attempted.
    pub fn failures(&self) -> impl Iterator<Item = (PipelineKind, &OTelSdkError)> {
        self.failures.iter().map(|(kind, err)| (*kind, err))
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "telemetry {} failed", self.operation)?;
        for (i, (kind, err)) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{kind} provider: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PipelineError {}

/// A built provider that can be flushed and closed.
pub(crate) trait Pipeline {
    fn kind(&self) -> PipelineKind;
    fn flush(&self) -> OTelSdkResult;
    fn close(&self) -> OTelSdkResult;
}

impl Pipeline for SdkTracerProvider {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Traces
    }

    fn flush(&self) -> OTelSdkResult {
        self.force_flush()
    }

    fn close(&self) -> OTelSdkResult {
        self.shutdown()
    }
}

impl Pipeline for SdkMeterProvider {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Metrics
    }

    fn flush(&self) -> OTelSdkResult {
        self.force_flush()
    }

    fn close(&self) -> OTelSdkResult {
        self.shutdown()
    }
}

impl Pipeline for SdkLoggerProvider {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Logs
    }

    fn flush(&self) -> OTelSdkResult {
        self.force_flush()
    }

    fn close(&self) -> OTelSdkResult {
        self.shutdown()
    }
}

/// Apply `op` to every pipeline in order. Never stops early.
fn each_pipeline(
    operation: &'static str,
    pipelines: &[&dyn Pipeline],
    op: impl Fn(&dyn Pipeline) -> OTelSdkResult,
) -> Result<(), PipelineError> {
    let failures: Vec<_> = pipelines
        .iter()
        .filter_map(|pipeline| op(*pipeline).err().map(|err| (pipeline.kind(), err)))
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(PipelineError {
            operation,
            failures,
        })
    }
}

fn close_all(pipelines: &[&dyn Pipeline]) -> Result<(), PipelineError> {
    each_pipeline("shutdown", pipelines, |pipeline| pipeline.close())
}

/// Close providers built before a setup failure. The setup error wins.
fn abandon(pipelines: &[&dyn Pipeline]) {
    if let Err(e) = close_all(pipelines) {
        tracing::warn!(error = %e, "Failed to close partially built telemetry");
    }
}

fn ensure_running(ctx: &RunContext, next: PipelineKind) -> Result<(), TelemetryError> {
    if ctx.is_stopped() {
        Err(TelemetryError::Cancelled(next))
    } else {
        Ok(())
    }
}

fn exporter<T>(pipeline: PipelineKind, built: Result<T, BoxError>) -> Result<T, TelemetryError> {
    built.map_err(|source| TelemetryError::Exporter { pipeline, source })
}

fn resource(config: &TelemetryConfig) -> Resource {
    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attribute(KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")))
        .build()
}

/// The trace, metric and log providers of the process.
///
/// Closed by [`Telemetry::shutdown`], or on drop if that never happened.
pub struct Telemetry {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: SdkLoggerProvider,
    closed: bool,
}

impl Telemetry {
    /// Build the providers with the exporters `config` selects.
    pub fn setup(ctx: &RunContext, config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        match config.exporter {
            ExporterKind::Stdout => Self::setup_with(ctx, config, StdoutExporters),
            ExporterKind::Otlp => Self::setup_with(ctx, config, OtlpExporters),
        }
    }

    /// Build the providers with exporters from `exporters`.
    pub fn setup_with<F: ExporterFactory>(
        ctx: &RunContext,
        config: &TelemetryConfig,
        exporters: F,
    ) -> Result<Self, TelemetryError> {
        let resource = resource(config);

        ensure_running(ctx, PipelineKind::Traces)?;
        let tracer_provider = SdkTracerProvider::builder()
            .with_resource(resource.clone())
            .with_batch_exporter(exporter(PipelineKind::Traces, exporters.spans())?)
            .build();

        let meter_provider = match ensure_running(ctx, PipelineKind::Metrics)
            .and_then(|()| build_meter_provider(&resource, config, &exporters))
        {
            Ok(provider) => provider,
            Err(e) => {
                abandon(&[&tracer_provider]);
                return Err(e);
            }
        };

        let logger_provider = match ensure_running(ctx, PipelineKind::Logs)
            .and_then(|()| exporter(PipelineKind::Logs, exporters.logs()))
        {
            Ok(logs) => SdkLoggerProvider::builder()
                .with_resource(resource)
                .with_batch_exporter(logs)
                .build(),
            Err(e) => {
                abandon(&[&tracer_provider, &meter_provider]);
                return Err(e);
            }
        };

        tracing::debug!(
            service_name = %config.service_name,
            exporter = ?config.exporter,
            "Telemetry pipelines built"
        );

        Ok(Self {
            tracer_provider,
            meter_provider,
            logger_provider,
            closed: false,
        })
    }

    /// Tracer for this crate's instrumentation scope.
    pub fn tracer(&self) -> SdkTracer {
        self.tracer_provider.tracer(SCOPE)
    }

    /// Meter for this crate's instrumentation scope.
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(SCOPE)
    }

    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    pub fn logger_provider(&self) -> &SdkLoggerProvider {
        &self.logger_provider
    }

    /// Export everything buffered so far without closing anything.
    pub fn force_flush(&self) -> Result<(), PipelineError> {
        each_pipeline("flush", &self.pipelines(), |pipeline| pipeline.flush())
    }

    /// Flush and close all three providers, in creation order.
    pub fn shutdown(mut self) -> Result<(), PipelineError> {
        self.close()
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        self.closed = true;
        close_all(&self.pipelines())
    }

    fn pipelines(&self) -> [&dyn Pipeline; 3] {
        [
            &self.tracer_provider,
            &self.meter_provider,
            &self.logger_provider,
        ]
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Telemetry closed on drop with errors");
        }
    }
}

fn build_meter_provider<F: ExporterFactory>(
    resource: &Resource,
    config: &TelemetryConfig,
    exporters: &F,
) -> Result<SdkMeterProvider, TelemetryError> {
    let interval = config.metric_interval();
    let reader = PeriodicReader::builder(exporter(PipelineKind::Metrics, exporters.metrics())?)
        .with_interval(interval)
        .build();

    let mut builder = SdkMeterProvider::builder()
        .with_resource(resource.clone())
        .with_reader(reader);

    if config.print_metrics {
        let printer = PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .with_interval(interval)
            .build();
        builder = builder.with_reader(printer);
    }

    Ok(builder.build())
}
