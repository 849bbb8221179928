//! Startup orchestration.
//!
//! # Responsibilities
//! - Install signal handling on a fresh run context
//! - Bring up telemetry, then logging, then the router and server
//! - Block until the server returns, then tear down in reverse
//!
//! # Design Decisions
//! - Fail fast: a setup error is fatal and nothing is served
//! - Telemetry exists before any handler is built, so handlers are
//!   instrumented from their first request
//! - Listeners start last (traffic only when ready)

use crate::config::ServiceConfig;
use crate::http::{router, HttpInstrumentation, HttpServer};
use crate::lifecycle::shutdown::{teardown, Error};
use crate::lifecycle::{RunContext, SignalBridge};
use crate::observability::{logging, Telemetry};

/// Run the service until interrupted or until the listener fails.
pub async fn run(config: ServiceConfig) -> Result<(), Error> {
    let ctx = RunContext::new();
    let signals = SignalBridge::install(&ctx).map_err(Error::Signals)?;

    let telemetry = Telemetry::setup(&ctx, &config.telemetry)?;

    if let Err(e) = logging::init(&config.logging, Some(telemetry.logger_provider())) {
        eprintln!("logging already initialised: {e}");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        exporter = ?config.telemetry.exporter,
        "dice-server starting"
    );

    serve(&config, ctx, telemetry, Some(signals)).await
}

/// Serve with a caller-supplied run context and telemetry bundle.
///
/// Binds the configured address, serves until `ctx` is stopped or the
/// listener fails, then revokes `signals` and shuts `telemetry` down.
pub async fn serve(
    config: &ServiceConfig,
    ctx: RunContext,
    telemetry: Telemetry,
    signals: Option<SignalBridge>,
) -> Result<(), Error> {
    let instrumentation = HttpInstrumentation::new(&telemetry);
    let server = HttpServer::new(config, router(&instrumentation, &config.timeouts));
    let result = server.run(ctx).await;
    teardown(result, signals, telemetry)
}
