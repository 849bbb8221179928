//! Ordered teardown and the process-level error.
//!
//! # Design Decisions
//! - Teardown runs whatever the server returned
//! - Signal handling is revoked before telemetry is flushed, so a further
//!   interrupt during a slow flush kills the process
//! - A server error and a shutdown error are both reported, never one
//!   dropped in favour of the other

use std::io;

use thiserror::Error;

use crate::http::ServerError;
use crate::lifecycle::SignalBridge;
use crate::observability::{PipelineError, Telemetry, TelemetryError};

/// Why the process exited unsuccessfully.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to install signal handling: {0}")]
    Signals(#[source] io::Error),
    #[error("telemetry setup failed: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("server failed: {0}")]
    Server(#[from] ServerError),
    #[error(transparent)]
    Shutdown(#[from] PipelineError),
    #[error("server failed: {server}; {shutdown}")]
    Both {
        server: ServerError,
        #[source]
        shutdown: PipelineError,
    },
}

impl Error {
    /// Combine the server's exit with the telemetry shutdown outcome.
    pub fn join(
        server: Result<(), ServerError>,
        shutdown: Result<(), PipelineError>,
    ) -> Result<(), Error> {
        match (server, shutdown) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(server), Ok(())) => Err(Error::Server(server)),
            (Ok(()), Err(shutdown)) => Err(Error::Shutdown(shutdown)),
            (Err(server), Err(shutdown)) => Err(Error::Both { server, shutdown }),
        }
    }
}

/// Release process resources after the server has returned.
pub(crate) fn teardown(
    server: Result<(), ServerError>,
    signals: Option<SignalBridge>,
    telemetry: Telemetry,
) -> Result<(), Error> {
    if let Some(mut signals) = signals {
        signals.revoke();
    }

    tracing::info!("Flushing telemetry");
    let shutdown = telemetry.shutdown();
    if let Err(e) = &shutdown {
        // The log pipeline may be gone; make sure the failure is visible.
        eprintln!("{e}");
    }

    Error::join(server, shutdown)
}
