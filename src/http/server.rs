//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Serve the router over HTTP/1.1 and HTTP/2 on a bounded listener
//! - Bound request header delivery by the read timeout
//! - Attach the run context to every request
//! - Drain in-flight connections when the run context is stopped
//!
//! # State Machine
//! ```text
//! Idle → Serving → Draining → Closed
//!   └───────┴──────────────────→ Closed   (bind or accept failure)
//! ```
//!
//! # Design Decisions
//! - The accept loop runs on its own task and owns every connection task
//! - Connections outliving the drain period are aborted

use std::time::Duration;

use axum::{Extension, Router};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::{ListenerConfig, ServiceConfig, TimeoutConfig};
use crate::lifecycle::RunContext;
use crate::net::{Listener, ListenerError};

/// Where the server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Serving,
    Draining,
    Closed,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("accept loop aborted")]
    Aborted(#[source] JoinError),
}

/// HTTP server for the service router.
pub struct HttpServer {
    router: Router,
    listener: ListenerConfig,
    timeouts: TimeoutConfig,
    state: watch::Sender<ServerState>,
}

impl HttpServer {
    /// Create a server for `router`. Nothing is bound until [`HttpServer::run`].
    ///
    /// Body and response timeouts belong to the router (see
    /// [`RouteTable::build`](crate::http::RouteTable::build)); the server
    /// only bounds header delivery.
    pub fn new(config: &ServiceConfig, router: Router) -> Self {
        let (state, _) = watch::channel(ServerState::Idle);

        Self {
            router,
            listener: config.listener.clone(),
            timeouts: config.timeouts.clone(),
            state,
        }
    }

    /// Receiver following the server's state.
    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Bind the configured address and serve until `ctx` is stopped.
    pub async fn run(self, ctx: RunContext) -> Result<(), ServerError> {
        match Listener::bind(&self.listener).await {
            Ok(listener) => self.serve(listener, ctx).await,
            Err(e) => {
                tracing::error!(error = %e, "Listener failed to start");
                self.state.send_replace(ServerState::Closed);
                Err(e.into())
            }
        }
    }

    /// Serve on an already bound listener until `ctx` is stopped.
    ///
    /// Returns once every connection has finished or been aborted.
    pub async fn serve(self, listener: Listener, ctx: RunContext) -> Result<(), ServerError> {
        let HttpServer {
            router,
            timeouts,
            state,
            ..
        } = self;

        let router = router.layer(Extension(ctx.clone()));
        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(timeouts.read());

        let address = listener.local_addr().ok();
        let stop = CancellationToken::new();
        let mut accept = tokio::spawn(accept_loop(listener, builder, router, stop.clone()));

        state.send_replace(ServerState::Serving);
        tracing::info!(address = ?address, "HTTP server serving");

        let exit = tokio::select! {
            joined = &mut accept => joined,
            () = ctx.stopped() => {
                state.send_replace(ServerState::Draining);
                stop.cancel();
                accept.await
            }
        };

        let result = match exit {
            Ok(AcceptExit {
                connections,
                error: None,
            }) => {
                connections.drain(timeouts.drain()).await;
                Ok(())
            }
            Ok(AcceptExit {
                connections,
                error: Some(e),
            }) => {
                tracing::error!(error = %e, "Accept loop failed");
                connections.abort().await;
                Err(e.into())
            }
            Err(e) => Err(ServerError::Aborted(e)),
        };

        state.send_replace(ServerState::Closed);
        tracing::info!("HTTP server stopped");
        result
    }
}

/// Connection tasks spawned by the accept loop.
struct Connections {
    graceful: GracefulShutdown,
    tasks: JoinSet<()>,
}

impl Connections {
    /// Let in-flight requests finish within `period`, then abort the rest.
    async fn drain(mut self, period: Duration) {
        tracing::info!(
            connections = self.tasks.len(),
            drain_secs = period.as_secs(),
            "Draining connections"
        );

        if tokio::time::timeout(period, self.graceful.shutdown())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tasks.len(),
                "Drain period elapsed, closing remaining connections"
            );
            self.tasks.abort_all();
        }
        while self.tasks.join_next().await.is_some() {}
    }

    async fn abort(mut self) {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }
}

struct AcceptExit {
    connections: Connections,
    error: Option<ListenerError>,
}

async fn accept_loop(
    listener: Listener,
    builder: auto::Builder<TokioExecutor>,
    router: Router,
    stop: CancellationToken,
) -> AcceptExit {
    let graceful = GracefulShutdown::new();
    let mut tasks = JoinSet::new();

    let error = loop {
        let accepted = tokio::select! {
            () = stop.cancelled() => break None,
            accepted = listener.accept() => accepted,
        };

        // Reap finished connections.
        while tasks.try_join_next().is_some() {}

        let (stream, peer, permit) = match accepted {
            Ok(accepted) => accepted,
            Err(e) if e.is_connection_error() => {
                tracing::debug!(error = %e, "Skipping failed connection");
                continue;
            }
            Err(e) => break Some(e),
        };

        let service = TowerToHyperService::new(router.clone());
        let conn = builder
            .serve_connection_with_upgrades(TokioIo::new(stream), service)
            .into_owned();
        let conn = graceful.watch(conn);

        tasks.spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(peer_addr = %peer, error = %e, "Connection closed with error");
            }
            drop(permit);
        });
    };

    AcceptExit {
        connections: Connections { graceful, tasks },
        error,
    }
}
