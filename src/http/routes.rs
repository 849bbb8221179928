//! Route table.
//!
//! Routes are registered once, each handler wrapped in its route's
//! instrumentation layer, before the server starts accepting.
//!
//! # Layers (outermost first)
//! ```text
//! request instrumentation → TraceLayer → body read timeout
//!     → response timeout (408) → CatchPanicLayer (500) → route
//! ```

use axum::routing::{get, MethodRouter};
use axum::Router;
use rand::Rng;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;

use crate::config::TimeoutConfig;
use crate::http::instrument::HttpInstrumentation;

pub const ROLL_DICE: &str = "/rolldice";

/// Builder for the service's router.
pub struct RouteTable {
    router: Router,
    instrumentation: HttpInstrumentation,
    timeouts: TimeoutConfig,
}

impl RouteTable {
    pub fn new(instrumentation: &HttpInstrumentation, timeouts: &TimeoutConfig) -> Self {
        Self {
            router: Router::new(),
            instrumentation: instrumentation.clone(),
            timeouts: timeouts.clone(),
        }
    }

    /// Register `handler` under `pattern`.
    pub fn handle(mut self, pattern: &'static str, handler: MethodRouter) -> Self {
        let handler = handler.layer(self.instrumentation.route(pattern));
        self.router = self.router.route(pattern, handler);
        self
    }

    /// Finish the table, wrapping it in timeouts and request instrumentation.
    ///
    /// Panics and timeouts are turned into responses inside the
    /// instrumentation, so they are recorded with their status like any
    /// other response.
    #[allow(deprecated)]
    pub fn build(self) -> Router {
        self.router
            .layer(CatchPanicLayer::new())
            .layer(TimeoutLayer::new(self.timeouts.write()))
            .layer(RequestBodyTimeoutLayer::new(self.timeouts.read()))
            .layer(TraceLayer::new_for_http())
            .layer(self.instrumentation.layer())
    }
}

/// The service's router.
pub fn router(instrumentation: &HttpInstrumentation, timeouts: &TimeoutConfig) -> Router {
    RouteTable::new(instrumentation, timeouts)
        .handle(ROLL_DICE, get(roll_dice))
        .build()
}

async fn roll_dice() -> String {
    let roll: u8 = rand::thread_rng().gen_range(1..=6);
    tracing::info!(roll, "Rolled dice");
    roll.to_string()
}
