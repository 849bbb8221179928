//! dice-server
//!
//! A single-endpoint HTTP service with traces, metrics and logs exported
//! through OpenTelemetry.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::listener ─▶ http::server ─▶ http::instrument ─▶ /rolldice
//!                                                           │
//!                                                           ▼
//!                                              observability::telemetry
//!                                              (traces, metrics, logs)
//!                                                           │
//!                                                           ▼
//!                                                 stdout / OTLP exporter
//!
//!     SIGINT/SIGTERM ─▶ lifecycle::signals ─▶ RunContext::stop ─▶ drain ─▶ flush
//! ```
//!
//! Configuration is read from the TOML file named by `DICE_CONFIG`, if set.

use dice_server::config;
use dice_server::lifecycle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_from_env()?;
    lifecycle::run(config).await?;
    Ok(())
}
