//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     RunContext + signals → Telemetry → logging → router → HttpServer::run
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → RunContext::stop → server drains
//!
//! Shutdown (shutdown.rs):
//!     server returns → revoke signals → flush + close telemetry → exit status
//! ```
//!
//! # Design Decisions
//! - Ordered startup: telemetry first, then handlers, then listeners
//! - Ordered shutdown: stop accept, drain, revoke signals, close telemetry
//! - The drain period bounds shutdown; a second interrupt ends it at once

pub mod context;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use context::RunContext;
pub use shutdown::Error;
pub use signals::SignalBridge;
pub use startup::{run, serve};
