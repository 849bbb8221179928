//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::listener)
//!     → server.rs (hyper connection, timeouts, drain)
//!     → instrument.rs (request span + metrics)
//!     → routes.rs (route table → handler)
//!     → Send to client
//! ```

pub mod instrument;
pub mod routes;
pub mod server;

pub use instrument::{HttpInstrumentation, InstrumentLayer, Instrumented, MatchedRoute};
pub use routes::{router, RouteTable, ROLL_DICE};
pub use server::{HttpServer, ServerError, ServerState};
