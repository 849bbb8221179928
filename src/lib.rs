//! dice-server library: an instrumented `/rolldice` HTTP service.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::RunContext;
pub use observability::Telemetry;
