//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → Hand off to HTTP layer (http::server)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - A connection slot is held until its connection task ends

pub mod listener;

pub use listener::{ConnectionPermit, Listener, ListenerError};
