//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, address parses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),
    #[error("listener.max_connections must be at least 1")]
    MaxConnections,
    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("timeouts.write_secs ({write}) must not be shorter than timeouts.read_secs ({read})")]
    WriteShorterThanRead { read: u64, write: u64 },
    #[error("telemetry.service_name must not be empty")]
    ServiceName,
    #[error("telemetry.metric_interval_secs must be greater than zero")]
    MetricInterval,
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::MaxConnections);
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("read_secs", timeouts.read_secs),
        ("write_secs", timeouts.write_secs),
        ("drain_secs", timeouts.drain_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }
    if timeouts.write_secs < timeouts.read_secs {
        errors.push(ValidationError::WriteShorterThanRead {
            read: timeouts.read_secs,
            write: timeouts.write_secs,
        });
    }

    if config.telemetry.service_name.trim().is_empty() {
        errors.push(ValidationError::ServiceName);
    }
    if config.telemetry.metric_interval_secs == 0 {
        errors.push(ValidationError::MetricInterval);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
