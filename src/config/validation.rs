//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, buffer sizes and the log level
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MonteConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Zero values are not errors; they select the defaults

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::MonteConfig;
use crate::protocol::frame::{LENGTH_PREFIX_LEN, SEQ_LEN, TAG_LEN};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Largest plaintext whose ciphertext length still fits the `u32` prefix.
const MAX_BUFFER_SIZE: usize = u32::MAX as usize - TAG_LEN - LENGTH_PREFIX_LEN;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `server.bind_address`.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check every semantic constraint and report all failures together.
pub fn validate_config(config: &MonteConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }

    if !is_host_port(&config.client.address) {
        errors.push(ValidationError::new(
            "client.address",
            format!("'{}' is not a host:port pair", config.client.address),
        ));
    }

    check_buffer(
        &mut errors,
        "connection.read_buffer_size",
        config.connection.read_buffer_size,
    );
    check_buffer(
        &mut errors,
        "connection.write_buffer_size",
        config.connection.write_buffer_size,
    );

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!(
                "unknown level '{}', expected one of {}",
                config.observability.log_level,
                LOG_LEVELS.join(", ")
            ),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_buffer(errors: &mut Vec<ValidationError>, field: &'static str, size: usize) {
    if size == 0 {
        return;
    }
    if size <= SEQ_LEN {
        errors.push(ValidationError::new(
            field,
            format!("{size} bytes cannot hold a sequence number and payload"),
        ));
    } else if size > MAX_BUFFER_SIZE {
        errors.push(ValidationError::new(
            field,
            format!("{size} bytes exceeds the frame length limit of {MAX_BUFFER_SIZE}"),
        ));
    }
}

fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
