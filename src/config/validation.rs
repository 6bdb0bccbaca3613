//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds > 0, status codes valid)
//! - Check the target is present and parseable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use regex::Regex;

use crate::config::schema::{AttackDetectorEntry, ProxyConfig};
use crate::http::target::TargetDescriptor;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.target.as_deref() {
        None | Some("") => errors.push(ValidationError::new("target", "a target URL is required")),
        Some(url) => {
            if let Err(e) = TargetDescriptor::resolve(url) {
                errors.push(ValidationError::new("target", e.to_string()));
            }
        }
    }

    if config.timeouts.upstream_ms == 0 {
        errors.push(ValidationError::new(
            "timeouts.upstream_ms",
            "must be greater than 0",
        ));
    }

    if config.pool.max_sockets == 0 {
        errors.push(ValidationError::new("pool.max_sockets", "must be greater than 0"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    for (i, entry) in config.attack_detectors.iter().enumerate() {
        validate_detector(i, entry, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_detector(index: usize, entry: &AttackDetectorEntry, errors: &mut Vec<ValidationError>) {
    let field = |name: &str| format!("attack_detectors[{}].{}", index, name);

    match (&entry.path, &entry.path_pattern) {
        (Some(_), Some(_)) => errors.push(ValidationError::new(
            field("path"),
            "set either path or path_pattern, not both",
        )),
        (None, None) => errors.push(ValidationError::new(
            field("path"),
            "one of path or path_pattern is required",
        )),
        (None, Some(pattern)) => {
            if let Err(e) = Regex::new(pattern) {
                errors.push(ValidationError::new(field("path_pattern"), e.to_string()));
            }
        }
        (Some(_), None) => {}
    }

    if !(100..=999).contains(&entry.status_code) {
        errors.push(ValidationError::new(
            field("status_code"),
            format!("{} is not a valid HTTP status", entry.status_code),
        ));
    }
    if entry.threshold == 0 {
        errors.push(ValidationError::new(field("threshold"), "must be greater than 0"));
    }
    if entry.time_window_ms == 0 {
        errors.push(ValidationError::new(field("time_window_ms"), "must be greater than 0"));
    }
}
