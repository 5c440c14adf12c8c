//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, headroom >= 1, batch > 0)
//! - Validate URLs and addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PayoutConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{PayoutConfig, StorageBackend};

/// One failed semantic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check every semantic constraint and collect all violations.
pub fn validate_config(config: &PayoutConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.provider.base_url.parse::<url::Url>().is_err() {
        errors.push(ValidationError::new("provider.base_url", "not a valid URL"));
    }
    for (i, u) in config.provider.failover_urls.iter().enumerate() {
        if u.parse::<url::Url>().is_err() {
            errors.push(ValidationError::new(
                &format!("provider.failover_urls[{}]", i),
                "not a valid URL",
            ));
        }
    }
    if config.provider.timeout_ms == 0 {
        errors.push(ValidationError::new("provider.timeout_ms", "must be > 0"));
    }

    let headroom = config.selection.headroom_factor;
    if !headroom.is_finite() || headroom < 1.0 {
        errors.push(ValidationError::new("selection.headroom_factor", "must be >= 1.0"));
    }

    if config.broadcast.max_attempts == 0 {
        errors.push(ValidationError::new("broadcast.max_attempts", "must be >= 1"));
    }
    if config.broadcast.base_delay_ms > config.broadcast.max_delay_ms {
        errors.push(ValidationError::new(
            "broadcast.base_delay_ms",
            "must not exceed broadcast.max_delay_ms",
        ));
    }

    if config.poller.interval_ms == 0 {
        errors.push(ValidationError::new("poller.interval_ms", "must be > 0"));
    }
    if config.poller.batch_size == 0 {
        errors.push(ValidationError::new("poller.batch_size", "must be > 0"));
    }
    if config.poller.concurrency == 0 {
        errors.push(ValidationError::new("poller.concurrency", "must be > 0"));
    }
    if config.poller.provider_timeout_ms == 0 {
        errors.push(ValidationError::new("poller.provider_timeout_ms", "must be > 0"));
    }

    if config.idempotency.ttl_secs == 0 {
        errors.push(ValidationError::new("idempotency.ttl_secs", "must be > 0"));
    }
    if config.idempotency.purge_interval_secs == 0 {
        errors.push(ValidationError::new("idempotency.purge_interval_secs", "must be > 0"));
    }
    if config.idempotency.pending_lease_secs == 0 {
        errors.push(ValidationError::new("idempotency.pending_lease_secs", "must be > 0"));
    }

    if config.storage.backend == StorageBackend::Sqlite && config.storage.path.trim().is_empty() {
        errors.push(ValidationError::new("storage.path", "required for sqlite backend"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a valid socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
