//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the payout
//! service. All types derive Serde traits for deserialization from config
//! files.

use serde::{Deserialize, Serialize};

use crate::selection::{SelectionOptions, DEFAULT_DUST_THRESHOLD};

/// Root configuration for the payout service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PayoutConfig {
    /// Chain data provider (block explorer) settings.
    pub provider: ProviderConfig,

    /// Coin selection policy.
    pub selection: SelectionConfig,

    /// Broadcast retry configuration.
    pub broadcast: RetryConfig,

    /// Confirmation poller settings.
    pub poller: PollerConfig,

    /// Idempotency ledger settings.
    pub idempotency: IdempotencyConfig,

    /// Persistence backend.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Chain data provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Explorer REST base URL.
    pub base_url: String,

    /// Failover explorer base URLs, tried in order.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://blockstream.info/api".to_string(),
            failover_urls: Vec::new(),
            timeout_ms: 10_000,
        }
    }
}

/// Coin selection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Smallest output value the network relays, in satoshis.
    pub dust_threshold_sats: u64,

    /// Target multiplier absorbing fee estimation error (1.0 = none).
    pub headroom_factor: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            dust_threshold_sats: DEFAULT_DUST_THRESHOLD,
            headroom_factor: 1.0,
        }
    }
}

impl SelectionConfig {
    /// Options for a single-recipient payment.
    pub fn options(&self) -> SelectionOptions {
        SelectionOptions {
            dust_threshold: self.dust_threshold_sats,
            outputs_without_change: 1,
            headroom_factor: self.headroom_factor,
        }
    }
}

/// Broadcast retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of broadcast attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 150,
            max_delay_ms: 2000,
            jitter: false,
        }
    }
}

/// Confirmation poller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Enable the background poller.
    pub enabled: bool,

    /// Tick interval in milliseconds.
    pub interval_ms: u64,

    /// Maximum rows checked per tick.
    pub batch_size: usize,

    /// Concurrent provider queries within a tick.
    pub concurrency: usize,

    /// Treat any transaction the provider knows about as confirmed.
    pub zero_conf: bool,

    /// Deadline for one status query in milliseconds.
    pub provider_timeout_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
            batch_size: 50,
            concurrency: 4,
            zero_conf: false,
            provider_timeout_ms: 5_000,
        }
    }
}

/// Idempotency ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// How long finalized records stay replayable, in seconds.
    pub ttl_secs: u64,

    /// How often expired records are purged, in seconds.
    pub purge_interval_secs: u64,

    /// How long a record may stay pending before it is reported stale, in
    /// seconds.
    pub pending_lease_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 7 * 24 * 3600,
            purge_interval_secs: 600,
            pending_lease_secs: 15 * 60,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Database file (sqlite backend only).
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: "data/payout.db".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
