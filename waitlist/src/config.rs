//! Configuration management for the waitlist engine.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Longest offer lifetime accepted from the environment (7 days)
pub const MAX_OFFER_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Offer and sweep timing
    pub offers: OfferConfig,
    /// Per-event store settings
    pub store: StoreSettings,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

/// Offer lifetime and expiry sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferConfig {
    /// Offer lifetime in seconds (default: 30 minutes)
    pub ttl_secs: u64,
    /// Seconds between expiry sweeps
    pub sweep_interval_secs: u64,
}

/// Per-event store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// How long a caller waits for a command's reply, in milliseconds
    pub request_timeout_ms: u64,
    /// Capacity of each store's action broadcast
    pub action_broadcast_capacity: usize,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

/// Logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directives in `RUST_LOG` syntax
    pub log_level: String,
    /// Install the Prometheus recorder
    pub metrics_enabled: bool,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            offers: OfferConfig {
                ttl_secs: 1800,
                sweep_interval_secs: 15,
            },
            store: StoreSettings {
                request_timeout_ms: 5000,
                action_broadcast_capacity: 1024,
                shutdown_timeout_secs: 10,
            },
            observability: ObservabilityConfig {
                log_level: "info,waitlist=debug".to_string(),
                metrics_enabled: true,
                metrics_host: "0.0.0.0".to_string(),
                metrics_port: 9090,
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to [`Config::default`].
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            offers: OfferConfig {
                ttl_secs: parsed("OFFER_TTL_SECS").map_or(defaults.offers.ttl_secs, clamp_ttl),
                sweep_interval_secs: parsed("SWEEP_INTERVAL_SECS")
                    .unwrap_or(defaults.offers.sweep_interval_secs),
            },
            store: StoreSettings {
                request_timeout_ms: parsed("REQUEST_TIMEOUT_MS")
                    .unwrap_or(defaults.store.request_timeout_ms),
                action_broadcast_capacity: parsed("ACTION_BROADCAST_CAPACITY")
                    .unwrap_or(defaults.store.action_broadcast_capacity),
                shutdown_timeout_secs: parsed("SHUTDOWN_TIMEOUT_SECS")
                    .unwrap_or(defaults.store.shutdown_timeout_secs),
            },
            observability: ObservabilityConfig {
                log_level: env::var("RUST_LOG").unwrap_or(defaults.observability.log_level),
                metrics_enabled: parsed("METRICS_ENABLED")
                    .unwrap_or(defaults.observability.metrics_enabled),
                metrics_host: env::var("METRICS_HOST")
                    .unwrap_or(defaults.observability.metrics_host),
                metrics_port: parsed("METRICS_PORT").unwrap_or(defaults.observability.metrics_port),
            },
        }
    }

    /// Offer lifetime, capped at [`MAX_OFFER_TTL_SECS`]
    #[must_use]
    pub fn offer_ttl(&self) -> chrono::Duration {
        let secs = self.offers.ttl_secs.min(MAX_OFFER_TTL_SECS);
        i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(chrono::Duration::zero)
    }

    /// Time between sweeps, at least one second
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.offers.sweep_interval_secs.max(1))
    }

    /// Reply timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.store.request_timeout_ms)
    }

    /// Store shutdown timeout
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.store.shutdown_timeout_secs)
    }

    /// `host:port` for the metrics endpoint
    #[must_use]
    pub fn metrics_addr(&self) -> String {
        format!("{}:{}", self.observability.metrics_host, self.observability.metrics_port)
    }
}

fn clamp_ttl(secs: u64) -> u64 {
    if secs > MAX_OFFER_TTL_SECS {
        tracing::warn!(
            requested = secs,
            max = MAX_OFFER_TTL_SECS,
            "OFFER_TTL_SECS too large, clamping"
        );
    }
    secs.min(MAX_OFFER_TTL_SECS)
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}
