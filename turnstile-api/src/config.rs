//! API Configuration Module
//!
//! Configuration for the HTTP server, API-key authentication, rate limiting,
//! and the idempotency layer. Loaded from environment variables with
//! sensible defaults for development.

use std::net::SocketAddr;
use std::time::Duration;

use turnstile_core::UnavailablePolicy;

use crate::error::{ApiError, ApiResult};

/// Default replay window for completed idempotent results.
pub const DEFAULT_EXPIRE_AFTER: Duration = Duration::from_secs(3600);

/// Default time-to-live for in-flight reservations.
///
/// A reservation stranded by a hung handler or an interrupted process
/// reverts to "no record" after this window, so the key is not blocked
/// forever.
pub const DEFAULT_RESERVATION_TTL: Duration = Duration::from_secs(300);

/// Maximum response body size buffered for replay (1MB).
pub const MAX_CACHED_BODY_BYTES: usize = 1024 * 1024;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind host for the HTTP listener.
    pub bind_host: String,

    /// Bind port for the HTTP listener.
    pub port: u16,

    /// Literal API key compared against the `X-API-Key` header.
    /// `None` disables authentication (dev mode).
    pub api_key: Option<String>,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    /// Whether rate limiting is enabled.
    pub rate_limit_enabled: bool,

    /// Requests per minute allowed per client IP on rate-limited routes.
    pub rate_limit_per_minute: u32,

    /// Burst capacity beyond the steady rate.
    pub rate_limit_burst: u32,

    // ========================================================================
    // Idempotency Configuration
    // ========================================================================
    /// Replay window for routes without an explicit expiry.
    pub default_expire_after: Duration,

    /// Time-to-live for in-flight reservations.
    pub reservation_ttl: Duration,

    /// Behavior when the idempotency store is unavailable.
    pub unavailable_policy: UnavailablePolicy,

    /// Interval for the periodic expiry sweep. `None` relies on lazy
    /// expiry alone.
    pub sweep_interval: Option<Duration>,

    /// Maximum response body size buffered for replay.
    pub max_cached_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 3000,
            api_key: None,

            // Rate limiting defaults match the original resource contract:
            // 5 requests per minute on the list route.
            rate_limit_enabled: true,
            rate_limit_per_minute: 5,
            rate_limit_burst: 5,

            default_expire_after: DEFAULT_EXPIRE_AFTER,
            reservation_ttl: DEFAULT_RESERVATION_TTL,
            unavailable_policy: UnavailablePolicy::FailOpen,
            sweep_interval: None,
            max_cached_body_bytes: MAX_CACHED_BODY_BYTES,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TURNSTILE_BIND`: Bind host (default: 0.0.0.0)
    /// - `PORT` / `TURNSTILE_PORT`: Bind port (default: 3000)
    /// - `TURNSTILE_API_KEY`: Literal API key; unset disables auth
    /// - `TURNSTILE_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `TURNSTILE_RATE_LIMIT_PER_MINUTE`: Requests per minute per IP (default: 5)
    /// - `TURNSTILE_RATE_LIMIT_BURST`: Burst capacity (default: 5)
    /// - `TURNSTILE_IDEMPOTENCY_EXPIRE_SECS`: Default replay window (default: 3600)
    /// - `TURNSTILE_IDEMPOTENCY_RESERVATION_TTL_SECS`: Reservation TTL (default: 300)
    /// - `TURNSTILE_IDEMPOTENCY_POLICY`: "fail_open" or "fail_closed" (default: fail_open)
    /// - `TURNSTILE_IDEMPOTENCY_SWEEP_SECS`: Sweep interval; 0 or unset disables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_host =
            std::env::var("TURNSTILE_BIND").unwrap_or_else(|_| defaults.bind_host.clone());

        let port = std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("TURNSTILE_PORT").ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let api_key = std::env::var("TURNSTILE_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());

        let rate_limit_enabled = std::env::var("TURNSTILE_RATE_LIMIT_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.rate_limit_enabled);

        let rate_limit_per_minute = std::env::var("TURNSTILE_RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rate_limit_per_minute);

        let rate_limit_burst = std::env::var("TURNSTILE_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rate_limit_burst);

        let default_expire_after = env_duration_secs("TURNSTILE_IDEMPOTENCY_EXPIRE_SECS")
            .unwrap_or(defaults.default_expire_after);

        let reservation_ttl = env_duration_secs("TURNSTILE_IDEMPOTENCY_RESERVATION_TTL_SECS")
            .unwrap_or(defaults.reservation_ttl);

        let unavailable_policy = std::env::var("TURNSTILE_IDEMPOTENCY_POLICY")
            .ok()
            .and_then(|s| UnavailablePolicy::parse(&s))
            .unwrap_or(defaults.unavailable_policy);

        let sweep_interval =
            env_duration_secs("TURNSTILE_IDEMPOTENCY_SWEEP_SECS").filter(|d| !d.is_zero());

        Self {
            bind_host,
            port,
            api_key,
            rate_limit_enabled,
            rate_limit_per_minute,
            rate_limit_burst,
            default_expire_after,
            reservation_ttl,
            unavailable_policy,
            sweep_interval,
            max_cached_body_bytes: defaults.max_cached_body_bytes,
        }
    }

    /// Resolve the socket address to bind.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::invalid_format(format!("Invalid bind address {}: {}", addr, e)))
    }
}

fn env_duration_secs(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}
