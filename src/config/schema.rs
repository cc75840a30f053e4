//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Coordination store settings for backend discovery.
    pub discovery: DiscoveryConfig,

    /// Route definitions mapping path prefixes to backend services.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Coordination store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Store endpoints (e.g., "http://127.0.0.1:2379").
    pub endpoints: Vec<String>,

    /// Key prefix under which service instances are registered.
    /// Instances for service `svc` live at `{prefix}/svc/{instance_id}`.
    pub prefix: String,

    /// Bounded timeout for the initial store connection in seconds.
    pub connect_timeout_secs: u64,

    /// Reconnect backoff for a failed watch stream.
    pub backoff: BackoffConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:2379".to_string()],
            prefix: "/services".to_string(),
            connect_timeout_secs: 5,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff parameters for watch reconnection.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base delay in milliseconds.
    pub base_ms: u64,

    /// Delay ceiling in milliseconds.
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 200,
            max_ms: 30_000,
        }
    }
}

/// Route configuration mapping a path prefix to a backend service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match (axum owns the actual matching).
    pub path_prefix: String,

    /// Logical service name to resolve through discovery.
    pub service: String,

    /// Endpoint selection policy for this route.
    #[serde(default)]
    pub policy: SelectionKind,

    /// Strip the matched prefix before forwarding upstream.
    #[serde(default)]
    pub strip_prefix: bool,

    /// Enable the retry decorator for this route. Falls back to the
    /// global `retries.enabled` when unset.
    #[serde(default)]
    pub retry: Option<bool>,
}

/// Endpoint selection policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionKind {
    #[default]
    RoundRobin,
    Random,
    Weighted,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total request deadline enforced at the edge, in seconds.
    pub request_secs: u64,

    /// Per-attempt deadline for one upstream call, in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_secs: 10,
        }
    }
}

/// Retry configuration for the retry decorator.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries by default for all routes.
    pub enabled: bool,

    /// Maximum number of attempts (first try included).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Fraction of observed requests that may be retries (retry budget).
    pub budget_ratio: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            budget_ratio: 0.1,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
