//! Gateway error definitions.
//!
//! # Design Decisions
//! - Startup errors (`InvalidRouteConfig`, `DiscoveryUnavailable` at connect)
//!   are fatal; the process must not serve with a broken route table
//! - Per-request errors map to HTTP responses, never panics
//! - Watch-stream errors stay inside the reconnect loop and are not
//!   represented here

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the discovery and proxy pipeline.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The coordination store could not be reached, or a lookup was made
    /// after the watch session was closed.
    #[error("discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// The endpoint set for the service is empty or not yet synced.
    #[error("no backend available for service '{service}'")]
    NoBackendAvailable { service: String },

    /// A route references an unknown backend or carries malformed rules.
    /// Raised at startup while building pipelines; always fatal.
    #[error("invalid route '{route}': {reason}")]
    InvalidRouteConfig { route: String, reason: String },

    /// The upstream did not answer within the per-request deadline.
    #[error("upstream timeout after {0:?}")]
    UpstreamTimeout(Duration),

    /// The upstream rejected or dropped the connection.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
}

impl GatewayError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::DiscoveryUnavailable(_) => "discovery_unavailable",
            GatewayError::NoBackendAvailable { .. } => "no_backend_available",
            GatewayError::InvalidRouteConfig { .. } => "invalid_route_config",
            GatewayError::UpstreamTimeout(_) => "upstream_timeout",
            GatewayError::UpstreamUnreachable(_) => "upstream_unreachable",
        }
    }

    /// HTTP status this error maps to at the edge.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::DiscoveryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::NoBackendAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::InvalidRouteConfig { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Body carries the error kind, not internal details.
        (status, self.kind()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = GatewayError::NoBackendAvailable {
            service: "users".into(),
        };
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = GatewayError::UpstreamTimeout(Duration::from_secs(30));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);

        let err = GatewayError::UpstreamUnreachable("connection refused".into());
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_kind_labels_are_stable() {
        let err = GatewayError::DiscoveryUnavailable("etcd down".into());
        assert_eq!(err.kind(), "discovery_unavailable");
    }
}
