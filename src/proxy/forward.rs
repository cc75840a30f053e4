//! Forwarding core of the proxy pipeline.
//!
//! # Responsibilities
//! - Resolve the current endpoint set through the route's subscriber
//! - Select one endpoint via the configured policy
//! - Rewrite the request target and forward it upstream
//! - Map network failures to the gateway error taxonomy
//!
//! # Design Decisions
//! - No retries here; a failed attempt is reported as-is and the retry
//!   decorator decides what to do with it
//! - The endpoint set is an immutable snapshot, read once per request

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{Request, Response, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};

use crate::config::RouteConfig;
use crate::discovery::endpoint::Endpoint;
use crate::discovery::Subscriber;
use crate::error::GatewayError;
use crate::proxy::selection::SelectionPolicy;
use crate::proxy::Handler;

/// Forwards requests for one route to its discovered backends.
pub struct ForwardProxy {
    route_name: String,
    path_prefix: String,
    strip_prefix: bool,
    subscriber: Subscriber,
    policy: Box<dyn SelectionPolicy>,
    client: Client<HttpConnector, Body>,
    upstream_timeout: Duration,
}

impl std::fmt::Debug for ForwardProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardProxy")
            .field("route_name", &self.route_name)
            .field("path_prefix", &self.path_prefix)
            .field("strip_prefix", &self.strip_prefix)
            .finish_non_exhaustive()
    }
}

impl ForwardProxy {
    pub fn new(
        route: &RouteConfig,
        subscriber: Subscriber,
        policy: Box<dyn SelectionPolicy>,
        client: Client<HttpConnector, Body>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            route_name: route.name.clone(),
            path_prefix: route.path_prefix.clone(),
            strip_prefix: route.strip_prefix,
            subscriber,
            policy,
            client,
            upstream_timeout,
        }
    }

    /// Retarget the request URI at the chosen endpoint, optionally
    /// stripping the matched route prefix.
    fn rewrite_uri(&self, uri: &Uri, endpoint: &Endpoint) -> Result<Uri, GatewayError> {
        let mut parts = uri.clone().into_parts();

        parts.scheme = Some(Scheme::from_str(&endpoint.scheme).map_err(|e| {
            GatewayError::UpstreamUnreachable(format!(
                "endpoint scheme '{}' is invalid: {}",
                endpoint.scheme, e
            ))
        })?);
        parts.authority = Some(Authority::from_str(&endpoint.authority()).map_err(|e| {
            GatewayError::UpstreamUnreachable(format!(
                "endpoint address '{}' is invalid: {}",
                endpoint.authority(),
                e
            ))
        })?);

        if self.strip_prefix {
            let path = uri.path();
            let stripped = strip_route_prefix(path, &self.path_prefix);
            let path_and_query = match uri.query() {
                Some(query) => format!("{}?{}", stripped, query),
                None => stripped,
            };
            parts.path_and_query = Some(path_and_query.parse().map_err(|e| {
                GatewayError::UpstreamUnreachable(format!("rewritten path is invalid: {}", e))
            })?);
        }

        Uri::from_parts(parts)
            .map_err(|e| GatewayError::UpstreamUnreachable(format!("rewritten uri is invalid: {}", e)))
    }
}

/// Remove the route prefix from a request path, keeping a leading slash.
fn strip_route_prefix(path: &str, prefix: &str) -> String {
    let remainder = path.strip_prefix(prefix).unwrap_or(path);
    if remainder.starts_with('/') {
        remainder.to_string()
    } else {
        format!("/{}", remainder)
    }
}

#[async_trait]
impl Handler for ForwardProxy {
    async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, GatewayError> {
        let set = self.subscriber.endpoints()?;
        let endpoint = self
            .policy
            .select(&set)
            .ok_or_else(|| GatewayError::NoBackendAvailable {
                service: self.subscriber.service().to_string(),
            })?
            .clone();

        let (mut parts, body) = request.into_parts();
        parts.uri = self.rewrite_uri(&parts.uri, &endpoint)?;
        let upstream_request = Request::from_parts(parts, body);

        tracing::debug!(
            route = %self.route_name,
            endpoint = %endpoint,
            "Forwarding request"
        );

        match tokio::time::timeout(self.upstream_timeout, self.client.request(upstream_request))
            .await
        {
            Err(_) => Err(GatewayError::UpstreamTimeout(self.upstream_timeout)),
            Ok(Err(e)) => Err(GatewayError::UpstreamUnreachable(e.to_string())),
            Ok(Ok(response)) => {
                let (parts, body) = response.into_parts();
                Ok(Response::from_parts(parts, Body::new(body)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_route_prefix() {
        assert_eq!(strip_route_prefix("/users/42", "/users"), "/42");
        assert_eq!(strip_route_prefix("/users", "/users"), "/");
        assert_eq!(strip_route_prefix("/other/x", "/users"), "/other/x");
    }
}
