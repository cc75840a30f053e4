//! Pipeline assembly per route.
//!
//! # Responsibilities
//! - Validate the route against the running discovery state
//! - Compose the pipeline: forwarding core, optional retry decorator,
//!   logging decorator outermost
//!
//! # Design Decisions
//! - `InvalidRouteConfig` here is startup-fatal; a broken route table must
//!   never serve traffic
//! - One shared upstream client; connection pooling lives in hyper

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::config::{RetryConfig, RouteConfig, TimeoutConfig};
use crate::discovery::DiscoveryWatcher;
use crate::error::GatewayError;
use crate::proxy::forward::ForwardProxy;
use crate::proxy::logging::LoggingMiddleware;
use crate::proxy::retry::RetryMiddleware;
use crate::proxy::selection;
use crate::proxy::Handler;
use crate::resilience::retries::RetryBudget;

/// Minimum retries the budget lets through regardless of traffic volume.
const RETRY_BUDGET_FLOOR: u64 = 10;

/// Builds one forwarding pipeline per configured route.
pub struct ProxyFactory {
    watcher: Arc<DiscoveryWatcher>,
    client: Client<HttpConnector, Body>,
    timeouts: TimeoutConfig,
    retries: RetryConfig,
    budget: Arc<RetryBudget>,
}

impl ProxyFactory {
    pub fn new(
        watcher: Arc<DiscoveryWatcher>,
        timeouts: TimeoutConfig,
        retries: RetryConfig,
    ) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let budget = Arc::new(RetryBudget::new(retries.budget_ratio, RETRY_BUDGET_FLOOR));
        Self {
            watcher,
            client,
            timeouts,
            retries,
            budget,
        }
    }

    /// Build the pipeline for one route.
    pub fn build(&self, route: &RouteConfig) -> Result<Arc<dyn Handler>, GatewayError> {
        if route.service.is_empty() {
            return Err(GatewayError::InvalidRouteConfig {
                route: route.name.clone(),
                reason: "backend service must not be empty".into(),
            });
        }
        if !route.path_prefix.starts_with('/') {
            return Err(GatewayError::InvalidRouteConfig {
                route: route.name.clone(),
                reason: format!("path prefix '{}' must start with '/'", route.path_prefix),
            });
        }

        let subscriber = self.watcher.subscriber(&route.service).ok_or_else(|| {
            GatewayError::InvalidRouteConfig {
                route: route.name.clone(),
                reason: format!("no watch session for service '{}'", route.service),
            }
        })?;

        let policy = selection::policy_for(route.policy);
        let forward: Arc<dyn Handler> = Arc::new(ForwardProxy::new(
            route,
            subscriber,
            policy,
            self.client.clone(),
            Duration::from_secs(self.timeouts.upstream_secs),
        ));

        let pipeline = if route.retry.unwrap_or(self.retries.enabled) {
            RetryMiddleware::wrap(forward, self.retries, self.budget.clone())
        } else {
            forward
        };

        Ok(LoggingMiddleware::wrap(&route.name, pipeline))
    }
}
