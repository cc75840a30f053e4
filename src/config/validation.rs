//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference a non-empty service)
//! - Validate value ranges (timeouts > 0, backoff base <= cap)
//! - Detect conflicting routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: GatewayConfig -> Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic validation failure.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("no routes configured")]
    NoRoutes,

    #[error("duplicate route name '{0}'")]
    DuplicateRouteName(String),

    #[error("route '{route}': {reason}")]
    Route { route: String, reason: String },

    #[error("discovery: {0}")]
    Discovery(String),

    #[error("retries: {0}")]
    Retries(String),

    #[error("timeouts: {0}")]
    Timeouts(String),
}

/// Validate a parsed configuration. Collects every failure.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.routes.is_empty() {
        errors.push(ValidationError::NoRoutes);
    }

    let mut seen_names = std::collections::HashSet::new();
    let mut seen_prefixes = std::collections::HashSet::new();
    for route in &config.routes {
        if !seen_names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRouteName(route.name.clone()));
        }
        if route.name.is_empty() {
            errors.push(ValidationError::Route {
                route: route.name.clone(),
                reason: "route name must not be empty".into(),
            });
        }
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::Route {
                route: route.name.clone(),
                reason: format!("path prefix '{}' must start with '/'", route.path_prefix),
            });
        }
        if !seen_prefixes.insert(route.path_prefix.as_str()) {
            errors.push(ValidationError::Route {
                route: route.name.clone(),
                reason: format!("path prefix '{}' conflicts with another route", route.path_prefix),
            });
        }
        if route.service.is_empty() {
            errors.push(ValidationError::Route {
                route: route.name.clone(),
                reason: "backend service must not be empty".into(),
            });
        }
        if route.service.contains('/') {
            errors.push(ValidationError::Route {
                route: route.name.clone(),
                reason: format!("service name '{}' must not contain '/'", route.service),
            });
        }
    }

    if config.discovery.endpoints.is_empty() {
        errors.push(ValidationError::Discovery(
            "at least one store endpoint is required".into(),
        ));
    }
    for endpoint in &config.discovery.endpoints {
        match Url::parse(endpoint) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::Discovery(format!(
                "endpoint '{}' has unsupported scheme '{}'",
                endpoint,
                url.scheme()
            ))),
            Err(e) => errors.push(ValidationError::Discovery(format!(
                "endpoint '{}' is not a valid URL: {}",
                endpoint, e
            ))),
        }
    }
    if config.discovery.connect_timeout_secs == 0 {
        errors.push(ValidationError::Discovery(
            "connect timeout must be greater than zero".into(),
        ));
    }
    if config.discovery.backoff.base_ms == 0 {
        errors.push(ValidationError::Discovery(
            "backoff base must be greater than zero".into(),
        ));
    }
    if config.discovery.backoff.base_ms > config.discovery.backoff.max_ms {
        errors.push(ValidationError::Discovery(format!(
            "backoff base {}ms exceeds cap {}ms",
            config.discovery.backoff.base_ms, config.discovery.backoff.max_ms
        )));
    }

    if config.timeouts.request_secs == 0 || config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::Timeouts(
            "timeouts must be greater than zero".into(),
        ));
    }

    let retries = &config.retries;
    let retry_requested =
        retries.enabled || config.routes.iter().any(|r| r.retry == Some(true));
    if retry_requested {
        if retries.max_attempts < 1 {
            errors.push(ValidationError::Retries(
                "max_attempts must be at least 1".into(),
            ));
        }
        if !(retries.budget_ratio > 0.0 && retries.budget_ratio <= 1.0) {
            errors.push(ValidationError::Retries(format!(
                "budget_ratio {} must be within (0, 1]",
                retries.budget_ratio
            )));
        }
        if retries.base_delay_ms > retries.max_delay_ms {
            errors.push(ValidationError::Retries(format!(
                "base delay {}ms exceeds max delay {}ms",
                retries.base_delay_ms, retries.max_delay_ms
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
