//! Retry eligibility and budget.
//!
//! # Responsibilities
//! - Decide whether a failed attempt may be retried (idempotent methods only)
//! - Enforce a global retry budget so retries never amplify an outage
//!
//! # Design Decisions
//! - Never retry POST/PUT/DELETE/PATCH (non-idempotent)
//! - Budget is a running ratio: retries are allowed while
//!   `retries < ratio * requests`, with a small floor to let retries
//!   through during warmup

use axum::http::Method;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::GatewayError;

/// Methods the gateway will replay against another attempt.
pub fn is_idempotent(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Errors worth a second attempt. Timeouts and transport failures are
/// retryable; everything else already has a definitive answer.
pub fn is_retryable(error: &GatewayError) -> bool {
    matches!(
        error,
        GatewayError::UpstreamTimeout(_) | GatewayError::UpstreamUnreachable(_)
    )
}

/// Global retry budget shared by all routes.
pub struct RetryBudget {
    ratio: f32,
    floor: u64,
    requests: AtomicU64,
    retries: AtomicU64,
}

impl RetryBudget {
    pub fn new(ratio: f32, floor: u64) -> Self {
        Self {
            ratio,
            floor,
            requests: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    /// Record one first attempt.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Try to spend one retry from the budget.
    pub fn try_acquire(&self) -> bool {
        let requests = self.requests.load(Ordering::Relaxed);
        let retries = self.retries.fetch_add(1, Ordering::Relaxed);
        let allowance = (requests as f64 * self.ratio as f64) as u64 + self.floor;
        if retries < allowance {
            true
        } else {
            self.retries.fetch_sub(1, Ordering::Relaxed);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_idempotent_methods() {
        assert!(is_idempotent(&Method::GET));
        assert!(is_idempotent(&Method::HEAD));
        assert!(!is_idempotent(&Method::POST));
        assert!(!is_idempotent(&Method::DELETE));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable(&GatewayError::UpstreamTimeout(
            Duration::from_secs(1)
        )));
        assert!(is_retryable(&GatewayError::UpstreamUnreachable(
            "refused".into()
        )));
        assert!(!is_retryable(&GatewayError::NoBackendAvailable {
            service: "web".into()
        }));
    }

    #[test]
    fn test_budget_exhausts() {
        let budget = RetryBudget::new(0.5, 1);
        budget.record_request();
        budget.record_request();

        // 2 requests * 0.5 + floor 1 = allowance of 2 retries.
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());
    }
}
