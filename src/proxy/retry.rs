//! Retry decorator for the proxy pipeline.
//!
//! Composed around the forwarding core when a route opts in. Retries only
//! idempotent requests, only on transport-level failures, and only while
//! the global retry budget allows it.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::request::Parts;
use axum::http::{Request, Response};

use crate::config::RetryConfig;
use crate::error::GatewayError;
use crate::proxy::Handler;
use crate::resilience::backoff::{backoff_ceiling, full_jitter};
use crate::resilience::retries::{is_idempotent, is_retryable, RetryBudget};

/// Largest request body the decorator will buffer for replay.
const MAX_BUFFERED_BODY: usize = 1024 * 1024;

/// Retries idempotent requests on transport failures.
pub struct RetryMiddleware {
    inner: Arc<dyn Handler>,
    config: RetryConfig,
    budget: Arc<RetryBudget>,
}

impl std::fmt::Debug for RetryMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryMiddleware")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl RetryMiddleware {
    pub fn wrap(
        inner: Arc<dyn Handler>,
        config: RetryConfig,
        budget: Arc<RetryBudget>,
    ) -> Arc<dyn Handler> {
        Arc::new(Self {
            inner,
            config,
            budget,
        })
    }
}

/// Rebuild a request for another attempt from its recorded parts.
/// Extensions do not survive the rebuild; the request id lives in a header
/// and is preserved.
fn build_attempt(parts: &Parts, body: &Bytes) -> Request<Body> {
    let mut request = Request::builder()
        .method(parts.method.clone())
        .uri(parts.uri.clone())
        .version(parts.version);
    if let Some(headers) = request.headers_mut() {
        headers.extend(parts.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    request
        .body(Body::from(body.clone()))
        .expect("rebuilding a previously valid request cannot fail")
}

#[async_trait]
impl Handler for RetryMiddleware {
    async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, GatewayError> {
        self.budget.record_request();

        if !is_idempotent(request.method()) {
            return self.inner.handle(request).await;
        }

        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, MAX_BUFFERED_BODY)
            .await
            .map_err(|e| {
                GatewayError::UpstreamUnreachable(format!(
                    "request body could not be buffered for retry: {}",
                    e
                ))
            })?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.inner.handle(build_attempt(&parts, &body)).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt >= self.config.max_attempts
                        || !is_retryable(&e)
                        || !self.budget.try_acquire()
                    {
                        return Err(e);
                    }

                    let delay = full_jitter(backoff_ceiling(
                        attempt,
                        self.config.base_delay_ms,
                        self.config.max_delay_ms,
                    ));
                    tracing::info!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FlakyHandler {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl Handler for FlakyHandler {
        async fn handle(&self, _request: Request<Body>) -> Result<Response<Body>, GatewayError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(GatewayError::UpstreamUnreachable("refused".into()))
            } else {
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::empty())
                    .unwrap())
            }
        }
    }

    fn config() -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            budget_ratio: 1.0,
        }
    }

    fn request(method: Method) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("http://gateway/users")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let inner = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        let wrapped = RetryMiddleware::wrap(
            inner.clone(),
            config(),
            Arc::new(RetryBudget::new(1.0, 10)),
        );

        let response = wrapped.handle(request(Method::GET)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        });
        let wrapped = RetryMiddleware::wrap(
            inner.clone(),
            config(),
            Arc::new(RetryBudget::new(1.0, 10)),
        );

        let err = wrapped.handle(request(Method::GET)).await.unwrap_err();
        assert_eq!(err.kind(), "upstream_unreachable");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_idempotent_request_is_not_retried() {
        let inner = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        });
        let wrapped = RetryMiddleware::wrap(
            inner.clone(),
            config(),
            Arc::new(RetryBudget::new(1.0, 10)),
        );

        let err = wrapped.handle(request(Method::POST)).await.unwrap_err();
        assert_eq!(err.kind(), "upstream_unreachable");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        #[derive(Debug)]
        struct NoBackend;

        #[async_trait]
        impl Handler for NoBackend {
            async fn handle(
                &self,
                _request: Request<Body>,
            ) -> Result<Response<Body>, GatewayError> {
                Err(GatewayError::NoBackendAvailable {
                    service: "web".into(),
                })
            }
        }

        let wrapped = RetryMiddleware::wrap(
            Arc::new(NoBackend),
            config(),
            Arc::new(RetryBudget::new(1.0, 10)),
        );

        let err = wrapped.handle(request(Method::GET)).await.unwrap_err();
        assert_eq!(err.kind(), "no_backend_available");
    }
}
