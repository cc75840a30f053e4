//! Logging decorator for the proxy pipeline.
//!
//! Wraps any [`Handler`] with structured before/after logging. The wrapped
//! response or error is returned untouched; the decorator only observes.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};

use crate::error::GatewayError;
use crate::http::request::X_REQUEST_ID;
use crate::proxy::Handler;

/// Structured logging around one route's pipeline.
pub struct LoggingMiddleware {
    route: String,
    inner: Arc<dyn Handler>,
}

impl std::fmt::Debug for LoggingMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingMiddleware")
            .field("route", &self.route)
            .field("inner", &self.inner)
            .finish()
    }
}

impl LoggingMiddleware {
    pub fn wrap(route: impl Into<String>, inner: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(Self {
            route: route.into(),
            inner,
        })
    }
}

#[async_trait]
impl Handler for LoggingMiddleware {
    async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, GatewayError> {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let start = Instant::now();

        tracing::debug!(
            route = %self.route,
            request_id = %request_id,
            method = %method,
            path = %path,
            "Proxying request"
        );

        let result = self.inner.handle(request).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                tracing::info!(
                    route = %self.route,
                    request_id = %request_id,
                    status = response.status().as_u16(),
                    latency_ms = latency_ms,
                    "Request completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    route = %self.route,
                    request_id = %request_id,
                    error = %e,
                    kind = e.kind(),
                    latency_ms = latency_ms,
                    "Request failed"
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[derive(Debug)]
    struct StubHandler {
        fail: bool,
    }

    #[async_trait]
    impl Handler for StubHandler {
        async fn handle(&self, _request: Request<Body>) -> Result<Response<Body>, GatewayError> {
            if self.fail {
                Err(GatewayError::UpstreamUnreachable("refused".into()))
            } else {
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header("x-marker", "stub")
                    .body(Body::from("payload"))
                    .unwrap())
            }
        }
    }

    fn request() -> Request<Body> {
        Request::builder()
            .uri("http://gateway/users/1")
            .header(X_REQUEST_ID, "req-1")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_wrapped_response_is_unchanged() {
        let bare = StubHandler { fail: false };
        let wrapped = LoggingMiddleware::wrap("users", Arc::new(StubHandler { fail: false }));

        let bare_response = bare.handle(request()).await.unwrap();
        let wrapped_response = wrapped.handle(request()).await.unwrap();

        assert_eq!(bare_response.status(), wrapped_response.status());
        assert_eq!(
            bare_response.headers().get("x-marker"),
            wrapped_response.headers().get("x-marker")
        );

        let bare_body = axum::body::to_bytes(bare_response.into_body(), 1024)
            .await
            .unwrap();
        let wrapped_body = axum::body::to_bytes(wrapped_response.into_body(), 1024)
            .await
            .unwrap();
        assert_eq!(bare_body, wrapped_body);
    }

    #[tokio::test]
    async fn test_wrapped_error_is_unchanged() {
        let bare = StubHandler { fail: true };
        let wrapped = LoggingMiddleware::wrap("users", Arc::new(StubHandler { fail: true }));

        let bare_err = bare.handle(request()).await.unwrap_err();
        let wrapped_err = wrapped.handle(request()).await.unwrap_err();

        assert_eq!(bare_err.kind(), wrapped_err.kind());
        assert_eq!(bare_err.to_string(), wrapped_err.to_string());
    }
}
