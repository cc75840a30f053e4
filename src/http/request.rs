//! Request identity.
//!
//! # Responsibilities
//! - Assign a unique request ID as early as possible
//! - Reuse an incoming `x-request-id` so IDs correlate across hops
//! - Expose the ID via request extensions for handlers and logs

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{HeaderValue, Request};
use tower::{Layer, Service};
use uuid::Uuid;

/// Header carrying the request ID across hops.
pub const X_REQUEST_ID: &str = "x-request-id";

/// A per-request identifier, either inherited or freshly generated.
#[derive(Debug, Clone)]
pub struct RequestId(Arc<str>);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Extension access to the request ID.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&RequestId>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions().get::<RequestId>()
    }
}

/// Tower layer that stamps every request with an ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = SetRequestId<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SetRequestId { inner }
    }
}

/// Service wrapper inserting the `x-request-id` header and extension.
#[derive(Debug, Clone)]
pub struct SetRequestId<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for SetRequestId<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Ok(value) = HeaderValue::from_str(&id) {
            request.headers_mut().insert(X_REQUEST_ID, value);
        }
        request.extensions_mut().insert(RequestId(id.into()));

        self.inner.call(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::ServiceExt;

    async fn capture(request: Request<()>) -> Result<Request<()>, Infallible> {
        Ok(request)
    }

    #[tokio::test]
    async fn test_generates_id_when_missing() {
        let mut service = RequestIdLayer.layer(tower::service_fn(capture));
        let request = Request::builder().body(()).unwrap();

        let seen = service.ready().await.unwrap().call(request).await.unwrap();
        let id = seen.request_id().expect("extension set");
        assert!(!id.as_str().is_empty());
        assert_eq!(
            seen.headers().get(X_REQUEST_ID).unwrap().to_str().unwrap(),
            id.as_str()
        );
    }

    #[tokio::test]
    async fn test_reuses_incoming_id() {
        let mut service = RequestIdLayer.layer(tower::service_fn(capture));
        let request = Request::builder()
            .header(X_REQUEST_ID, "upstream-id")
            .body(())
            .unwrap();

        let seen = service.ready().await.unwrap().call(request).await.unwrap();
        assert_eq!(seen.request_id().unwrap().as_str(), "upstream-id");
    }
}
