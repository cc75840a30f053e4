//! HTTP server setup.
//!
//! # Responsibilities
//! - Register one axum route per configured gateway route (axum owns path
//!   matching; the pipeline never inspects the route table)
//! - Wire up middleware (timeout, request ID, tracing)
//! - Dispatch matched requests into the route's proxy pipeline
//! - Map pipeline errors to HTTP responses

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{GatewayConfig, RouteConfig};
use crate::error::GatewayError;
use crate::http::request::RequestIdLayer;
use crate::observability::metrics;
use crate::proxy::{Handler, ProxyFactory};

/// HTTP edge of the gateway.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    /// Build the edge router. Fails with `InvalidRouteConfig` when any
    /// route cannot be assembled; the process must not start half-routed.
    pub fn new(config: &GatewayConfig, factory: &ProxyFactory) -> Result<Self, GatewayError> {
        let mut router = Router::new();
        for route in &config.routes {
            let pipeline = factory.build(route)?;
            router = router.merge(route_router(route, pipeline));
        }

        let router = router
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http());

        Ok(Self { router })
    }

    /// Run the server until the shutdown signal fires, then drain.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Register both the bare prefix and everything below it.
fn route_router(route: &RouteConfig, pipeline: Arc<dyn Handler>) -> Router {
    let route_name = route.name.clone();
    let handler = move |request: Request| {
        let pipeline = pipeline.clone();
        let route_name = route_name.clone();
        async move { dispatch(pipeline, &route_name, request).await }
    };

    let prefix = route.path_prefix.trim_end_matches('/');
    if prefix.is_empty() {
        Router::new()
            .route("/", any(handler.clone()))
            .route("/{*rest}", any(handler))
    } else {
        Router::new()
            .route(prefix, any(handler.clone()))
            .route(&format!("{}/{{*rest}}", prefix), any(handler))
    }
}

async fn dispatch(pipeline: Arc<dyn Handler>, route: &str, request: Request<Body>) -> Response {
    let start = Instant::now();
    let response = match pipeline.handle(request).await {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    };
    metrics::record_request(route, response.status().as_u16(), start);
    response
}
