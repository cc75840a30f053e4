//! Proxy pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Route registered → factory.rs builds the pipeline:
//!     logging.rs (outermost decorator)
//!         → retry.rs (optional decorator, idempotent requests only)
//!             → forward.rs (select endpoint, rewrite target, forward)
//!                 → selection.rs (round-robin / random / weighted)
//!                 → discovery subscriber (current endpoint set)
//! ```
//!
//! # Design Decisions
//! - One capability trait (`Handler`); every decorator both implements it
//!   and holds one instance of it (composition, not inheritance)
//! - The forwarding core never retries; retry is a separate decorator
//! - Selection state (the rotation counter) is a single atomic, safe under
//!   concurrent `handle` calls

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};

use crate::error::GatewayError;

pub mod factory;
pub mod forward;
pub mod logging;
pub mod retry;
pub mod selection;

pub use factory::ProxyFactory;
pub use forward::ForwardProxy;
pub use logging::LoggingMiddleware;
pub use retry::RetryMiddleware;
pub use selection::SelectionPolicy;

/// A request-forwarding pipeline stage.
///
/// Implemented by the forwarding core and by every decorator around it.
#[async_trait]
pub trait Handler: Send + Sync + std::fmt::Debug {
    async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, GatewayError>;
}
