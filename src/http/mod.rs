//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, route registration, middleware)
//!     → request.rs (request ID stamping)
//!     → proxy pipeline (per matched route)
//!     → response or mapped error back to the client
//! ```

pub mod request;
pub mod server;

pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use server::GatewayServer;
