//! Discovery-Driven API Gateway Library
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                    GATEWAY                        │
//!  Client ───────▶│  http (axum router, request IDs)                  │
//!                 │      │ matched route                              │
//!                 │      ▼                                            │
//!                 │  proxy pipeline: logging ▸ [retry] ▸ forward      │
//!                 │      │ pick endpoint (selection policy)           │
//!                 │      ▼                                            │
//!                 │  discovery subscriber ── snapshot ◀─┐             │
//!                 │                                     │ atomic swap │
//!                 │  discovery watcher (1 task/service) ┘             │
//!                 │      │ watch + list                               │
//!                 └──────┼───────────────────────────────────────────┘
//!                        ▼
//!                  etcd cluster                     Backend ◀── forward
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod resilience;

pub use config::GatewayConfig;
pub use discovery::{DiscoveryWatcher, EtcdStore, Subscriber, WatchSession};
pub use error::GatewayError;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use proxy::ProxyFactory;
