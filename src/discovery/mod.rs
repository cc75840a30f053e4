//! Backend discovery subsystem.
//!
//! # Data Flow
//! ```text
//! coordination store (etcd)
//!     → store.rs (narrow list + watch interface)
//!     → watcher.rs (single-writer loop per service,
//!                   atomic snapshot publication, backoff reconnect)
//!     → subscriber.rs (per-route read-only view)
//!     → proxy pipeline (selects one endpoint per request)
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable values swapped atomically; the request path
//!   reads without locks
//! - The store binding (etcd.rs) is the only module that knows the wire
//!   protocol; everything else depends on the `DiscoveryStore` trait
//! - memory.rs backs the integration tests and local development

pub mod endpoint;
pub mod etcd;
pub mod memory;
pub mod store;
pub mod subscriber;
pub mod watcher;

pub use endpoint::{Endpoint, EndpointSet, EndpointsSnapshot};
pub use etcd::EtcdStore;
pub use store::{DiscoveryStore, MembershipEvent};
pub use subscriber::Subscriber;
pub use watcher::{DiscoveryWatcher, WatchSession};
