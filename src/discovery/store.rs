//! Narrow interface to the coordination store.
//!
//! # Design Decisions
//! - The watcher depends only on `list` + `watch`, not on the store's full
//!   API; swapping the backend touches one module
//! - Watch delivery is a plain channel; the channel closing signals a lost
//!   stream and triggers the watcher's reconnect path

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::discovery::endpoint::Endpoint;
use crate::error::GatewayError;

/// A membership change for one registered instance.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipEvent {
    /// An instance was registered or its record updated.
    Put { instance: String, endpoint: Endpoint },
    /// An instance was deregistered.
    Delete { instance: String },
}

/// Read-side client for a distributed coordination store.
///
/// Implementations must deliver events for a service in the order the store
/// observed them. A closed event channel means the stream is gone and the
/// caller must re-establish the watch (and re-list) itself.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Fetch all currently registered instances for a service.
    async fn list(&self, service: &str) -> Result<Vec<(String, Endpoint)>, GatewayError>;

    /// Open a watch for membership changes on a service.
    async fn watch(
        &self,
        service: &str,
    ) -> Result<mpsc::Receiver<MembershipEvent>, GatewayError>;
}
