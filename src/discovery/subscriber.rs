//! Per-route subscriber over one service's endpoint set.
//!
//! Insulates the proxy from discovery internals: the pipeline only ever
//! sees an immutable [`EndpointSet`] or an explicit error.

use std::sync::Arc;

use crate::discovery::endpoint::{EndpointSet, EndpointsSnapshot};
use crate::discovery::watcher::ServiceSlot;
use crate::error::GatewayError;

/// Read-only view over the current endpoint set of one service.
#[derive(Clone)]
pub struct Subscriber {
    slot: Arc<ServiceSlot>,
}

impl Subscriber {
    pub(crate) fn new(slot: Arc<ServiceSlot>) -> Self {
        Self { slot }
    }

    pub fn service(&self) -> &str {
        self.slot.service()
    }

    /// Current endpoint set for the service.
    ///
    /// A not-yet-synced or empty set surfaces as `NoBackendAvailable`; a
    /// closed watch session surfaces as `DiscoveryUnavailable`. The caller
    /// never gets a silently degraded answer.
    pub fn endpoints(&self) -> Result<EndpointSet, GatewayError> {
        if self.slot.is_closed() {
            return Err(GatewayError::DiscoveryUnavailable(format!(
                "watch session for '{}' is closed",
                self.slot.service()
            )));
        }

        match self.slot.load() {
            EndpointsSnapshot::NotSynced => Err(GatewayError::NoBackendAvailable {
                service: self.slot.service().to_string(),
            }),
            EndpointsSnapshot::Synced(set) if set.is_empty() => {
                Err(GatewayError::NoBackendAvailable {
                    service: self.slot.service().to_string(),
                })
            }
            EndpointsSnapshot::Synced(set) => Ok(set),
        }
    }
}
