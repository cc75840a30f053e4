//! In-memory discovery store.
//!
//! Used by the integration tests and for local development without a real
//! coordination store. Supports fault injection: dropping the active watch
//! streams simulates a store outage without losing the registered data.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::discovery::endpoint::Endpoint;
use crate::discovery::store::{DiscoveryStore, MembershipEvent};
use crate::error::GatewayError;

/// In-memory implementation of [`DiscoveryStore`].
#[derive(Default)]
pub struct MemoryStore {
    services: Mutex<HashMap<String, BTreeMap<String, Endpoint>>>,
    watchers: Mutex<HashMap<String, Vec<mpsc::Sender<MembershipEvent>>>>,
    unreachable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update an instance and notify watchers.
    pub async fn put(&self, service: &str, instance: &str, endpoint: Endpoint) {
        self.services
            .lock()
            .unwrap()
            .entry(service.to_string())
            .or_default()
            .insert(instance.to_string(), endpoint.clone());

        self.notify(
            service,
            MembershipEvent::Put {
                instance: instance.to_string(),
                endpoint,
            },
        )
        .await;
    }

    /// Deregister an instance and notify watchers.
    pub async fn delete(&self, service: &str, instance: &str) {
        if let Some(members) = self.services.lock().unwrap().get_mut(service) {
            members.remove(instance);
        }

        self.notify(
            service,
            MembershipEvent::Delete {
                instance: instance.to_string(),
            },
        )
        .await;
    }

    /// Drop every active watch stream, simulating a store outage.
    /// Registered data is kept; a later `watch` + `list` sees it again.
    pub fn drop_streams(&self) {
        self.watchers.lock().unwrap().clear();
    }

    /// Make `list` and `watch` fail with `DiscoveryUnavailable` until
    /// reachability is restored.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), GatewayError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(GatewayError::DiscoveryUnavailable(
                "store unreachable".into(),
            ))
        } else {
            Ok(())
        }
    }

    async fn notify(&self, service: &str, event: MembershipEvent) {
        let senders: Vec<_> = self
            .watchers
            .lock()
            .unwrap()
            .get(service)
            .map(|senders| senders.to_vec())
            .unwrap_or_default();

        for sender in senders {
            let _ = sender.send(event.clone()).await;
        }
    }
}

#[async_trait]
impl DiscoveryStore for MemoryStore {
    async fn list(&self, service: &str) -> Result<Vec<(String, Endpoint)>, GatewayError> {
        self.check_reachable()?;
        Ok(self
            .services
            .lock()
            .unwrap()
            .get(service)
            .map(|members| {
                members
                    .iter()
                    .map(|(id, endpoint)| (id.clone(), endpoint.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn watch(
        &self,
        service: &str,
    ) -> Result<mpsc::Receiver<MembershipEvent>, GatewayError> {
        self.check_reachable()?;
        let (tx, rx) = mpsc::channel(256);
        self.watchers
            .lock()
            .unwrap()
            .entry(service.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
