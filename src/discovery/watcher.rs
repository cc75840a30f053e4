//! Discovery watcher.
//!
//! # Responsibilities
//! - Keep one up-to-date endpoint set per watched service
//! - Publish immutable snapshots via atomic swap (lock-free read path)
//! - Reconnect with jittered exponential backoff on stream loss
//!
//! # Design Decisions
//! - Single-writer discipline: only the subscription loop for a service
//!   writes its snapshot; request handlers are pure readers
//! - Every membership event rebuilds the full set from the writer-side map,
//!   never patches the published value, so readers cannot observe a torn set
//! - During an outage the last known-good snapshot keeps being served
//!   (stale-but-available over empty)

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::BackoffConfig;
use crate::discovery::endpoint::{Endpoint, EndpointSet, EndpointsSnapshot};
use crate::discovery::store::{DiscoveryStore, MembershipEvent};
use crate::discovery::subscriber::Subscriber;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::resilience::backoff::{backoff_ceiling, full_jitter};

/// Shared per-service state: the published snapshot plus lifecycle flags.
pub(crate) struct ServiceSlot {
    service: String,
    snapshot: ArcSwap<EndpointsSnapshot>,
    closed: AtomicBool,
}

impl ServiceSlot {
    fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            snapshot: ArcSwap::from_pointee(EndpointsSnapshot::NotSynced),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn service(&self) -> &str {
        &self.service
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn load(&self) -> EndpointsSnapshot {
        self.snapshot.load().as_ref().clone()
    }

    /// Replace the published snapshot with a full rebuild of the membership
    /// map. The swap is atomic; readers see either the old or the new set.
    fn publish(&self, members: &BTreeMap<String, Endpoint>) {
        let set = EndpointSet::new(members.values().cloned().collect());
        metrics::record_endpoint_count(&self.service, set.len());
        self.snapshot
            .store(Arc::new(EndpointsSnapshot::Synced(set)));
    }
}

/// Maintains live endpoint sets for logical services by watching the store.
pub struct DiscoveryWatcher {
    store: Arc<dyn DiscoveryStore>,
    backoff: BackoffConfig,
    services: DashMap<String, Arc<ServiceSlot>>,
}

impl DiscoveryWatcher {
    pub fn new(store: Arc<dyn DiscoveryStore>, backoff: BackoffConfig) -> Self {
        Self {
            store,
            backoff,
            services: DashMap::new(),
        }
    }

    /// Open a watch for a service and run its subscription loop in the
    /// background. Fails with `DiscoveryUnavailable` when the store cannot
    /// be reached for the initial watch + sync.
    pub async fn start(&self, service: &str) -> Result<WatchSession, GatewayError> {
        // Watch before list: events racing the initial listing are applied
        // on top of it, so the snapshot still converges.
        let events = self.store.watch(service).await?;
        let listing = self.store.list(service).await?;

        let slot = Arc::new(ServiceSlot::new(service));
        let members: BTreeMap<String, Endpoint> = listing.into_iter().collect();
        slot.publish(&members);
        self.services.insert(service.to_string(), slot.clone());

        tracing::info!(
            service = %service,
            instances = members.len(),
            "Watch session started"
        );

        let (close_tx, close_rx) = watch::channel(false);
        let task = tokio::spawn(subscription_loop(
            self.store.clone(),
            slot.clone(),
            events,
            members,
            close_rx,
            self.backoff,
        ));

        Ok(WatchSession {
            slot,
            close_tx,
            task: Mutex::new(Some(task)),
        })
    }

    /// Latest known snapshot for a service. Never blocks; a service that was
    /// never started (or has not finished its first sync) reports
    /// `NotSynced`.
    pub fn current(&self, service: &str) -> EndpointsSnapshot {
        self.services
            .get(service)
            .map(|slot| slot.load())
            .unwrap_or(EndpointsSnapshot::NotSynced)
    }

    /// Per-route read-only view over one service's endpoint set.
    /// Returns `None` for a service no watch was started for.
    pub fn subscriber(&self, service: &str) -> Option<Subscriber> {
        self.services
            .get(service)
            .map(|slot| Subscriber::new(Arc::clone(slot.value())))
    }
}

/// Live watch for one service.
///
/// Closing cancels the background loop promptly and releases the watch.
/// Dropping the session without closing stops the loop as well.
pub struct WatchSession {
    slot: Arc<ServiceSlot>,
    close_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("service", &self.slot.service())
            .finish_non_exhaustive()
    }
}

impl WatchSession {
    pub fn service(&self) -> &str {
        self.slot.service()
    }

    /// Cancel the subscription loop and wait for it to stop. Idempotent.
    /// Subsequent subscriber lookups for this service fail with
    /// `DiscoveryUnavailable`; the last snapshot stays readable.
    pub async fn close(&self) {
        if self.slot.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.close_tx.send(true);
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
        tracing::info!(service = %self.slot.service(), "Watch session closed");
    }
}

fn apply_event(members: &mut BTreeMap<String, Endpoint>, event: MembershipEvent) {
    match event {
        MembershipEvent::Put { instance, endpoint } => {
            members.insert(instance, endpoint);
        }
        MembershipEvent::Delete { instance } => {
            members.remove(&instance);
        }
    }
}

/// Single-writer loop: applies membership events, republishes the snapshot,
/// and re-establishes the stream with backoff after a loss.
async fn subscription_loop(
    store: Arc<dyn DiscoveryStore>,
    slot: Arc<ServiceSlot>,
    mut events: mpsc::Receiver<MembershipEvent>,
    mut members: BTreeMap<String, Endpoint>,
    mut close_rx: watch::Receiver<bool>,
    backoff: BackoffConfig,
) {
    let service = slot.service().to_string();
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            // Ok(()) on close(); Err when the session was dropped. Stop
            // either way.
            _ = close_rx.changed() => break,
            event = events.recv() => match event {
                Some(event) => {
                    apply_event(&mut members, event);
                    slot.publish(&members);
                    attempt = 0;
                }
                None => {
                    // Stream lost. Keep serving the current snapshot and
                    // retry with jittered exponential backoff.
                    attempt += 1;
                    metrics::record_discovery_connected(&service, false);
                    let delay = full_jitter(backoff_ceiling(
                        attempt,
                        backoff.base_ms,
                        backoff.max_ms,
                    ));
                    tracing::warn!(
                        service = %service,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Watch stream lost, reconnecting"
                    );

                    tokio::select! {
                        _ = close_rx.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }

                    match reconnect(store.as_ref(), &service).await {
                        Ok((stream, listing)) => {
                            events = stream;
                            members = listing.into_iter().collect();
                            slot.publish(&members);
                            metrics::record_discovery_connected(&service, true);
                            tracing::info!(
                                service = %service,
                                instances = members.len(),
                                "Watch stream re-established"
                            );
                            attempt = 0;
                        }
                        Err(e) => {
                            // `events` stays closed, so the next recv()
                            // returns None and the backoff grows.
                            tracing::warn!(
                                service = %service,
                                attempt = attempt,
                                error = %e,
                                "Reconnect failed"
                            );
                        }
                    }
                }
            }
        }
    }

    tracing::debug!(service = %service, "Subscription loop stopped");
}

/// Re-open the watch, then resync the full membership from a fresh listing.
async fn reconnect(
    store: &dyn DiscoveryStore,
    service: &str,
) -> Result<(mpsc::Receiver<MembershipEvent>, Vec<(String, Endpoint)>), GatewayError> {
    let events = store.watch(service).await?;
    let listing = store.list(service).await?;
    Ok((events, listing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::memory::MemoryStore;
    use std::time::Duration;

    fn backoff() -> BackoffConfig {
        BackoffConfig {
            base_ms: 10,
            max_ms: 50,
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within deadline");
    }

    #[tokio::test]
    async fn test_current_is_not_synced_before_start() {
        let store = Arc::new(MemoryStore::new());
        let watcher = DiscoveryWatcher::new(store, backoff());
        assert!(matches!(
            watcher.current("web"),
            EndpointsSnapshot::NotSynced
        ));
    }

    #[tokio::test]
    async fn test_start_syncs_existing_instances() {
        let store = Arc::new(MemoryStore::new());
        store.put("web", "a", Endpoint::new("10.0.0.1", 80)).await;

        let watcher = DiscoveryWatcher::new(store.clone(), backoff());
        let session = watcher.start("web").await.unwrap();

        let set = watcher.current("web").synced().unwrap().clone();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(0).unwrap().host, "10.0.0.1");

        session.close().await;
    }

    #[tokio::test]
    async fn test_start_fails_when_store_unreachable() {
        let store = Arc::new(MemoryStore::new());
        store.set_unreachable(true);

        let watcher = DiscoveryWatcher::new(store, backoff());
        let err = watcher.start("web").await.unwrap_err();
        assert!(matches!(err, GatewayError::DiscoveryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_events_converge_to_registered_set() {
        let store = Arc::new(MemoryStore::new());
        let watcher = DiscoveryWatcher::new(store.clone(), backoff());
        let session = watcher.start("web").await.unwrap();

        store.put("web", "a", Endpoint::new("10.0.0.1", 80)).await;
        store.put("web", "b", Endpoint::new("10.0.0.2", 80)).await;
        store.delete("web", "a").await;

        wait_until(|| {
            watcher
                .current("web")
                .synced()
                .map(|set| set.len() == 1 && set.get(0).unwrap().host == "10.0.0.2")
                .unwrap_or(false)
        })
        .await;

        session.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        store.put("web", "a", Endpoint::new("10.0.0.1", 80)).await;

        let watcher = DiscoveryWatcher::new(store, backoff());
        let session = watcher.start("web").await.unwrap();

        session.close().await;
        session.close().await;

        // Lookups fail after close; the last snapshot stays readable.
        let subscriber = watcher.subscriber("web").unwrap();
        assert!(matches!(
            subscriber.endpoints().unwrap_err(),
            GatewayError::DiscoveryUnavailable(_)
        ));
        assert!(watcher.current("web").synced().is_some());
    }
}
