//! Integration tests for the discovery watcher.
//!
//! Drives the watcher through an in-memory store so membership events,
//! stream loss and reconnection can be injected deterministically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use discovery_gateway::config::BackoffConfig;
use discovery_gateway::discovery::memory::MemoryStore;
use discovery_gateway::discovery::{DiscoveryWatcher, Endpoint, EndpointsSnapshot};
use discovery_gateway::error::GatewayError;

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        base_ms: 10,
        max_ms: 50,
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {}", what);
}

fn hosts(snapshot: &EndpointsSnapshot) -> Option<Vec<String>> {
    snapshot
        .synced()
        .map(|set| set.iter().map(|e| e.host.clone()).collect())
}

#[tokio::test]
async fn test_converges_to_registered_set() {
    let store = Arc::new(MemoryStore::new());
    let watcher = DiscoveryWatcher::new(store.clone(), fast_backoff());
    let session = watcher.start("web").await.unwrap();

    store.put("web", "a", Endpoint::new("host-a", 80)).await;
    store.put("web", "b", Endpoint::new("host-b", 80)).await;
    store.put("web", "c", Endpoint::new("host-c", 80)).await;
    // Update in place, then remove: neither may leave stale entries.
    store.put("web", "b", Endpoint::new("host-b2", 80)).await;
    store.delete("web", "a").await;

    wait_until("snapshot convergence", || {
        hosts(&watcher.current("web"))
            .map(|h| h == vec!["host-b2".to_string(), "host-c".to_string()])
            .unwrap_or(false)
    })
    .await;

    session.close().await;
}

#[tokio::test]
async fn test_empty_set_is_synced_not_unknown() {
    let store = Arc::new(MemoryStore::new());
    let watcher = DiscoveryWatcher::new(store, fast_backoff());
    let session = watcher.start("web").await.unwrap();

    // Synced with zero instances: distinguishable from "no data yet".
    let snapshot = watcher.current("web");
    assert!(snapshot.synced().is_some());
    assert!(snapshot.synced().unwrap().is_empty());

    // But a service nobody watches has no data at all.
    assert!(matches!(
        watcher.current("ghost"),
        EndpointsSnapshot::NotSynced
    ));

    // Both surface to the caller as "no backend", never a silent default.
    let err = watcher
        .subscriber("web")
        .unwrap()
        .endpoints()
        .unwrap_err();
    assert!(matches!(err, GatewayError::NoBackendAvailable { .. }));

    session.close().await;
}

#[tokio::test]
async fn test_resync_replaces_snapshot_wholesale() {
    let store = Arc::new(MemoryStore::new());
    store.put("web", "1", Endpoint::new("a-1", 80)).await;
    store.put("web", "2", Endpoint::new("a-2", 80)).await;
    store.put("web", "3", Endpoint::new("a-3", 80)).await;

    let watcher = Arc::new(DiscoveryWatcher::new(store.clone(), fast_backoff()));
    let session = watcher.start("web").await.unwrap();

    // Concurrent readers must only ever see a complete generation: all
    // hosts from the old membership or all from the new, never a mix.
    let stop = Arc::new(AtomicBool::new(false));
    let torn = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let watcher = watcher.clone();
        let stop = stop.clone();
        let torn = torn.clone();
        readers.push(tokio::spawn(async move {
            while !stop.load(Ordering::Relaxed) {
                if let Some(hosts) = hosts(&watcher.current("web")) {
                    let generation_a = hosts.iter().all(|h| h.starts_with("a-"));
                    let generation_b = hosts.iter().all(|h| h.starts_with("b-"));
                    if !(generation_a || generation_b) || hosts.len() != 3 {
                        torn.store(true, Ordering::Relaxed);
                    }
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    // Kill the stream and hold the store unreachable while the whole
    // membership is swapped; the reconnect re-list then publishes the new
    // generation in one shot.
    store.set_unreachable(true);
    store.drop_streams();
    for id in ["1", "2", "3"] {
        store.delete("web", id).await;
    }
    store.put("web", "1", Endpoint::new("b-1", 80)).await;
    store.put("web", "2", Endpoint::new("b-2", 80)).await;
    store.put("web", "3", Endpoint::new("b-3", 80)).await;
    store.set_unreachable(false);

    wait_until("resynced generation", || {
        hosts(&watcher.current("web"))
            .map(|h| h.iter().all(|host| host.starts_with("b-")))
            .unwrap_or(false)
    })
    .await;

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.await.unwrap();
    }
    assert!(!torn.load(Ordering::Relaxed), "reader observed a torn snapshot");

    session.close().await;
}

#[tokio::test]
async fn test_serves_stale_snapshot_during_outage() {
    let store = Arc::new(MemoryStore::new());
    store.put("web", "a", Endpoint::new("host-a", 80)).await;

    let watcher = DiscoveryWatcher::new(store.clone(), fast_backoff());
    let session = watcher.start("web").await.unwrap();
    let subscriber = watcher.subscriber("web").unwrap();

    // Outage: stream gone and reconnects keep failing.
    store.set_unreachable(true);
    store.drop_streams();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Stale-but-available: the last good snapshot keeps serving.
    let set = subscriber.endpoints().unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set.get(0).unwrap().host, "host-a");

    // Recovery: the re-list picks up changes made during the outage.
    store.set_unreachable(false);
    store.put("web", "b", Endpoint::new("host-b", 80)).await;

    wait_until("post-outage resync", || {
        hosts(&watcher.current("web"))
            .map(|h| h.contains(&"host-b".to_string()))
            .unwrap_or(false)
    })
    .await;

    session.close().await;
}
