//! etcd binding for the discovery store interface.
//!
//! # Responsibilities
//! - Connect to the etcd cluster with a bounded timeout
//! - List registered instances under the service key prefix
//! - Translate etcd watch events into membership events
//!
//! # Key layout
//! Instances for service `svc` are registered at `{prefix}/svc/{instance_id}`
//! with a JSON-encoded [`Endpoint`] as the value.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, EventType, GetOptions, WatchOptions};
use tokio::sync::{mpsc, Mutex};

use crate::config::DiscoveryConfig;
use crate::discovery::endpoint::Endpoint;
use crate::discovery::store::{DiscoveryStore, MembershipEvent};
use crate::error::GatewayError;

/// Buffered events per watch stream before backpressure applies.
const WATCH_CHANNEL_CAPACITY: usize = 256;

/// etcd-backed discovery store.
pub struct EtcdStore {
    client: Arc<Mutex<Client>>,
    prefix: String,
}

impl EtcdStore {
    /// Connect to the cluster. Fails with `DiscoveryUnavailable` when no
    /// endpoint answers within the configured connect timeout.
    pub async fn connect(config: &DiscoveryConfig) -> Result<Self, GatewayError> {
        let timeout = Duration::from_secs(config.connect_timeout_secs);
        let options = ConnectOptions::new()
            .with_connect_timeout(timeout)
            .with_timeout(timeout);

        let client = Client::connect(&config.endpoints, Some(options))
            .await
            .map_err(|e| GatewayError::DiscoveryUnavailable(e.to_string()))?;

        tracing::info!(
            endpoints = ?config.endpoints,
            prefix = %config.prefix,
            "Connected to coordination store"
        );

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            prefix: config.prefix.trim_end_matches('/').to_string(),
        })
    }

    /// Key prefix for one service, trailing slash included so that watch
    /// and list cover exactly the instances of that service.
    fn service_prefix(&self, service: &str) -> String {
        format!("{}/{}/", self.prefix, service)
    }

    fn instance_id(key_prefix: &str, key: &[u8]) -> Option<String> {
        let key = std::str::from_utf8(key).ok()?;
        key.strip_prefix(key_prefix).map(|id| id.to_string())
    }
}

#[async_trait]
impl DiscoveryStore for EtcdStore {
    async fn list(&self, service: &str) -> Result<Vec<(String, Endpoint)>, GatewayError> {
        let key_prefix = self.service_prefix(service);
        let mut client = self.client.lock().await;

        let response = client
            .get(key_prefix.as_str(), Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| GatewayError::DiscoveryUnavailable(e.to_string()))?;

        let mut instances = Vec::new();
        for kv in response.kvs() {
            let Some(instance) = Self::instance_id(&key_prefix, kv.key()) else {
                continue;
            };
            match serde_json::from_slice::<Endpoint>(kv.value()) {
                Ok(endpoint) => instances.push((instance, endpoint)),
                Err(e) => {
                    tracing::warn!(
                        service = %service,
                        instance = %instance,
                        error = %e,
                        "Skipping instance with malformed registration record"
                    );
                }
            }
        }

        Ok(instances)
    }

    async fn watch(
        &self,
        service: &str,
    ) -> Result<mpsc::Receiver<MembershipEvent>, GatewayError> {
        let key_prefix = self.service_prefix(service);
        let mut client = self.client.lock().await;

        let (mut watcher, mut stream) = client
            .watch(key_prefix.as_str(), Some(WatchOptions::new().with_prefix()))
            .await
            .map_err(|e| GatewayError::DiscoveryUnavailable(e.to_string()))?;
        drop(client);

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let service = service.to_string();

        tokio::spawn(async move {
            'stream: loop {
                // A dropped receiver means the subscription loop moved on
                // (reconnect or close); cancel the server-side watch without
                // waiting for the next event.
                let response = tokio::select! {
                    _ = tx.closed() => break 'stream,
                    message = stream.message() => match message {
                        Ok(Some(response)) => response,
                        Ok(None) => {
                            tracing::warn!(service = %service, "Watch stream ended");
                            break 'stream;
                        }
                        Err(e) => {
                            tracing::warn!(service = %service, error = %e, "Watch stream error");
                            break 'stream;
                        }
                    }
                };

                for event in response.events() {
                    let Some(kv) = event.kv() else { continue };
                    let Some(instance) = EtcdStore::instance_id(&key_prefix, kv.key()) else {
                        continue;
                    };

                    let membership = match event.event_type() {
                        EventType::Put => {
                            match serde_json::from_slice::<Endpoint>(kv.value()) {
                                Ok(endpoint) => MembershipEvent::Put { instance, endpoint },
                                Err(e) => {
                                    tracing::warn!(
                                        service = %service,
                                        instance = %instance,
                                        error = %e,
                                        "Ignoring malformed registration record"
                                    );
                                    continue;
                                }
                            }
                        }
                        EventType::Delete => MembershipEvent::Delete { instance },
                    };

                    if tx.send(membership).await.is_err() {
                        break 'stream;
                    }
                }
            }
            let _ = watcher.cancel().await;
        });

        Ok(rx)
    }
}
