//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use discovery_gateway::config::{GatewayConfig, RouteConfig, SelectionKind};
use discovery_gateway::discovery::memory::MemoryStore;
use discovery_gateway::discovery::{DiscoveryWatcher, WatchSession};
use discovery_gateway::http::GatewayServer;
use discovery_gateway::lifecycle::Shutdown;
use discovery_gateway::proxy::ProxyFactory;

/// Start a simple mock backend that returns a fixed response body.
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Route over one backend service.
#[allow(dead_code)]
pub fn route(name: &str, path_prefix: &str, service: &str) -> RouteConfig {
    RouteConfig {
        name: name.into(),
        path_prefix: path_prefix.into(),
        service: service.into(),
        policy: SelectionKind::RoundRobin,
        strip_prefix: false,
        retry: None,
    }
}

/// Bring up a full gateway against an in-memory store.
///
/// The returned watch sessions must be kept alive for the duration of the
/// test; dropping one stops its subscription loop.
#[allow(dead_code)]
pub async fn spawn_gateway(
    config: GatewayConfig,
    store: Arc<MemoryStore>,
) -> (Arc<Shutdown>, Vec<WatchSession>) {
    let watcher = Arc::new(DiscoveryWatcher::new(store, config.discovery.backoff));

    let mut services: Vec<&str> = config.routes.iter().map(|r| r.service.as_str()).collect();
    services.sort_unstable();
    services.dedup();

    let mut sessions = Vec::new();
    for service in services {
        sessions.push(watcher.start(service).await.unwrap());
    }

    let factory = ProxyFactory::new(watcher, config.timeouts, config.retries);
    let server = GatewayServer::new(&config, &factory).unwrap();

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .unwrap();

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (shutdown, sessions)
}
