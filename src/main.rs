//! Gateway process wiring.
//!
//! Startup order matters: configuration is validated before anything runs,
//! the store connection and the per-service watch sessions come up before
//! the first pipeline is built, and a route that cannot be assembled aborts
//! the process.

use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;

use discovery_gateway::config;
use discovery_gateway::discovery::{DiscoveryWatcher, EtcdStore};
use discovery_gateway::http::GatewayServer;
use discovery_gateway::lifecycle::{self, Shutdown};
use discovery_gateway::observability::{logging, metrics};
use discovery_gateway::proxy::ProxyFactory;

const DEFAULT_CONFIG_PATH: &str = "gateway.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    // Logging is not up yet; config failures go to stderr.
    let config = match config::load_config(Path::new(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: configuration '{}': {}", config_path, e);
            std::process::exit(1);
        }
    };

    logging::init(&config.observability);
    tracing::info!(
        config = %config_path,
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        "discovery-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = Arc::new(EtcdStore::connect(&config.discovery).await?);
    let watcher = Arc::new(DiscoveryWatcher::new(store, config.discovery.backoff));

    // One watch session per distinct backend service.
    let mut services: Vec<&str> = config.routes.iter().map(|r| r.service.as_str()).collect();
    services.sort_unstable();
    services.dedup();

    let mut sessions = Vec::with_capacity(services.len());
    for service in services {
        sessions.push(watcher.start(service).await?);
    }

    let factory = ProxyFactory::new(watcher.clone(), config.timeouts, config.retries);
    let server = GatewayServer::new(&config, &factory)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Arc::new(Shutdown::new());
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        lifecycle::wait_for_signal().await;
        signal_shutdown.trigger();
    });

    server.run(listener, shutdown.subscribe()).await?;

    // The server has drained; stop discovery last so in-flight requests
    // never lost their lookups.
    for session in &sessions {
        session.close().await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
