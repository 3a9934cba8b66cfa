mod config;
mod net;
mod world;

use std::sync::Arc;

use tracing::{error, info, Level};

use crate::config::ServerConfig;
use crate::net::hub::ChatroomHub;
use crate::net::transport::PlazaServer;
use crate::world::animation::AnimationCatalog;
use crate::world::collision::CollisionMap;
use crate::world::persist::InMemoryCoordinateStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Plaza Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    info!(
        "Configuration loaded: {}:{}, max_connections={}",
        config.bind_address, config.port, config.max_connections
    );

    // Shared world state
    let map = Arc::new(CollisionMap::plaza());
    let catalog = Arc::new(AnimationCatalog::builtin());
    let store = Arc::new(InMemoryCoordinateStore::new());
    let hub = ChatroomHub::new_shared(map, catalog, store);

    let server = PlazaServer::new(config.clone(), hub).await?;

    info!(
        "Server ready on https://{}:{}",
        config.bind_address, config.port
    );
    info!("Certificate hash: {}", server.cert_hash());
    info!(
        "Chrome flag: --ignore-certificate-errors-spki-list={}",
        server.cert_hash()
    );

    // Shutdown signal handler
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!("Server stopped");
    Ok(())
}
