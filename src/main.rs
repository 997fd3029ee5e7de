use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use picket::api::{self, ApiState};
use picket::cli;
use picket::cluster::{Discovery, DiscoveryMode, StaticDiscovery};
use picket::replicator::Replicator;
use picket::store::{MemoryStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "picket=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings();

    let listen_address: IpAddr = settings.listen_address.parse()?;
    let api_address = SocketAddr::from((listen_address, settings.listen_port));
    let replicator_address = SocketAddr::from((listen_address, settings.replicator_port));

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    // Anti-entropy task against the configured peers
    let discovery: Arc<dyn Discovery> = match settings.cluster_discovery {
        DiscoveryMode::Static => Arc::new(StaticDiscovery::new(settings.cluster_nodes.clone())),
    };
    let replicator = Replicator::bind(
        replicator_address,
        discovery,
        Arc::clone(&store),
        settings.replication_interval,
    )
    .await?;
    info!("Starting replicator on {}", replicator_address);
    tokio::spawn(replicator.run());

    // Build Axum Router
    let api = api::api(ApiState::new(store));

    // Start server
    info!("Starting picket on {}", api_address);
    axum::Server::bind(&api_address)
        .serve(api.into_make_service())
        .await?;

    Ok(())
}
