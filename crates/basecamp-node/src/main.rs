use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use basecamp_config::Topology;
use basecamp_federation::Engine;
use basecamp_server::GrpcPeerPool;
use basecamp_store::{seed::seed_store, LocalStore, Segment};

#[derive(clap::Parser, Debug)]
#[command(name = "basecamp-node", about = "Basecamp federated query node")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0:50051")]
    address: String,
    #[arg(long, default_value = "A")]
    node_id: String,
    #[arg(long, default_value = "../configs/topology.json")]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let addr: SocketAddr = cli
        .address
        .parse()
        .with_context(|| format!("invalid address: {}", cli.address))?;

    let topology = Arc::new(
        Topology::load(&cli.config, &cli.node_id)
            .with_context(|| format!("failed to load topology from {}", cli.config.display()))?,
    );
    let spec = topology
        .node(&cli.node_id)
        .with_context(|| format!("node '{}' missing from topology", cli.node_id))?;

    let segment = Segment::reset(&topology.shared_memory_key);
    let store = LocalStore::attach(cli.node_id.clone(), spec.data_range, segment);
    let seeded = seed_store(&store).await;

    tracing::info!(
        node_id = %cli.node_id,
        %addr,
        seeded,
        portal = topology.is_portal(&cli.node_id),
        "node starting"
    );

    let pool = Arc::new(GrpcPeerPool::build(&topology, &cli.node_id));
    tracing::info!(peers = pool.peer_count(), "peer stub pool ready");

    let engine = Arc::new(Engine::new(
        cli.node_id.clone(),
        Arc::clone(&topology),
        store,
        pool,
    ));

    let result = basecamp_server::serve(addr, engine).await;
    Segment::destroy(&topology.shared_memory_key);
    result
}
