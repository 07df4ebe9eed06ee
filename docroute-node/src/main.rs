//! Docroute Node - drives a routed collection against an in-memory cluster
//!
//! Reads the cluster layout from the environment, seeds a collection through
//! the router and issues a batch of reads, then reports where they landed.

use std::sync::Arc;

use docroute_core::ClusterConfig;
use docroute_router::{CollectionRegistry, MemoryCluster, RoutingStats};
use docroute_types::{doc, Selector};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reads issued when `DOCROUTE_READS` is unset
const DEFAULT_READS: u64 = 100;

async fn run(config: ClusterConfig, reads: u64) -> anyhow::Result<RoutingStats> {
    let cluster = MemoryCluster::for_config(&config);
    let registry = CollectionRegistry::new(config, Arc::new(cluster))?;
    let people = registry.collection("people")?;

    let documents = (0..10)
        .map(|i| doc(serde_json::json!({ "name": format!("user-{}", i), "shard": i % 3 })))
        .collect();
    people.insert(documents).await?;

    for _ in 0..reads {
        people.count(Selector::new()).await?;
    }

    Ok(people.stats())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration from environment
    let config = ClusterConfig::from_env();
    let reads = std::env::var("DOCROUTE_READS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_READS);

    info!(
        master = %config.master.address,
        slaves = config.slaves.len(),
        max_successive_reads = config.max_successive_reads,
        reads,
        "Starting docroute node"
    );

    let stats = run(config, reads).await?;

    info!(
        writes = stats.writes,
        master_reads = stats.master_reads,
        slave_reads = ?stats.slave_reads,
        slave_ratio = stats.slave_ratio(),
        "Routing summary"
    );

    Ok(())
}
