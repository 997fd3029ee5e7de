//! CLI for this application
//!
use std::net::SocketAddr;
use std::time::Duration;

use crate::cluster::DiscoveryMode;
use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = "0.0.0.0",
        env("PICKET_LISTEN_ADDRESS"),
        help = "IP Address to listen on"
    )]
    pub listen_address: String,

    // HTTP API listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("PICKET_HTTP_LISTEN_PORT"),
        help = "Port to bind the picket HTTP API server to"
    )]
    pub listen_port: u16,

    // UDP listen port for the replicator
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_REPLICATOR,
        env("PICKET_REPLICATOR_LISTEN_PORT"),
        help = "UDP port to bind the picket replicator to"
    )]
    pub replicator_port: u16,

    // Anti-entropy interval
    #[clap(
        long,
        default_value = "1000",
        env("PICKET_REPLICATION_INTERVAL_MS"),
        help = "Interval in milliseconds between snapshot broadcasts"
    )]
    pub replication_interval_ms: u64,

    // Peer discovery strategy
    #[clap(
        long,
        default_value = "static",
        env("PICKET_CLUSTER_DISCOVERY"),
        help = "Cluster discovery [static]"
    )]
    pub cluster_discovery: DiscoveryMode,

    // Cluster configuration information: peer addresses
    #[clap(
        long = "cluster-node",
        env("PICKET_CLUSTER_NODES"),
        value_delimiter = ',',
        help = "Peer replicator address (host:port) to broadcast to; repeatable"
    )]
    pub cluster_nodes: Vec<SocketAddr>,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            listen_address: self.listen_address,
            listen_port: self.listen_port,
            replicator_port: self.replicator_port,
            replication_interval: Duration::from_millis(self.replication_interval_ms),
            cluster_discovery: self.cluster_discovery,
            cluster_nodes: self.cluster_nodes,
        }
    }
}
