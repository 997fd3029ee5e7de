//! picket application settings
use std::net::SocketAddr;
use std::time::Duration;

use crate::cluster::DiscoveryMode;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_HTTP: u16 = 8080;
pub const DEFAULT_PORT_HTTP: &str = "8080";
pub const STANDARD_PORT_REPLICATOR: u16 = 16000;
pub const DEFAULT_PORT_REPLICATOR: &str = "16000";

#[derive(Clone, Debug)]
pub struct Settings {
    // Server listen address
    pub listen_address: String,

    // HTTP API listen port
    pub listen_port: u16,

    // UDP listen port for the replicator
    pub replicator_port: u16,

    // Interval between snapshot broadcasts to peers
    pub replication_interval: Duration,

    // How replication peers are discovered
    pub cluster_discovery: DiscoveryMode,

    // Peer replicator addresses
    pub cluster_nodes: Vec<SocketAddr>,
}
