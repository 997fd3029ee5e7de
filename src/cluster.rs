//! Cluster membership for replication.
//!
//! Membership management is out of scope for the core: peers are supplied
//! as a static `host:port` list, behind a trait so another discovery
//! strategy can be plugged in.
use std::net::SocketAddr;

/// Supplies the current set of peer replicator addresses.
pub trait Discovery: Send + Sync {
    fn peers(&self) -> Vec<SocketAddr>;
}

/// A fixed peer list taken from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticDiscovery {
    peers: Vec<SocketAddr>,
}

impl StaticDiscovery {
    pub fn new(peers: Vec<SocketAddr>) -> Self {
        Self { peers }
    }
}

impl Discovery for StaticDiscovery {
    fn peers(&self) -> Vec<SocketAddr> {
        self.peers.clone()
    }
}

/// How replication peers are discovered.
#[derive(Clone, Copy, Debug, Default)]
pub enum DiscoveryMode {
    #[default]
    Static,
}

impl std::fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryMode::Static => write!(f, "static"),
        }
    }
}

impl std::str::FromStr for DiscoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" => Ok(DiscoveryMode::Static),
            _ => Err(format!("Invalid cluster discovery: {}", s)),
        }
    }
}
