//! UDP anti-entropy replication between peer nodes.
//!
//! Every interval the replicator reads the full local snapshot, encodes
//! each bucket with the wire codec and sends the frames to every peer,
//! packed into MTU-sized datagrams. Received snapshots are decoded and
//! merged back into the local store. The merge is idempotent, so datagrams
//! may be lost, duplicated or reordered without corrupting state; no
//! delivery deduplication is needed.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::bucket::{self, Buckets};
use crate::cluster::Discovery;
use crate::error::Result;
use crate::store::Store;

/// Keep datagrams under a conservative ethernet MTU.
pub const MAX_DATAGRAM_SIZE: usize = 1400;

pub struct Replicator {
    socket: UdpSocket,
    discovery: Arc<dyn Discovery>,
    store: Arc<dyn Store>,
    interval: Duration,
}

impl Replicator {
    pub async fn bind(
        addr: SocketAddr,
        discovery: Arc<dyn Discovery>,
        store: Arc<dyn Store>,
        interval: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            discovery,
            store,
            interval,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Runs the broadcast and receive loops until the task is aborted.
    pub async fn run(self) -> Result<()> {
        let mut ticker = interval(self.interval);
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.broadcast().await {
                        warn!(error = %err, "snapshot broadcast failed");
                    }
                }
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => self.receive(&buf[..len], peer).await,
                        Err(err) => warn!(error = %err, "snapshot receive failed"),
                    }
                }
            }
        }
    }

    async fn broadcast(&self) -> Result<()> {
        let peers = self.discovery.peers();
        if peers.is_empty() {
            return Ok(());
        }

        let snapshot = self.store.get_all().await?;
        if snapshot.is_empty() {
            return Ok(());
        }

        for datagram in pack_frames(&snapshot)? {
            for peer in &peers {
                if let Err(err) = self.socket.send_to(&datagram, peer).await {
                    warn!(peer = %peer, error = %err, "failed sending snapshot datagram");
                }
            }
        }

        debug!(
            buckets = snapshot.len(),
            peers = peers.len(),
            "broadcast snapshot"
        );
        Ok(())
    }

    async fn receive(&self, data: &[u8], peer: SocketAddr) {
        let deltas = match bucket::decode_frames(data) {
            Ok(deltas) => deltas,
            Err(err) => {
                // A corrupt datagram is dropped; the next anti-entropy
                // round carries the same state again.
                warn!(peer = %peer, error = %err, "dropping undecodable snapshot datagram");
                return;
            }
        };

        let count = deltas.len();
        match self.store.update_all(deltas).await {
            Ok(()) => debug!(peer = %peer, buckets = count, "merged peer snapshot"),
            Err(err) => warn!(peer = %peer, error = %err, "failed merging peer snapshot"),
        }
    }
}

/// Packs encoded bucket frames into datagrams no larger than
/// MAX_DATAGRAM_SIZE. A single frame above the limit gets a datagram of
/// its own.
pub fn pack_frames(buckets: &Buckets) -> Result<Vec<Vec<u8>>> {
    let mut datagrams = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for bucket in buckets.values() {
        if !current.is_empty() && current.len() + bucket.encoded_len() > MAX_DATAGRAM_SIZE {
            datagrams.push(std::mem::take(&mut current));
        }
        bucket.encode_into(&mut current)?;
    }

    if !current.is_empty() {
        datagrams.push(current);
    }

    Ok(datagrams)
}
