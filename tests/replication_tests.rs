//! End-to-end replicator tests over loopback UDP.
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use picket::bucket::{decode_frames, encode_frames, Bucket, Buckets};
use picket::cluster::{Discovery, StaticDiscovery};
use picket::rate::Rate;
use picket::replicator::Replicator;
use picket::store::{MemoryStore, Store};

const T0: i64 = 1_700_000_000_000_000_000;

#[tokio::test]
async fn replicator_broadcasts_and_merges_snapshots() {
    // A bare UDP socket plays the remote peer.
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let rate = Rate::new(10, Duration::from_secs(1));
    store.apply_take("api", &rate, 2, T0).await.unwrap();

    let discovery: Arc<dyn Discovery> = Arc::new(StaticDiscovery::new(vec![peer_addr]));
    let replicator = Replicator::bind(
        "127.0.0.1:0".parse().unwrap(),
        discovery,
        Arc::clone(&store),
        Duration::from_millis(20),
    )
    .await
    .unwrap();
    let replicator_addr = replicator.local_addr().unwrap();
    let handle = tokio::spawn(replicator.run());

    // The local snapshot arrives at the peer as decodable wire frames.
    let mut buf = vec![0u8; 64 * 1024];
    let (len, _) = timeout(Duration::from_secs(5), peer.recv_from(&mut buf))
        .await
        .expect("no snapshot broadcast received")
        .unwrap();
    let deltas = decode_frames(&buf[..len]).unwrap();
    assert_eq!(deltas["api"].taken, 2.0);

    // A snapshot sent to the replicator is merged into the local store.
    let mut remote = Bucket::named("api");
    remote.added = 9.0;
    remote.taken = 9.0;
    remote.last = T0 + 1;
    let mut frames = Buckets::new();
    frames.insert(remote.name.clone(), remote);
    peer.send_to(&encode_frames(&frames).unwrap(), replicator_addr)
        .await
        .unwrap();

    let merged = timeout(Duration::from_secs(5), async {
        loop {
            let bucket = store.get("api").await.unwrap();
            if bucket.taken >= 9.0 {
                return bucket;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("peer snapshot was not merged in time");

    assert_eq!(merged.added, 9.0);
    assert_eq!(merged.last, T0 + 1);

    handle.abort();
}

#[tokio::test]
async fn replicator_drops_corrupt_datagrams() {
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let discovery: Arc<dyn Discovery> = Arc::new(StaticDiscovery::new(vec![]));
    let replicator = Replicator::bind(
        "127.0.0.1:0".parse().unwrap(),
        discovery,
        Arc::clone(&store),
        Duration::from_secs(60),
    )
    .await
    .unwrap();
    let replicator_addr = replicator.local_addr().unwrap();
    let handle = tokio::spawn(replicator.run());

    // Garbage, then a valid frame: only the latter lands in the store.
    peer.send_to(&[1, 2, 3], replicator_addr).await.unwrap();

    let mut bucket = Bucket::named("ok");
    bucket.added = 1.0;
    let mut frames = Buckets::new();
    frames.insert(bucket.name.clone(), bucket);
    peer.send_to(&encode_frames(&frames).unwrap(), replicator_addr)
        .await
        .unwrap();

    timeout(Duration::from_secs(5), async {
        loop {
            if store.get_all().await.unwrap().contains_key("ok") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("valid snapshot after garbage was not merged");

    assert_eq!(store.get_all().await.unwrap().len(), 1);

    handle.abort();
}
