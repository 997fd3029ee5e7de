//! Concurrent bucket storage.
use std::sync::RwLock;

use async_trait::async_trait;

use crate::bucket::{Bucket, Buckets};
use crate::error::{PicketError, Result};
use crate::rate::Rate;

/// Capability contract for bucket storage backends.
///
/// Every write is a merge-on-write: the stored value and the incoming delta
/// are joined with the bucket's convergent merge, so replication deliveries
/// can be applied any number of times in any order. Backends must keep
/// that per-key contract, but are free to shard or persist however they
/// like.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the bucket with the given name, or its zero value if absent.
    async fn get(&self, name: &str) -> Result<Bucket>;

    /// Returns a point-in-time copy of all buckets, isolated from
    /// subsequent mutation.
    async fn get_all(&self) -> Result<Buckets>;

    /// Merges `delta` into the stored bucket for `name`, creating the
    /// entry if absent.
    async fn update(&self, name: &str, delta: Bucket) -> Result<()>;

    /// Applies `update` per key. Not an atomic multi-key transaction:
    /// readers may observe a partially applied batch mid-call.
    async fn update_all(&self, deltas: Buckets) -> Result<()>;

    /// Admission check as one atomic read-modify-write.
    ///
    /// Composing `get` + `Bucket::take` + `update` would let two
    /// concurrent requests read the same starting balance and both commit,
    /// jointly admitting more than the burst capacity permits. This
    /// operation serializes admission decisions instead.
    async fn apply_take(&self, name: &str, rate: &Rate, n: u64, now_ns: i64) -> Result<bool>;
}

/// A thread safe Store backed by an in-memory map behind a single
/// reader/writer lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: RwLock<Buckets>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// Lock poisoning surfaces as a storage failure rather than a panic; the
// request's admission decision is aborted, not guessed.
fn poisoned() -> PicketError {
    PicketError::Storage("bucket store lock poisoned".to_string())
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, name: &str) -> Result<Bucket> {
        let buckets = self.buckets.read().map_err(|_| poisoned())?;
        Ok(buckets
            .get(name)
            .cloned()
            .unwrap_or_else(|| Bucket::named(name)))
    }

    async fn get_all(&self) -> Result<Buckets> {
        let buckets = self.buckets.read().map_err(|_| poisoned())?;
        Ok(buckets.clone())
    }

    async fn update(&self, name: &str, delta: Bucket) -> Result<()> {
        let mut buckets = self.buckets.write().map_err(|_| poisoned())?;
        merge_entry(&mut buckets, name, delta);
        Ok(())
    }

    async fn update_all(&self, deltas: Buckets) -> Result<()> {
        for (name, delta) in deltas {
            let mut buckets = self.buckets.write().map_err(|_| poisoned())?;
            merge_entry(&mut buckets, &name, delta);
        }
        Ok(())
    }

    async fn apply_take(&self, name: &str, rate: &Rate, n: u64, now_ns: i64) -> Result<bool> {
        // The write lock is held across read, take and write-back.
        let mut buckets = self.buckets.write().map_err(|_| poisoned())?;
        let mut bucket = buckets
            .get(name)
            .cloned()
            .unwrap_or_else(|| Bucket::named(name));
        let allowed = bucket.take(now_ns, rate, n);
        merge_entry(&mut buckets, name, bucket);
        Ok(allowed)
    }
}

fn merge_entry(buckets: &mut Buckets, name: &str, delta: Bucket) {
    let current = buckets
        .entry(name.to_string())
        .or_insert_with(|| Bucket::named(name));
    let mut merged = Bucket::merged(delta, current);
    merged.name = name.to_string();
    *current = merged;
}
