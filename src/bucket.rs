//! Token bucket with PN-counter merge semantics and the replication wire codec.
//!
//! `added` and `taken` are each monotonically non-decreasing within one
//! replica's history, so a field-wise maximum is a valid join and buckets
//! updated independently on different nodes can be merged in any order,
//! any number of times, and still converge.
use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::rate::Rate;

/// Capacity is the number of tokens that can be taken out of a bucket in a
/// single call, also known as burstiness. It *also* determines how quickly
/// a bucket is depleted when the take rate is above the refill rate: the
/// larger the capacity, the longer a take rate slightly above the refill
/// rate (e.g. refill 100/s, take 105/s) keeps being admitted. Empirically,
/// 5 keeps those policy violation windows short while tolerating variable
/// burstiness.
const CAPACITY: f64 = 5.0;

/// Fixed wire frame header: added (8) + taken (8) + last (8) + name length (2).
pub const WIRE_HEADER_LEN: usize = 26;

/// All buckets of a node keyed by name; the unit of bulk reads and of
/// replication payloads.
pub type Buckets = HashMap<String, Bucket>;

/// A token bucket with CRDT PN-counter accumulators, mergeable with other
/// replicas' views of the same bucket without coordination.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub added: f64,
    pub taken: f64,
    /// Unix nanoseconds timestamp of the last update.
    pub last: i64,
}

/// Current wall clock as unix nanoseconds.
pub fn now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

impl Bucket {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The current token balance.
    pub fn balance(&self) -> f64 {
        self.added - self.taken
    }

    /// Attempts to take `n` tokens out of the bucket at time `now_ns`,
    /// refilling at `rate`. Returns whether the take was admitted.
    ///
    /// A denial is a business outcome, not an error: it consumes nothing
    /// and only records the (possibly clamped) observation time. A fresh
    /// zero-value bucket has `last == 0`, so its first call sees an
    /// epoch-sized elapsed time and is granted up to full capacity.
    pub fn take(&mut self, now_ns: i64, rate: &Rate, n: u64) -> bool {
        // Clock regression guard: replication can deliver a timestamp from
        // a peer whose clock runs ahead of ours.
        let last = self.last.min(now_ns);

        let balance = self.added - self.taken;

        let mut refill = rate.tokens(now_ns - last);
        let missing = CAPACITY - balance;
        if refill > missing {
            refill = missing;
        }

        let wanted = n as f64;
        let allowed = wanted <= balance + refill;
        if allowed {
            self.last = now_ns;
            self.added += refill;
            self.taken += wanted;
        } else {
            self.last = last;
        }

        allowed
    }

    /// Merges other replicas' views of this bucket into `self`, picking the
    /// largest value for each field. The join is commutative, associative
    /// and idempotent, so deliveries may be duplicated or reordered freely.
    pub fn merge<'a, I>(&mut self, others: I)
    where
        I: IntoIterator<Item = &'a Bucket>,
    {
        for other in others {
            if self.added < other.added {
                self.added = other.added;
            }

            if self.taken < other.taken {
                self.taken = other.taken;
            }

            if self.last < other.last {
                self.last = other.last;
            }
        }
    }

    /// Pure two-bucket join; argument order does not affect the result.
    pub fn merged(mut a: Bucket, b: &Bucket) -> Bucket {
        a.merge([b]);
        a
    }

    /// Size of this bucket's wire frame.
    pub fn encoded_len(&self) -> usize {
        WIRE_HEADER_LEN + self.name.len()
    }

    /// Appends this bucket's wire frame to `buf`: big-endian added, taken,
    /// last and name length, followed by the name bytes.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        if self.name.len() > u16::MAX as usize {
            return Err(CodecError::NameTooLarge);
        }

        buf.reserve(self.encoded_len());
        buf.extend_from_slice(&self.added.to_bits().to_be_bytes());
        buf.extend_from_slice(&self.taken.to_bits().to_be_bytes());
        buf.extend_from_slice(&self.last.to_be_bytes());
        buf.extend_from_slice(&(self.name.len() as u16).to_be_bytes());
        buf.extend_from_slice(self.name.as_bytes());

        Ok(())
    }

    /// Encodes this bucket as a single wire frame.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Decodes one wire frame, returning the bucket and the remaining bytes
    /// so frames can be carried back-to-back in one payload.
    pub fn decode(data: &[u8]) -> Result<(Bucket, &[u8]), CodecError> {
        if data.len() < WIRE_HEADER_LEN {
            return Err(CodecError::ShortBuffer);
        }

        let added = f64::from_bits(be_u64(&data[0..8]));
        let taken = f64::from_bits(be_u64(&data[8..16]));
        let last = be_u64(&data[16..24]) as i64;
        let name_len = u16::from_be_bytes([data[24], data[25]]) as usize;

        let rest = &data[WIRE_HEADER_LEN..];
        if rest.len() < name_len {
            return Err(CodecError::ShortBuffer);
        }
        let name = String::from_utf8_lossy(&rest[..name_len]).into_owned();

        Ok((
            Bucket {
                name,
                added,
                taken,
                last,
            },
            &rest[name_len..],
        ))
    }
}

/// Encodes all buckets as back-to-back wire frames.
pub fn encode_frames(buckets: &Buckets) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    for bucket in buckets.values() {
        bucket.encode_into(&mut buf)?;
    }
    Ok(buf)
}

/// Decodes back-to-back wire frames into a map keyed by bucket name.
pub fn decode_frames(mut data: &[u8]) -> Result<Buckets, CodecError> {
    let mut buckets = Buckets::new();
    while !data.is_empty() {
        let (bucket, rest) = Bucket::decode(data)?;
        data = rest;
        buckets.insert(bucket.name.clone(), bucket);
    }
    Ok(buckets)
}

fn be_u64(chunk: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&chunk[..8]);
    u64::from_be_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const T0: i64 = 1_700_000_000_000_000_000;

    fn rate_10_per_s() -> Rate {
        Rate::new(10, Duration::from_secs(1))
    }

    fn bucket(added: f64, taken: f64, last: i64) -> Bucket {
        Bucket {
            name: "b".to_string(),
            added,
            taken,
            last,
        }
    }

    #[test]
    fn first_use_grants_full_capacity() {
        // A fresh bucket has last == 0, so elapsed time since epoch
        // saturates the refill at capacity.
        let mut fresh = Bucket::named("b");
        assert!(fresh.take(T0, &rate_10_per_s(), 5));
        assert_eq!(fresh.taken, 5.0);
        assert_eq!(fresh.last, T0);

        let mut fresh = Bucket::named("b");
        assert!(!fresh.take(T0, &rate_10_per_s(), 6));
    }

    #[test]
    fn burst_exhaustion_at_same_instant() {
        let rate = rate_10_per_s();
        let mut b = Bucket::named("b");

        assert!(b.take(T0, &rate, 3));
        assert_eq!(b.balance(), 2.0);

        // No time has passed: 2 tokens remain, 3 requested.
        let (added, taken) = (b.added, b.taken);
        assert!(!b.take(T0, &rate, 3));
        assert_eq!(b.added, added);
        assert_eq!(b.taken, taken);
        assert_eq!(b.last, T0);
    }

    #[test]
    fn refill_is_capped_at_capacity() {
        let rate = rate_10_per_s();
        let mut b = Bucket::named("b");
        assert!(b.take(T0, &rate, 5));

        // An hour later the refill must still stop at 5 tokens.
        let later = T0 + 3_600_000_000_000;
        assert!(!b.take(later, &rate, 6));
        assert!(b.take(later, &rate, 5));
    }

    #[test]
    fn partial_refill_over_time() {
        let rate = rate_10_per_s();
        let mut b = Bucket::named("b");
        assert!(b.take(T0, &rate, 5));

        // 200ms at 10/s refills 2 tokens.
        let later = T0 + 200_000_000;
        assert!(!b.take(later, &rate, 3));
        assert!(b.take(later, &rate, 2));
    }

    #[test]
    fn zero_rate_always_denies() {
        let zero_freq = Rate::new(0, Duration::from_secs(1));
        let zero_per = Rate::new(10, Duration::ZERO);

        let mut b = Bucket::named("b");
        assert!(!b.take(T0, &zero_freq, 1));
        assert!(!b.take(T0 + i64::MAX / 2, &zero_freq, 1));
        assert!(!b.take(T0, &zero_per, 1));

        // An existing balance can still be drawn down.
        let mut b = bucket(3.0, 0.0, T0);
        assert!(b.take(T0, &zero_freq, 2));
        assert!(!b.take(T0, &zero_freq, 2));
        assert!(b.take(T0, &zero_freq, 1));
    }

    #[test]
    fn clock_regression_is_clamped() {
        let rate = rate_10_per_s();
        // last is one hour ahead of now, e.g. merged from a peer with a
        // fast clock.
        let mut b = bucket(5.0, 5.0, T0 + 3_600_000_000_000);

        // No refill is owed for the "negative" elapsed time.
        assert!(!b.take(T0, &rate, 1));
        assert_eq!(b.last, T0);
    }

    #[test]
    fn merge_is_field_wise_maximum() {
        let mut b = bucket(10.0, 5.0, 100);
        b.merge([&bucket(8.0, 9.0, 50), &bucket(2.0, 1.0, 200)]);
        assert_eq!(b, bucket(10.0, 9.0, 200));
    }

    #[test]
    fn merge_laws() {
        let a = bucket(10.0, 4.0, 100);
        let b = bucket(7.0, 9.0, 300);
        let c = bucket(12.0, 1.0, 50);

        // commutative
        assert_eq!(
            Bucket::merged(a.clone(), &b),
            Bucket::merged(b.clone(), &a)
        );

        // associative
        assert_eq!(
            Bucket::merged(Bucket::merged(a.clone(), &b), &c),
            Bucket::merged(a.clone(), &Bucket::merged(b.clone(), &c))
        );

        // idempotent
        assert_eq!(Bucket::merged(a.clone(), &a), a);
    }

    #[test]
    fn merged_matches_variadic_merge() {
        let a = bucket(10.0, 4.0, 100);
        let b = bucket(7.0, 9.0, 300);

        let mut variadic = a.clone();
        variadic.merge([&b]);
        assert_eq!(Bucket::merged(a, &b), variadic);
    }

    #[test]
    fn codec_round_trip() {
        let b = bucket(10.5, 4.25, T0);
        let data = b.encode().unwrap();
        assert_eq!(data.len(), WIRE_HEADER_LEN + b.name.len());

        let (decoded, rest) = Bucket::decode(&data).unwrap();
        assert_eq!(decoded, b);
        assert!(rest.is_empty());
    }

    #[test]
    fn codec_layout_is_big_endian() {
        let b = Bucket {
            name: "ab".to_string(),
            added: 1.0,
            taken: 2.0,
            last: 3,
        };
        let data = b.encode().unwrap();

        assert_eq!(&data[0..8], 1.0f64.to_bits().to_be_bytes());
        assert_eq!(&data[8..16], 2.0f64.to_bits().to_be_bytes());
        assert_eq!(&data[16..24], 3i64.to_be_bytes());
        assert_eq!(&data[24..26], 2u16.to_be_bytes());
        assert_eq!(&data[26..], b"ab");
    }

    #[test]
    fn codec_rejects_oversized_names() {
        let b = Bucket::named("x".repeat(u16::MAX as usize));
        assert!(b.encode().is_ok());

        let b = Bucket::named("x".repeat(u16::MAX as usize + 1));
        assert_eq!(b.encode(), Err(CodecError::NameTooLarge));
    }

    #[test]
    fn codec_rejects_short_buffers() {
        assert_eq!(
            Bucket::decode(&[0u8; WIRE_HEADER_LEN - 1]),
            Err(CodecError::ShortBuffer)
        );

        // Declared name length exceeds the remaining bytes.
        let mut data = bucket(1.0, 2.0, 3).encode().unwrap();
        data.truncate(data.len() - 1);
        assert_eq!(Bucket::decode(&data), Err(CodecError::ShortBuffer));
    }

    #[test]
    fn frames_round_trip() {
        let mut buckets = Buckets::new();
        for name in ["a", "b", "c"] {
            let mut b = bucket(1.0, 0.5, T0);
            b.name = name.to_string();
            buckets.insert(name.to_string(), b);
        }

        let data = encode_frames(&buckets).unwrap();
        assert_eq!(decode_frames(&data).unwrap(), buckets);
    }

    #[test]
    fn frames_reject_trailing_garbage() {
        let mut data = bucket(1.0, 2.0, 3).encode().unwrap();
        data.extend_from_slice(&[0u8; 5]);
        assert_eq!(decode_frames(&data), Err(CodecError::ShortBuffer));
    }
}
