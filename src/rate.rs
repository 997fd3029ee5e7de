//! Rate policy parsing and token refill math.
use std::time::Duration;

use crate::error::{PicketError, Result};

/// Maximum frequency of some events, expressed as a number of events per
/// unit of time. A zero Rate allows no events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rate {
    pub freq: u64,
    pub per: Duration,
}

impl Rate {
    pub fn new(freq: u64, per: Duration) -> Self {
        Self { freq, per }
    }

    /// Parses a Rate from the `"freq:duration"` format (e.g. `50:1s`).
    ///
    /// A missing duration defaults to `1s`. Bare unit suffixes
    /// (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`) are read as one of that unit.
    pub fn parse(text: &str) -> Result<Rate> {
        let (freq, per) = match text.split_once(':') {
            Some((freq, per)) => (freq, per),
            None => (text, "1s"),
        };

        let freq = freq.parse::<u64>().map_err(|err| {
            PicketError::Validation(format!(
                "rate {:?} doesn't match the \"freq:duration\" format (i.e. 50:1s): {}",
                text, err
            ))
        })?;

        let per = match per {
            "ns" | "us" | "µs" | "ms" | "s" | "m" | "h" => format!("1{}", per),
            other => other.to_string(),
        };

        // humantime spells the microsecond unit "us"
        let per = humantime::parse_duration(&per.replace("µs", "us")).map_err(|err| {
            PicketError::Validation(format!("rate {:?} has a bad duration: {}", text, err))
        })?;

        Ok(Rate { freq, per })
    }

    /// Returns true if either field is zero valued.
    pub fn is_zero(&self) -> bool {
        self.freq == 0 || self.per.is_zero()
    }

    /// The nominal interval between two single-token refills.
    pub fn interval(&self) -> Duration {
        if self.freq == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.per.as_nanos() / self.freq as u128) as u64)
    }

    /// Unit conversion from an elapsed time in nanoseconds to the number of
    /// tokens which accumulate over it at this rate.
    pub fn tokens(&self, elapsed_ns: i64) -> f64 {
        if self.is_zero() {
            return 0.0;
        }

        let interval_ns = self.interval().as_nanos() as i64;
        if interval_ns == 0 {
            return 0.0;
        }

        elapsed_ns as f64 / interval_ns as f64
    }
}
