//! Timestamp and timestamp-sequence types (`spec.md` §3).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A point in time expressed as seconds since the Unix epoch plus a nanosecond remainder.
///
/// Invariant: `nanoseconds < 1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub epoch_seconds: u64,
    /// Nanosecond remainder, always `< 1_000_000_000`.
    pub nanoseconds: u64,
}

impl Timestamp {
    /// One nanosecond shy of a second.
    const NANOS_PER_SEC: u64 = 1_000_000_000;
    /// Year 2100 as a rough upper sanity bound on plausible epoch seconds.
    const YEAR_2100_EPOCH: u64 = 4_102_444_800;

    /// Builds a timestamp, normalizing an overflowing nanosecond remainder into whole seconds.
    #[must_use]
    pub fn new(epoch_seconds: u64, nanoseconds: u64) -> Self {
        let carry = nanoseconds / Self::NANOS_PER_SEC;
        Self {
            epoch_seconds: epoch_seconds + carry,
            nanoseconds: nanoseconds % Self::NANOS_PER_SEC,
        }
    }

    /// `true` if `epoch_seconds > 0` and it precedes the year 2100, per `spec.md` §3.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.epoch_seconds > 0 && self.epoch_seconds < Self::YEAR_2100_EPOCH
    }

    /// Nanoseconds elapsed since the Unix epoch, as a signed 128-bit quantity to avoid overflow.
    #[must_use]
    pub fn as_nanos_since_epoch(&self) -> i128 {
        i128::from(self.epoch_seconds) * i128::from(Self::NANOS_PER_SEC) + i128::from(self.nanoseconds)
    }

    /// Adds a (possibly large) nanosecond offset, returning a new normalized timestamp.
    #[must_use]
    pub fn add_nanos(&self, nanos: u64) -> Self {
        Self::new(self.epoch_seconds, self.nanoseconds + nanos)
    }

    /// Converts to a `chrono` UTC datetime, for display and filename parsing.
    #[must_use]
    pub fn to_chrono(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(
            self.epoch_seconds as i64,
            self.nanoseconds as u32,
        )
        .unwrap_or_else(|| chrono::DateTime::from_timestamp(0, 0).expect("epoch 0 is valid"))
    }
}

/// A compact representation of regularly spaced timestamps: `start + i * period` for `i` in
/// `0..count`.
///
/// Invariant: `startTime + periodNanos * (count - 1)` equals the last logical sample time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingClock {
    /// Timestamp of the first sample.
    pub start_time: Timestamp,
    /// Spacing between samples, in nanoseconds.
    pub period_nanos: u64,
    /// Number of samples described by this clock.
    pub count: u32,
}

impl SamplingClock {
    /// Generates the full timestamp sequence this clock describes.
    #[must_use]
    pub fn generate_timestamps(&self) -> Vec<Timestamp> {
        (0..self.count as u64)
            .map(|i| self.start_time.add_nanos(i * self.period_nanos))
            .collect()
    }

    /// Total duration spanned by this clock, in nanoseconds.
    #[must_use]
    pub fn total_duration_nanos(&self) -> u64 {
        self.period_nanos.saturating_mul(u64::from(self.count.saturating_sub(1)))
    }

    /// Sampling frequency in Hz, or `0.0` if the period is zero.
    #[must_use]
    pub fn frequency_hz(&self) -> f64 {
        if self.period_nanos == 0 {
            0.0
        } else {
            1.0e9 / self.period_nanos as f64
        }
    }
}

/// An explicit, monotonically non-decreasing sequence of timestamps, used when sampling is
/// irregular.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TimestampList {
    /// The timestamps, in non-decreasing order.
    pub timestamps: Vec<Timestamp>,
}

impl TimestampList {
    /// Wraps a vector of timestamps without checking ordering; callers that read from HDF5 or
    /// off the wire are expected to already have monotonic data.
    #[must_use]
    pub fn new(timestamps: Vec<Timestamp>) -> Self {
        Self { timestamps }
    }

    /// Number of timestamps in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// `true` if the list has no timestamps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Tagged variant over the two ways of describing a signal's timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataTimestamps {
    /// Regular sampling, represented compactly.
    Clock(SamplingClock),
    /// Irregular sampling, represented explicitly.
    List(TimestampList),
}

impl DataTimestamps {
    /// Number of timestamps described, without materializing them for the `Clock` case.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Clock(clock) => clock.count as usize,
            Self::List(list) => list.len(),
        }
    }

    /// `true` if this describes zero timestamps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materializes the full timestamp sequence, generating it from the clock if needed.
    #[must_use]
    pub fn extract_all(&self) -> Vec<Timestamp> {
        match self {
            Self::Clock(clock) => clock.generate_timestamps(),
            Self::List(list) => list.timestamps.clone(),
        }
    }

    /// Wraps this value in an `Arc` so all signals read from one file can share it without
    /// copying the timestamp vector.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Minimum adjacent-sample period accepted before a signal is deemed irregular by range, per
/// `spec.md` §4.B (100 ns).
pub const MIN_PLAUSIBLE_PERIOD_NANOS: u64 = 100;
/// Maximum adjacent-sample period accepted before a signal is deemed irregular by range, per
/// `spec.md` §4.B (10 s).
pub const MAX_PLAUSIBLE_PERIOD_NANOS: u64 = 10_000_000_000;
/// Default period substituted when the observed period falls outside the plausible range.
pub const DEFAULT_PERIOD_NANOS: u64 = 1_000_000_000;
/// Regularity tolerance: adjacent periods within this many nanoseconds of each other count as
/// regular.
pub const REGULARITY_TOLERANCE_NANOS: i128 = 1_000;

/// Determines whether `timestamps` are regularly spaced and, if so, returns the `SamplingClock`
/// that describes them; otherwise returns the equivalent `TimestampList`.
///
/// Per `spec.md` §3/§4.B: the period is taken from the first two samples, and regularity holds
/// iff every adjacent difference in the first `min(10, N-1)` samples matches that period within
/// ±1µs.
#[must_use]
pub fn infer_data_timestamps(timestamps: Vec<Timestamp>) -> DataTimestamps {
    if timestamps.len() < 2 {
        return DataTimestamps::List(TimestampList::new(timestamps));
    }

    let period = timestamps[1].as_nanos_since_epoch() - timestamps[0].as_nanos_since_epoch();
    let sample_count = (timestamps.len() - 1).min(9);
    let mut regular = period > 0;
    if regular {
        for i in 0..=sample_count {
            if i + 1 >= timestamps.len() {
                break;
            }
            let diff = timestamps[i + 1].as_nanos_since_epoch() - timestamps[i].as_nanos_since_epoch();
            if (diff - period).abs() > REGULARITY_TOLERANCE_NANOS {
                regular = false;
                break;
            }
        }
    }

    if !regular {
        return DataTimestamps::List(TimestampList::new(timestamps));
    }

    let period_nanos = if period < 0 {
        DEFAULT_PERIOD_NANOS
    } else {
        period as u64
    };
    let period_nanos = if (MIN_PLAUSIBLE_PERIOD_NANOS..=MAX_PLAUSIBLE_PERIOD_NANOS).contains(&period_nanos) {
        period_nanos
    } else {
        DEFAULT_PERIOD_NANOS
    };

    DataTimestamps::Clock(SamplingClock {
        start_time: timestamps[0],
        period_nanos,
        count: timestamps.len() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_timestamps_become_a_sampling_clock() {
        let ts = vec![
            Timestamp::new(1_700_000_000, 0),
            Timestamp::new(1_700_000_001, 0),
            Timestamp::new(1_700_000_002, 0),
        ];
        match infer_data_timestamps(ts) {
            DataTimestamps::Clock(clock) => {
                assert_eq!(clock.period_nanos, 1_000_000_000);
                assert_eq!(clock.count, 3);
            }
            DataTimestamps::List(_) => panic!("expected a sampling clock"),
        }
    }

    #[test]
    fn irregular_gap_becomes_a_timestamp_list() {
        let ts = vec![
            Timestamp::new(1_700_000_000, 0),
            Timestamp::new(1_700_000_001, 0),
            Timestamp::new(1_700_000_003, 0),
        ];
        match infer_data_timestamps(ts) {
            DataTimestamps::List(list) => assert_eq!(list.len(), 3),
            DataTimestamps::Clock(_) => panic!("expected a timestamp list"),
        }
    }

    #[test]
    fn sampling_clock_duration_matches_invariant() {
        let clock = SamplingClock {
            start_time: Timestamp::new(1_700_000_000, 0),
            period_nanos: 1_000_000_000,
            count: 5,
        };
        let generated = clock.generate_timestamps();
        let first = generated.first().expect("non-empty");
        let last = generated.last().expect("non-empty");
        assert_eq!(
            last.as_nanos_since_epoch() - first.as_nanos_since_epoch(),
            clock.total_duration_nanos() as i128
        );
    }
}
