//! Time-Ordered Sample Buffer

use crate::{BufferError, TimedValue};
use chrono::{DateTime, Duration, Utc};
use std::collections::vec_deque;
use std::collections::VecDeque;

/// Initial sample capacity (1 day of 5 minute telemetry)
pub const DEFAULT_CAPACITY: usize = 288;

/// Weight of the newest gap in the sampling period estimate
const PERIOD_SMOOTHING: f64 = 0.2;

/// Missed intervals after which a signal counts as stale
const STALE_INTERVALS: f64 = 3.0;

/// Lazy, restartable view over a slice of the buffer
pub type Window<'a> = vec_deque::Iter<'a, TimedValue>;

/// What `append` did with a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Sample is the new head
    Appended,
    /// Late sample (within tolerance) inserted before the head
    Inserted,
    /// Existing sample with the same timestamp was overwritten
    Replaced,
}

/// Ordered samples for one signal
#[derive(Debug, Clone)]
pub struct TimedValueBuffer {
    /// Samples in ascending timestamp order, no duplicate timestamps
    samples: VecDeque<TimedValue>,
    /// How far behind the head a late sample may land
    tolerance: Duration,
    /// Total samples accepted (for statistics)
    total_written: usize,
    /// Gap between the two newest samples when the head last advanced
    last_gap: Option<Duration>,
    /// Smoothed gap between consecutive samples, in milliseconds
    period_ms: Option<f64>,
}

impl TimedValueBuffer {
    /// Create a buffer that rejects any sample older than its head
    pub fn new() -> Self {
        Self::with_tolerance(Duration::zero())
    }

    /// Create a buffer accepting late samples up to `tolerance` behind the head
    pub fn with_tolerance(tolerance: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(DEFAULT_CAPACITY),
            tolerance: tolerance.max(Duration::zero()),
            total_written: 0,
            last_gap: None,
            period_ms: None,
        }
    }

    /// Store a sample, replacing one with an identical timestamp
    pub fn append(
        &mut self,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Result<AppendOutcome, BufferError> {
        if !value.is_finite() {
            return Err(BufferError::NonFiniteValue { timestamp, value });
        }

        let sample = TimedValue::new(timestamp, value);
        let head = self.samples.back().map(|s| s.timestamp);

        let outcome = match head {
            None => {
                self.samples.push_back(sample);
                AppendOutcome::Appended
            }
            Some(head) if timestamp > head => {
                self.samples.push_back(sample);
                self.observe_gap(timestamp - head);
                AppendOutcome::Appended
            }
            Some(head) => {
                let oldest = head.checked_sub_signed(self.tolerance);
                if oldest.map_or(false, |oldest| timestamp < oldest) {
                    return Err(BufferError::OutOfOrderSample {
                        timestamp,
                        head,
                        tolerance_ms: self.tolerance.num_milliseconds(),
                    });
                }

                let idx = self.samples.partition_point(|s| s.timestamp < timestamp);
                match self.samples.get_mut(idx) {
                    Some(existing) if existing.timestamp == timestamp => {
                        existing.value = value;
                        AppendOutcome::Replaced
                    }
                    _ => {
                        self.samples.insert(idx, sample);
                        AppendOutcome::Inserted
                    }
                }
            }
        };

        self.total_written += 1;
        Ok(outcome)
    }

    fn observe_gap(&mut self, gap: Duration) {
        let millis = gap.num_milliseconds() as f64;
        self.last_gap = Some(gap);
        self.period_ms = Some(match self.period_ms {
            Some(period) => period + PERIOD_SMOOTHING * (millis - period),
            None => millis,
        });
    }

    /// Samples with `from <= timestamp < to`, ascending
    pub fn window(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Window<'_> {
        if from >= to {
            return self.samples.range(0..0);
        }
        let start = self.samples.partition_point(|s| s.timestamp < from);
        let end = self.samples.partition_point(|s| s.timestamp < to);
        self.samples.range(start..end)
    }

    /// Last sample at or before `timestamp` (step-hold)
    pub fn sample_at(&self, timestamp: DateTime<Utc>) -> Option<&TimedValue> {
        let idx = self.samples.partition_point(|s| s.timestamp <= timestamp);
        idx.checked_sub(1).and_then(|i| self.samples.get(i))
    }

    /// Value held at `timestamp`, `None` if nothing has been seen yet
    pub fn value_at(&self, timestamp: DateTime<Utc>) -> Option<f64> {
        self.sample_at(timestamp).map(|s| s.value)
    }

    /// Whether a value is held at `from`, so a window starting there is fully covered
    pub fn covers(&self, from: DateTime<Utc>) -> bool {
        self.first().map_or(false, |first| first.timestamp <= from)
    }

    /// Drop samples older than `cutoff`
    ///
    /// The newest sample before `cutoff` is kept as the step-hold anchor so
    /// `value_at(cutoff)` is unaffected. Returns the number of samples removed.
    pub fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let older = self.samples.partition_point(|s| s.timestamp < cutoff);
        let remove = older.saturating_sub(1);
        self.samples.drain(..remove);
        remove
    }

    /// All retained samples, ascending
    pub fn iter(&self) -> Window<'_> {
        self.samples.iter()
    }

    /// Oldest retained sample
    pub fn first(&self) -> Option<&TimedValue> {
        self.samples.front()
    }

    /// Newest sample
    pub fn last(&self) -> Option<&TimedValue> {
        self.samples.back()
    }

    /// Number of retained samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Late-arrival tolerance
    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Get total samples accepted (for statistics)
    pub fn total_written(&self) -> usize {
        self.total_written
    }

    /// Gap between the two newest samples
    pub fn last_gap(&self) -> Option<Duration> {
        self.last_gap
    }

    /// Smoothed sampling period
    pub fn estimated_period(&self) -> Option<Duration> {
        self.period_ms
            .map(|millis| Duration::milliseconds(millis.round() as i64))
    }

    /// Whether the signal is still reporting regularly at `now`.
    ///
    /// The expected interval is the larger of `trend_interval` and the
    /// estimated period. A signal is stale once it has been silent for more
    /// than three intervals, or when its last gap was that long. Fewer than two
    /// samples is never timely.
    pub fn is_timely(&self, now: DateTime<Utc>, trend_interval: Duration) -> bool {
        let Some(last) = self.last() else {
            return false;
        };
        if self.samples.len() < 2 {
            return false;
        }

        let interval = self
            .estimated_period()
            .map_or(trend_interval, |period| period.max(trend_interval));
        if interval <= Duration::zero() {
            return true;
        }
        let limit_ms = interval.num_milliseconds() as f64 * STALE_INTERVALS;

        if (now - last.timestamp).num_milliseconds() as f64 > limit_ms {
            return false;
        }
        self.last_gap
            .map_or(true, |gap| gap.num_milliseconds() as f64 <= limit_ms)
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.samples.clear();
        self.last_gap = None;
        self.period_ms = None;
    }
}

impl Default for TimedValueBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn test_append_and_value_at() {
        let mut buffer = TimedValueBuffer::new();
        buffer.append(at(0), 1.0).unwrap();
        buffer.append(at(60), 2.0).unwrap();

        assert_eq!(buffer.value_at(at(-1)), None);
        assert_eq!(buffer.value_at(at(0)), Some(1.0));
        assert_eq!(buffer.value_at(at(59)), Some(1.0));
        assert_eq!(buffer.value_at(at(60)), Some(2.0));
        assert_eq!(buffer.value_at(at(3600)), Some(2.0));
    }

    #[test]
    fn test_duplicate_timestamp_last_write_wins() {
        let mut buffer = TimedValueBuffer::new();
        buffer.append(at(0), 1.0).unwrap();
        let outcome = buffer.append(at(0), 5.0).unwrap();

        assert_eq!(outcome, AppendOutcome::Replaced);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.value_at(at(0)), Some(5.0));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut buffer = TimedValueBuffer::new();
        buffer.append(at(60), 1.0).unwrap();

        let err = buffer.append(at(30), 2.0).unwrap_err();
        assert!(matches!(err, BufferError::OutOfOrderSample { .. }));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.total_written(), 1);
    }

    #[test]
    fn test_late_sample_within_tolerance() {
        let mut buffer = TimedValueBuffer::with_tolerance(Duration::seconds(60));
        buffer.append(at(0), 1.0).unwrap();
        buffer.append(at(120), 3.0).unwrap();

        assert_eq!(buffer.append(at(90), 2.0).unwrap(), AppendOutcome::Inserted);
        assert_eq!(buffer.value_at(at(100)), Some(2.0));
        assert!(buffer.append(at(30), 9.0).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut buffer = TimedValueBuffer::new();
        assert!(buffer.append(at(0), f64::NAN).is_err());
        assert!(buffer.append(at(0), f64::INFINITY).is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_window_is_half_open_and_restartable() {
        let mut buffer = TimedValueBuffer::new();
        for i in 0..10 {
            buffer.append(at(i * 10), i as f64).unwrap();
        }

        let window = buffer.window(at(20), at(50));
        let first: Vec<f64> = window.clone().map(|s| s.value).collect();
        let second: Vec<f64> = window.map(|s| s.value).collect();

        assert_eq!(first, vec![2.0, 3.0, 4.0]);
        assert_eq!(first, second);
        assert_eq!(buffer.window(at(50), at(50)).count(), 0);
        assert_eq!(buffer.window(at(500), at(600)).count(), 0);
    }

    #[test]
    fn test_evict_keeps_anchor() {
        let mut buffer = TimedValueBuffer::new();
        for i in 0..10 {
            buffer.append(at(i * 10), i as f64).unwrap();
        }

        let removed = buffer.evict_before(at(45));
        assert_eq!(removed, 4);
        assert_eq!(buffer.first().unwrap().timestamp, at(40));
        assert_eq!(buffer.value_at(at(45)), Some(4.0));
    }

    #[test]
    fn test_covers_needs_a_held_value() {
        let mut buffer = TimedValueBuffer::new();
        assert!(!buffer.covers(at(0)));
        buffer.append(at(10), 1.0).unwrap();
        assert!(!buffer.covers(at(0)));
        assert!(buffer.covers(at(10)));
        assert!(buffer.covers(at(500)));
    }

    #[test]
    fn test_period_estimate_and_timeliness() {
        let mut buffer = TimedValueBuffer::new();
        buffer.append(at(0), 1.0).unwrap();
        // a single sample is never timely
        assert!(!buffer.is_timely(at(0), Duration::seconds(60)));

        for i in 1..10 {
            buffer.append(at(i * 60), 1.0).unwrap();
        }
        assert_eq!(buffer.estimated_period(), Some(Duration::seconds(60)));
        assert_eq!(buffer.last_gap(), Some(Duration::seconds(60)));

        assert!(buffer.is_timely(at(540 + 180), Duration::seconds(60)));
        assert!(!buffer.is_timely(at(540 + 181), Duration::seconds(60)));
        // a slower configured interval widens the limit
        assert!(buffer.is_timely(at(540 + 600), Duration::minutes(5)));
    }

    #[test]
    fn test_long_gap_is_not_timely() {
        let mut buffer = TimedValueBuffer::new();
        for i in 0..5 {
            buffer.append(at(i * 60), 1.0).unwrap();
        }
        // back after an hour of silence
        buffer.append(at(240 + 3600), 1.0).unwrap();
        assert!(!buffer.is_timely(at(240 + 3600), Duration::seconds(60)));
    }

    #[test]
    fn test_huge_tolerance_does_not_overflow() {
        let mut buffer = TimedValueBuffer::with_tolerance(Duration::MAX);
        buffer.append(at(60), 1.0).unwrap();
        assert_eq!(buffer.append(at(0), 2.0).unwrap(), AppendOutcome::Inserted);
    }

    proptest! {
        #[test]
        fn prop_timestamps_stay_strictly_ascending(
            offsets in proptest::collection::vec(0i64..500, 1..200)
        ) {
            let mut buffer = TimedValueBuffer::with_tolerance(Duration::seconds(100));
            for (i, offset) in offsets.iter().enumerate() {
                let _ = buffer.append(at(*offset), i as f64);
            }

            let stamps: Vec<_> = buffer.iter().map(|s| s.timestamp).collect();
            prop_assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn prop_eviction_preserves_value_at_cutoff(
            count in 1i64..100,
            cutoff in 0i64..1200
        ) {
            let mut buffer = TimedValueBuffer::new();
            for i in 0..count {
                buffer.append(at(i * 10), i as f64).unwrap();
            }

            let before = buffer.value_at(at(cutoff));
            buffer.evict_before(at(cutoff));
            prop_assert_eq!(buffer.value_at(at(cutoff)), before);
        }
    }
}
