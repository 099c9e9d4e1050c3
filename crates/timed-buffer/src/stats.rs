//! Step-Hold Window Statistics
//!
//! All statistics run over the closed interval `[from, to]`. The value held at
//! `from` (the last sample at or before it) counts as the first point, and a
//! window the buffer does not fully cover yields `None`.

use crate::{TimedValue, TimedValueBuffer};
use chrono::{DateTime, Utc};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

impl TimedValueBuffer {
    /// Points describing the step-hold curve over `[from, to]`
    fn held_points(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Option<impl Iterator<Item = TimedValue> + '_> {
        let anchor = self.sample_at(from)?;
        let anchor = TimedValue::new(from, anchor.value);
        let inner = self
            .iter()
            .filter(move |s| s.timestamp > from && s.timestamp <= to)
            .copied();
        Some(std::iter::once(anchor).chain(inner))
    }

    /// Samples received inside `(from, to]`, once the window is covered
    fn received(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Option<impl Iterator<Item = &TimedValue> + '_> {
        self.covers(from)
            .then(|| self.iter().filter(move |s| s.timestamp > from && s.timestamp <= to))
    }

    /// Time-weighted average of the held value
    pub fn average(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<f64> {
        if to <= from {
            return self.value_at(to);
        }

        let mut weighted = 0.0;
        let mut covered_ms = 0i64;
        let mut previous: Option<TimedValue> = None;

        for point in self.held_points(from, to)? {
            if let Some(prev) = previous {
                let span = (point.timestamp - prev.timestamp).num_milliseconds();
                weighted += prev.value * span as f64;
                covered_ms += span;
            }
            previous = Some(point);
        }

        let last = previous?;
        let tail = (to - last.timestamp).num_milliseconds();
        weighted += last.value * tail as f64;
        covered_ms += tail;

        if covered_ms == 0 {
            Some(last.value)
        } else {
            Some(weighted / covered_ms as f64)
        }
    }

    /// Smallest held value
    pub fn min(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<f64> {
        self.held_points(from, to)?.map(|p| p.value).reduce(f64::min)
    }

    /// Largest held value
    pub fn max(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<f64> {
        self.held_points(from, to)?.map(|p| p.value).reduce(f64::max)
    }

    /// Change between the first and last held value
    pub fn delta(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<f64> {
        let mut points = self.held_points(from, to)?;
        let first = points.next()?;
        let last = points.last().unwrap_or(first);
        Some(last.value - first.value)
    }

    /// Sum of the samples received inside the window
    pub fn sum(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<f64> {
        Some(self.received(from, to)?.map(|s| s.value).sum())
    }

    /// Number of samples received inside the window
    pub fn count(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<usize> {
        Some(self.received(from, to)?.count())
    }

    /// Population standard deviation of the held values
    pub fn standard_deviation(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<f64> {
        let values: Vec<f64> = self.held_points(from, to)?.map(|p| p.value).collect();
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(variance.sqrt())
    }

    /// Least-squares slope of the held curve, in units per day
    pub fn slope(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<f64> {
        let mut points: Vec<(f64, f64)> = self
            .held_points(from, to)?
            .map(|p| ((p.timestamp - from).num_milliseconds() as f64 / MILLIS_PER_DAY, p.value))
            .collect();
        if let Some(&(x, y)) = points.last() {
            let end = (to - from).num_milliseconds() as f64 / MILLIS_PER_DAY;
            if end > x {
                points.push((end, y));
            }
        }

        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
        let (mut covariance, mut spread) = (0.0, 0.0);
        for (x, y) in &points {
            covariance += (x - mean_x) * (y - mean_y);
            spread += (x - mean_x).powi(2);
        }

        if spread == 0.0 {
            Some(0.0)
        } else {
            Some(covariance / spread)
        }
    }

    /// Whether any held value is non-zero
    pub fn any(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<bool> {
        let mut points = self.held_points(from, to)?;
        Some(points.any(|p| p.value != 0.0))
    }

    /// Whether every held value is non-zero
    pub fn all(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<bool> {
        let mut points = self.held_points(from, to)?;
        Some(points.all(|p| p.value != 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn sample_buffer() -> TimedValueBuffer {
        let mut buffer = TimedValueBuffer::new();
        buffer.append(at(0), 10.0).unwrap();
        buffer.append(at(60), 20.0).unwrap();
        buffer.append(at(120), 5.0).unwrap();
        buffer
    }

    #[test]
    fn test_average_is_time_weighted() {
        let buffer = sample_buffer();
        // 10 for 60s, 20 for 60s
        let avg = buffer.average(at(0), at(120)).unwrap();
        assert!((avg - 15.0).abs() < 1e-9);

        // 10 for 30s, 20 for 60s, 5 for 30s
        let avg = buffer.average(at(30), at(150)).unwrap();
        assert!((avg - 13.75).abs() < 1e-9);
    }

    #[test]
    fn test_min_max_include_anchor() {
        let buffer = sample_buffer();
        assert_eq!(buffer.min(at(30), at(90)), Some(10.0));
        assert_eq!(buffer.max(at(30), at(90)), Some(20.0));
        assert_eq!(buffer.min(at(30), at(120)), Some(5.0));
    }

    #[test]
    fn test_delta() {
        let buffer = sample_buffer();
        assert_eq!(buffer.delta(at(0), at(60)), Some(10.0));
        assert_eq!(buffer.delta(at(0), at(120)), Some(-5.0));
        assert_eq!(buffer.delta(at(10), at(20)), Some(0.0));
    }

    #[test]
    fn test_no_history_is_none() {
        let buffer = sample_buffer();
        assert_eq!(buffer.average(at(-100), at(-50)), None);
        assert_eq!(buffer.min(at(-100), at(-50)), None);
        assert_eq!(buffer.delta(at(-100), at(-50)), None);
        assert_eq!(buffer.count(at(-100), at(-50)), None);
    }

    #[test]
    fn test_partial_coverage_is_none() {
        let buffer = sample_buffer();
        // history starts at 0, the window starts 30s earlier
        assert_eq!(buffer.average(at(-30), at(120)), None);
        assert_eq!(buffer.max(at(-30), at(120)), None);
        assert_eq!(buffer.sum(at(-30), at(120)), None);
        assert_eq!(buffer.standard_deviation(at(-30), at(120)), None);
        assert_eq!(buffer.any(at(-30), at(120)), None);
        assert!(buffer.average(at(0), at(120)).is_some());
    }

    #[test]
    fn test_sum_and_count_received_samples() {
        let buffer = sample_buffer();
        assert_eq!(buffer.count(at(0), at(120)), Some(2));
        assert_eq!(buffer.sum(at(0), at(120)), Some(25.0));
        assert_eq!(buffer.count(at(10), at(50)), Some(0));
        assert_eq!(buffer.sum(at(10), at(50)), Some(0.0));
    }

    #[test]
    fn test_standard_deviation() {
        let buffer = sample_buffer();
        // held points 10, 20
        assert_eq!(buffer.standard_deviation(at(0), at(60)), Some(5.0));
        assert_eq!(buffer.standard_deviation(at(10), at(20)), Some(0.0));
    }

    #[test]
    fn test_slope_per_day() {
        let mut buffer = TimedValueBuffer::new();
        for i in 0..3 {
            buffer.append(at(i * 60), i as f64).unwrap();
        }
        let slope = buffer.slope(at(0), at(120)).unwrap();
        assert!((slope - 1440.0).abs() < 1e-6);
        assert_eq!(sample_buffer().slope(at(10), at(20)), Some(0.0));
    }

    #[test]
    fn test_any_all() {
        let mut buffer = TimedValueBuffer::new();
        buffer.append(at(0), 0.0).unwrap();
        buffer.append(at(60), 1.0).unwrap();
        assert_eq!(buffer.any(at(0), at(30)), Some(false));
        assert_eq!(buffer.any(at(0), at(90)), Some(true));
        assert_eq!(buffer.all(at(0), at(90)), Some(false));
        assert_eq!(buffer.all(at(60), at(90)), Some(true));
    }
}
