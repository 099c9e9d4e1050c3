//! Rolling Faulted-Time Accumulator

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Span {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    faulted: bool,
}

impl Span {
    fn millis(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }
}

/// Defined time inside a trailing window, split into faulted and clear.
///
/// Spans are recorded as `[start, end)` and never overlap. Gaps (undefined
/// input) are simply absent.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    length: Duration,
    spans: VecDeque<Span>,
    faulted_ms: i64,
}

impl RollingWindow {
    /// Create an accumulator covering `length`
    pub fn new(length: Duration) -> Self {
        Self {
            length,
            spans: VecDeque::new(),
            faulted_ms: 0,
        }
    }

    /// Window length
    pub fn length(&self) -> Duration {
        self.length
    }

    /// Add `[start, end)` and drop everything before `end - length`
    pub fn record(&mut self, start: DateTime<Utc>, end: DateTime<Utc>, faulted: bool) {
        if end <= start {
            return;
        }
        let span = Span { start, end, faulted };
        let millis = span.millis();

        match self.spans.back_mut() {
            Some(last) if last.end == start && last.faulted == faulted => last.end = end,
            _ => self.spans.push_back(span),
        }
        if faulted {
            self.faulted_ms += millis;
        }

        self.advance(end);
    }

    /// Drop time that fell out of the window ending at `now`
    pub fn advance(&mut self, now: DateTime<Utc>) {
        let Some(cutoff) = now.checked_sub_signed(self.length) else {
            return;
        };
        while let Some(front) = self.spans.front_mut() {
            if front.end <= cutoff {
                if front.faulted {
                    self.faulted_ms -= front.millis();
                }
                self.spans.pop_front();
            } else {
                if front.start < cutoff {
                    if front.faulted {
                        self.faulted_ms -= (cutoff - front.start).num_milliseconds();
                    }
                    front.start = cutoff;
                }
                break;
            }
        }
    }

    /// Faulted milliseconds inside the window
    pub fn faulted_ms(&self) -> i64 {
        self.faulted_ms
    }

    /// Faulted share of the whole window length
    pub fn percentage_faulted(&self) -> f64 {
        let length = self.length.num_milliseconds();
        if length <= 0 {
            return 0.0;
        }
        self.faulted_ms as f64 / length as f64
    }

    /// `faulted / length >= ratio`, compared without dividing
    pub fn reaches(&self, ratio: f64) -> bool {
        self.faulted_ms as f64 >= ratio * self.length.num_milliseconds() as f64
    }

    pub fn faulted_seconds(&self) -> f64 {
        self.faulted_ms as f64 / 1000.0
    }

    pub fn clear(&mut self) {
        self.spans.clear();
        self.faulted_ms = 0;
    }
}
