//! Timed Value Buffer
//!
//! Provides an append-only, time-ordered store of samples for one signal with
//! step-hold lookup, window slicing and bounded retention.

mod buffer;
mod error;
mod stats;

pub use buffer::{AppendOutcome, TimedValueBuffer, Window};
pub use error::BufferError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observed sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedValue {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl TimedValue {
    /// Create a new sample
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}
