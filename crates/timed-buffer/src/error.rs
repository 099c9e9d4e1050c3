//! Buffer Error Types

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised when appending to a buffer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BufferError {
    /// Sample is older than the buffer head minus the tolerance
    #[error("Out of order sample at {timestamp}: buffer head is {head} (tolerance {tolerance_ms}ms)")]
    OutOfOrderSample {
        timestamp: DateTime<Utc>,
        head: DateTime<Utc>,
        tolerance_ms: i64,
    },

    /// NaN or infinite values are never stored
    #[error("Non-finite value {value} at {timestamp}")]
    NonFiniteValue {
        timestamp: DateTime<Utc>,
        value: f64,
    },
}
