//! Classification States

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of the time at a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultState {
    /// Not enough history to decide
    Unknown,
    Clear,
    Faulted,
}

impl FaultState {
    pub fn is_faulted(&self) -> bool {
        matches!(self, FaultState::Faulted)
    }
}

impl fmt::Display for FaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultState::Unknown => write!(f, "unknown"),
            FaultState::Clear => write!(f, "clear"),
            FaultState::Faulted => write!(f, "faulted"),
        }
    }
}

/// A change of state at a tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: FaultState,
    pub to: FaultState,
    pub at: DateTime<Utc>,
}

/// Outcome of one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// State after the tick
    pub state: FaultState,
    /// Set when `state` differs from the previous tick
    pub transition: Option<Transition>,
    /// Faulted share of the rolling window, `0.0..=1.0`
    pub percentage_faulted: f64,
    /// Faulted seconds inside the rolling window
    pub faulted_seconds: f64,
}
