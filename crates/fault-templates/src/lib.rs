//! Fault Templates
//!
//! Each template turns the tick-by-tick output of a rule's `result` parameter
//! into a classification of time:
//! - `any_fault`: faulted exactly while the result is true
//! - `any_hysteresis`: percentage-of-time gate over a trigger band with resets
//! - `unchanging`: faulted when the value has not moved for a whole window
//!
//! The interval between two ticks belongs to the earlier tick's input.

mod config;
mod error;
mod state;
mod template;
mod window;

pub use config::{fields, AnyFaultConfig, HysteresisConfig, TemplateKind, UnchangingConfig};
pub use error::TemplateError;
pub use state::{FaultState, TickReport, Transition};
pub use template::FaultTemplate;
pub use window::RollingWindow;
