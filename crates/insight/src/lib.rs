//! Insight Builder
//!
//! Turns template state changes into a time-ordered list of occurrences with
//! rendered, human-readable text.

mod history;
mod occurrence;
mod render;

pub use history::OccurrenceLog;
pub use occurrence::{Occurrence, OccurrenceBuilder, TriggerValues, DEFAULT_CLEAR_DESCRIPTION};
pub use render::render;
