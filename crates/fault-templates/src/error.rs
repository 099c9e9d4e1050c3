//! Template Error Types

use thiserror::Error;

/// Invalid template configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// Window length must be positive and at most a year
    #[error("Window must be positive and at most 365 days, got {0} hours")]
    InvalidWindow(f64),

    /// Percentage outside `[0, 1]`
    #[error("{field} must be between 0 and 1, got {value}")]
    PercentageOutOfRange { field: &'static str, value: f64 },

    /// Clear percentage configured above the fault percentage
    #[error("clear_percentage_of_time ({clear}) cannot exceed percentage_of_time ({fault})")]
    ClearAboveFault { clear: f64, fault: f64 },

    /// Hysteresis without any trigger
    #[error("Hysteresis needs max_trigger or min_trigger")]
    MissingTrigger,

    /// Reset outside its trigger, or a reset without a trigger
    #[error("{reset} ({reset_value}) must sit inside {trigger}")]
    ResetOutsideTrigger {
        reset: &'static str,
        reset_value: f64,
        trigger: &'static str,
    },

    /// max_trigger not above min_trigger
    #[error("max_trigger ({max}) must be greater than min_trigger ({min})")]
    InvertedBand { max: f64, min: f64 },

    /// Negative or non-finite tolerance
    #[error("Tolerance must be a non-negative number, got {0}")]
    InvalidTolerance(f64),
}
