//! Template Kinds and Configuration
//!
//! Rules carry their template settings as a flat map of named numbers (the
//! rule's UI fields). Each kind reads the fields it understands into a typed
//! config and validates it.

use crate::TemplateError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Names of the numeric fields templates read
pub mod fields {
    pub const OVER_HOW_MANY_HOURS: &str = "over_how_many_hours";
    pub const PERCENTAGE_OF_TIME: &str = "percentage_of_time";
    pub const CLEAR_PERCENTAGE_OF_TIME: &str = "clear_percentage_of_time";
    /// Older name for [`CLEAR_PERCENTAGE_OF_TIME`]
    pub const PERCENTAGE_OF_TIME_OFF: &str = "percentage_of_time_off";
    pub const MAX_TRIGGER: &str = "max_trigger";
    pub const MIN_TRIGGER: &str = "min_trigger";
    pub const MAX_RESET: &str = "max_reset";
    pub const MIN_RESET: &str = "min_reset";
    pub const TOLERANCE: &str = "tolerance";
}

/// Supported fault templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    AnyFault,
    AnyHysteresis,
    Unchanging,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateKind::AnyFault => write!(f, "any_fault"),
            TemplateKind::AnyHysteresis => write!(f, "any_hysteresis"),
            TemplateKind::Unchanging => write!(f, "unchanging"),
        }
    }
}

fn window_from(values: &BTreeMap<String, f64>, default_hours: f64) -> Result<Duration, TemplateError> {
    let hours = values
        .get(fields::OVER_HOW_MANY_HOURS)
        .copied()
        .unwrap_or(default_hours);
    let max_hours = (expression::MAX_WINDOW_DAYS * 24) as f64;
    if !hours.is_finite() || hours <= 0.0 || hours > max_hours {
        return Err(TemplateError::InvalidWindow(hours));
    }
    Ok(Duration::milliseconds((hours * 3_600_000.0).round() as i64))
}

fn check_percentage(field: &'static str, value: f64) -> Result<(), TemplateError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(TemplateError::PercentageOutOfRange { field, value });
    }
    Ok(())
}

/// Any fault configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AnyFaultConfig {
    /// Reporting window for the percentage metric
    pub window: Duration,
    /// Reported alongside the metric; does not gate the state
    pub percentage_of_time: f64,
}

impl Default for AnyFaultConfig {
    fn default() -> Self {
        Self {
            window: Duration::hours(12),
            percentage_of_time: 0.0,
        }
    }
}

impl AnyFaultConfig {
    pub fn from_fields(values: &BTreeMap<String, f64>) -> Result<Self, TemplateError> {
        let defaults = Self::default();
        let config = Self {
            window: window_from(values, defaults.window.num_hours() as f64)?,
            percentage_of_time: values
                .get(fields::PERCENTAGE_OF_TIME)
                .copied()
                .unwrap_or(defaults.percentage_of_time),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        check_percentage(fields::PERCENTAGE_OF_TIME, self.percentage_of_time)
    }
}

/// Hysteresis configuration
#[derive(Debug, Clone, PartialEq)]
pub struct HysteresisConfig {
    /// Rolling window length
    pub window: Duration,
    /// Violation share of the window that raises the fault (default: 0.25)
    pub percentage_of_time: f64,
    /// Violation share below which the fault clears (default: `percentage_of_time`)
    pub clear_percentage_of_time: f64,
    /// Violation above this value
    pub max_trigger: Option<f64>,
    /// Violation below this value
    pub min_trigger: Option<f64>,
    /// Once violating, stays violating above this value
    pub max_reset: Option<f64>,
    /// Once violating, stays violating below this value
    pub min_reset: Option<f64>,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            window: Duration::hours(12),
            percentage_of_time: 0.25,
            clear_percentage_of_time: 0.25,
            max_trigger: None,
            min_trigger: None,
            max_reset: None,
            min_reset: None,
        }
    }
}

impl HysteresisConfig {
    pub fn from_fields(values: &BTreeMap<String, f64>) -> Result<Self, TemplateError> {
        let defaults = Self::default();
        let percentage_of_time = values
            .get(fields::PERCENTAGE_OF_TIME)
            .copied()
            .unwrap_or(defaults.percentage_of_time);
        let clear_percentage_of_time = values
            .get(fields::CLEAR_PERCENTAGE_OF_TIME)
            .or_else(|| values.get(fields::PERCENTAGE_OF_TIME_OFF))
            .copied()
            .unwrap_or(percentage_of_time);

        let config = Self {
            window: window_from(values, defaults.window.num_hours() as f64)?,
            percentage_of_time,
            clear_percentage_of_time,
            max_trigger: values.get(fields::MAX_TRIGGER).copied(),
            min_trigger: values.get(fields::MIN_TRIGGER).copied(),
            max_reset: values.get(fields::MAX_RESET).copied(),
            min_reset: values.get(fields::MIN_RESET).copied(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        check_percentage(fields::PERCENTAGE_OF_TIME, self.percentage_of_time)?;
        check_percentage(fields::CLEAR_PERCENTAGE_OF_TIME, self.clear_percentage_of_time)?;
        if self.clear_percentage_of_time > self.percentage_of_time {
            return Err(TemplateError::ClearAboveFault {
                clear: self.clear_percentage_of_time,
                fault: self.percentage_of_time,
            });
        }

        if self.max_trigger.is_none() && self.min_trigger.is_none() {
            return Err(TemplateError::MissingTrigger);
        }
        if let (Some(max), Some(min)) = (self.max_trigger, self.min_trigger) {
            if max <= min {
                return Err(TemplateError::InvertedBand { max, min });
            }
        }

        if let Some(reset) = self.max_reset {
            if self.max_trigger.map_or(true, |trigger| reset > trigger) {
                return Err(TemplateError::ResetOutsideTrigger {
                    reset: fields::MAX_RESET,
                    reset_value: reset,
                    trigger: fields::MAX_TRIGGER,
                });
            }
        }
        if let Some(reset) = self.min_reset {
            if self.min_trigger.map_or(true, |trigger| reset < trigger) {
                return Err(TemplateError::ResetOutsideTrigger {
                    reset: fields::MIN_RESET,
                    reset_value: reset,
                    trigger: fields::MIN_TRIGGER,
                });
            }
        }
        Ok(())
    }

    /// Whether `value` violates the band, given the previous violation
    pub fn violates(&self, value: f64, was_violating: bool) -> bool {
        let (upper, lower) = if was_violating {
            (
                self.max_reset.or(self.max_trigger),
                self.min_reset.or(self.min_trigger),
            )
        } else {
            (self.max_trigger, self.min_trigger)
        };
        upper.map_or(false, |limit| value > limit) || lower.map_or(false, |limit| value < limit)
    }
}

/// Unchanging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct UnchangingConfig {
    /// Unchanged time that raises the fault
    pub window: Duration,
    /// Largest movement still counted as unchanged
    pub tolerance: f64,
}

impl Default for UnchangingConfig {
    fn default() -> Self {
        Self {
            window: Duration::hours(12),
            tolerance: 0.0,
        }
    }
}

impl UnchangingConfig {
    pub fn from_fields(values: &BTreeMap<String, f64>) -> Result<Self, TemplateError> {
        let defaults = Self::default();
        let config = Self {
            window: window_from(values, defaults.window.num_hours() as f64)?,
            tolerance: values
                .get(fields::TOLERANCE)
                .copied()
                .unwrap_or(defaults.tolerance),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(TemplateError::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(TemplateKind::AnyHysteresis.to_string(), "any_hysteresis");
        assert_eq!(TemplateKind::Unchanging.to_string(), "unchanging");
    }

    #[test]
    fn test_window_validation() {
        assert!(matches!(
            AnyFaultConfig::from_fields(&map(&[(fields::OVER_HOW_MANY_HOURS, 0.0)])),
            Err(TemplateError::InvalidWindow(_))
        ));
        let config = AnyFaultConfig::from_fields(&map(&[(fields::OVER_HOW_MANY_HOURS, 1.5)])).unwrap();
        assert_eq!(config.window, Duration::minutes(90));

        assert!(matches!(
            AnyFaultConfig::from_fields(&map(&[(fields::OVER_HOW_MANY_HOURS, 1e10)])),
            Err(TemplateError::InvalidWindow(_))
        ));
        let year = AnyFaultConfig::from_fields(&map(&[(fields::OVER_HOW_MANY_HOURS, 8760.0)])).unwrap();
        assert_eq!(year.window, Duration::days(365));
    }

    #[test]
    fn test_hysteresis_defaults_clear_to_fault_percentage() {
        let config = HysteresisConfig::from_fields(&map(&[
            (fields::MAX_TRIGGER, 30.0),
            (fields::PERCENTAGE_OF_TIME, 0.4),
        ]))
        .unwrap();
        assert_eq!(config.clear_percentage_of_time, 0.4);

        let legacy = HysteresisConfig::from_fields(&map(&[
            (fields::MAX_TRIGGER, 30.0),
            (fields::PERCENTAGE_OF_TIME, 0.4),
            (fields::PERCENTAGE_OF_TIME_OFF, 0.1),
        ]))
        .unwrap();
        assert_eq!(legacy.clear_percentage_of_time, 0.1);
    }

    #[test]
    fn test_hysteresis_validation() {
        assert_eq!(
            HysteresisConfig::from_fields(&map(&[])).unwrap_err(),
            TemplateError::MissingTrigger
        );
        assert!(matches!(
            HysteresisConfig::from_fields(&map(&[
                (fields::MAX_TRIGGER, 30.0),
                (fields::PERCENTAGE_OF_TIME, 0.2),
                (fields::CLEAR_PERCENTAGE_OF_TIME, 0.3),
            ])),
            Err(TemplateError::ClearAboveFault { .. })
        ));
        assert!(matches!(
            HysteresisConfig::from_fields(&map(&[
                (fields::MAX_TRIGGER, 30.0),
                (fields::MAX_RESET, 31.0),
            ])),
            Err(TemplateError::ResetOutsideTrigger { reset: "max_reset", .. })
        ));
        assert!(matches!(
            HysteresisConfig::from_fields(&map(&[(fields::MIN_RESET, 5.0), (fields::MAX_TRIGGER, 30.0)])),
            Err(TemplateError::ResetOutsideTrigger { reset: "min_reset", .. })
        ));
        assert!(matches!(
            HysteresisConfig::from_fields(&map(&[(fields::PERCENTAGE_OF_TIME, 1.5), (fields::MAX_TRIGGER, 1.0)])),
            Err(TemplateError::PercentageOutOfRange { .. })
        ));
    }

    #[test]
    fn test_violation_with_reset_deadband() {
        let config = HysteresisConfig {
            max_trigger: Some(30.0),
            max_reset: Some(25.0),
            ..Default::default()
        };
        assert!(!config.violates(28.0, false));
        assert!(config.violates(31.0, false));
        assert!(config.violates(28.0, true));
        assert!(!config.violates(24.0, true));
    }

    #[test]
    fn test_unchanging_tolerance() {
        assert!(matches!(
            UnchangingConfig::from_fields(&map(&[(fields::TOLERANCE, -1.0)])),
            Err(TemplateError::InvalidTolerance(_))
        ));
    }
}
