//! Expression Error Types

use thiserror::Error;

/// Errors raised while compiling a formula
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    /// Formula is blank
    #[error("Expression is empty")]
    Empty,

    /// Character outside the grammar
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },

    /// `[name` without the closing bracket
    #[error("Unterminated reference starting at position {0}")]
    UnterminatedReference(usize),

    /// Numeric literal that does not parse
    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    /// Duration suffix other than s, m, min, h, d
    #[error("Unknown duration unit '{0}'")]
    UnknownUnit(String),

    /// Token in the wrong place
    #[error("Unexpected {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },

    /// Formula ended mid-expression
    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    /// Reference to a signal, parameter or field the rule does not declare
    #[error("Undeclared name '{0}'")]
    UndeclaredName(String),

    /// Function outside the supported set
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    /// Wrong number of function arguments
    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },

    /// Temporal function called without a signal and a window
    #[error("{0} needs a signal reference and a window, e.g. {0}([temperature], 1h)")]
    TemporalArguments(&'static str),

    /// Temporal window beyond the buffer horizon
    #[error("{function} window of {days} days exceeds the {} day limit", crate::MAX_WINDOW_DAYS)]
    WindowTooLong { function: &'static str, days: i64 },

    /// Duration literal used as a plain value
    #[error("Duration literal at position {0} is only valid as a temporal window")]
    MisplacedDuration(usize),
}
