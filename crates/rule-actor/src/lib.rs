//! Rule Actor
//!
//! One actor owns everything needed to evaluate one rule against one piece of
//! equipment: signal buffers, compiled parameters, template state and the
//! occurrence history. Samples go in, occurrences come out.
//!
//! [`ActorPool`] runs many actors side by side, one tokio task each.

mod actor;
mod definition;
mod pool;

pub use actor::{RuleActor, TickOutcome, DELTA_TIME_S, IS_FAULTY, RESULT, TIME};
pub use definition::{RuleDefinition, RuleParameter};
pub use pool::{ActorHandle, ActorPool, ActorReport, PoolConfig};

use chrono::{DateTime, Utc};
use expression::ExpressionError;
use fault_templates::TemplateError;
use thiserror::Error;

/// Errors raised by a rule actor
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActorError {
    /// A parameter formula failed to compile
    #[error("Invalid expression for parameter '{parameter}': {source}")]
    InvalidExpression {
        parameter: String,
        #[source]
        source: ExpressionError,
    },

    /// Template fields failed validation
    #[error("Invalid template: {0}")]
    InvalidTemplate(#[from] TemplateError),

    /// No parameter named `result`
    #[error("Rule has no 'result' parameter")]
    MissingResult,

    /// Two signals, parameters or fields share a name
    #[error("Name '{0}' is declared more than once")]
    DuplicateName(String),

    /// Trend interval that is not a positive number of seconds
    #[error("Invalid trend interval for '{signal}': {seconds} seconds")]
    InvalidTrendInterval { signal: String, seconds: f64 },

    /// Sample for a signal the rule does not declare
    #[error("Unknown signal '{0}'")]
    UnknownSignal(String),

    /// Sample older than the buffer head minus tolerance
    #[error("Out-of-order sample for '{signal}' at {timestamp} (head {head})")]
    OutOfOrderSample {
        signal: String,
        timestamp: DateTime<Utc>,
        head: DateTime<Utc>,
    },

    /// NaN or infinite sample value
    #[error("Non-finite value for '{signal}' at {timestamp}")]
    NonFiniteValue {
        signal: String,
        timestamp: DateTime<Utc>,
    },
}

/// Errors raised by the actor pool
#[derive(Debug, Error)]
pub enum PoolError {
    /// The actor task stopped accepting commands
    #[error("Actor for rule '{0}' is no longer running")]
    Closed(String),

    /// The actor task panicked or was cancelled
    #[error("Actor task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
