//! Parameter Expression Language
//!
//! Formulas such as `[supply_temp] - [return_temp] > 5` or
//! `OPTION([zone_temp], [return_temp])` are compiled once against a [`Scope`]
//! that resolves every name to an integer slot. Evaluation then reads step-hold
//! values from the bound buffers at a given instant and never looks names up.
//!
//! An undefined operand (a signal with no sample yet, a division by zero) makes
//! the whole expression undefined. Only `OPTION` absorbs undefined operands.
//!
//! Temporal functions (`AVERAGE`, `MIN`, `MAX`, `DELTA`, `SUM`, `COUNT`, `STND`,
//! `SLOPE`, `ANY`, `ALL`) take a signal and a window of at most
//! [`MAX_WINDOW_DAYS`] and are undefined until the buffer covers the whole window.
//! `^` raises to a power, binds tighter than `*` and groups to the right.

mod ast;
mod error;
mod eval;
mod lexer;
mod parser;

pub use ast::{Binding, Scope, Value};
pub use error::ExpressionError;
pub use eval::SignalSource;
pub use parser::{compile, split_assignment, CompiledExpression};

/// Longest trailing window a temporal function or template may use
pub const MAX_WINDOW_DAYS: i64 = 365;
