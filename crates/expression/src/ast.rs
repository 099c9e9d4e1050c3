//! Operator Tree and Name Resolution

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Result of evaluating an expression at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Bool(bool),
}

impl Value {
    /// Numeric view (`true` is 1.0)
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(true) => 1.0,
            Value::Bool(false) => 0.0,
        }
    }

    /// Truthiness (non-zero numbers are true)
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Bool(b) => *b,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{:.2}", n),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// What a name in a formula refers to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binding {
    /// Buffer-backed signal, read with step-hold at the evaluation instant
    Signal(usize),
    /// Scalar supplied by the caller at evaluation (earlier parameters, TIME, ...)
    Variable(usize),
    /// Fixed value folded in at compile time (rule UI fields)
    Constant(f64),
}

/// Names visible to a formula
#[derive(Debug, Clone, Default)]
pub struct Scope {
    names: HashMap<String, Binding>,
}

impl Scope {
    /// Create an empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a buffer slot
    pub fn declare_signal(&mut self, name: impl Into<String>, slot: usize) -> &mut Self {
        self.names.insert(name.into(), Binding::Signal(slot));
        self
    }

    /// Bind `name` to a caller-supplied variable slot
    pub fn declare_variable(&mut self, name: impl Into<String>, slot: usize) -> &mut Self {
        self.names.insert(name.into(), Binding::Variable(slot));
        self
    }

    /// Bind `name` to a constant
    pub fn declare_constant(&mut self, name: impl Into<String>, value: f64) -> &mut Self {
        self.names.insert(name.into(), Binding::Constant(value));
        self
    }

    /// Look a name up
    pub fn resolve(&self, name: &str) -> Option<Binding> {
        self.names.get(name).copied()
    }

    /// Whether `name` is already bound
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Function {
    Option,
    If,
    Min,
    Max,
    Abs,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TemporalFunction {
    Average,
    Min,
    Max,
    Delta,
    Sum,
    Count,
    Stnd,
    Slope,
    Any,
    All,
}

impl TemporalFunction {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            TemporalFunction::Average => "AVERAGE",
            TemporalFunction::Min => "MIN",
            TemporalFunction::Max => "MAX",
            TemporalFunction::Delta => "DELTA",
            TemporalFunction::Sum => "SUM",
            TemporalFunction::Count => "COUNT",
            TemporalFunction::Stnd => "STND",
            TemporalFunction::Slope => "SLOPE",
            TemporalFunction::Any => "ANY",
            TemporalFunction::All => "ALL",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Constant(Value),
    Signal(usize),
    Variable(usize),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
    Temporal {
        function: TemporalFunction,
        signal: usize,
        window: Duration,
    },
}

impl Expr {
    /// Longest temporal window anywhere in the tree
    pub(crate) fn max_lookback(&self) -> Duration {
        match self {
            Expr::Constant(_) | Expr::Signal(_) | Expr::Variable(_) => Duration::zero(),
            Expr::Unary(_, inner) => inner.max_lookback(),
            Expr::Binary(_, left, right) => left.max_lookback().max(right.max_lookback()),
            Expr::Call(_, args) => args
                .iter()
                .map(Expr::max_lookback)
                .max()
                .unwrap_or_else(Duration::zero),
            Expr::Temporal { window, .. } => *window,
        }
    }

    /// Collect referenced signal slots
    pub(crate) fn collect_signals(&self, out: &mut Vec<usize>) {
        match self {
            Expr::Signal(slot) | Expr::Temporal { signal: slot, .. } => {
                if !out.contains(slot) {
                    out.push(*slot);
                }
            }
            Expr::Constant(_) | Expr::Variable(_) => {}
            Expr::Unary(_, inner) => inner.collect_signals(out),
            Expr::Binary(_, left, right) => {
                left.collect_signals(out);
                right.collect_signals(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_signals(out)),
        }
    }

    /// Collect the longest window read per signal slot
    pub(crate) fn collect_windows(&self, out: &mut Vec<(usize, Duration)>) {
        match self {
            Expr::Temporal { signal, window, .. } => {
                match out.iter_mut().find(|(slot, _)| slot == signal) {
                    Some((_, longest)) => *longest = (*longest).max(*window),
                    None => out.push((*signal, *window)),
                }
            }
            Expr::Constant(_) | Expr::Signal(_) | Expr::Variable(_) => {}
            Expr::Unary(_, inner) => inner.collect_windows(out),
            Expr::Binary(_, left, right) => {
                left.collect_windows(out);
                right.collect_windows(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_windows(out)),
        }
    }
}
