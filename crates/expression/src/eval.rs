//! Tree Evaluation

use crate::ast::{BinaryOp, Expr, Function, TemporalFunction, UnaryOp, Value};
use crate::CompiledExpression;
use chrono::{DateTime, Utc};
use timed_buffer::TimedValueBuffer;

/// Supplies bound buffers and variables by slot
pub trait SignalSource {
    /// Buffer bound to a signal slot
    fn buffer(&self, slot: usize) -> Option<&TimedValueBuffer>;

    /// Current value of a variable slot, `None` when undefined
    fn variable(&self, slot: usize) -> Option<Value>;
}

impl CompiledExpression {
    /// Evaluate at `at`; `None` means undefined
    pub fn evaluate<S: SignalSource + ?Sized>(&self, source: &S, at: DateTime<Utc>) -> Option<Value> {
        eval(&self.root, source, at)
    }
}

fn eval<S: SignalSource + ?Sized>(expr: &Expr, source: &S, at: DateTime<Utc>) -> Option<Value> {
    match expr {
        Expr::Constant(value) => Some(*value),
        Expr::Signal(slot) => source.buffer(*slot)?.value_at(at).map(Value::Number),
        Expr::Variable(slot) => source.variable(*slot),
        Expr::Unary(op, inner) => {
            let value = eval(inner, source, at)?;
            match op {
                UnaryOp::Neg => number(-value.as_f64()),
                UnaryOp::Not => Some(Value::Bool(!value.as_bool())),
            }
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, source, at)?;
            let right = eval(right, source, at)?;
            binary(*op, left, right)
        }
        Expr::Call(function, args) => call(*function, args, source, at),
        Expr::Temporal {
            function,
            signal,
            window,
        } => {
            let buffer = source.buffer(*signal)?;
            let from = at.checked_sub_signed(*window)?;
            match function {
                TemporalFunction::Average => number(buffer.average(from, at)?),
                TemporalFunction::Min => number(buffer.min(from, at)?),
                TemporalFunction::Max => number(buffer.max(from, at)?),
                TemporalFunction::Delta => number(buffer.delta(from, at)?),
                TemporalFunction::Sum => number(buffer.sum(from, at)?),
                TemporalFunction::Count => number(buffer.count(from, at)? as f64),
                TemporalFunction::Stnd => number(buffer.standard_deviation(from, at)?),
                TemporalFunction::Slope => number(buffer.slope(from, at)?),
                TemporalFunction::Any => buffer.any(from, at).map(Value::Bool),
                TemporalFunction::All => buffer.all(from, at).map(Value::Bool),
            }
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Option<Value> {
    let (a, b) = (left.as_f64(), right.as_f64());
    match op {
        BinaryOp::Add => number(a + b),
        BinaryOp::Sub => number(a - b),
        BinaryOp::Mul => number(a * b),
        BinaryOp::Div if b == 0.0 => None,
        BinaryOp::Div => number(a / b),
        BinaryOp::Rem if b == 0.0 => None,
        BinaryOp::Rem => number(a % b),
        BinaryOp::Pow => number(a.powf(b)),
        BinaryOp::Lt => Some(Value::Bool(a < b)),
        BinaryOp::Le => Some(Value::Bool(a <= b)),
        BinaryOp::Gt => Some(Value::Bool(a > b)),
        BinaryOp::Ge => Some(Value::Bool(a >= b)),
        BinaryOp::Eq => Some(Value::Bool(a == b)),
        BinaryOp::Ne => Some(Value::Bool(a != b)),
        BinaryOp::And => Some(Value::Bool(left.as_bool() && right.as_bool())),
        BinaryOp::Or => Some(Value::Bool(left.as_bool() || right.as_bool())),
    }
}

fn call<S: SignalSource + ?Sized>(
    function: Function,
    args: &[Expr],
    source: &S,
    at: DateTime<Utc>,
) -> Option<Value> {
    match function {
        Function::Option => args.iter().find_map(|arg| eval(arg, source, at)),
        Function::If => {
            let condition = eval(args.first()?, source, at)?;
            let branch = if condition.as_bool() { args.get(1) } else { args.get(2) };
            eval(branch?, source, at)
        }
        Function::Min | Function::Max => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, source, at)?.as_f64());
            }
            let folded = if function == Function::Min {
                values.into_iter().reduce(f64::min)
            } else {
                values.into_iter().reduce(f64::max)
            };
            number(folded?)
        }
        Function::Abs => number(eval(args.first()?, source, at)?.as_f64().abs()),
    }
}

fn number(value: f64) -> Option<Value> {
    value.is_finite().then_some(Value::Number(value))
}
