//! Recursive-Descent Compiler
//!
//! Precedence, lowest first: `OR`, `AND`, `NOT`, comparison, `+ -`, `* / %`,
//! unary minus, `^` (right-associative), primary. `-2 ^ 2` is `-(2 ^ 2)`.

use crate::ast::{BinaryOp, Binding, Expr, Function, Scope, TemporalFunction, UnaryOp, Value};
use crate::lexer::{tokenize, Spanned, Token};
use crate::{ExpressionError, MAX_WINDOW_DAYS};
use chrono::Duration;
use tracing::trace;

/// A formula resolved against a [`Scope`], ready for repeated evaluation
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    pub(crate) root: Expr,
    max_lookback: Duration,
    signals: Vec<usize>,
    windows: Vec<(usize, Duration)>,
}

impl CompiledExpression {
    /// Longest trailing window any temporal function reads
    pub fn max_lookback(&self) -> Duration {
        self.max_lookback
    }

    /// Signal slots read by this expression, in first-use order
    pub fn signals(&self) -> &[usize] {
        &self.signals
    }

    /// Longest temporal window per signal slot
    pub fn temporal_windows(&self) -> &[(usize, Duration)] {
        &self.windows
    }
}

/// Compile `formula` with every name resolved through `scope`
pub fn compile(formula: &str, scope: &Scope) -> Result<CompiledExpression, ExpressionError> {
    let tokens = tokenize(formula)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        scope,
    };
    let root = parser.parse_or()?;
    if let Some((token, position)) = parser.tokens.get(parser.pos) {
        return Err(ExpressionError::UnexpectedToken {
            found: token.describe(),
            position: *position,
        });
    }

    let mut signals = Vec::new();
    root.collect_signals(&mut signals);
    let mut windows = Vec::new();
    root.collect_windows(&mut windows);
    let max_lookback = root.max_lookback();
    trace!("Compiled '{}' (lookback {}s)", formula.trim(), max_lookback.num_seconds());

    Ok(CompiledExpression {
        root,
        max_lookback,
        signals,
        windows,
    })
}

/// Split `name = formula` into its parts.
///
/// Returns `None` when the line has no assignment, so `[a] == 3` and
/// `[a] >= 3` are left alone.
pub fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let bytes = line.as_bytes();
    let index = (0..bytes.len()).find(|&i| {
        bytes[i] == b'='
            && bytes.get(i + 1) != Some(&b'=')
            && (i == 0 || !matches!(bytes[i - 1], b'=' | b'<' | b'>' | b'!'))
    })?;

    let name = line[..index].trim();
    let name = name
        .strip_prefix('[')
        .and_then(|n| n.strip_suffix(']'))
        .unwrap_or(name)
        .trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    Some((name, line[index + 1..].trim()))
}

enum Arg {
    Expr(Expr),
    Window(Duration, usize),
}

struct Parser<'a> {
    tokens: Vec<Spanned>,
    pos: usize,
    scope: &'a Scope,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn next(&mut self) -> Result<Spanned, ExpressionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExpressionError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        let (token, position) = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken {
                found: token.describe(),
                position,
            })
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Not) {
            let inner = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        if self.eat(&Token::Plus) {
            return self.parse_unary();
        }
        if self.eat(&Token::Not) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.parse_primary()?;
        if self.eat(&Token::Caret) {
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let (token, position) = self.next()?;
        match token {
            Token::Number(n) => Ok(Expr::Constant(Value::Number(n))),
            Token::Duration(_) => Err(ExpressionError::MisplacedDuration(position)),
            Token::Reference(name) => self.resolve(&name),
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    return self.parse_call(&name);
                }
                match name.to_ascii_uppercase().as_str() {
                    "TRUE" => Ok(Expr::Constant(Value::Bool(true))),
                    "FALSE" => Ok(Expr::Constant(Value::Bool(false))),
                    upper => {
                        if self.scope.contains(&name) {
                            self.resolve(&name)
                        } else {
                            self.resolve(upper)
                                .map_err(|_| ExpressionError::UndeclaredName(name.clone()))
                        }
                    }
                }
            }
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(ExpressionError::UnexpectedToken {
                found: other.describe(),
                position,
            }),
        }
    }

    fn resolve(&self, name: &str) -> Result<Expr, ExpressionError> {
        match self.scope.resolve(name) {
            Some(Binding::Signal(slot)) => Ok(Expr::Signal(slot)),
            Some(Binding::Variable(slot)) => Ok(Expr::Variable(slot)),
            Some(Binding::Constant(value)) => Ok(Expr::Constant(Value::Number(value))),
            None => Err(ExpressionError::UndeclaredName(name.to_string())),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Arg>, ExpressionError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            let is_window = matches!(self.peek(), Some(Token::Duration(_)))
                && matches!(self.peek_at(1), Some(Token::Comma) | Some(Token::RParen));
            if is_window {
                if let (Token::Duration(window), position) = self.next()? {
                    args.push(Arg::Window(window, position));
                }
            } else {
                args.push(Arg::Expr(self.parse_or()?));
            }

            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            return Ok(args);
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr, ExpressionError> {
        let args = self.parse_args()?;
        let upper = name.to_ascii_uppercase();

        let temporal = match upper.as_str() {
            "AVERAGE" => Some(TemporalFunction::Average),
            "DELTA" => Some(TemporalFunction::Delta),
            "SUM" => Some(TemporalFunction::Sum),
            "COUNT" => Some(TemporalFunction::Count),
            "STND" => Some(TemporalFunction::Stnd),
            "SLOPE" => Some(TemporalFunction::Slope),
            "ANY" => Some(TemporalFunction::Any),
            "ALL" => Some(TemporalFunction::All),
            "MIN" | "MAX" if matches!(args.last(), Some(Arg::Window(..))) => {
                if upper == "MIN" {
                    Some(TemporalFunction::Min)
                } else {
                    Some(TemporalFunction::Max)
                }
            }
            _ => None,
        };
        if let Some(function) = temporal {
            return temporal_call(function, args);
        }

        let (function, name, expected, min, max) = match upper.as_str() {
            "OPTION" => (Function::Option, "OPTION", "at least 1", 1, usize::MAX),
            "IF" => (Function::If, "IF", "3", 3, 3),
            "MIN" => (Function::Min, "MIN", "at least 1", 1, usize::MAX),
            "MAX" => (Function::Max, "MAX", "at least 1", 1, usize::MAX),
            "ABS" => (Function::Abs, "ABS", "1", 1, 1),
            _ => return Err(ExpressionError::UnknownFunction(name.to_string())),
        };

        if args.len() < min || args.len() > max {
            return Err(ExpressionError::Arity {
                function: name,
                expected,
                found: args.len(),
            });
        }

        let operands = args
            .into_iter()
            .map(|arg| match arg {
                Arg::Expr(expr) => Ok(expr),
                Arg::Window(_, position) => Err(ExpressionError::MisplacedDuration(position)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Expr::Call(function, operands))
    }
}

fn temporal_call(function: TemporalFunction, args: Vec<Arg>) -> Result<Expr, ExpressionError> {
    let mut args = args.into_iter();
    match (args.next(), args.next(), args.next()) {
        (Some(Arg::Expr(Expr::Signal(signal))), Some(Arg::Window(window, _)), None)
            if window > Duration::zero() =>
        {
            if window > Duration::days(MAX_WINDOW_DAYS) {
                return Err(ExpressionError::WindowTooLong {
                    function: function.name(),
                    days: window.num_days(),
                });
            }
            Ok(Expr::Temporal {
                function,
                signal,
                window,
            })
        }
        _ => Err(ExpressionError::TemporalArguments(function.name())),
    }
}
