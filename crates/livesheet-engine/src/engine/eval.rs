//! Formula evaluation.
//!
//! A formula is evaluated in four steps: range calls are resolved against
//! the sheet, plain references are substituted with literals, the residual
//! text is parsed into an [`Expr`], and the tree is walked. Any failure along
//! the way becomes the `#ERROR` sentinel at the [`Evaluator::evaluate`]
//! boundary.

use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::cell::{CellError, Value};
use super::detect::parse_number;
use super::expr::{BinaryOp, Expr, UnaryOp, parse_expression};
use super::format::format_value;
use super::preprocess::{
    cell_ref_re, map_outside_strings, range_call_re, resolve_range_calls, substitute_references,
};
use super::sheet::Sheet;
use crate::builtins::{self, Clock, FunctionLibrary, RandomSource};
use crate::error::{FormulaError, FormulaResult};

/// Bounds on formula size that keep evaluation terminating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    /// Maximum length of a formula body in characters.
    pub max_formula_len: usize,
    /// Maximum expression nesting depth.
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_formula_len: 4096,
            max_depth: 64,
        }
    }
}

/// Evaluates formulas against a sheet using a function library.
#[derive(Clone, Default)]
pub struct Evaluator {
    library: FunctionLibrary,
    limits: Limits,
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Evaluator {
    pub fn new(library: FunctionLibrary, limits: Limits) -> Self {
        Evaluator { library, limits }
    }

    /// An evaluator with default limits reading time and randomness from
    /// the given ports.
    pub fn with_ports(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        Evaluator::new(FunctionLibrary::new(clock, random), Limits::default())
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn library(&self) -> &FunctionLibrary {
        &self.library
    }

    /// Evaluate `raw` (including the leading `=`) against `sheet`.
    ///
    /// Never fails: errors are logged and yield `#ERROR`.
    pub fn evaluate(&self, raw: &str, sheet: &Sheet) -> Value {
        match self.try_evaluate(raw, sheet) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(formula = raw, error = %e, "formula evaluation failed");
                Value::Error(CellError::Error)
            }
        }
    }

    /// Evaluate `raw` against `sheet`, surfacing the failure reason.
    pub fn try_evaluate(&self, raw: &str, sheet: &Sheet) -> FormulaResult<Value> {
        let body = self.body(raw)?;
        let resolved = resolve_range_calls(body, sheet, &self.library)?;
        let substituted = substitute_references(&resolved, sheet)?;
        let expr = parse_expression(&substituted, self.limits.max_depth)?;
        let value = self.eval(&expr)?;
        finite(value)
    }

    /// Check that `raw` is a well-formed formula calling known functions
    /// with acceptable argument counts. No sheet is consulted.
    pub fn validate(&self, raw: &str) -> FormulaResult<()> {
        let body = self.body(raw)?;
        let mut failure = None;
        let placeholder = map_outside_strings(body, |seg| {
            let seg = range_call_re().replace_all(seg, |caps: &regex::Captures| {
                let name = caps[1].to_ascii_uppercase();
                if failure.is_none() && !builtins::is_builtin(&name) {
                    failure = Some(FormulaError::UnknownFunction(name));
                }
                "0".to_string()
            })
            .into_owned();
            let mut out = String::with_capacity(seg.len());
            let mut last = 0;
            for m in cell_ref_re().find_iter(&seg) {
                if seg[m.end()..].starts_with('(') {
                    continue;
                }
                out.push_str(&seg[last..m.start()]);
                out.push('0');
                last = m.end();
            }
            out.push_str(&seg[last..]);
            out
        });
        if let Some(e) = failure {
            return Err(e);
        }
        let expr = parse_expression(&placeholder, self.limits.max_depth)?;
        check_calls(&expr)
    }

    fn body<'a>(&self, raw: &'a str) -> FormulaResult<&'a str> {
        let body = raw
            .strip_prefix('=')
            .ok_or_else(|| FormulaError::Parse("formula must start with '='".to_string()))?;
        if body.chars().count() > self.limits.max_formula_len {
            return Err(FormulaError::TooLong(self.limits.max_formula_len));
        }
        Ok(body)
    }

    fn eval(&self, expr: &Expr) -> FormulaResult<Value> {
        match expr {
            Expr::Num(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Text(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Unary { op, operand } => {
                let n = to_number(&self.eval(operand)?)?;
                Ok(Value::Number(match op {
                    UnaryOp::Neg => -n,
                    UnaryOp::Plus => n,
                }))
            }
            Expr::BinOp { .. } => self.eval_chain(expr),
            Expr::Call { name, args } => self.call(name, args),
        }
    }

    /// Evaluate an operator chain by walking its left spine in a loop.
    fn eval_chain(&self, expr: &Expr) -> FormulaResult<Value> {
        let mut pending = Vec::new();
        let mut node = expr;
        while let Expr::BinOp { op, left, right } = node {
            pending.push((*op, right.as_ref()));
            node = left.as_ref();
        }
        let mut acc = self.eval(node)?;
        while let Some((op, right)) = pending.pop() {
            let right = self.eval(right)?;
            acc = binary(op, &acc, &right)?;
        }
        Ok(acc)
    }

    fn call(&self, name: &str, args: &[Expr]) -> FormulaResult<Value> {
        // IF only evaluates the branch it takes.
        if name == "IF" && (2..=3).contains(&args.len()) {
            let condition = coerce_argument(self.eval(&args[0])?);
            return match (condition.is_truthy(), args.get(2)) {
                (true, _) => self.eval(&args[1]),
                (false, Some(otherwise)) => self.eval(otherwise),
                (false, None) => Ok(Value::Bool(false)),
            };
        }

        let values = args
            .iter()
            .map(|arg| self.eval(arg).map(coerce_argument))
            .collect::<FormulaResult<Vec<_>>>()?;
        self.library.call(name, &values)
    }
}

/// Validate `raw` with default limits.
pub fn validate_formula(raw: &str) -> FormulaResult<()> {
    Evaluator::default().validate(raw)
}

fn check_calls(expr: &Expr) -> FormulaResult<()> {
    let mut pending = vec![expr];
    while let Some(expr) = pending.pop() {
        match expr {
            Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) => {}
            Expr::Unary { operand, .. } => pending.push(operand),
            Expr::BinOp { left, right, .. } => {
                pending.push(right);
                pending.push(left);
            }
            Expr::Call { name, args } => {
                let builtin = builtins::lookup(name)
                    .ok_or_else(|| FormulaError::UnknownFunction(name.clone()))?;
                if !builtin.accepts(args.len()) {
                    return Err(FormulaError::ArgumentCount {
                        function: name.clone(),
                        expected: builtin.expected(),
                        actual: args.len(),
                    });
                }
                pending.extend(args.iter().rev());
            }
        }
    }
    Ok(())
}

/// Text arguments that read as numbers are passed to functions as numbers.
fn coerce_argument(value: Value) -> Value {
    if let Value::Text(s) = &value
        && let Some(n) = parse_number(s)
    {
        return Value::Number(n);
    }
    value
}

fn to_number(value: &Value) -> FormulaResult<f64> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Empty => Ok(0.0),
        Value::Text(s) => parse_number(s)
            .ok_or_else(|| FormulaError::Evaluation(format!("{:?} is not a number", s))),
        Value::Error(e) => Err(FormulaError::Evaluation(e.sentinel().to_string())),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> FormulaResult<Value> {
    let arithmetic = |f: fn(f64, f64) -> f64| -> FormulaResult<Value> {
        Ok(Value::Number(f(to_number(left)?, to_number(right)?)))
    };

    match op {
        BinaryOp::Add => {
            if matches!(left, Value::Text(_)) || matches!(right, Value::Text(_)) {
                Ok(Value::Text(format_value(left) + &format_value(right)))
            } else {
                arithmetic(|a, b| a + b)
            }
        }
        BinaryOp::Sub => arithmetic(|a, b| a - b),
        BinaryOp::Mul => arithmetic(|a, b| a * b),
        BinaryOp::Div => {
            let divisor = to_number(right)?;
            if divisor == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            Ok(Value::Number(to_number(left)? / divisor))
        }
        BinaryOp::Eq => Ok(Value::Bool(compare(left, right) == Ordering::Equal)),
        BinaryOp::Ne => Ok(Value::Bool(compare(left, right) != Ordering::Equal)),
        BinaryOp::Lt => Ok(Value::Bool(compare(left, right) == Ordering::Less)),
        BinaryOp::Le => Ok(Value::Bool(compare(left, right) != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Bool(compare(left, right) == Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(compare(left, right) != Ordering::Less)),
    }
}

/// Numbers compare numerically, text case-insensitively, and numbers sort
/// before text.
fn compare(left: &Value, right: &Value) -> Ordering {
    match (to_number(left), to_number(right)) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => format_value(left)
            .to_lowercase()
            .cmp(&format_value(right).to_lowercase()),
    }
}

fn finite(value: Value) -> FormulaResult<Value> {
    match value {
        Value::Number(n) if !n.is_finite() => Err(FormulaError::Evaluation(
            "result is not a finite number".to_string(),
        )),
        value => Ok(value),
    }
}
