//! Built-in spreadsheet functions and their metadata.
//!
//! Conventions:
//! - Formula-facing built-in names are ALL CAPS (e.g. `SUM`, `AVERAGE`).
//! - Every built-in is listed in `BUILTINS` with its arity; arity is checked
//!   before dispatch. If you add a built-in, add it to the table and to
//!   `FunctionLibrary::dispatch`.
//! - Nothing here panics. Bad input either coerces (non-numeric -> 0) or
//!   returns a `FormulaError`, which the evaluator turns into `#ERROR`.
//! - NOW/TODAY/RAND read time and randomness only through the [`Clock`]
//!   and [`RandomSource`] ports.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::engine::{Value, format_value};
use crate::error::{FormulaError, FormulaResult};

/// Source of the current time for NOW() and TODAY().
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Source of uniform floats in `[0, 1)` for RAND().
pub trait RandomSource: Send + Sync {
    fn next_f64(&self) -> f64;
}

/// The thread-local RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::thread_rng().r#gen()
    }
}

/// A reproducible RNG seeded once.
#[derive(Debug)]
pub struct SeededRandom(Mutex<StdRng>);

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        SeededRandom(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        let mut rng = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.r#gen()
    }
}

pub struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub description: &'static str,
}

impl Builtin {
    pub(crate) fn expected(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{}..={}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }

    pub(crate) fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }
}

const fn builtin(
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    description: &'static str,
) -> Builtin {
    Builtin {
        name,
        min_args,
        max_args,
        description,
    }
}

pub const BUILTINS: &[Builtin] = &[
    builtin("SUM", 0, None, "Sum of numeric values"),
    builtin("AVERAGE", 0, None, "Arithmetic mean of numeric values"),
    builtin("MAX", 0, None, "Largest numeric value"),
    builtin("MIN", 0, None, "Smallest numeric value"),
    builtin("COUNT", 0, None, "Count of non-empty values"),
    builtin("COUNTA", 0, None, "Count of non-empty values"),
    builtin("MEDIAN", 0, None, "Middle value of the sorted numeric values"),
    builtin("IF", 2, Some(3), "Choose between two values on a condition"),
    builtin("AND", 1, None, "True when every argument is truthy"),
    builtin("OR", 1, None, "True when any argument is truthy"),
    builtin("NOT", 1, Some(1), "Logical negation"),
    builtin("NOW", 0, Some(0), "Current timestamp (RFC 3339, UTC)"),
    builtin("TODAY", 0, Some(0), "Current date (YYYY-MM-DD, UTC)"),
    builtin("RAND", 0, Some(0), "Uniform random number in [0, 1)"),
    builtin("PI", 0, Some(0), "The constant pi"),
    builtin("ROUND", 1, Some(2), "Round half away from zero to N digits"),
    builtin("ABS", 1, Some(1), "Absolute value"),
    builtin("SQRT", 1, Some(1), "Square root"),
    builtin("POWER", 2, Some(2), "Raise a number to a power"),
    builtin("EXP", 1, Some(1), "e raised to a power"),
    builtin("LN", 1, Some(1), "Natural logarithm"),
    builtin("LOG", 1, Some(2), "Logarithm, base 10 unless given"),
    builtin("CONCATENATE", 0, None, "Join text with no separator"),
    builtin("CONCAT", 0, None, "Join text with no separator"),
    builtin("LEN", 1, Some(1), "Number of characters"),
    builtin("UPPER", 1, Some(1), "Convert text to upper case"),
    builtin("LOWER", 1, Some(1), "Convert text to lower case"),
    builtin("TRIM", 1, Some(1), "Strip leading and trailing whitespace"),
    builtin("LEFT", 1, Some(2), "First N characters"),
    builtin("RIGHT", 1, Some(2), "Last N characters"),
    builtin("MID", 3, Some(3), "N characters starting at a 1-based position"),
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

pub fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(sum(values) / values.len() as f64)
    }
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Count values that are neither empty nor empty text.
pub fn count(values: &[Value]) -> usize {
    values.iter().filter(|v| v.is_present()).count()
}

/// Round half away from zero to `digits` decimal places (negative rounds
/// to tens, hundreds, ...).
pub fn round_half_away_from_zero(x: f64, digits: i32) -> f64 {
    const MAX_DIGITS: i32 = 15;
    let digits = digits.clamp(-MAX_DIGITS, MAX_DIGITS);
    let factor = 10f64.powi(digits);
    let scaled = x * factor;
    if !scaled.is_finite() {
        // Too large to carry `digits` decimals; already an integer.
        return x;
    }
    scaled.round() / factor
}

fn invalid_arg(message: &str) -> FormulaError {
    FormulaError::Evaluation(message.to_string())
}

fn numbers(args: &[Value]) -> Vec<f64> {
    args.iter().map(Value::to_number_lossy).collect()
}

fn number_at(args: &[Value], idx: usize) -> f64 {
    args.get(idx).map(Value::to_number_lossy).unwrap_or(0.0)
}

fn text_at(args: &[Value], idx: usize) -> String {
    args.get(idx).map(format_value).unwrap_or_default()
}

/// Optional character-count argument; defaults to `default`, rejects negatives.
fn count_at(args: &[Value], idx: usize, default: usize, label: &str) -> FormulaResult<usize> {
    let Some(value) = args.get(idx) else {
        return Ok(default);
    };
    let n = value.to_number_lossy().trunc();
    if n < 0.0 {
        return Err(invalid_arg(&format!("{} must be >= 0", label)));
    }
    Ok(n as usize)
}

fn non_empty(result: Option<f64>, name: &str) -> FormulaResult<Value> {
    result
        .map(Value::Number)
        .ok_or_else(|| invalid_arg(&format!("{} of an empty set", name)))
}

/// The built-in function set bound to its clock and random ports.
#[derive(Clone)]
pub struct FunctionLibrary {
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl fmt::Debug for FunctionLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionLibrary").finish_non_exhaustive()
    }
}

impl Default for FunctionLibrary {
    fn default() -> Self {
        FunctionLibrary::new(Arc::new(SystemClock), Arc::new(ThreadRandom))
    }
}

impl FunctionLibrary {
    pub fn new(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        FunctionLibrary { clock, random }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Call a built-in by (upper-case) name.
    pub fn call(&self, name: &str, args: &[Value]) -> FormulaResult<Value> {
        let builtin =
            lookup(name).ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;
        if !builtin.accepts(args.len()) {
            return Err(FormulaError::ArgumentCount {
                function: name.to_string(),
                expected: builtin.expected(),
                actual: args.len(),
            });
        }

        match self.dispatch(builtin.name, args)? {
            Value::Number(n) if !n.is_finite() => {
                Err(invalid_arg(&format!("{} produced a non-finite result", name)))
            }
            value => Ok(value),
        }
    }

    fn dispatch(&self, name: &str, args: &[Value]) -> FormulaResult<Value> {
        let value = match name {
            "SUM" => Value::Number(sum(&numbers(args))),
            "AVERAGE" => non_empty(average(&numbers(args)), name)?,
            "MAX" => non_empty(max(&numbers(args)), name)?,
            "MIN" => non_empty(min(&numbers(args)), name)?,
            "MEDIAN" => non_empty(median(&numbers(args)), name)?,
            "COUNT" | "COUNTA" => Value::Number(count(args) as f64),

            "IF" => {
                let branch = if args[0].is_truthy() { 1 } else { 2 };
                args.get(branch).cloned().unwrap_or(Value::Bool(false))
            }
            "AND" => Value::Bool(args.iter().all(Value::is_truthy)),
            "OR" => Value::Bool(args.iter().any(Value::is_truthy)),
            "NOT" => Value::Bool(!args[0].is_truthy()),

            "NOW" => Value::Text(
                self.clock
                    .now()
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            "TODAY" => Value::Text(self.clock.now().format("%Y-%m-%d").to_string()),
            "RAND" => Value::Number(self.random.next_f64()),
            "PI" => Value::Number(std::f64::consts::PI),

            "ROUND" => {
                let digits = number_at(args, 1).trunc();
                Value::Number(round_half_away_from_zero(
                    number_at(args, 0),
                    digits.clamp(i32::MIN as f64, i32::MAX as f64) as i32,
                ))
            }
            "ABS" => Value::Number(number_at(args, 0).abs()),
            "SQRT" => {
                let x = number_at(args, 0);
                if x < 0.0 {
                    return Err(invalid_arg("SQRT of a negative number"));
                }
                Value::Number(x.sqrt())
            }
            "POWER" => Value::Number(number_at(args, 0).powf(number_at(args, 1))),
            "EXP" => Value::Number(number_at(args, 0).exp()),
            "LN" => {
                let x = number_at(args, 0);
                if x <= 0.0 {
                    return Err(invalid_arg("LN of a non-positive number"));
                }
                Value::Number(x.ln())
            }
            "LOG" => {
                let x = number_at(args, 0);
                let base = if args.len() > 1 { number_at(args, 1) } else { 10.0 };
                if x <= 0.0 || base <= 0.0 || base == 1.0 {
                    return Err(invalid_arg("LOG argument out of domain"));
                }
                let log = if base == 10.0 {
                    x.log10()
                } else if base == 2.0 {
                    x.log2()
                } else {
                    x.ln() / base.ln()
                };
                Value::Number(log)
            }

            "CONCATENATE" | "CONCAT" => {
                Value::Text(args.iter().map(format_value).collect::<String>())
            }
            "LEN" => Value::Number(text_at(args, 0).chars().count() as f64),
            "UPPER" => Value::Text(text_at(args, 0).to_uppercase()),
            "LOWER" => Value::Text(text_at(args, 0).to_lowercase()),
            "TRIM" => Value::Text(text_at(args, 0).trim().to_string()),
            "LEFT" => {
                let n = count_at(args, 1, 1, "num_chars")?;
                Value::Text(text_at(args, 0).chars().take(n).collect())
            }
            "RIGHT" => {
                let n = count_at(args, 1, 1, "num_chars")?;
                let text = text_at(args, 0);
                let skip = text.chars().count().saturating_sub(n);
                Value::Text(text.chars().skip(skip).collect())
            }
            "MID" => {
                let start = number_at(args, 1).trunc();
                if start < 1.0 {
                    return Err(invalid_arg("MID start must be >= 1"));
                }
                let n = count_at(args, 2, 0, "num_chars")?;
                Value::Text(
                    text_at(args, 0)
                        .chars()
                        .skip(start as usize - 1)
                        .take(n)
                        .collect(),
                )
            }

            _ => return Err(FormulaError::UnknownFunction(name.to_string())),
        };
        Ok(value)
    }
}
