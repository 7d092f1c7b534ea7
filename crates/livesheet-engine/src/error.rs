//! Error types for the Livesheet engine.

use thiserror::Error;

/// Malformed input handed to the address codec.
///
/// These indicate a bug at the boundary layer and are returned to the
/// caller rather than swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Malformed cell address: {0:?}")]
    Malformed(String),

    #[error("Invalid column letters: {0:?}")]
    InvalidColumn(String),

    #[error("Row and column numbers start at 1")]
    ZeroIndex,

    #[error("Cell address out of range: {0:?}")]
    Overflow(String),
}

/// Failures while evaluating a formula.
///
/// None of these escape [`crate::engine::Evaluator::evaluate`]; they are
/// converted to the `#ERROR` sentinel there.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Reference to a cell holding an error: {0}")]
    ErrorReference(String),

    #[error("Formula longer than {0} characters")]
    TooLong(usize),

    #[error("Formula nested deeper than {0} levels")]
    TooDeep(usize),

    #[error(transparent)]
    Address(#[from] AddressError),
}

pub type FormulaResult<T> = std::result::Result<T, FormulaError>;
