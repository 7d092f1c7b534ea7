//! Spreadsheet engine API.
//!
//! This module provides the core computation engine for the spreadsheet:
//!
//! - [`Cell`], [`Value`], [`CellKind`], [`CellFormat`] - Data structures for cell storage
//! - [`CellRef`] - Cell reference parsing (A1 notation ↔ 1-based row/col)
//! - [`detect`] - Classify raw input
//! - [`Sheet`] - The sparse cell store with range iteration
//! - [`Evaluator`] - Formula evaluation against a sheet
//! - [`extract_dependencies`] - Parse formula dependencies
//! - [`evaluation_plan`] - Dependency ordering and circular reference detection
//! - [`format_value`] - Format values for display

mod cell;
mod cell_ref;
mod cycle;
mod deps;
mod detect;
mod eval;
mod expr;
mod format;
mod preprocess;
mod sheet;

pub use cell::{Alignment, Cell, CellError, CellFormat, CellKind, Value};
pub use cell_ref::{CellRef, column_to_letters, compose, letters_to_column, parse_address};
pub use cycle::{DependencyGraph, EvaluationPlan, detect_cycle, evaluation_plan};
pub use deps::{extract_dependencies, extract_reference_ranges};
pub use detect::{detect, parse_number};
pub use eval::{Evaluator, Limits, validate_formula};
pub use expr::{BinaryOp, Expr, UnaryOp, parse_expression};
pub use format::{format_number, format_value};
pub use preprocess::{
    literal, map_outside_strings, range_values, resolve_range_calls, substitute_references,
};
pub use sheet::{DEFAULT_COLS, DEFAULT_ROWS, RangeIter, Sheet};
