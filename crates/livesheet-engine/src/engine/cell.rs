//! Cell data structures for the spreadsheet grid.
//!
//! - [`Value`] - The scalar a cell holds after its input has been processed
//! - [`CellKind`] - The type detected from the raw input
//! - [`CellFormat`] - Optional presentation attributes, updated by patching
//! - [`Cell`] - A cell with its address, value, formula and format

use serde::{Deserialize, Serialize};
use std::fmt;

use super::cell_ref::CellRef;
use super::detect::parse_number;
use super::format::format_value;

/// Error sentinels a cell can hold in place of a computed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellError {
    /// Any evaluation failure.
    Error,
    /// The cell sits on a reference cycle (only produced by recalculation).
    Circular,
}

impl CellError {
    pub fn sentinel(&self) -> &'static str {
        match self {
            CellError::Error => "#ERROR",
            CellError::Circular => "#CIRCULAR",
        }
    }
}

/// The scalar stored in a cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Value {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(CellError),
}

impl Value {
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Numeric view used by range functions; anything non-numeric is 0.
    pub fn to_number_lossy(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Text(s) => parse_number(s).unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Truthiness for IF/AND/OR/NOT: non-zero numbers, non-empty text, `true`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::Empty | Value::Error(_) => false,
        }
    }

    /// True for values COUNT considers present.
    pub fn is_present(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Text(s) => !s.is_empty(),
            _ => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_value(self))
    }
}

/// Type of a cell, derived solely from its raw input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    #[default]
    Text,
    Number,
    Formula,
    Date,
    Boolean,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Presentation attributes. `None` means "not set".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
}

impl CellFormat {
    /// Apply `patch` on top of `self`. Only fields set in the patch change.
    pub fn merge(&self, patch: &CellFormat) -> CellFormat {
        CellFormat {
            bold: patch.bold.or(self.bold),
            italic: patch.italic.or(self.italic),
            underline: patch.underline.or(self.underline),
            color: patch.color.clone().or_else(|| self.color.clone()),
            background_color: patch
                .background_color
                .clone()
                .or_else(|| self.background_color.clone()),
            alignment: patch.alignment.or(self.alignment),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == CellFormat::default()
    }
}

/// A cell in the spreadsheet grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub address: String,
    pub row: usize,
    pub col: usize,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(rename = "type")]
    pub kind: CellKind,
    #[serde(default, skip_serializing_if = "CellFormat::is_empty")]
    pub format: CellFormat,
}

impl Cell {
    pub fn new_empty(at: CellRef) -> Cell {
        Cell {
            address: at.to_string(),
            row: at.row(),
            col: at.col(),
            value: Value::Empty,
            formula: None,
            kind: CellKind::Text,
            format: CellFormat::default(),
        }
    }

    /// The position this cell claims to occupy.
    pub fn cell_ref(&self) -> Option<CellRef> {
        CellRef::new(self.row, self.col).ok()
    }

    /// Text suitable for the edit box: the formula if any, else the value.
    pub fn input_text(&self) -> String {
        match &self.formula {
            Some(formula) => formula.clone(),
            None => format_value(&self.value),
        }
    }
}
