//! Cell reference parsing and formatting.
//!
//! Provides bidirectional conversion between spreadsheet-style addresses
//! (e.g., "A1", "B12", "AA100") and 1-based row/column numbers. Columns use
//! bijective base-26: A..Z are 1..26, AA follows Z, AAA follows ZZ.
//!
//! # Examples
//!
//! ```
//! use livesheet_engine::engine::CellRef;
//!
//! let cell: CellRef = "B3".parse().unwrap();
//! assert_eq!(cell.row(), 3);
//! assert_eq!(cell.col(), 2);
//! assert_eq!(cell.to_string(), "B3");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::error::AddressError;

/// A reference to a cell by 1-based row and column.
///
/// Ordering is row-major, so sorted collections of references iterate the
/// grid the way a reader scans it.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRef {
    row: usize,
    col: usize,
}

impl CellRef {
    pub fn new(row: usize, col: usize) -> Result<CellRef, AddressError> {
        if row == 0 || col == 0 {
            return Err(AddressError::ZeroIndex);
        }
        Ok(CellRef { row, col })
    }

    /// Construct from coordinates already known to be >= 1.
    pub(crate) fn at(row: usize, col: usize) -> CellRef {
        debug_assert!(row >= 1 && col >= 1);
        CellRef { row, col }
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }
}

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Z]+)([1-9][0-9]*)$").expect("address regex must compile")
    })
}

fn encode_column(col: usize) -> String {
    let mut result = String::new();
    let mut n = col as u128;
    while n > 0 {
        n -= 1;
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    result
}

/// Convert a 1-based column number to letters (1 -> A, 26 -> Z, 27 -> AA).
pub fn column_to_letters(col: usize) -> Result<String, AddressError> {
    if col == 0 {
        return Err(AddressError::ZeroIndex);
    }
    Ok(encode_column(col))
}

/// Convert uppercase column letters back to a 1-based column number.
pub fn letters_to_column(letters: &str) -> Result<usize, AddressError> {
    if letters.is_empty() {
        return Err(AddressError::InvalidColumn(String::new()));
    }
    let mut acc = 0usize;
    for b in letters.bytes() {
        if !b.is_ascii_uppercase() {
            return Err(AddressError::InvalidColumn(letters.to_string()));
        }
        let digit = (b - b'A') as usize + 1;
        acc = acc
            .checked_mul(26)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| AddressError::Overflow(letters.to_string()))?;
    }
    Ok(acc)
}

/// Build an address string such as "B12" from a row and column.
pub fn compose(row: usize, col: usize) -> Result<String, AddressError> {
    Ok(CellRef::new(row, col)?.to_string())
}

/// Parse an address such as "B12" into its row and column.
pub fn parse_address(address: &str) -> Result<CellRef, AddressError> {
    let caps = address_re()
        .captures(address)
        .ok_or_else(|| AddressError::Malformed(address.to_string()))?;
    let col = letters_to_column(&caps[1])?;
    let row = caps[2]
        .parse::<usize>()
        .map_err(|_| AddressError::Overflow(address.to_string()))?;
    Ok(CellRef { row, col })
}

impl std::str::FromStr for CellRef {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_address(s)
    }
}

impl TryFrom<String> for CellRef {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_address(&value)
    }
}

impl From<CellRef> for String {
    fn from(value: CellRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", encode_column(self.col), self.row)
    }
}
