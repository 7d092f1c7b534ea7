//! Formula preprocessing against a sheet.
//!
//! Before a formula body is parsed, grid-relative parts are resolved to
//! literals:
//!
//! - **Range calls**: `SUM(A1:B5)` is evaluated against the sheet and the
//!   whole call replaced by its result
//! - **References**: `A1` becomes the cell's value as a literal
//!
//! Both passes only touch text outside string literals.

use regex::{Captures, Regex};
use std::sync::OnceLock;

use super::cell::{CellError, Value};
use super::cell_ref::{CellRef, parse_address};
use super::format::format_number;
use super::sheet::Sheet;
use crate::builtins::FunctionLibrary;
use crate::error::{FormulaError, FormulaResult};

pub(crate) fn range_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b([A-Za-z_][A-Za-z0-9_]*)\(\s*([A-Z]+[1-9][0-9]*)\s*:\s*([A-Z]+[1-9][0-9]*)\s*\)",
        )
        .expect("range call regex must compile")
    })
}

pub(crate) fn cell_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z]+)([1-9][0-9]*)\b").expect("cell reference regex must compile")
    })
}

/// Apply `f` to every segment of `script` that lies outside a double-quoted
/// string literal. Literals (quotes included) are copied through unchanged.
/// An unterminated literal runs to the end of the script.
pub fn map_outside_strings(script: &str, mut f: impl FnMut(&str) -> String) -> String {
    let bytes = script.as_bytes();
    let mut out = String::with_capacity(script.len());
    let mut seg_start = 0;
    let mut in_string = false;
    let mut backslashes = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if b == b'\\' {
                backslashes += 1;
                continue;
            }
            if b == b'"' && backslashes.is_multiple_of(2) {
                out.push_str(&script[seg_start..=i]);
                in_string = false;
                seg_start = i + 1;
            }
            backslashes = 0;
            continue;
        }

        if b == b'"' {
            out.push_str(&f(&script[seg_start..i]));
            in_string = true;
            seg_start = i;
            backslashes = 0;
        }
    }

    if seg_start < script.len() {
        if in_string {
            out.push_str(&script[seg_start..]);
        } else {
            out.push_str(&f(&script[seg_start..]));
        }
    }

    out
}

/// Render a value as a literal of the residual expression language.
///
/// Numbers are unquoted, booleans are bare `TRUE`/`FALSE`, text is quoted
/// with `\` escapes, and empty values read as `0`.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Text(s) if s.is_empty() => "0".to_string(),
        Value::Text(s) => quote(s),
        Value::Empty => "0".to_string(),
        Value::Error(e) => quote(e.sentinel()),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

fn error_reference(at: CellRef, error: CellError) -> FormulaError {
    FormulaError::ErrorReference(format!("{} is {}", at, error.sentinel()))
}

/// Numeric values of the present cells in `start..=end`, row-major.
///
/// Absent and empty cells are skipped, as are cells outside the sheet.
/// Anything non-numeric contributes 0.
pub fn range_values(sheet: &Sheet, start: CellRef, end: CellRef) -> FormulaResult<Vec<Value>> {
    let mut values = Vec::new();
    for cell in sheet.cells_in_range(start.row(), start.col(), end.row(), end.col()) {
        match &cell.value {
            Value::Empty => {}
            Value::Error(e) => {
                let at = cell.cell_ref().unwrap_or(start);
                return Err(error_reference(at, *e));
            }
            value => values.push(Value::Number(value.to_number_lossy())),
        }
    }
    Ok(values)
}

/// Replace every `NAME(START:END)` call with the literal result of calling
/// `NAME` on the range's values.
pub fn resolve_range_calls(
    script: &str,
    sheet: &Sheet,
    library: &FunctionLibrary,
) -> FormulaResult<String> {
    let mut failure: Option<FormulaError> = None;

    let resolved = map_outside_strings(script, |seg| {
        range_call_re()
            .replace_all(seg, |caps: &Captures| {
                if failure.is_some() {
                    return caps[0].to_string();
                }
                match call_on_range(&caps[1], &caps[2], &caps[3], sheet, library) {
                    Ok(value) => literal(&value),
                    Err(e) => {
                        failure = Some(e);
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(resolved),
    }
}

fn call_on_range(
    name: &str,
    start: &str,
    end: &str,
    sheet: &Sheet,
    library: &FunctionLibrary,
) -> FormulaResult<Value> {
    let start = parse_address(start)?;
    let end = parse_address(end)?;
    let values = range_values(sheet, start, end)?;
    library.call(&name.to_ascii_uppercase(), &values)
}

/// Replace every plain reference with the referenced cell's literal value.
///
/// References directly followed by `(` are function names (e.g. `LOG10`)
/// and are left alone. Absent cells and cells outside the sheet read as 0.
pub fn substitute_references(script: &str, sheet: &Sheet) -> FormulaResult<String> {
    let mut failure: Option<FormulaError> = None;

    let substituted = map_outside_strings(script, |seg| {
        let mut out = String::with_capacity(seg.len());
        let mut last = 0;
        for m in cell_ref_re().find_iter(seg) {
            if seg[m.end()..].starts_with('(') {
                continue;
            }
            out.push_str(&seg[last..m.start()]);
            last = m.end();
            if failure.is_some() {
                out.push_str(m.as_str());
                continue;
            }
            match reference_literal(m.as_str(), sheet) {
                Ok(lit) => out.push_str(&lit),
                Err(e) => {
                    failure = Some(e);
                    out.push_str(m.as_str());
                }
            }
        }
        out.push_str(&seg[last..]);
        out
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(substituted),
    }
}

fn reference_literal(address: &str, sheet: &Sheet) -> FormulaResult<String> {
    let at = parse_address(address)?;
    if at.row() > sheet.rows() || at.col() > sheet.cols() {
        return Ok("0".to_string());
    }
    match sheet.get_cell(&at).map(|cell| &cell.value) {
        None => Ok("0".to_string()),
        Some(Value::Error(e)) => Err(error_reference(at, *e)),
        Some(value) => Ok(literal(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sheet_with(entries: &[(&str, &str)]) -> Sheet {
        let mut sheet = Sheet::new("sheet1", "Sheet 1", 10, 5);
        for (address, raw) in entries {
            sheet.set(address, raw).unwrap();
        }
        sheet
    }

    #[test]
    fn test_map_outside_strings_skips_literals() {
        let out = map_outside_strings(r#"A1 & "A1 \" A1" & A1"#, |seg| seg.replace("A1", "X"));
        assert_eq!(out, r#"X & "A1 \" A1" & X"#);
    }

    #[test]
    fn test_map_outside_strings_unterminated_literal() {
        let out = map_outside_strings(r#"A1 "A1"#, |seg| seg.replace("A1", "X"));
        assert_eq!(out, r#"X "A1"#);
    }

    #[test]
    fn test_literal_quotes_and_escapes_text() {
        assert_eq!(literal(&Value::Number(2.5)), "2.5");
        assert_eq!(literal(&Value::Bool(true)), "TRUE");
        assert_eq!(literal(&Value::Empty), "0");
        assert_eq!(literal(&Value::Text(r#"a"b\c"#.to_string())), r#""a\"b\\c""#);
    }

    #[test]
    fn test_substitute_references() {
        let sheet = sheet_with(&[("A1", "5"), ("B1", "hello")]);
        assert_eq!(
            substitute_references("A1 + B1 + C1 + Z1", &sheet).unwrap(),
            r#"5 + "hello" + 0 + 0"#
        );
    }

    #[test]
    fn test_substitution_leaves_function_names_and_strings() {
        let sheet = sheet_with(&[("A1", "5")]);
        assert_eq!(
            substitute_references(r#"LOG10(A1) + LEN("A1")"#, &sheet).unwrap(),
            r#"LOG10(5) + LEN("A1")"#
        );
    }

    #[test]
    fn test_overflowing_reference_is_an_error() {
        let sheet = sheet_with(&[]);
        let huge = format!("{}1", "Z".repeat(40));
        assert!(substitute_references(&huge, &sheet).is_err());
    }

    #[test]
    fn test_resolve_range_calls() {
        let sheet = sheet_with(&[("A1", "1"), ("A2", "2"), ("A3", "3")]);
        let library = FunctionLibrary::default();
        assert_eq!(
            resolve_range_calls("SUM(A1:A3) * 2", &sheet, &library).unwrap(),
            "6 * 2"
        );
        assert_eq!(
            resolve_range_calls(r#""SUM(A1:A3)""#, &sheet, &library).unwrap(),
            r#""SUM(A1:A3)""#
        );
    }

    #[test]
    fn test_range_skips_absent_and_coerces_text() {
        let sheet = sheet_with(&[("A1", "4"), ("A3", "abc")]);
        let start: CellRef = "A1".parse().unwrap();
        let end: CellRef = "A4".parse().unwrap();
        assert_eq!(
            range_values(&sheet, start, end).unwrap(),
            vec![Value::Number(4.0), Value::Number(0.0)]
        );
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let sheet = sheet_with(&[("A1", "4"), ("A3", "5")]);
        let library = FunctionLibrary::default();
        assert_eq!(
            resolve_range_calls("SUM(A3:A1)", &sheet, &library).unwrap(),
            "0"
        );
    }

    #[test]
    fn test_unknown_range_function_is_an_error() {
        let sheet = sheet_with(&[("A1", "4")]);
        let library = FunctionLibrary::default();
        assert!(matches!(
            resolve_range_calls("NOPE(A1:A2)", &sheet, &library),
            Err(FormulaError::UnknownFunction(_))
        ));
    }
}
