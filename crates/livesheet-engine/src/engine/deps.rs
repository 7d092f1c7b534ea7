//! Dependency extraction from formula strings.
//!
//! Parses formula text to find all cell references (e.g., `A1`, `B2:C5`)
//! that the formula depends on. Used by [`Sheet::recalculate`] to order
//! evaluation and find cycles.
//!
//! Handles:
//! - Simple cell references: `A1`, `B2`
//! - Ranges: `SUM(A1:B5)`; inverted ranges contribute nothing, matching
//!   how they evaluate. [`extract_reference_ranges`] keeps ranges as
//!   rectangles so callers can intersect them with the cells that exist
//! - Ignores references inside string literals and function names
//!
//! [`Sheet::recalculate`]: super::Sheet::recalculate

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::cell_ref::{CellRef, parse_address};
use super::preprocess::{cell_ref_re, map_outside_strings};

const MAX_DEPENDENCY_RANGE_CELLS: usize = 1_000_000;

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z]+[1-9][0-9]*)\s*:\s*([A-Z]+[1-9][0-9]*)\b")
            .expect("dependency range regex must compile")
    })
}

/// Every reference in a formula as an inclusive `(start, end)` rectangle;
/// a single cell is a one-cell rectangle. Inverted ranges are dropped.
/// Rectangles are not expanded, so they may be arbitrarily large.
pub fn extract_reference_ranges(formula: &str) -> Vec<(CellRef, CellRef)> {
    let mut rects = BTreeSet::new();

    let script = map_outside_strings(formula, |seg| {
        let mut ranges_removed = String::with_capacity(seg.len());
        let mut last = 0;
        for caps in range_re().captures_iter(seg) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            ranges_removed.push_str(&seg[last..whole.start()]);
            ranges_removed.push(' ');
            last = whole.end();
            if let (Ok(start), Ok(end)) = (parse_address(&caps[1]), parse_address(&caps[2]))
                && start.row() <= end.row()
                && start.col() <= end.col()
            {
                rects.insert((start, end));
            }
        }
        ranges_removed.push_str(&seg[last..]);
        ranges_removed
    });

    // Single references in what is left; string literals still pass through.
    map_outside_strings(&script, |seg| {
        for m in cell_ref_re().find_iter(seg) {
            if seg[m.end()..].starts_with('(') {
                continue;
            }
            if let Ok(cr) = parse_address(m.as_str()) {
                rects.insert((cr, cr));
            }
        }
        String::new()
    });

    rects.into_iter().collect()
}

/// Extract every cell a formula refers to, sorted row-major, without
/// duplicates. Ranges over `MAX_DEPENDENCY_RANGE_CELLS` positions are
/// skipped; use [`extract_reference_ranges`] to see them.
pub fn extract_dependencies(formula: &str) -> Vec<CellRef> {
    let mut deps = BTreeSet::new();
    for (start, end) in extract_reference_ranges(formula) {
        expand_range(start, end, &mut deps);
    }
    deps.into_iter().collect()
}

fn expand_range(start: CellRef, end: CellRef, deps: &mut BTreeSet<CellRef>) {
    let row_count = end.row() - start.row() + 1;
    let col_count = end.col() - start.col() + 1;
    let Some(cell_count) = row_count.checked_mul(col_count) else {
        return;
    };
    if cell_count > MAX_DEPENDENCY_RANGE_CELLS {
        return;
    }

    for row in start.row()..=end.row() {
        for col in start.col()..=end.col() {
            deps.insert(CellRef::at(row, col));
        }
    }
}
