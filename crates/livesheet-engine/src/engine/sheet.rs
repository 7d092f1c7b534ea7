//! The sparse cell store.
//!
//! A [`Sheet`] exclusively owns its cells, keyed by [`CellRef`]. Writes go
//! through [`Sheet::set_cell_raw_input`], which detects the input type and,
//! for formulas, evaluates against the sheet as it stood before the write.
//! Nothing is recomputed afterwards unless [`Sheet::recalculate`] is called.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::cell::{Cell, CellError, CellFormat, CellKind, Value};
use super::cell_ref::{CellRef, parse_address};
use super::cycle::{DependencyGraph, detect_cycle, evaluation_plan};
use super::deps::extract_reference_ranges;
use super::detect::{detect, parse_number};
use super::eval::Evaluator;
use crate::error::AddressError;

pub const DEFAULT_ROWS: usize = 100;
pub const DEFAULT_COLS: usize = 26;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sheet {
    id: String,
    name: String,
    cells: BTreeMap<CellRef, Cell>,
    rows: usize,
    cols: usize,
    #[serde(skip)]
    evaluator: Arc<Evaluator>,
}

impl Default for Sheet {
    fn default() -> Self {
        Sheet::new("sheet1", "Sheet 1", DEFAULT_ROWS, DEFAULT_COLS)
    }
}

impl Sheet {
    pub fn new(id: impl Into<String>, name: impl Into<String>, rows: usize, cols: usize) -> Self {
        Sheet {
            id: id.into(),
            name: name.into(),
            cells: BTreeMap::new(),
            rows,
            cols,
            evaluator: Arc::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn set_evaluator(&mut self, evaluator: Arc<Evaluator>) {
        self.evaluator = evaluator;
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get_cell(&self, at: &CellRef) -> Option<&Cell> {
        self.cells.get(at)
    }

    /// Look up a cell by address string such as `"B3"`.
    pub fn get(&self, address: &str) -> Result<Option<&Cell>, AddressError> {
        Ok(self.cells.get(&parse_address(address)?))
    }

    pub fn contains(&self, at: &CellRef) -> bool {
        self.cells.contains_key(at)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Present cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Store raw user input at `at`.
    ///
    /// The cell kind comes from [`detect`]. Formulas are evaluated against
    /// the current sheet; other input is stored as a number, boolean or text
    /// value. Writing past the current extent grows it. Never fails.
    pub fn set_cell_raw_input(&mut self, at: CellRef, raw: &str) {
        let kind = detect(raw);
        let (value, formula) = match kind {
            CellKind::Formula => (self.evaluator.evaluate(raw, self), Some(raw.to_string())),
            _ => (literal_value(kind, raw), None),
        };

        self.grow_to(at);
        let cell = self.cells.entry(at).or_insert_with(|| Cell::new_empty(at));
        cell.value = value;
        cell.formula = formula;
        cell.kind = kind;
    }

    /// [`Sheet::set_cell_raw_input`] by address string.
    pub fn set(&mut self, address: &str, raw: &str) -> Result<(), AddressError> {
        let at = parse_address(address)?;
        self.set_cell_raw_input(at, raw);
        Ok(())
    }

    /// Merge `patch` into the cell's format. Only fields set in the patch
    /// change; an absent cell is created empty.
    pub fn set_cell_format(&mut self, at: CellRef, patch: &CellFormat) {
        self.grow_to(at);
        let cell = self.cells.entry(at).or_insert_with(|| Cell::new_empty(at));
        cell.format = cell.format.merge(patch);
    }

    /// Remove the cell at `at`, returning it if it existed.
    pub fn clear_cell(&mut self, at: CellRef) -> Option<Cell> {
        self.cells.remove(&at)
    }

    /// Every position in the rectangle from `(r0, c0)` to `(r1, c1)`,
    /// row-major, with the cell stored there if any. Inverted bounds yield
    /// nothing.
    pub fn iterate_range(&self, r0: usize, c0: usize, r1: usize, c1: usize) -> RangeIter<'_> {
        let r0 = r0.max(1);
        let c0 = c0.max(1);
        let next = (r0 <= r1 && c0 <= c1).then_some((r0, c0));
        RangeIter {
            sheet: self,
            c0,
            r1,
            c1,
            next,
        }
    }

    /// Present cells in the rectangle from `(r0, c0)` to `(r1, c1)` that lie
    /// within the sheet, row-major. Absent positions are not visited.
    pub fn cells_in_range(
        &self,
        r0: usize,
        c0: usize,
        r1: usize,
        c1: usize,
    ) -> impl Iterator<Item = &Cell> {
        let (r0, c0) = (r0.max(1), c0.max(1));
        let (r1, c1) = (r1.min(self.rows), c1.min(self.cols));
        let span = if r0 <= r1 && c0 <= c1 {
            Some(CellRef::at(r0, c0)..=CellRef::at(r1, c1))
        } else {
            None
        };
        span.into_iter()
            .flat_map(move |span| self.cells.range(span))
            .filter(move |(at, _)| (c0..=c1).contains(&at.col()))
            .map(|(_, cell)| cell)
    }

    /// The bottom-right corner of the cells in use, if any.
    pub fn used_extent(&self) -> Option<(usize, usize)> {
        let max_row = self.cells.keys().map(CellRef::row).max()?;
        let max_col = self.cells.keys().map(CellRef::col).max()?;
        Some((max_row, max_col))
    }

    /// Grow the extent to cover every stored cell.
    pub fn grow_to_fit(&mut self) {
        if let Some((rows, cols)) = self.used_extent() {
            self.rows = self.rows.max(rows);
            self.cols = self.cols.max(cols);
        }
    }

    /// The first stored cell whose own address, row or column disagrees with
    /// the position it is stored under.
    pub fn find_inconsistent_cell(&self) -> Option<CellRef> {
        self.cells
            .iter()
            .find(|(at, cell)| {
                cell.row != at.row() || cell.col != at.col() || cell.address != at.to_string()
            })
            .map(|(at, _)| *at)
    }

    /// Re-evaluate every formula cell, dependencies first.
    ///
    /// Cells on a reference cycle are set to `#CIRCULAR`; cells that read
    /// one become `#ERROR`. Returns the number of formula cells visited.
    pub fn recalculate(&mut self) -> usize {
        let formulas: BTreeSet<CellRef> = self
            .cells
            .iter()
            .filter(|(_, cell)| cell.formula.is_some())
            .map(|(at, _)| *at)
            .collect();
        let formulas = &formulas;
        let graph: DependencyGraph = self
            .cells
            .iter()
            .filter_map(|(at, cell)| cell.formula.as_deref().map(|f| (*at, f)))
            .map(|(at, formula)| {
                let deps: BTreeSet<CellRef> = extract_reference_ranges(formula)
                    .into_iter()
                    .flat_map(move |(start, end)| formulas_within(formulas, start, end))
                    .collect();
                (at, deps.into_iter().collect())
            })
            .collect();

        let plan = evaluation_plan(&graph);
        tracing::debug!(
            formulas = graph.len(),
            cyclic = plan.cyclic.len(),
            "recalculating sheet {}",
            self.id
        );

        if let Some(&first) = plan.cyclic.first()
            && let Some(path) = detect_cycle(first, &graph)
        {
            let path: Vec<String> = path.iter().map(CellRef::to_string).collect();
            tracing::debug!("circular reference: {}", path.join(" -> "));
        }
        for at in &plan.cyclic {
            if let Some(cell) = self.cells.get_mut(at) {
                cell.value = Value::Error(CellError::Circular);
            }
        }
        let evaluator = Arc::clone(&self.evaluator);
        for at in &plan.order {
            let Some(formula) = self.cells.get(at).and_then(|c| c.formula.clone()) else {
                continue;
            };
            let value = evaluator.evaluate(&formula, self);
            if let Some(cell) = self.cells.get_mut(at) {
                cell.value = value;
            }
        }

        graph.len()
    }

    fn grow_to(&mut self, at: CellRef) {
        self.rows = self.rows.max(at.row());
        self.cols = self.cols.max(at.col());
    }
}

/// Formula cells inside the rectangle `start..=end`, which must not be
/// inverted.
fn formulas_within(
    formulas: &BTreeSet<CellRef>,
    start: CellRef,
    end: CellRef,
) -> impl Iterator<Item = CellRef> + '_ {
    let cols = start.col()..=end.col();
    formulas
        .range(start..=end)
        .copied()
        .filter(move |at| cols.contains(&at.col()))
}

fn literal_value(kind: CellKind, raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Empty;
    }
    match kind {
        CellKind::Number => parse_number(raw)
            .map(Value::Number)
            .unwrap_or_else(|| Value::Text(raw.to_string())),
        CellKind::Boolean => Value::Bool(raw.eq_ignore_ascii_case("true")),
        _ => Value::Text(raw.to_string()),
    }
}

/// Row-major walk over a rectangle of a [`Sheet`].
#[derive(Clone, Debug)]
pub struct RangeIter<'a> {
    sheet: &'a Sheet,
    c0: usize,
    r1: usize,
    c1: usize,
    next: Option<(usize, usize)>,
}

impl<'a> Iterator for RangeIter<'a> {
    type Item = (CellRef, Option<&'a Cell>);

    fn next(&mut self) -> Option<Self::Item> {
        let (row, col) = self.next?;
        self.next = if col < self.c1 {
            Some((row, col + 1))
        } else if row < self.r1 {
            Some((row + 1, self.c0))
        } else {
            None
        };
        let at = CellRef::at(row, col);
        Some((at, self.sheet.cells.get(&at)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn r(address: &str) -> CellRef {
        address.parse().unwrap()
    }

    #[test]
    fn test_literal_writes_coerce_by_kind() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "42").unwrap();
        sheet.set("A2", "True").unwrap();
        sheet.set("A3", "2024-03-01").unwrap();
        sheet.set("A4", "hello").unwrap();
        sheet.set("A5", "").unwrap();

        let value = |a: &str| sheet.get(a).unwrap().unwrap().value.clone();
        assert_eq!(value("A1"), Value::Number(42.0));
        assert_eq!(value("A2"), Value::Bool(true));
        assert_eq!(value("A3"), Value::Text("2024-03-01".to_string()));
        assert_eq!(value("A4"), Value::Text("hello".to_string()));
        assert_eq!(value("A5"), Value::Empty);
        assert_eq!(sheet.get("A3").unwrap().unwrap().kind, CellKind::Date);
    }

    #[test]
    fn test_formula_write_keeps_formula_text() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "2").unwrap();
        sheet.set("B1", "=A1*3").unwrap();
        let cell = sheet.get("B1").unwrap().unwrap();
        assert_eq!(cell.formula.as_deref(), Some("=A1*3"));
        assert_eq!(cell.value, Value::Number(6.0));
        assert_eq!(cell.kind, CellKind::Formula);

        sheet.set("B1", "7").unwrap();
        let cell = sheet.get("B1").unwrap().unwrap();
        assert_eq!(cell.formula, None);
        assert_eq!(cell.value, Value::Number(7.0));
    }

    #[test]
    fn test_write_preserves_format_and_address() {
        let mut sheet = Sheet::default();
        let patch = CellFormat {
            bold: Some(true),
            ..CellFormat::default()
        };
        sheet.set_cell_format(r("C2"), &patch);
        sheet.set("C2", "x").unwrap();
        let cell = sheet.get("C2").unwrap().unwrap();
        assert_eq!(cell.format.bold, Some(true));
        assert_eq!(cell.address, "C2");
        assert_eq!((cell.row, cell.col), (2, 3));
    }

    #[test]
    fn test_writes_outside_extent_grow_sheet() {
        let mut sheet = Sheet::new("s", "S", 2, 2);
        sheet.set("E7", "1").unwrap();
        assert_eq!((sheet.rows(), sheet.cols()), (7, 5));
    }

    #[test]
    fn test_clear_cell() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "1").unwrap();
        assert!(sheet.clear_cell(r("A1")).is_some());
        assert!(!sheet.contains(&r("A1")));
        assert!(sheet.clear_cell(r("A1")).is_none());
    }

    #[test]
    fn test_iterate_range_is_row_major_and_restartable() {
        let mut sheet = Sheet::default();
        sheet.set("B2", "5").unwrap();
        let iter = sheet.iterate_range(1, 1, 2, 2);
        let addresses: Vec<String> = iter.clone().map(|(at, _)| at.to_string()).collect();
        assert_eq!(addresses, vec!["A1", "B1", "A2", "B2"]);
        let present: Vec<CellRef> = iter.filter_map(|(at, c)| c.map(|_| at)).collect();
        assert_eq!(present, vec![r("B2")]);
    }

    #[test]
    fn test_iterate_inverted_range_is_empty() {
        let sheet = Sheet::default();
        assert_eq!(sheet.iterate_range(3, 1, 1, 1).count(), 0);
        assert_eq!(sheet.iterate_range(1, 3, 1, 1).count(), 0);
    }

    #[test]
    fn test_cells_in_range_filters_columns_and_clamps() {
        let mut sheet = Sheet::new("s", "S", 3, 3);
        sheet.set("A1", "1").unwrap();
        sheet.set("C1", "2").unwrap();
        sheet.set("A2", "3").unwrap();
        sheet.set("B2", "4").unwrap();
        let found: Vec<&str> = sheet
            .cells_in_range(1, 1, 2, 2)
            .map(|c| c.address.as_str())
            .collect();
        assert_eq!(found, vec!["A1", "A2", "B2"]);
        assert_eq!(sheet.cells_in_range(1, 1, 1_000_000, 1_000_000).count(), 4);
    }

    #[test]
    fn test_recalculate_refreshes_stale_values() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "1").unwrap();
        sheet.set("B1", "=A1+1").unwrap();
        sheet.set("C1", "=B1*10").unwrap();
        sheet.set("A1", "5").unwrap();
        assert_eq!(sheet.get("C1").unwrap().unwrap().value, Value::Number(20.0));

        assert_eq!(sheet.recalculate(), 2);
        assert_eq!(sheet.get("B1").unwrap().unwrap().value, Value::Number(6.0));
        assert_eq!(sheet.get("C1").unwrap().unwrap().value, Value::Number(60.0));
    }

    #[test]
    fn test_recalculate_marks_cycles() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "=B1+1").unwrap();
        sheet.set("B1", "=A1+1").unwrap();
        sheet.set("C1", "=A1").unwrap();
        sheet.recalculate();
        let value = |a: &str| sheet.get(a).unwrap().unwrap().value.clone();
        assert_eq!(value("A1"), Value::Error(CellError::Circular));
        assert_eq!(value("B1"), Value::Error(CellError::Circular));
        assert_eq!(value("C1"), Value::Error(CellError::Error));
    }

    #[test]
    fn test_recalculate_orders_through_ranges_beyond_the_sheet() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "1").unwrap();
        sheet.set("A2", "=A1+1").unwrap();
        sheet.set("B1", "=SUM(A1:A2000000)").unwrap();
        sheet.set("A1", "5").unwrap();

        assert_eq!(sheet.recalculate(), 2);
        let value = |a: &str| sheet.get(a).unwrap().unwrap().value.clone();
        assert_eq!(value("A2"), Value::Number(6.0));
        assert_eq!(value("B1"), Value::Number(11.0));
    }

    #[test]
    fn test_range_covering_its_own_cell_is_circular() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "1").unwrap();
        sheet.set("C1", "=SUM(A1:Z40000)").unwrap();
        sheet.set("D5", "=C1*2").unwrap();
        sheet.recalculate();
        let value = |a: &str| sheet.get(a).unwrap().unwrap().value.clone();
        assert_eq!(value("C1"), Value::Error(CellError::Circular));
        assert_eq!(value("D5"), Value::Error(CellError::Circular));
    }

    #[test]
    fn test_find_inconsistent_cell() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "1").unwrap();
        assert_eq!(sheet.find_inconsistent_cell(), None);
        if let Some(cell) = sheet.cells.get_mut(&r("A1")) {
            cell.address = "B1".to_string();
        }
        assert_eq!(sheet.find_inconsistent_cell(), Some(r("A1")));
    }
}
