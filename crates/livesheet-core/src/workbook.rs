//! Workbook: an ordered set of sheets with one active.

use std::sync::{Arc, Mutex, MutexGuard};

use livesheet_engine::engine::{DEFAULT_COLS, DEFAULT_ROWS, Evaluator, Sheet};

use crate::error::{LivesheetError, Result};

/// Owns its sheets in tab order. Every sheet shares the workbook's
/// evaluator.
#[derive(Clone, Debug)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    active: usize,
    next_id: usize,
    evaluator: Arc<Evaluator>,
    rows: usize,
    cols: usize,
}

impl Default for Workbook {
    fn default() -> Self {
        Workbook::new()
    }
}

impl Workbook {
    /// A workbook with one empty sheet of the default size.
    pub fn new() -> Self {
        Workbook::with_settings(Arc::default(), DEFAULT_ROWS, DEFAULT_COLS)
    }

    /// A workbook with one empty sheet whose new sheets are `rows` by `cols`
    /// and evaluate with `evaluator`.
    pub fn with_settings(evaluator: Arc<Evaluator>, rows: usize, cols: usize) -> Self {
        let mut workbook = Workbook {
            sheets: Vec::new(),
            active: 0,
            next_id: 1,
            evaluator,
            rows,
            cols,
        };
        workbook.add_sheet(None);
        workbook
    }

    /// Rebuild a workbook from stored sheets. The active index is clamped
    /// into range. Sheets added later get the default size; see
    /// [`Workbook::set_sheet_size`].
    pub fn from_sheets(
        sheets: Vec<Sheet>,
        active: usize,
        evaluator: Arc<Evaluator>,
    ) -> Result<Self> {
        if sheets.is_empty() {
            return Err(LivesheetError::EmptyWorkbook);
        }
        let next_id = sheets
            .iter()
            .filter_map(|sheet| sheet.id().strip_prefix("sheet")?.parse::<usize>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let mut sheets = sheets;
        for sheet in &mut sheets {
            sheet.set_evaluator(Arc::clone(&evaluator));
        }
        let active = active.min(sheets.len() - 1);
        Ok(Workbook {
            sheets,
            active,
            next_id,
            evaluator,
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        })
    }

    /// Size given to sheets added from now on. Existing sheets keep theirs.
    pub fn set_sheet_size(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
    }

    pub fn sheet_size(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn evaluator(&self) -> Arc<Evaluator> {
        Arc::clone(&self.evaluator)
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Append a new empty sheet and return its id. Without a name the sheet
    /// is called "Sheet N".
    pub fn add_sheet(&mut self, name: Option<&str>) -> String {
        let n = self.next_id;
        self.next_id += 1;
        let id = format!("sheet{}", n);
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("Sheet {}", n));
        let sheet = Sheet::new(id.clone(), name, self.rows, self.cols)
            .with_evaluator(Arc::clone(&self.evaluator));
        self.sheets.push(sheet);
        id
    }

    /// Remove a sheet. The last remaining sheet cannot be removed.
    pub fn remove_sheet(&mut self, id: &str) -> Result<Sheet> {
        let index = self.index_of(id)?;
        if self.sheets.len() == 1 {
            return Err(LivesheetError::LastSheet);
        }
        let removed = self.sheets.remove(index);
        if self.active > index || self.active == self.sheets.len() {
            self.active -= 1;
        }
        Ok(removed)
    }

    pub fn rename_sheet(&mut self, id: &str, name: &str) -> Result<()> {
        let index = self.index_of(id)?;
        self.sheets[index].set_name(name);
        Ok(())
    }

    pub fn set_active(&mut self, id: &str) -> Result<()> {
        self.active = self.index_of(id)?;
        Ok(())
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_sheet(&self) -> &Sheet {
        &self.sheets[self.active]
    }

    pub fn active_sheet_mut(&mut self) -> &mut Sheet {
        &mut self.sheets[self.active]
    }

    pub fn sheet(&self, id: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.id() == id)
    }

    pub fn sheet_mut(&mut self, id: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|sheet| sheet.id() == id)
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.sheets
            .iter()
            .position(|sheet| sheet.id() == id)
            .ok_or_else(|| LivesheetError::NoSuchSheet(id.to_string()))
    }
}

/// A workbook shared between threads. Writers are serialized by the lock.
#[derive(Clone, Debug, Default)]
pub struct SharedWorkbook(Arc<Mutex<Workbook>>);

impl SharedWorkbook {
    pub fn new(workbook: Workbook) -> Self {
        SharedWorkbook(Arc::new(Mutex::new(workbook)))
    }

    /// Lock the workbook. A poisoned lock is recovered, since every write
    /// leaves the workbook consistent.
    pub fn lock(&self) -> MutexGuard<'_, Workbook> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` with exclusive access to the workbook.
    pub fn with<R>(&self, f: impl FnOnce(&mut Workbook) -> R) -> R {
        f(&mut self.lock())
    }

    /// A copy of the workbook as it is now.
    pub fn snapshot(&self) -> Workbook {
        self.lock().clone()
    }
}
