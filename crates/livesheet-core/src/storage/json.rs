//! JSON persistence for sheets and whole workbooks.
//!
//! A sheet is stored with every cell's value, type, formula and format,
//! and is loaded back verbatim: formulas are not re-evaluated on load.
//! Call [`Sheet::recalculate`] afterwards to refresh them.
//!
//! A workbook snapshot wraps the sheets with the active sheet index and the
//! time it was taken:
//!
//! ```json
//! { "sheets": [...], "activeSheetIndex": 0, "timestamp": "2024-01-02T03:04:05Z" }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use livesheet_engine::builtins::Clock;
use livesheet_engine::engine::{Evaluator, Sheet};

use crate::error::{LivesheetError, Result};
use crate::workbook::Workbook;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookSnapshot {
    pub sheets: Vec<Sheet>,
    pub active_sheet_index: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkbookSnapshotRef<'a> {
    sheets: &'a [Sheet],
    active_sheet_index: usize,
    timestamp: DateTime<Utc>,
}

pub fn sheet_to_json(sheet: &Sheet) -> Result<String> {
    Ok(serde_json::to_string_pretty(sheet)?)
}

/// Parse a stored sheet. Cells must sit under their own address; the
/// sheet's extent grows to cover every cell.
pub fn sheet_from_json(json: &str, evaluator: Arc<Evaluator>) -> Result<Sheet> {
    let sheet: Sheet = serde_json::from_str(json)?;
    restore_sheet(sheet, evaluator)
}

fn restore_sheet(mut sheet: Sheet, evaluator: Arc<Evaluator>) -> Result<Sheet> {
    if let Some(at) = sheet.find_inconsistent_cell() {
        return Err(LivesheetError::InconsistentCell(at.to_string()));
    }
    sheet.grow_to_fit();
    sheet.set_evaluator(evaluator);
    Ok(sheet)
}

/// Serialize the workbook, stamped with the clock's current time.
pub fn to_snapshot_json(workbook: &Workbook, clock: &dyn Clock) -> Result<String> {
    let snapshot = WorkbookSnapshotRef {
        sheets: workbook.sheets(),
        active_sheet_index: workbook.active_index(),
        timestamp: clock.now(),
    };
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

pub fn from_snapshot_json(json: &str, evaluator: Arc<Evaluator>) -> Result<Workbook> {
    let snapshot: WorkbookSnapshot = serde_json::from_str(json)?;
    tracing::debug!(
        sheets = snapshot.sheets.len(),
        timestamp = %snapshot.timestamp,
        "parsed workbook snapshot"
    );
    let sheets = snapshot
        .sheets
        .into_iter()
        .map(|sheet| restore_sheet(sheet, Arc::clone(&evaluator)))
        .collect::<Result<Vec<_>>>()?;
    Workbook::from_sheets(sheets, snapshot.active_sheet_index, evaluator)
}

pub fn save_sheet(path: &Path, sheet: &Sheet) -> Result<()> {
    std::fs::write(path, sheet_to_json(sheet)?)?;
    tracing::info!(path = %path.display(), sheet = sheet.id(), "saved sheet");
    Ok(())
}

pub fn load_sheet(path: &Path, evaluator: Arc<Evaluator>) -> Result<Sheet> {
    let sheet = sheet_from_json(&super::read_bounded(path)?, evaluator)?;
    tracing::info!(path = %path.display(), cells = sheet.len(), "loaded sheet");
    Ok(sheet)
}

pub fn save_workbook(path: &Path, workbook: &Workbook, clock: &dyn Clock) -> Result<()> {
    std::fs::write(path, to_snapshot_json(workbook, clock)?)?;
    tracing::info!(path = %path.display(), sheets = workbook.len(), "saved workbook");
    Ok(())
}

pub fn load_workbook(path: &Path, evaluator: Arc<Evaluator>) -> Result<Workbook> {
    let workbook = from_snapshot_json(&super::read_bounded(path)?, evaluator)?;
    tracing::info!(path = %path.display(), sheets = workbook.len(), "loaded workbook");
    Ok(workbook)
}
