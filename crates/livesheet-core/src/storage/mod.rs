//! Storage backends for import/export.

pub mod csv;
pub mod json;

pub use self::csv::{export_csv, import_csv, read_csv, write_csv};
pub use json::{
    WorkbookSnapshot, from_snapshot_json, load_sheet, load_workbook, save_sheet, save_workbook,
    sheet_from_json, sheet_to_json, to_snapshot_json,
};

use crate::error::{LivesheetError, Result};
use std::path::Path;

const MAX_IMPORT_FILE_BYTES: u64 = 64 * 1_048_576; // 64 MiB

/// Refuse files too large to import.
pub(crate) fn check_size(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path)?;
    if meta.len() > MAX_IMPORT_FILE_BYTES {
        return Err(LivesheetError::FileTooLarge {
            path: path.display().to_string(),
            size: meta.len(),
            max: MAX_IMPORT_FILE_BYTES,
        });
    }
    Ok(())
}

/// Read a whole file, refusing anything implausibly large.
pub(crate) fn read_bounded(path: &Path) -> Result<String> {
    check_size(path)?;
    Ok(std::fs::read_to_string(path)?)
}
