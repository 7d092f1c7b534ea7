//! CSV import/export functionality

use std::io::{Read, Write};
use std::path::Path;

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use livesheet_engine::engine::{CellRef, Sheet, format_value};

use crate::error::Result;

/// Write the sheet's displayed values as CSV.
///
/// Rows and columns run from A1 to the bottom-right cell in use. Every
/// field is quoted; formulas are written as their computed value.
pub fn write_csv<W: Write>(sheet: &Sheet, writer: W) -> Result<()> {
    let mut csv_writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(writer);

    if let Some((max_row, max_col)) = sheet.used_extent() {
        for row in 1..=max_row {
            let record: Vec<String> = sheet
                .iterate_range(row, 1, row, max_col)
                .map(|(_, cell)| cell.map(|c| format_value(&c.value)).unwrap_or_default())
                .collect();
            csv_writer.write_record(&record)?;
        }
    }

    csv_writer.flush()?;
    Ok(())
}

/// Read CSV into `sheet`, writing each non-empty field at its position
/// through the normal input path. Returns the number of cells written.
pub fn read_csv<R: Read>(sheet: &mut Sheet, reader: R) -> Result<usize> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut written = 0;
    for (row_idx, record) in csv_reader.byte_records().enumerate() {
        let record = record?;
        for (col_idx, field) in record.iter().enumerate() {
            if field.is_empty() {
                continue;
            }
            let at = CellRef::new(row_idx + 1, col_idx + 1)?;
            match std::str::from_utf8(field) {
                Ok(text) => {
                    sheet.set_cell_raw_input(at, text);
                    written += 1;
                }
                Err(_) => {
                    tracing::warn!(cell = %at, "skipping CSV field that is not valid UTF-8");
                }
            }
        }
    }

    Ok(written)
}

/// Export the sheet to a CSV file.
pub fn export_csv(path: &Path, sheet: &Sheet) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(sheet, file)?;
    tracing::info!(path = %path.display(), sheet = sheet.id(), "exported CSV");
    Ok(())
}

/// Import a CSV file into the sheet.
pub fn import_csv(path: &Path, sheet: &mut Sheet) -> Result<usize> {
    super::check_size(path)?;
    let file = std::fs::File::open(path)?;
    let written = read_csv(sheet, file)?;
    tracing::info!(path = %path.display(), cells = written, "imported CSV");
    Ok(written)
}
