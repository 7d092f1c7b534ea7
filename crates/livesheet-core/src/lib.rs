//! livesheet-core - Workbook model, storage and configuration.

pub mod config;
pub mod error;
pub mod storage;
pub mod workbook;

pub use config::EngineConfig;
pub use error::{LivesheetError, Result};
pub use workbook::{SharedWorkbook, Workbook};

pub use livesheet_engine::engine::{CellRef, Sheet};
