//! Error types for Livesheet core.

use thiserror::Error;

use livesheet_engine::error::AddressError;

/// Errors that can occur while managing or persisting a workbook
#[derive(Error, Debug)]
pub enum LivesheetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("No sheet with id {0:?}")]
    NoSuchSheet(String),

    #[error("Cannot remove the last sheet")]
    LastSheet,

    #[error("Cell stored at {0} does not match its own address")]
    InconsistentCell(String),

    #[error("Workbook snapshot has no sheets")]
    EmptyWorkbook,

    #[error("Refusing to read {path}: file too large ({size} bytes, max {max})")]
    FileTooLarge { path: String, size: u64, max: u64 },
}

pub type Result<T> = std::result::Result<T, LivesheetError>;
