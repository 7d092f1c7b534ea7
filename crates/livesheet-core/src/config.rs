//! Engine configuration loaded from TOML.
//!
//! ```toml
//! [limits]
//! max_formula_len = 4096
//! max_depth = 64
//!
//! [sheet]
//! rows = 100
//! cols = 26
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use livesheet_engine::builtins::FunctionLibrary;
use livesheet_engine::engine::{DEFAULT_COLS, DEFAULT_ROWS, Evaluator, Limits};

use crate::error::{LivesheetError, Result};
use crate::storage;
use crate::workbook::Workbook;

const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576; // 1 MiB

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub limits: Limits,
    pub sheet: SheetConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SheetConfig {
    pub rows: usize,
    pub cols: usize,
}

impl Default for SheetConfig {
    fn default() -> Self {
        SheetConfig {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from `path`. The file must exist.
    pub fn load(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)?;
        if meta.len() > MAX_CONFIG_FILE_BYTES {
            return Err(LivesheetError::FileTooLarge {
                path: path.display().to_string(),
                size: meta.len(),
                max: MAX_CONFIG_FILE_BYTES,
            });
        }
        let config = EngineConfig::from_toml(&std::fs::read_to_string(path)?)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Load configuration from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            EngineConfig::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(EngineConfig::default())
        }
    }

    /// An evaluator using the system clock and RNG with these limits.
    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(FunctionLibrary::default(), self.limits)
    }

    /// An empty workbook sized and limited by this configuration.
    pub fn new_workbook(&self) -> Workbook {
        Workbook::with_settings(Arc::new(self.evaluator()), self.sheet.rows, self.sheet.cols)
    }

    /// Load a stored workbook that evaluates with these limits and adds
    /// sheets of the configured size.
    pub fn open_workbook(&self, path: &Path) -> Result<Workbook> {
        let mut workbook = storage::load_workbook(path, Arc::new(self.evaluator()))?;
        workbook.set_sheet_size(self.sheet.rows, self.sheet.cols);
        Ok(workbook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livesheet_engine::builtins::SystemClock;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_is_default() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.limits.max_formula_len, 4096);
        assert_eq!(config.limits.max_depth, 64);
        assert_eq!((config.sheet.rows, config.sheet.cols), (100, 26));
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let config = EngineConfig::from_toml("[limits]\nmax_depth = 8\n\n[sheet]\ncols = 4\n").unwrap();
        assert_eq!(config.limits.max_depth, 8);
        assert_eq!(config.limits.max_formula_len, 4096);
        assert_eq!((config.sheet.rows, config.sheet.cols), (100, 4));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml("[limits]\nmax_width = 3\n"),
            Err(LivesheetError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(
            EngineConfig::load_or_default(&path).unwrap(),
            EngineConfig::default()
        );
        assert!(matches!(
            EngineConfig::load(&path),
            Err(LivesheetError::Io(_))
        ));
    }

    #[test]
    fn test_opened_workbook_uses_configured_sheet_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.json");
        storage::save_workbook(&path, &Workbook::new(), &SystemClock).unwrap();

        let config = EngineConfig::from_toml("[sheet]\nrows = 7\ncols = 4\n").unwrap();
        let mut workbook = config.open_workbook(&path).unwrap();
        assert_eq!(workbook.sheet_size(), (7, 4));
        let stored = workbook.sheet("sheet1").unwrap();
        assert_eq!((stored.rows(), stored.cols()), (100, 26));

        let id = workbook.add_sheet(None);
        let added = workbook.sheet(&id).unwrap();
        assert_eq!((added.rows(), added.cols()), (7, 4));
    }

    #[test]
    fn test_configured_workbook_applies_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[limits]\nmax_depth = 2\n[sheet]\nrows = 3\ncols = 3\n").unwrap();
        let config = EngineConfig::load_or_default(&path).unwrap();

        let mut workbook = config.new_workbook();
        let sheet = workbook.active_sheet_mut();
        assert_eq!((sheet.rows(), sheet.cols()), (3, 3));
        sheet.set("A1", "=((1))").unwrap();
        assert!(sheet.get("A1").unwrap().unwrap().value.is_error());
        sheet.set("A2", "=(1)").unwrap();
        assert!(!sheet.get("A2").unwrap().unwrap().value.is_error());
    }
}
