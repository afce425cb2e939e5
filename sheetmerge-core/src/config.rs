//! Merge options and their validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::coordinate::CellRef;
use crate::error::{MergeError, Result};
use crate::naming::{NameMode, NamingStrategy};
use crate::workbook::CompressionLevel;

/// Extension of the files read and written.
pub const WORKBOOK_EXTENSION: &str = "xlsx";

fn name_cell_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z]+[0-9]+$").expect("name cell pattern is valid"))
}

/// Unvalidated merge options, as collected from the command line.
///
/// ```no_run
/// use sheetmerge_core::{merge_workbooks, MergeOptions, NameMode};
///
/// let config = MergeOptions::new("reports/2024", "out/combined")
///     .with_name_mode(NameMode::FromCell)
///     .with_name_cell("A1")
///     .resolve()?;
/// let summary = merge_workbooks(&config)?;
/// println!("{} sheets", summary.sheets.len());
/// # Ok::<(), sheetmerge_core::MergeError>(())
/// ```
#[derive(Clone, Debug)]
pub struct MergeOptions {
    pub source_dir: PathBuf,
    pub target: PathBuf,
    pub name_mode: NameMode,
    pub name_cell: Option<String>,
    pub compression: CompressionLevel,
}

impl MergeOptions {
    pub fn new(source_dir: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        MergeOptions {
            source_dir: source_dir.into(),
            target: target.into(),
            name_mode: NameMode::default(),
            name_cell: None,
            compression: CompressionLevel::default(),
        }
    }

    pub fn with_name_mode(mut self, mode: NameMode) -> Self {
        self.name_mode = mode;
        self
    }

    pub fn with_name_cell(mut self, cell: impl Into<String>) -> Self {
        self.name_cell = Some(cell.into());
        self
    }

    pub fn with_compression(mut self, level: CompressionLevel) -> Self {
        self.compression = level;
        self
    }

    /// Validate the options and prepare the target location.
    ///
    /// Creates the target's parent directory when it does not exist yet.
    pub fn resolve(&self) -> Result<MergeConfig> {
        if !self.source_dir.is_dir() {
            return Err(MergeError::config(format!(
                "source directory \"{}\" does not exist or is not a directory",
                self.source_dir.display()
            )));
        }

        let naming = self.naming_strategy()?;
        let target_path = normalize_target(&self.target)?;

        if let Some(parent) = target_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                log::debug!("creating target directory {}", parent.display());
                fs::create_dir_all(parent)?;
            }
        }

        Ok(MergeConfig {
            source_dir: self.source_dir.clone(),
            target_path,
            naming,
            compression: self.compression,
        })
    }

    fn naming_strategy(&self) -> Result<NamingStrategy> {
        match self.name_mode {
            NameMode::Sequential => Ok(NamingStrategy::Sequential),
            NameMode::FromSheetName => Ok(NamingStrategy::FromSheetName),
            NameMode::FromCell => {
                let cell = self
                    .name_cell
                    .as_deref()
                    .map(str::trim)
                    .ok_or_else(|| MergeError::config("name mode from_cell requires a name cell (-c/--name-cell)"))?;
                if !name_cell_pattern().is_match(cell) {
                    return Err(MergeError::config(format!(
                        "name cell \"{}\" must be column letters followed by a row number, e.g. B12",
                        cell
                    )));
                }
                let cell: CellRef = cell
                    .parse()
                    .map_err(|_| MergeError::config(format!("name cell \"{}\" is outside the sheet grid", cell)))?;
                Ok(NamingStrategy::FromCell(cell))
            }
        }
    }
}

/// Append the workbook extension when missing; reject any other extension.
pub fn normalize_target(target: &Path) -> Result<PathBuf> {
    if target.as_os_str().is_empty() {
        return Err(MergeError::config("target path is empty"));
    }
    match target.extension() {
        None => {
            let mut path = target.as_os_str().to_owned();
            path.push(".");
            path.push(WORKBOOK_EXTENSION);
            Ok(PathBuf::from(path))
        }
        Some(ext) if ext == WORKBOOK_EXTENSION => Ok(target.to_path_buf()),
        Some(ext) => Err(MergeError::config(format!(
            "target extension \".{}\" is not supported, expected .{}",
            ext.to_string_lossy(),
            WORKBOOK_EXTENSION
        ))),
    }
}

/// Validated settings for one merge run.
#[derive(Clone, Debug)]
pub struct MergeConfig {
    pub source_dir: PathBuf,
    pub target_path: PathBuf,
    pub naming: NamingStrategy,
    pub compression: CompressionLevel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target(Path::new("out")).unwrap(), PathBuf::from("out.xlsx"));
        assert_eq!(
            normalize_target(Path::new("dir/out.xlsx")).unwrap(),
            PathBuf::from("dir/out.xlsx")
        );
        assert!(matches!(normalize_target(Path::new("out.csv")), Err(MergeError::Config(_))));
        assert!(matches!(normalize_target(Path::new("out.XLSX")), Err(MergeError::Config(_))));
        assert!(normalize_target(Path::new("")).is_err());
    }

    #[test]
    fn test_name_cell_pattern() {
        let pattern = name_cell_pattern();
        assert!(pattern.is_match("B7"));
        assert!(pattern.is_match("aa100"));
        assert!(!pattern.is_match("12A"));
        assert!(!pattern.is_match("B"));
        assert!(!pattern.is_match("B7C"));
        assert!(!pattern.is_match("$B$7"));
    }

    #[test]
    fn test_resolve_from_cell() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/deeper/merged");

        let options = MergeOptions::new(dir.path(), &target).with_name_mode(NameMode::FromCell);
        assert!(matches!(options.resolve(), Err(MergeError::Config(_))));
        assert!(matches!(
            options.clone().with_name_cell("12A").resolve(),
            Err(MergeError::Config(_))
        ));
        assert!(matches!(
            options.clone().with_name_cell("XFE1").resolve(),
            Err(MergeError::Config(_))
        ));

        let config = options.with_name_cell("B7").resolve().unwrap();
        assert_eq!(config.naming, NamingStrategy::FromCell(CellRef::new(7, 2)));
        assert_eq!(config.target_path, dir.path().join("nested/deeper/merged.xlsx"));
        assert!(dir.path().join("nested/deeper").is_dir());
    }

    #[test]
    fn test_resolve_missing_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let options = MergeOptions::new(dir.path().join("absent"), dir.path().join("out"));
        assert!(matches!(options.resolve(), Err(MergeError::Config(_))));

        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            MergeOptions::new(&file, dir.path().join("out")).resolve(),
            Err(MergeError::Config(_))
        ));
    }

    #[test]
    fn test_name_cell_ignored_outside_from_cell() {
        let dir = tempfile::tempdir().unwrap();
        let config = MergeOptions::new(dir.path(), dir.path().join("out.xlsx"))
            .with_name_cell("not a cell")
            .with_compression(CompressionLevel::Best)
            .resolve()
            .unwrap();
        assert_eq!(config.naming, NamingStrategy::Sequential);
        assert_eq!(config.compression, CompressionLevel::Best);
    }
}
