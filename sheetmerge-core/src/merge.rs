//! Merge driver: open each source, name and copy its sheet, then save once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::MergeConfig;
use crate::copy::copy_sheet;
use crate::enumerate::list_workbooks;
use crate::error::{MergeError, Result};
use crate::workbook::{Workbook, DEFAULT_SHEET_NAME};

/// One sheet written to the target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedSheet {
    pub source: PathBuf,
    pub sheet_name: String,
}

/// Outcome of a successful run.
#[derive(Clone, Debug)]
pub struct MergeSummary {
    pub target_path: PathBuf,
    pub sheets: Vec<MergedSheet>,
}

/// Accumulates the target workbook for one run.
pub struct Merger<'a> {
    config: &'a MergeConfig,
    target: Workbook,
    /// Lowercased names already taken in the target.
    used_names: HashSet<String>,
    /// The blank "Sheet" the target starts with is still present.
    placeholder: bool,
    sheets: Vec<MergedSheet>,
}

impl<'a> Merger<'a> {
    pub fn new(config: &'a MergeConfig) -> Self {
        let mut target = Workbook::blank();
        target.set_compression(config.compression);
        Merger {
            config,
            target,
            used_names: HashSet::new(),
            placeholder: true,
            sheets: Vec::new(),
        }
    }

    /// Open `path`, derive its sheet name and copy its active sheet into the target.
    pub fn add_source(&mut self, path: &Path) -> Result<&str> {
        let source = Workbook::load(path).map_err(|e| MergeError::SourceRead {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;

        let index = self.sheets.len();
        let name = self
            .config
            .naming
            .sheet_name(index, &source)
            .inspect_err(|e| log::warn!("{}: {}", path.display(), e))?;
        self.claim_name(&name)?;

        if self.placeholder && name.eq_ignore_ascii_case(DEFAULT_SHEET_NAME) {
            self.drop_placeholder()?;
        }

        let sheet = source.active()?;
        let dest = self.target.create_sheet(&name)?;
        copy_sheet(sheet, dest);
        log::info!(
            "{} -> \"{}\" ({} cells, {} merged ranges)",
            path.display(),
            name,
            sheet.cells.len(),
            sheet.merged_ranges().len()
        );

        self.sheets.push(MergedSheet {
            source: path.to_path_buf(),
            sheet_name: name,
        });
        Ok(&self.sheets[index].sheet_name)
    }

    fn claim_name(&mut self, name: &str) -> Result<()> {
        if !self.used_names.insert(name.to_lowercase()) {
            return Err(MergeError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    fn drop_placeholder(&mut self) -> Result<()> {
        if self.placeholder {
            log::debug!("removing placeholder sheet \"{}\"", DEFAULT_SHEET_NAME);
            self.target.remove_sheet(DEFAULT_SHEET_NAME)?;
            self.placeholder = false;
        }
        Ok(())
    }

    /// Remove the unused placeholder and return the finished workbook.
    pub fn into_workbook(mut self) -> Result<(Workbook, Vec<MergedSheet>)> {
        if self.sheets.is_empty() {
            return Err(MergeError::NoWorksheets);
        }
        self.drop_placeholder()?;
        Ok((self.target, self.sheets))
    }
}

/// Run a whole merge: enumerate, copy every source, save the target.
///
/// Nothing is written unless every source was merged.
pub fn merge_workbooks(config: &MergeConfig) -> Result<MergeSummary> {
    let paths = list_workbooks(&config.source_dir, Some(&config.target_path))?;

    let mut merger = Merger::new(config);
    for path in &paths {
        merger.add_source(path)?;
    }
    let (workbook, sheets) = merger.into_workbook()?;

    log::info!(
        "saving {} sheet(s) to {}",
        workbook.worksheets.len(),
        config.target_path.display()
    );
    workbook.save(&config.target_path)?;

    Ok(MergeSummary {
        target_path: config.target_path.clone(),
        sheets,
    })
}
