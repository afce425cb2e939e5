//! Source file discovery.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::WORKBOOK_EXTENSION;
use crate::error::{MergeError, Result};

/// Prefix Excel gives the lock file of an open workbook.
const LOCK_FILE_PREFIX: &str = "~$";

/// List the workbook files directly inside `dir`, sorted by path.
///
/// `exclude` is skipped when present so that a target written into the source
/// directory is not merged into itself on the next run.
pub fn list_workbooks(dir: &Path, exclude: Option<&Path>) -> Result<Vec<PathBuf>> {
    let exclude = exclude.and_then(|path| fs::canonicalize(path).ok());
    let mut paths = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != WORKBOOK_EXTENSION) {
            continue;
        }
        if !entry.file_type()?.is_file() && !path.is_file() {
            log::warn!("skipping {}: not a regular file", path.display());
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(LOCK_FILE_PREFIX) {
            log::warn!("skipping {}: Excel lock file", path.display());
            continue;
        }
        if exclude.is_some() && fs::canonicalize(&path).ok() == exclude {
            log::warn!("skipping {}: it is the merge target", path.display());
            continue;
        }
        paths.push(path);
    }

    if paths.is_empty() {
        return Err(MergeError::NoInput(dir.to_path_buf()));
    }
    paths.sort();
    log::info!("found {} workbook(s) in {}", paths.len(), dir.display());
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_lists_sorted_xlsx_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.xlsx");
        touch(dir.path(), "a.xlsx");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "legacy.xls");
        touch(dir.path(), "macro.xlsm");
        touch(dir.path(), "~$a.xlsx");
        fs::create_dir(dir.path().join("folder.xlsx")).unwrap();

        let found = list_workbooks(dir.path(), None).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.xlsx", "b.xlsx"]);
    }

    #[test]
    fn test_excludes_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = touch(dir.path(), "source.xlsx");
        let target = touch(dir.path(), "merged.xlsx");

        let found = list_workbooks(dir.path(), Some(&target)).unwrap();
        assert_eq!(found, vec![source]);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "readme.md");
        assert!(matches!(list_workbooks(dir.path(), None), Err(MergeError::NoInput(_))));
    }
}
