//! Merge the active sheet of every `.xlsx` workbook in a directory into one workbook.
//!
//! The crate carries its own small xlsx layer (`zip` + `quick-xml`) covering what a
//! sheet copy needs: values, formulas (shared groups expanded per cell), styles, merged
//! ranges and row/column dimensions.
//!
//! ```no_run
//! use sheetmerge_core::{merge_workbooks, MergeOptions};
//!
//! let config = MergeOptions::new("inbox", "merged.xlsx").resolve()?;
//! for sheet in merge_workbooks(&config)?.sheets {
//!     println!("{} -> {}", sheet.source.display(), sheet.sheet_name);
//! }
//! # Ok::<(), sheetmerge_core::MergeError>(())
//! ```

pub mod cell;
pub mod config;
pub mod coordinate;
pub mod copy;
pub mod enumerate;
pub mod error;
pub mod formula;
pub mod merge;
pub mod naming;
mod reader;
pub mod style;
pub mod workbook;
pub mod worksheet;
mod writer;

pub use cell::CellValue;
pub use config::{normalize_target, MergeConfig, MergeOptions, WORKBOOK_EXTENSION};
pub use coordinate::{CellRange, CellRef};
pub use copy::copy_sheet;
pub use enumerate::list_workbooks;
pub use error::{MergeError, Result};
pub use formula::translate_shared_formula;
pub use merge::{merge_workbooks, MergeSummary, MergedSheet, Merger};
pub use naming::{NameMode, NamingStrategy};
pub use style::{Alignment, Border, BorderSide, CellStyle, Color, Fill, Font, Protection};
pub use workbook::{validate_sheet_name, CompressionLevel, Workbook, DEFAULT_SHEET_NAME};
pub use worksheet::{CellData, Worksheet};
