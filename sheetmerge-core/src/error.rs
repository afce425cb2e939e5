//! Error type shared by the workbook layer and the merge pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while resolving options, reading sources or writing the target.
#[derive(Error, Debug)]
pub enum MergeError {
    /// Invalid or missing arguments.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The source directory holds no workbook files.
    #[error("No .xlsx files found in \"{}\"", .0.display())]
    NoInput(PathBuf),

    /// Two sources produced the same target sheet name.
    #[error("Source sheet name already exists (duplicate): \"{0}\"")]
    DuplicateName(String),

    /// A source file could not be opened or parsed as a workbook.
    #[error("Failed to read source workbook \"{}\": {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: Box<MergeError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parse error: {0}")]
    ParseError(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Worksheet not found: {0}")]
    WorksheetNotFound(String),

    #[error("Worksheet already exists: {0}")]
    WorksheetAlreadyExists(String),

    #[error("Invalid sheet name \"{name}\": {reason}")]
    InvalidSheetName { name: String, reason: String },

    #[error("Workbook contains no worksheets")]
    NoWorksheets,
}

impl MergeError {
    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        MergeError::Config(msg.into())
    }

    pub(crate) fn invalid_sheet_name<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        MergeError::InvalidSheetName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn xml(context: &str, err: quick_xml::Error) -> Self {
        MergeError::ParseError(format!("{}: {}", context, err))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MergeError>;
