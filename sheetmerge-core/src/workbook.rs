//! Workbook representation and file I/O operations.

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{MergeError, Result};
use crate::reader;
use crate::worksheet::Worksheet;
use crate::writer;

/// Title a spreadsheet application gives the single sheet of a new workbook.
pub const DEFAULT_SHEET_NAME: &str = "Sheet";

/// Longest sheet title Excel accepts.
pub const MAX_SHEET_NAME_LEN: usize = 31;

const FORBIDDEN_SHEET_NAME_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Compression level for saving workbooks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionLevel {
    /// No compression - fastest saves, largest files
    None,
    /// Fast compression (deflate level 1)
    Fast,
    /// Deflate level 6, what spreadsheet applications produce
    #[default]
    Default,
    /// Best compression (deflate level 9) - smallest files, slowest
    Best,
}

impl CompressionLevel {
    fn file_options(self) -> SimpleFileOptions {
        let options = SimpleFileOptions::default().large_file(false);
        match self {
            CompressionLevel::None => options.compression_method(CompressionMethod::Stored),
            CompressionLevel::Fast => options
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(1)),
            CompressionLevel::Default => options
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(6)),
            CompressionLevel::Best => options
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(9)),
        }
    }
}

/// Check a sheet title against Excel's rules.
pub fn validate_sheet_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MergeError::invalid_sheet_name(name, "name is empty"));
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(MergeError::invalid_sheet_name(
            name,
            format!("longer than {} characters", MAX_SHEET_NAME_LEN),
        ));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_SHEET_NAME_CHARS.contains(c)) {
        return Err(MergeError::invalid_sheet_name(
            name,
            format!("contains forbidden character '{}'", c),
        ));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(MergeError::invalid_sheet_name(
            name,
            "must not start or end with an apostrophe",
        ));
    }
    Ok(())
}

/// An Excel workbook containing worksheets.
#[derive(Debug)]
pub struct Workbook {
    /// Worksheets in tab order.
    pub worksheets: Vec<Worksheet>,
    /// Index of the sheet shown when the file is opened.
    active: usize,
    /// Compression level for saving.
    pub compression: CompressionLevel,
}

impl Workbook {
    /// Create a workbook with no sheets at all. It cannot be saved until one is added.
    pub fn new() -> Self {
        Workbook {
            worksheets: Vec::new(),
            active: 0,
            compression: CompressionLevel::default(),
        }
    }

    /// Create a workbook holding the single empty "Sheet" a spreadsheet application starts with.
    pub fn blank() -> Self {
        let mut workbook = Workbook::new();
        workbook.worksheets.push(Worksheet::new(DEFAULT_SHEET_NAME));
        workbook
    }

    /// Set compression level for saving.
    pub fn set_compression(&mut self, level: CompressionLevel) {
        self.compression = level;
    }

    /// Load a workbook from a file path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            MergeError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open file '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_archive(ZipArchive::new(BufReader::new(file))?)
    }

    /// Load a workbook from bytes (e.g., from memory or network).
    pub fn load_from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_archive(ZipArchive::new(Cursor::new(data))?)
    }

    fn from_archive<R: Read + Seek>(mut archive: ZipArchive<R>) -> Result<Self> {
        let package = reader::read_package(&mut archive)?;
        Ok(Workbook {
            worksheets: package.worksheets,
            active: package.active,
            compression: CompressionLevel::default(),
        })
    }

    /// The active worksheet: the tab selected when the file was last saved.
    pub fn active(&self) -> Result<&Worksheet> {
        self.worksheets.get(self.active).ok_or(MergeError::NoWorksheets)
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    /// Select the active sheet by index.
    pub fn set_active(&mut self, index: usize) -> Result<()> {
        if index >= self.worksheets.len() {
            return Err(MergeError::WorksheetNotFound(format!("index {}", index)));
        }
        self.active = index;
        Ok(())
    }

    /// Sheet titles in tab order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.worksheets.iter().map(Worksheet::title).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.worksheets.iter().position(|ws| ws.title() == name)
    }

    /// Get a worksheet by exact title.
    pub fn get_sheet_by_name(&self, name: &str) -> Result<&Worksheet> {
        self.position(name)
            .map(|idx| &self.worksheets[idx])
            .ok_or_else(|| MergeError::WorksheetNotFound(name.to_string()))
    }

    pub fn get_sheet_by_name_mut(&mut self, name: &str) -> Result<&mut Worksheet> {
        match self.position(name) {
            Some(idx) => Ok(&mut self.worksheets[idx]),
            None => Err(MergeError::WorksheetNotFound(name.to_string())),
        }
    }

    /// True if a sheet with this title exists, ignoring case like Excel does.
    pub fn contains_sheet(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.worksheets.iter().any(|ws| ws.title().to_lowercase() == name)
    }

    /// Append a new empty worksheet.
    pub fn create_sheet(&mut self, name: &str) -> Result<&mut Worksheet> {
        validate_sheet_name(name)?;
        if self.contains_sheet(name) {
            return Err(MergeError::WorksheetAlreadyExists(name.to_string()));
        }
        self.worksheets.push(Worksheet::new(name));
        let idx = self.worksheets.len() - 1;
        Ok(&mut self.worksheets[idx])
    }

    /// Remove a worksheet by title.
    pub fn remove_sheet(&mut self, name: &str) -> Result<()> {
        let idx = self
            .position(name)
            .ok_or_else(|| MergeError::WorksheetNotFound(name.to_string()))?;
        self.worksheets.remove(idx);
        if self.active > idx || self.active >= self.worksheets.len() {
            self.active = self.active.saturating_sub(1);
        }
        Ok(())
    }

    /// Save the workbook to a file.
    ///
    /// The package is staged in a temporary file next to `path` and renamed over it
    /// once complete, so a failed save leaves any existing file untouched.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(staged.as_file_mut());
            self.save_to_writer(&mut writer)?;
            writer.flush()?;
        }
        staged.persist(path).map_err(|e| MergeError::Io(e.error))?;
        Ok(())
    }

    /// Save the workbook to an in-memory byte vector.
    pub fn save_to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.save_to_writer(&mut buffer)?;
        Ok(buffer.into_inner())
    }

    /// Save the workbook to any writer that implements Write + Seek.
    pub fn save_to_writer<W: Write + Seek>(&self, writer: W) -> Result<()> {
        if self.worksheets.is_empty() {
            return Err(MergeError::NoWorksheets);
        }
        let mut zip = ZipWriter::new(writer);
        self.write_workbook_contents(&mut zip)?;
        zip.finish()?;
        Ok(())
    }

    fn write_workbook_contents<W: Write + Seek>(&self, zip: &mut ZipWriter<W>) -> Result<()> {
        let options = self.compression.file_options();
        let names = self.sheet_names();
        let active = self.active.min(self.worksheets.len() - 1);

        let shared = writer::collect_shared_strings(&self.worksheets);
        let styles = writer::collect_styles(&self.worksheets);

        writer::write_content_types(zip, options, self.worksheets.len(), !shared.is_empty())?;
        writer::write_rels(zip, options)?;
        writer::write_doc_props(zip, options, &names)?;
        writer::write_workbook_xml(zip, options, &names, active)?;
        writer::write_workbook_rels(zip, options, self.worksheets.len(), !shared.is_empty())?;
        if !shared.is_empty() {
            writer::write_shared_strings(zip, options, &shared)?;
        }
        writer::write_styles_xml(zip, options, &styles.registry)?;

        for (idx, worksheet) in self.worksheets.iter().enumerate() {
            writer::write_worksheet_xml(zip, options, worksheet, idx + 1, idx == active, &shared, &styles)?;
        }
        log::debug!(
            "wrote {} sheet(s), {} shared string(s), {} cell format(s)",
            self.worksheets.len(),
            shared.strings.len(),
            styles.registry.cell_xfs.len()
        );
        Ok(())
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;
    use crate::style::{Alignment, Border, BorderSide, CellStyle, Color, Fill, Font};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_workbook_new() {
        let wb = Workbook::blank();
        assert_eq!(wb.sheet_names(), vec![DEFAULT_SHEET_NAME]);
        assert_eq!(wb.active().unwrap().title(), DEFAULT_SHEET_NAME);
        assert!(Workbook::new().worksheets.is_empty());
        assert!(Workbook::new().active().is_err());
    }

    #[test]
    fn test_create_sheet() {
        let mut wb = Workbook::new();
        wb.create_sheet("Sheet1").unwrap();
        assert_eq!(wb.sheet_names(), vec!["Sheet1"]);
    }

    #[test]
    fn test_create_sheet_duplicate_ignores_case() {
        let mut wb = Workbook::new();
        wb.create_sheet("Budget").unwrap();
        assert!(matches!(
            wb.create_sheet("BUDGET"),
            Err(MergeError::WorksheetAlreadyExists(_))
        ));
    }

    #[test]
    fn test_validate_sheet_name() {
        assert!(validate_sheet_name("Q1 2024").is_ok());
        assert!(validate_sheet_name(&"x".repeat(31)).is_ok());
        assert!(validate_sheet_name("").is_err());
        assert!(validate_sheet_name(&"x".repeat(32)).is_err());
        assert!(validate_sheet_name("a/b").is_err());
        assert!(validate_sheet_name("what?").is_err());
        assert!(validate_sheet_name("'quoted'").is_err());
        assert!(validate_sheet_name("it's").is_ok());
    }

    #[test]
    fn test_get_sheet_by_name() {
        let mut wb = Workbook::new();
        wb.create_sheet("MySheet").unwrap();
        assert_eq!(wb.get_sheet_by_name("MySheet").unwrap().title(), "MySheet");
        assert!(wb.get_sheet_by_name("Other").is_err());
        wb.get_sheet_by_name_mut("MySheet").unwrap().set_cell_value(1, 1, 1.0);
    }

    #[test]
    fn test_remove_sheet_keeps_active_in_range() {
        let mut wb = Workbook::blank();
        wb.create_sheet("Sheet2").unwrap();
        wb.set_active(1).unwrap();
        wb.remove_sheet("Sheet").unwrap();
        assert_eq!(wb.sheet_names(), vec!["Sheet2"]);
        assert_eq!(wb.active_index(), 0);
        assert!(wb.remove_sheet("Missing").is_err());
    }

    #[test]
    fn test_save_blank_workbook_fails() {
        assert!(matches!(Workbook::new().save_to_bytes(), Err(MergeError::NoWorksheets)));
    }

    #[test]
    fn test_save_to_bytes() {
        let mut wb = Workbook::blank();
        let ws = wb.get_sheet_by_name_mut(DEFAULT_SHEET_NAME).unwrap();
        ws.set_cell_value(1, 1, "Hello");
        ws.set_cell_value(1, 2, 42.0);
        ws.set_cell_value(2, 1, true);

        let bytes = wb.save_to_bytes().unwrap();
        assert!(bytes.len() > 4);
        assert_eq!(&bytes[0..2], b"PK");
    }

    #[test]
    fn test_bytes_roundtrip_with_multiple_sheets() {
        let mut wb = Workbook::new();
        wb.create_sheet("North").unwrap().set_cell_value(1, 1, "North Data");
        let ws = wb.create_sheet("South & West").unwrap();
        ws.set_cell_value(1, 1, "South Data");
        ws.set_cell_value(2, 2, 999.0);
        ws.set_cell_value(3, 1, CellValue::Formula("B2*2".into()));
        ws.set_cell_value(4, 1, CellValue::Error("#N/A".into()));
        wb.set_active(1).unwrap();

        let wb2 = Workbook::load_from_bytes(&wb.save_to_bytes().unwrap()).unwrap();
        assert_eq!(wb2.sheet_names(), vec!["North", "South & West"]);
        assert_eq!(wb2.active_index(), 1);

        let south = wb2.active().unwrap();
        assert_eq!(south.get_cell_value(1, 1), Some(&CellValue::text("South Data")));
        assert_eq!(south.get_cell_value(2, 2), Some(&CellValue::Number(999.0)));
        assert_eq!(south.get_cell_value(3, 1), Some(&CellValue::Formula("B2*2".into())));
        assert_eq!(south.get_cell_value(4, 1), Some(&CellValue::Error("#N/A".into())));
    }

    #[test]
    fn test_style_and_layout_roundtrip() {
        let style = CellStyle::new()
            .with_font(Font::new().with_name("Arial").with_size(12.0).with_bold(true).with_color(Color::rgb("FF1F4E79")))
            .with_fill(Fill::solid(Color::rgb("FFFFF2CC")))
            .with_border(Border::all(BorderSide::thin().with_color(Color::Indexed(64))))
            .with_alignment(Alignment::new().with_horizontal("center").with_wrap_text(true))
            .with_number_format("#,##0.00 \"EUR\"");

        let mut wb = Workbook::blank();
        let ws = wb.get_sheet_by_name_mut(DEFAULT_SHEET_NAME).unwrap();
        ws.set_cell_value(2, 3, 1234.5);
        ws.set_cell_style(2, 3, style.clone());
        ws.set_cell_style(5, 5, style.clone());
        ws.set_column_width(3, 22.0);
        ws.set_row_height(2, 28.0);
        ws.set_row_hidden(4, true);
        ws.merge_cells("A1:C1").unwrap();

        for level in [CompressionLevel::None, CompressionLevel::Best] {
            wb.set_compression(level);
            let loaded = Workbook::load_from_bytes(&wb.save_to_bytes().unwrap()).unwrap();
            let ws = loaded.active().unwrap();

            let cell = ws.get_cell(2, 3).unwrap();
            assert_eq!(cell.value, CellValue::Number(1234.5));
            let loaded_style = cell.style.as_deref().unwrap();
            assert_eq!(loaded_style.font, style.font);
            assert_eq!(loaded_style.fill, style.fill);
            assert_eq!(loaded_style.border, style.border);
            assert_eq!(loaded_style.alignment, style.alignment);
            assert_eq!(loaded_style.number_format, style.number_format);

            assert!(ws.get_cell(5, 5).unwrap().value.is_empty());
            assert_eq!(ws.column_dimension(3).unwrap().width, Some(22.0));
            assert_eq!(ws.row_dimension(2).unwrap().height, Some(28.0));
            assert!(ws.row_dimension(4).unwrap().hidden);
            assert_eq!(ws.merged_ranges()[0].to_string(), "A1:C1");
        }
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");

        let mut wb = Workbook::blank();
        wb.get_sheet_by_name_mut(DEFAULT_SHEET_NAME)
            .unwrap()
            .set_cell_value(1, 1, "  padded  ");
        wb.save(&path).unwrap();

        let loaded = Workbook::load(&path).unwrap();
        assert_eq!(
            loaded.active().unwrap().get_cell_value(1, 1),
            Some(&CellValue::text("  padded  "))
        );
        assert!(Workbook::load(dir.path().join("missing.xlsx")).is_err());
    }

    #[test]
    fn test_failed_save_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        std::fs::write(&path, b"previous output").unwrap();

        assert!(matches!(Workbook::new().save(&path), Err(MergeError::NoWorksheets)));
        assert_eq!(std::fs::read(&path).unwrap(), b"previous output");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        Workbook::blank().save(&path).unwrap();
        assert_eq!(Workbook::load(&path).unwrap().sheet_names(), vec![DEFAULT_SHEET_NAME]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_load_garbage_fails() {
        assert!(matches!(
            Workbook::load_from_bytes(b"not a zip archive"),
            Err(MergeError::Zip(_))
        ));
    }
}
