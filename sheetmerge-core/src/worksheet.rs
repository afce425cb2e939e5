//! Worksheet representation: sparse cell grid, merged regions and dimension overrides.

#[cfg(feature = "fast-hash")]
use hashbrown::HashMap;
#[cfg(not(feature = "fast-hash"))]
use std::collections::HashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cell::CellValue;
use crate::coordinate::{parse_coordinate, CellRange, CellRef};
use crate::error::Result;
use crate::style::CellStyle;

/// Pack (row, column) into one map key; row in the high half so keys sort row-major.
#[inline]
pub fn cell_key(row: u32, column: u32) -> u64 {
    ((row as u64) << 32) | column as u64
}

/// Inverse of [`cell_key`].
#[inline]
pub fn split_cell_key(key: u64) -> (u32, u32) {
    ((key >> 32) as u32, key as u32)
}

/// Contents of a single cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellData {
    pub value: CellValue,
    pub style: Option<Arc<CellStyle>>,
}

impl CellData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: CellValue) -> Self {
        CellData { value, style: None }
    }
}

/// Width/visibility override for one column.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnDimension {
    /// Width in characters of the default font.
    pub width: Option<f64>,
    pub hidden: bool,
}

/// Height/visibility override for one row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowDimension {
    /// Height in points.
    pub height: Option<f64>,
    pub hidden: bool,
}

/// A single worksheet.
#[derive(Clone, Debug, Default)]
pub struct Worksheet {
    title: String,
    pub cells: HashMap<u64, CellData>,
    pub merged_cells: Vec<CellRange>,
    pub column_dimensions: BTreeMap<u32, ColumnDimension>,
    pub row_dimensions: BTreeMap<u32, RowDimension>,
}

impl Worksheet {
    pub fn new<S: Into<String>>(title: S) -> Self {
        Worksheet {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn get_cell(&self, row: u32, column: u32) -> Option<&CellData> {
        self.cells.get(&cell_key(row, column))
    }

    pub fn get_cell_value(&self, row: u32, column: u32) -> Option<&CellValue> {
        self.get_cell(row, column).map(|cell| &cell.value)
    }

    /// Look up a cell by reference; a missing cell reads as empty.
    pub fn value_at(&self, cell: CellRef) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.get_cell_value(cell.row, cell.column).unwrap_or(&EMPTY)
    }

    pub fn get_or_create_cell_mut(&mut self, row: u32, column: u32) -> &mut CellData {
        self.cells.entry(cell_key(row, column)).or_default()
    }

    pub fn set_cell_value<V: Into<CellValue>>(&mut self, row: u32, column: u32, value: V) {
        self.get_or_create_cell_mut(row, column).value = value.into();
    }

    pub fn set_cell_style(&mut self, row: u32, column: u32, style: CellStyle) {
        self.get_or_create_cell_mut(row, column).style = Some(Arc::new(style));
    }

    pub fn set_cell_data(&mut self, row: u32, column: u32, data: CellData) {
        self.cells.insert(cell_key(row, column), data);
    }

    /// Declare a merged region, e.g. `"A1:C2"`.
    pub fn merge_cells(&mut self, range: &str) -> Result<()> {
        let range: CellRange = range.parse()?;
        self.add_merged_range(range);
        Ok(())
    }

    pub fn add_merged_range(&mut self, range: CellRange) {
        if !range.is_single_cell() && !self.merged_cells.contains(&range) {
            self.merged_cells.push(range);
        }
    }

    pub fn merged_ranges(&self) -> &[CellRange] {
        &self.merged_cells
    }

    pub fn set_column_width(&mut self, column: u32, width: f64) {
        self.column_dimensions.entry(column).or_default().width = Some(width);
    }

    pub fn set_column_hidden(&mut self, column: u32, hidden: bool) {
        self.column_dimensions.entry(column).or_default().hidden = hidden;
    }

    pub fn column_dimension(&self, column: u32) -> Option<&ColumnDimension> {
        self.column_dimensions.get(&column)
    }

    pub fn set_row_height(&mut self, row: u32, height: f64) {
        self.row_dimensions.entry(row).or_default().height = Some(height);
    }

    pub fn set_row_hidden(&mut self, row: u32, hidden: bool) {
        self.row_dimensions.entry(row).or_default().hidden = hidden;
    }

    pub fn row_dimension(&self, row: u32) -> Option<&RowDimension> {
        self.row_dimensions.get(&row)
    }

    /// Populated bounding rectangle as `(min_row, min_col, max_row, max_col)`.
    ///
    /// An empty sheet reports `(1, 1, 1, 1)`, the same as a spreadsheet application.
    pub fn dimensions(&self) -> (u32, u32, u32, u32) {
        if self.cells.is_empty() {
            return (1, 1, 1, 1);
        }
        let mut dims = (u32::MAX, u32::MAX, 0, 0);
        for &key in self.cells.keys() {
            let (row, col) = split_cell_key(key);
            dims.0 = dims.0.min(row);
            dims.1 = dims.1.min(col);
            dims.2 = dims.2.max(row);
            dims.3 = dims.3.max(col);
        }
        dims
    }

    pub fn max_row(&self) -> u32 {
        self.dimensions().2
    }

    pub fn max_column(&self) -> u32 {
        self.dimensions().3
    }

    /// Dimension reference such as "A1:D20".
    pub fn dimension_ref(&self) -> String {
        let (min_row, min_col, max_row, max_col) = self.dimensions();
        CellRange::new((min_row, min_col), (max_row, max_col)).to_string()
    }

    /// Cell keys in row-major order.
    pub fn sorted_keys(&self) -> Vec<u64> {
        let mut keys: Vec<u64> = self.cells.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Set a cell value by coordinate string, e.g. `ws.set("B2", 3.0)`.
    pub fn set<V: Into<CellValue>>(&mut self, coord: &str, value: V) -> Result<()> {
        let (row, col) = parse_coordinate(coord)?;
        self.set_cell_value(row, col, value);
        Ok(())
    }
}
