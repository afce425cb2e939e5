//! Worksheet content copy.

use crate::worksheet::{split_cell_key, Worksheet};

/// Copy the populated rectangle of `source` into `dest` at the same coordinates.
///
/// Values and styles of cells in rows `1..=max_row` and columns `1..=max_col` are
/// copied, together with the width and hidden state of those columns, the height and
/// hidden state of those rows, and every merged region. Styles are shared, not cloned.
pub fn copy_sheet(source: &Worksheet, dest: &mut Worksheet) {
    let (_, _, max_row, max_col) = source.dimensions();

    dest.cells.reserve(source.cells.len());
    for (&key, cell) in &source.cells {
        let (row, col) = split_cell_key(key);
        if row <= max_row && col <= max_col {
            dest.set_cell_data(row, col, cell.clone());
        }
    }

    for (&col, dim) in source.column_dimensions.range(1..=max_col) {
        dest.column_dimensions.insert(col, dim.clone());
    }
    for (&row, dim) in source.row_dimensions.range(1..=max_row) {
        dest.row_dimensions.insert(row, dim.clone());
    }

    for range in source.merged_ranges() {
        dest.add_merged_range(*range);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;
    use crate::style::{CellStyle, Color, Fill};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_copy_values_styles_and_layout() {
        let mut source = Worksheet::new("Source");
        source.set_cell_value(1, 1, "Header");
        source.set_cell_value(3, 4, 12.5);
        source.set_cell_style(3, 4, CellStyle::new().with_fill(Fill::solid(Color::rgb("FFFFFF00"))));
        source.set_column_width(2, 30.0);
        source.set_column_width(9, 5.0);
        source.set_row_height(3, 40.0);
        source.set_row_hidden(2, true);
        source.set_row_height(50, 12.0);
        source.merge_cells("A1:D1").unwrap();

        let mut dest = Worksheet::new("Dest");
        copy_sheet(&source, &mut dest);

        assert_eq!(dest.get_cell_value(1, 1), Some(&CellValue::text("Header")));
        assert_eq!(dest.get_cell(3, 4), source.get_cell(3, 4));
        assert!(Arc::ptr_eq(
            dest.get_cell(3, 4).unwrap().style.as_ref().unwrap(),
            source.get_cell(3, 4).unwrap().style.as_ref().unwrap(),
        ));
        assert_eq!(dest.cells.len(), 2);
        assert_eq!(dest.dimensions(), source.dimensions());

        assert_eq!(dest.column_dimension(2).unwrap().width, Some(30.0));
        assert!(dest.column_dimension(9).is_none());
        assert_eq!(dest.row_dimension(3).unwrap().height, Some(40.0));
        assert!(dest.row_dimension(2).unwrap().hidden);
        assert!(dest.row_dimension(50).is_none());
        assert_eq!(dest.merged_ranges(), source.merged_ranges());
        assert_eq!(dest.title(), "Dest");
    }

    #[test]
    fn test_copy_empty_sheet() {
        let source = Worksheet::new("Empty");
        let mut dest = Worksheet::new("Dest");
        copy_sheet(&source, &mut dest);
        assert!(dest.cells.is_empty());
        assert!(dest.merged_ranges().is_empty());
    }
}
