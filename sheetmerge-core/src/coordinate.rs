//! A1-style cell references and rectangular ranges.

use std::fmt;
use std::str::FromStr;

use crate::error::{MergeError, Result};

/// Last column Excel can address (XFD).
pub const MAX_COLUMN: u32 = 16_384;
/// Last row Excel can address.
pub const MAX_ROW: u32 = 1_048_576;

/// Parse a coordinate such as `b"AB12"` into `(row, column)`, both 1-based.
///
/// Letters are case-insensitive. Returns `None` for anything outside the Excel grid.
#[inline]
pub fn parse_coordinate_bytes(bytes: &[u8]) -> Option<(u32, u32)> {
    let split = bytes.iter().position(|b| !b.is_ascii_alphabetic())?;
    let (letters, digits) = bytes.split_at(split);
    if letters.is_empty() {
        return None;
    }

    let mut column: u32 = 0;
    for &b in letters {
        let value = (b.to_ascii_uppercase() - b'A' + 1) as u32;
        column = column.checked_mul(26)?.checked_add(value)?;
        if column > MAX_COLUMN {
            return None;
        }
    }

    let row = parse_u32_bytes(digits)?;
    if row == 0 || row > MAX_ROW {
        return None;
    }

    Some((row, column))
}

/// Parse a coordinate string into `(row, column)`.
pub fn parse_coordinate(coord: &str) -> Result<(u32, u32)> {
    let coord = coord.trim();
    parse_coordinate_bytes(coord.as_bytes())
        .ok_or_else(|| MergeError::InvalidCoordinate(coord.to_string()))
}

/// Parse an unsigned integer without going through `str`.
#[inline]
pub fn parse_u32_bytes(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    bytes.iter().try_fold(0u32, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add((b - b'0') as u32)
    })
}

/// Column letters to 1-based index ("A" -> 1, "XFD" -> 16384).
pub fn letter_to_column(letters: &str) -> Result<u32> {
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(MergeError::InvalidCoordinate(format!(
            "invalid column letters '{}'",
            letters
        )));
    }
    // Reuse the coordinate parser with a dummy row.
    parse_coordinate_bytes(format!("{}1", letters).as_bytes())
        .map(|(_, col)| col)
        .ok_or_else(|| {
            MergeError::InvalidCoordinate(format!(
                "column '{}' exceeds the maximum (XFD = {})",
                letters, MAX_COLUMN
            ))
        })
}

/// 1-based column index to letters (1 -> "A", 28 -> "AB").
pub fn column_to_letter(column: u32) -> String {
    let mut letters = Vec::with_capacity(3);
    let mut col = column;
    while col > 0 {
        col -= 1;
        letters.push(b'A' + (col % 26) as u8);
        col /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Build "B7" from `(7, 2)`.
pub fn coordinate_from_row_col(row: u32, column: u32) -> String {
    format!("{}{}", column_to_letter(column), row)
}

/// A single validated cell reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub row: u32,
    pub column: u32,
}

impl CellRef {
    pub fn new(row: u32, column: u32) -> Self {
        CellRef { row, column }
    }
}

impl FromStr for CellRef {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        let (row, column) = parse_coordinate(s)?;
        Ok(CellRef { row, column })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_to_letter(self.column), self.row)
    }
}

/// Inclusive rectangular range, e.g. a merged region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub min_row: u32,
    pub min_col: u32,
    pub max_row: u32,
    pub max_col: u32,
}

impl CellRange {
    /// Build a range from two corners given in any order.
    pub fn new(start: (u32, u32), end: (u32, u32)) -> Self {
        CellRange {
            min_row: start.0.min(end.0),
            min_col: start.1.min(end.1),
            max_row: start.0.max(end.0),
            max_col: start.1.max(end.1),
        }
    }

    pub fn contains(&self, row: u32, column: u32) -> bool {
        (self.min_row..=self.max_row).contains(&row) && (self.min_col..=self.max_col).contains(&column)
    }

    /// True when the range covers one cell only.
    pub fn is_single_cell(&self) -> bool {
        self.min_row == self.max_row && self.min_col == self.max_col
    }
}

impl FromStr for CellRange {
    type Err = MergeError;

    /// Accepts "A1:B10" and single-cell "C3".
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once(':') {
            Some((start, end)) => Ok(CellRange::new(parse_coordinate(start)?, parse_coordinate(end)?)),
            None => {
                let cell = parse_coordinate(s)?;
                Ok(CellRange::new(cell, cell))
            }
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = coordinate_from_row_col(self.min_row, self.min_col);
        if self.is_single_cell() {
            return f.write_str(&start);
        }
        write!(f, "{}:{}", start, coordinate_from_row_col(self.max_row, self.max_col))
    }
}
