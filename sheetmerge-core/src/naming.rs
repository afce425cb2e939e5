//! Target sheet naming.

use std::fmt;
use std::str::FromStr;

use crate::cell::CellValue;
use crate::coordinate::CellRef;
use crate::error::{MergeError, Result};
use crate::workbook::{validate_sheet_name, Workbook};

/// How target sheets are named, as chosen on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NameMode {
    /// "Sheet 1", "Sheet 2", ...
    #[default]
    Sequential,
    /// The title of the source workbook's first sheet.
    FromSheetName,
    /// The value of a fixed cell on the source sheet.
    FromCell,
}

impl NameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            NameMode::Sequential => "sequential",
            NameMode::FromSheetName => "from_sheet_name",
            NameMode::FromCell => "from_cell",
        }
    }
}

impl FromStr for NameMode {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sequential" => Ok(NameMode::Sequential),
            "from_sheet_name" => Ok(NameMode::FromSheetName),
            "from_cell" => Ok(NameMode::FromCell),
            other => Err(MergeError::config(format!(
                "unknown name mode '{}' (expected sequential, from_sheet_name or from_cell)",
                other
            ))),
        }
    }
}

impl fmt::Display for NameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved naming strategy. `FromCell` carries the already validated reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamingStrategy {
    Sequential,
    FromSheetName,
    FromCell(CellRef),
}

impl NamingStrategy {
    pub fn mode(&self) -> NameMode {
        match self {
            NamingStrategy::Sequential => NameMode::Sequential,
            NamingStrategy::FromSheetName => NameMode::FromSheetName,
            NamingStrategy::FromCell(_) => NameMode::FromCell,
        }
    }

    /// Name for the sheet copied from `source`, the `index`-th file of the run (0-based).
    ///
    /// Uniqueness across the run is checked by the caller.
    pub fn sheet_name(&self, index: usize, source: &Workbook) -> Result<String> {
        let name = match self {
            NamingStrategy::Sequential => format!("Sheet {}", index + 1),
            NamingStrategy::FromSheetName => source
                .worksheets
                .first()
                .map(|ws| ws.title().to_string())
                .ok_or(MergeError::NoWorksheets)?,
            NamingStrategy::FromCell(cell) => {
                let value = source.active()?.value_at(*cell);
                match value {
                    CellValue::Empty => {
                        return Err(MergeError::invalid_sheet_name(
                            "",
                            format!("name cell {} is empty", cell),
                        ))
                    }
                    CellValue::Formula(_) | CellValue::Error(_) => {
                        return Err(MergeError::invalid_sheet_name(
                            value.to_string(),
                            format!("name cell {} holds a formula or error, not a value", cell),
                        ))
                    }
                    other => other.to_string(),
                }
            }
        };
        validate_sheet_name(&name)?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str) -> Workbook {
        let mut wb = Workbook::new();
        let ws = wb.create_sheet(title).unwrap();
        ws.set("B2", "North").unwrap();
        ws.set("C3", 2024.0).unwrap();
        ws.set("D4", CellValue::Formula("A1".into())).unwrap();
        ws.set("E5", "bad/name").unwrap();
        wb
    }

    #[test]
    fn test_name_mode_parse() {
        assert_eq!("from_cell".parse::<NameMode>().unwrap(), NameMode::FromCell);
        assert_eq!(NameMode::FromSheetName.to_string(), "from_sheet_name");
        assert_eq!(NameMode::default(), NameMode::Sequential);
        assert!(matches!("fromcell".parse::<NameMode>(), Err(MergeError::Config(_))));
    }

    #[test]
    fn test_sequential() {
        let wb = source("Data");
        assert_eq!(NamingStrategy::Sequential.sheet_name(0, &wb).unwrap(), "Sheet 1");
        assert_eq!(NamingStrategy::Sequential.sheet_name(9, &wb).unwrap(), "Sheet 10");
    }

    #[test]
    fn test_from_sheet_name_uses_first_sheet() {
        let mut wb = source("Data");
        wb.create_sheet("Other").unwrap();
        wb.set_active(1).unwrap();
        assert_eq!(NamingStrategy::FromSheetName.sheet_name(0, &wb).unwrap(), "Data");
    }

    #[test]
    fn test_from_cell() {
        let wb = source("Data");
        let by_cell = |coord: &str| NamingStrategy::FromCell(coord.parse().unwrap()).sheet_name(0, &wb);

        assert_eq!(by_cell("B2").unwrap(), "North");
        assert_eq!(by_cell("C3").unwrap(), "2024");
        assert!(matches!(by_cell("A1"), Err(MergeError::InvalidSheetName { .. })));
        assert!(matches!(by_cell("D4"), Err(MergeError::InvalidSheetName { .. })));
        assert!(matches!(by_cell("E5"), Err(MergeError::InvalidSheetName { .. })));
    }

    #[test]
    fn test_strategy_mode() {
        let strategy = NamingStrategy::FromCell(CellRef::new(1, 1));
        assert_eq!(strategy.mode(), NameMode::FromCell);
    }
}
