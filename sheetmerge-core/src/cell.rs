//! Cell values.

use std::fmt;
use std::sync::Arc;

/// Shared string storage; one allocation per distinct shared-string table entry.
pub type InternedString = Arc<str>;

/// The value held by a cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    String(InternedString),
    Number(f64),
    Boolean(bool),
    /// ISO 8601 text as stored in `t="d"` cells.
    Date(String),
    /// Formula text without the leading `=`.
    Formula(String),
    /// Error literal such as `#N/A` or `#DIV/0!`.
    Error(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Convenience constructor for string cells.
    pub fn text<S: AsRef<str>>(s: S) -> Self {
        CellValue::String(Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::text(s)
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(Arc::from(s))
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

/// Renders the value the way a spreadsheet shows it in the formula bar.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::String(s) => f.write_str(s),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Boolean(true) => f.write_str("TRUE"),
            CellValue::Boolean(false) => f.write_str("FALSE"),
            CellValue::Date(d) => f.write_str(d),
            CellValue::Formula(formula) => write!(f, "={}", formula),
            CellValue::Error(e) => f.write_str(e),
        }
    }
}
