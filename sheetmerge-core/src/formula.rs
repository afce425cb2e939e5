//! Shared formula expansion.
//!
//! Excel stores a filled-down formula once, on the anchor cell of a shared group
//! (`<f t="shared" ref="B1:B9" si="0">A1*2</f>`), and leaves every other member with
//! an empty `<f t="shared" si="0"/>`. Each member's own formula is the anchor formula
//! with its relative references moved by the member's offset from the anchor.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::coordinate::{column_to_letter, letter_to_column, MAX_COLUMN, MAX_ROW};

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?P<sheet>(?:'(?:[^']|'')+'|[A-Za-z0-9_.]+)!)?(?P<col_abs>\$?)(?P<col>[A-Za-z]{1,3})(?P<row_abs>\$?)(?P<row>[0-9]+)",
        )
        .expect("reference pattern is valid")
    })
}

/// Move the relative A1 references in `formula` by `row_shift` rows and `col_shift`
/// columns. `$`-anchored parts stay put, string literals are left alone and a
/// reference pushed off the grid becomes `#REF!`.
pub fn translate_shared_formula(formula: &str, row_shift: i64, col_shift: i64) -> String {
    if row_shift == 0 && col_shift == 0 {
        return formula.to_string();
    }
    // Odd segments sit between double quotes ("" escapes split into empty segments).
    formula
        .split('"')
        .enumerate()
        .map(|(idx, segment)| {
            if idx % 2 == 1 {
                segment.to_string()
            } else {
                shift_segment(segment, row_shift, col_shift)
            }
        })
        .collect::<Vec<_>>()
        .join("\"")
}

fn shift_segment(segment: &str, row_shift: i64, col_shift: i64) -> String {
    reference_pattern()
        .replace_all(segment, |caps: &Captures| {
            let whole = &caps[0];
            if !is_standalone(segment, caps) {
                return whole.to_string();
            }
            shift_reference(caps, row_shift, col_shift).unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

/// Reject matches that are really part of a name or function call, e.g. `LOG10(`.
fn is_standalone(segment: &str, caps: &Captures) -> bool {
    let Some(whole) = caps.get(0) else {
        return false;
    };
    let identifier = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.';
    let before = segment[..whole.start()].chars().next_back();
    let after = segment[whole.end()..].chars().next();
    !before.is_some_and(|c| identifier(c) || c == '\'')
        && !after.is_some_and(|c| identifier(c) || c == '(' || c == '!')
}

fn shift_reference(caps: &Captures, row_shift: i64, col_shift: i64) -> Option<String> {
    let sheet = caps.name("sheet").map_or("", |m| m.as_str());
    let col_abs = !caps["col_abs"].is_empty();
    let row_abs = !caps["row_abs"].is_empty();
    let col = i64::from(letter_to_column(&caps["col"]).ok()?);
    let row: i64 = caps["row"].parse().ok()?;
    if row == 0 || row > i64::from(MAX_ROW) {
        return None;
    }

    let new_col = if col_abs { col } else { col + col_shift };
    let new_row = if row_abs { row } else { row + row_shift };
    if !(1..=i64::from(MAX_COLUMN)).contains(&new_col) || !(1..=i64::from(MAX_ROW)).contains(&new_row) {
        return Some(format!("{}#REF!", sheet));
    }

    let mut out = String::with_capacity(caps[0].len() + 2);
    out.push_str(sheet);
    if col_abs {
        out.push('$');
    }
    out.push_str(&column_to_letter(new_col as u32));
    if row_abs {
        out.push('$');
    }
    out.push_str(&new_row.to_string());
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_relative_references_move() {
        assert_eq!(translate_shared_formula("A1*2", 1, 0), "A2*2");
        assert_eq!(translate_shared_formula("SUM(A1:C1)", 4, 1), "SUM(B5:D5)");
        assert_eq!(translate_shared_formula("A1+B2", 0, 0), "A1+B2");
    }

    #[test]
    fn test_absolute_parts_stay() {
        assert_eq!(translate_shared_formula("$A$1*B1", 2, 3), "$A$1*E3");
        assert_eq!(translate_shared_formula("$A1+A$1", 2, 3), "$A3+D$1");
    }

    #[test]
    fn test_sheet_qualified_references() {
        assert_eq!(translate_shared_formula("Data!B2+'Q1 2024'!C3", 1, 0), "Data!B3+'Q1 2024'!C4");
        assert_eq!(translate_shared_formula("'It''s'!A1", 0, 1), "'It''s'!B1");
    }

    #[test]
    fn test_functions_names_and_literals_untouched() {
        assert_eq!(translate_shared_formula("LOG10(A1)", 1, 0), "LOG10(A2)");
        assert_eq!(translate_shared_formula("IF(A1=\"B2\",1,0)", 1, 0), "IF(A2=\"B2\",1,0)");
        assert_eq!(translate_shared_formula("\"say \"\"A1\"\"\"&A1", 1, 0), "\"say \"\"A1\"\"\"&A2");
        assert_eq!(translate_shared_formula("Rate2024*A1", 1, 0), "Rate2024*A2");
    }

    #[test]
    fn test_off_grid_becomes_ref_error() {
        assert_eq!(translate_shared_formula("A1", -1, 0), "#REF!");
        assert_eq!(translate_shared_formula("Data!A2", 0, -1), "Data!#REF!");
        assert_eq!(translate_shared_formula("XFD1", 0, 1), "#REF!");
    }
}
