//! xlsx package reader.
//!
//! Parses the parts needed to reproduce a sheet's grid and formatting:
//! `workbook.xml` (sheet order, active tab), its relationships, the shared string
//! table, `styles.xml` and every worksheet. Drawings, comments, defined names and
//! other parts are ignored.

use std::collections::HashMap;
use std::io::{BufRead, Cursor, Read, Seek};
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::cell::{CellValue, InternedString};
use crate::coordinate::{parse_coordinate_bytes, parse_u32_bytes, CellRange};
use crate::error::{MergeError, Result};
use crate::formula::translate_shared_formula;
use crate::style::{
    Alignment, Border, BorderSide, CellStyle, CellXf, Color, Fill, Font, Protection, StyleRegistry,
};
use crate::worksheet::{CellData, Worksheet};

const REL_SHARED_STRINGS: &str = "/sharedStrings";
const REL_STYLES: &str = "/styles";

/// Upper bound for pre-allocating the cell map from a `<dimension>` hint.
const MAX_RESERVE_CELLS: u64 = 1 << 20;

/// Sheets and view state read from `xl/workbook.xml` and its relationships.
pub(crate) struct Package {
    pub worksheets: Vec<Worksheet>,
    pub active: usize,
}

struct SheetEntry {
    name: String,
    rel_id: String,
}

struct Relationship {
    id: String,
    rel_type: String,
    target: String,
}

/// Read a whole package from a ZIP archive.
pub(crate) fn read_package<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Package> {
    let workbook_xml = read_part(archive, "xl/workbook.xml")?;
    let (sheets, active) = parse_workbook_xml(Cursor::new(&workbook_xml))?;
    if sheets.is_empty() {
        return Err(MergeError::NoWorksheets);
    }

    let rels = match read_part(archive, "xl/_rels/workbook.xml.rels") {
        Ok(xml) => parse_relationships(Cursor::new(&xml))?,
        Err(_) => Vec::new(),
    };

    let shared_strings = match read_optional_part(archive, &rels, REL_SHARED_STRINGS, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(Cursor::new(&xml))?,
        None => Vec::new(),
    };

    let styles: Vec<Arc<CellStyle>> = match read_optional_part(archive, &rels, REL_STYLES, "xl/styles.xml")? {
        Some(xml) => {
            let registry = parse_styles(Cursor::new(&xml))?;
            (0..registry.cell_xfs.len())
                .filter_map(|idx| registry.cell_style(idx))
                .map(Arc::new)
                .collect()
        }
        None => Vec::new(),
    };

    let mut worksheets = Vec::with_capacity(sheets.len());
    for (idx, entry) in sheets.iter().enumerate() {
        let path = rels
            .iter()
            .find(|rel| rel.id == entry.rel_id)
            .map(|rel| part_path(&rel.target))
            .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", idx + 1));
        let xml = read_part(archive, &path)?;

        let mut worksheet = Worksheet::new(entry.name.clone());
        parse_worksheet(Cursor::new(&xml), &shared_strings, &styles, &mut worksheet)?;
        log::debug!(
            "parsed sheet '{}' from {} ({} cells)",
            entry.name,
            path,
            worksheet.cells.len()
        );
        worksheets.push(worksheet);
    }

    let active = if active < worksheets.len() { active } else { 0 };
    Ok(Package { worksheets, active })
}

/// Resolve a relationship target (relative to `xl/`, or package-absolute) to a ZIP entry name.
fn part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Vec<u8>> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| MergeError::InvalidFormat(format!("missing {} in archive: {}", path, e)))?;
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read a part located through a relationship type, falling back to its conventional path.
fn read_optional_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    rels: &[Relationship],
    rel_suffix: &str,
    default_path: &str,
) -> Result<Option<Vec<u8>>> {
    let path = rels
        .iter()
        .find(|rel| rel.rel_type.ends_with(rel_suffix))
        .map(|rel| part_path(&rel.target))
        .unwrap_or_else(|| default_path.to_string());
    let mut file = match archive.by_name(&path) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)?;
    Ok(Some(buf))
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| match a.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
        })
}

fn attr_u32(e: &BytesStart, key: &[u8]) -> Option<u32> {
    attr(e, key).and_then(|s| s.trim().parse().ok())
}

fn attr_f64(e: &BytesStart, key: &[u8]) -> Option<f64> {
    attr(e, key).and_then(|s| s.trim().parse().ok())
}

fn attr_bool(e: &BytesStart, key: &[u8]) -> bool {
    matches!(attr(e, key).as_deref(), Some("1") | Some("true"))
}

/// Toggle elements like `<b/>` default to on; `<b val="0"/>` turns them off.
fn toggle_on(e: &BytesStart) -> bool {
    !matches!(attr(e, b"val").as_deref(), Some("0") | Some("false"))
}

fn parse_color(e: &BytesStart) -> Option<Color> {
    if let Some(rgb) = attr(e, b"rgb") {
        Some(Color::Rgb(rgb))
    } else if let Some(index) = attr_u32(e, b"theme") {
        Some(Color::Theme {
            index,
            tint: attr_f64(e, b"tint"),
        })
    } else if let Some(index) = attr_u32(e, b"indexed") {
        Some(Color::Indexed(index))
    } else if attr_bool(e, b"auto") {
        Some(Color::Auto)
    } else {
        None
    }
}

fn parse_workbook_xml<R: BufRead>(reader: R) -> Result<(Vec<SheetEntry>, usize)> {
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut active: Option<usize> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"sheet" => {
                    if let (Some(name), Some(rel_id)) = (attr(&e, b"name"), attr(&e, b"id")) {
                        sheets.push(SheetEntry { name, rel_id });
                    }
                }
                b"workbookView" => {
                    // Only the first view decides the active tab.
                    if active.is_none() {
                        active = Some(attr_u32(&e, b"activeTab").unwrap_or(0) as usize);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(MergeError::xml("workbook.xml", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok((sheets, active.unwrap_or(0)))
}

fn parse_relationships<R: BufRead>(reader: R) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                        rels.push(Relationship {
                            id,
                            rel_type: attr(&e, b"Type").unwrap_or_default(),
                            target,
                        });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(MergeError::xml("workbook.xml.rels", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

fn parse_shared_strings<R: BufRead>(reader: R) -> Result<Vec<InternedString>> {
    let mut reader = Reader::from_reader(reader);
    // Whitespace inside <t> is significant.
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_t = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(Arc::from(""));
                }
            }
            Ok(Event::Text(e)) => {
                if in_t && !in_phonetic {
                    let text = e.unescape().map_err(|err| MergeError::xml("sharedStrings.xml", err))?;
                    current.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if in_t && !in_phonetic {
                    current.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                b"si" => {
                    strings.push(Arc::from(current.as_str()));
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(MergeError::xml("sharedStrings.xml", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

#[derive(Clone, Copy, PartialEq)]
enum StyleSection {
    None,
    NumFmts,
    Fonts,
    Fills,
    Borders,
    CellXfs,
    /// cellStyleXfs, dxfs, colors, ... whose children must not leak into the tables above.
    Other,
}

/// Builder state for the element currently open inside a section.
struct StyleParser {
    section: StyleSection,
    registry: StyleRegistry,
    font: Option<Font>,
    fill: Option<Fill>,
    border: Option<Border>,
    side: Option<(Vec<u8>, BorderSide)>,
    xf: Option<CellXf>,
}

impl StyleParser {
    fn new() -> Self {
        StyleParser {
            section: StyleSection::None,
            registry: StyleRegistry {
                fonts: Vec::new(),
                fills: Vec::new(),
                borders: Vec::new(),
                num_fmts: Vec::new(),
                cell_xfs: Vec::new(),
            },
            font: None,
            fill: None,
            border: None,
            side: None,
            xf: None,
        }
    }

    fn section_for(name: &[u8]) -> Option<StyleSection> {
        match name {
            b"numFmts" => Some(StyleSection::NumFmts),
            b"fonts" => Some(StyleSection::Fonts),
            b"fills" => Some(StyleSection::Fills),
            b"borders" => Some(StyleSection::Borders),
            b"cellXfs" => Some(StyleSection::CellXfs),
            b"cellStyleXfs" | b"cellStyles" | b"dxfs" | b"tableStyles" | b"colors" | b"extLst" => {
                Some(StyleSection::Other)
            }
            _ => None,
        }
    }

    /// Handle an opening tag; `empty` is true for self-closing elements.
    fn open(&mut self, e: &BytesStart, empty: bool) {
        let local = e.local_name();
        let name = local.as_ref();

        if self.section == StyleSection::None || self.section == StyleSection::Other {
            if let Some(section) = Self::section_for(name) {
                if !empty && self.section == StyleSection::None {
                    self.section = section;
                }
            }
            return;
        }

        match self.section {
            StyleSection::NumFmts if name == b"numFmt" => {
                if let (Some(id), Some(code)) = (attr_u32(e, b"numFmtId"), attr(e, b"formatCode")) {
                    self.registry.num_fmts.push((id, code));
                }
            }
            StyleSection::Fonts => match name {
                b"font" if empty => self.registry.fonts.push(Font::default()),
                b"font" => self.font = Some(Font::default()),
                _ => {
                    if let Some(font) = self.font.as_mut() {
                        apply_font_property(font, e);
                    }
                }
            },
            StyleSection::Fills => match name {
                b"fill" if empty => self.registry.fills.push(Fill::default()),
                b"fill" => self.fill = Some(Fill::default()),
                b"patternFill" => {
                    if let Some(fill) = self.fill.as_mut() {
                        fill.pattern_type = attr(e, b"patternType");
                    }
                }
                b"fgColor" => {
                    if let Some(fill) = self.fill.as_mut() {
                        fill.fg_color = parse_color(e);
                    }
                }
                b"bgColor" => {
                    if let Some(fill) = self.fill.as_mut() {
                        fill.bg_color = parse_color(e);
                    }
                }
                _ => {}
            },
            StyleSection::Borders => match name {
                b"border" => {
                    let border = Border {
                        diagonal_up: attr_bool(e, b"diagonalUp"),
                        diagonal_down: attr_bool(e, b"diagonalDown"),
                        ..Default::default()
                    };
                    if empty {
                        self.registry.borders.push(border);
                    } else {
                        self.border = Some(border);
                    }
                }
                b"color" => {
                    if let Some((_, side)) = self.side.as_mut() {
                        side.color = parse_color(e);
                    }
                }
                edge => {
                    let style = attr(e, b"style");
                    if let (Some(border), Some(style)) = (self.border.as_mut(), style) {
                        let side = BorderSide::new(style);
                        if empty {
                            if let Some(slot) = border.side_mut(edge) {
                                *slot = Some(side);
                            }
                        } else {
                            self.side = Some((edge.to_vec(), side));
                        }
                    }
                }
            },
            StyleSection::CellXfs => match name {
                b"xf" => {
                    let xf = CellXf {
                        num_fmt_id: attr_u32(e, b"numFmtId").unwrap_or(0),
                        font_id: attr_u32(e, b"fontId").unwrap_or(0) as usize,
                        fill_id: attr_u32(e, b"fillId").unwrap_or(0) as usize,
                        border_id: attr_u32(e, b"borderId").unwrap_or(0) as usize,
                        alignment: None,
                        protection: None,
                    };
                    if empty {
                        self.registry.cell_xfs.push(xf);
                    } else {
                        self.xf = Some(xf);
                    }
                }
                b"alignment" => {
                    if let Some(xf) = self.xf.as_mut() {
                        xf.alignment = Some(Alignment {
                            horizontal: attr(e, b"horizontal"),
                            vertical: attr(e, b"vertical"),
                            wrap_text: attr_bool(e, b"wrapText"),
                            shrink_to_fit: attr_bool(e, b"shrinkToFit"),
                            text_rotation: attr_u32(e, b"textRotation"),
                            indent: attr_u32(e, b"indent"),
                        });
                    }
                }
                b"protection" => {
                    if let Some(xf) = self.xf.as_mut() {
                        xf.protection = Some(Protection {
                            locked: attr(e, b"locked").map_or(true, |v| v == "1" || v == "true"),
                            hidden: attr_bool(e, b"hidden"),
                        });
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        if Self::section_for(name) == Some(self.section) {
            self.section = StyleSection::None;
            return;
        }

        match (self.section, name) {
            (StyleSection::Fonts, b"font") => {
                if let Some(font) = self.font.take() {
                    self.registry.fonts.push(font);
                }
            }
            (StyleSection::Fills, b"fill") => {
                if let Some(fill) = self.fill.take() {
                    self.registry.fills.push(fill);
                }
            }
            (StyleSection::Borders, b"border") => {
                if let Some(border) = self.border.take() {
                    self.registry.borders.push(border);
                }
            }
            (StyleSection::Borders, edge) => {
                if let Some((open_edge, side)) = self.side.take() {
                    if open_edge == edge {
                        if let Some(slot) = self.border.as_mut().and_then(|b| b.side_mut(edge)) {
                            *slot = Some(side);
                        }
                    } else {
                        self.side = Some((open_edge, side));
                    }
                }
            }
            (StyleSection::CellXfs, b"xf") => {
                if let Some(xf) = self.xf.take() {
                    self.registry.cell_xfs.push(xf);
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> StyleRegistry {
        let mut registry = self.registry;
        let defaults = StyleRegistry::new();
        if registry.fonts.is_empty() {
            registry.fonts = defaults.fonts;
        }
        if registry.fills.is_empty() {
            registry.fills = defaults.fills;
        }
        if registry.borders.is_empty() {
            registry.borders = defaults.borders;
        }
        if registry.cell_xfs.is_empty() {
            registry.cell_xfs = defaults.cell_xfs;
        }
        registry
    }
}

fn apply_font_property(font: &mut Font, e: &BytesStart) {
    match e.local_name().as_ref() {
        b"b" => font.bold = toggle_on(e),
        b"i" => font.italic = toggle_on(e),
        b"strike" => font.strike = toggle_on(e),
        b"u" => {
            font.underline = match attr(e, b"val") {
                Some(kind) if kind == "none" => None,
                Some(kind) => Some(kind),
                None => Some("single".to_string()),
            }
        }
        b"sz" => font.size = attr_f64(e, b"val"),
        b"name" | b"rFont" => font.name = attr(e, b"val"),
        b"color" => font.color = parse_color(e),
        b"vertAlign" => font.vert_align = attr(e, b"val"),
        b"family" => font.family = attr_u32(e, b"val"),
        b"scheme" => font.scheme = attr(e, b"val"),
        _ => {}
    }
}

/// Parse `styles.xml` into index tables.
pub(crate) fn parse_styles<R: BufRead>(reader: R) -> Result<StyleRegistry> {
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut parser = StyleParser::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => parser.open(&e, false),
            Ok(Event::Empty(e)) => parser.open(&e, true),
            Ok(Event::End(e)) => parser.close(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(MergeError::xml("styles.xml", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(parser.finish())
}

/// Raw pieces of a `<c>` element collected until its end tag.
#[derive(Default)]
struct PendingCell {
    row: u32,
    column: u32,
    kind: Option<String>,
    style_id: Option<u32>,
    raw: Option<String>,
    formula: Option<String>,
    /// `si` of a `<f t="shared">` group this cell belongs to.
    shared_index: Option<u32>,
}

impl PendingCell {
    fn into_value(self, shared_strings: &[InternedString]) -> Result<CellValue> {
        if let Some(formula) = self.formula.filter(|f| !f.is_empty()) {
            return Ok(CellValue::Formula(formula));
        }
        let kind = self.kind.as_deref().unwrap_or("n");
        let Some(raw) = self.raw else {
            return Ok(match kind {
                "s" | "inlineStr" | "str" => CellValue::text(""),
                _ => CellValue::Empty,
            });
        };
        Ok(match kind {
            "s" => {
                let idx: usize = raw
                    .trim()
                    .parse()
                    .map_err(|_| MergeError::ParseError(format!("invalid shared string index '{}'", raw)))?;
                let s = shared_strings.get(idx).ok_or_else(|| {
                    MergeError::ParseError(format!("shared string index {} out of range", idx))
                })?;
                CellValue::String(s.clone())
            }
            "b" => CellValue::Boolean(matches!(raw.trim(), "1" | "true")),
            "d" => CellValue::Date(raw),
            "e" => CellValue::Error(raw),
            "str" | "inlineStr" => CellValue::from(raw),
            _ => match raw.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::from(raw),
            },
        })
    }
}

fn reserve_from_dimension(worksheet: &mut Worksheet, e: &BytesStart) {
    let Some(range) = attr(e, b"ref").and_then(|r| r.parse::<CellRange>().ok()) else {
        return;
    };
    let rows = (range.max_row - range.min_row + 1) as u64;
    let cols = (range.max_col - range.min_col + 1) as u64;
    let cells = rows.saturating_mul(cols);
    if cells <= MAX_RESERVE_CELLS {
        worksheet.cells.reserve(cells as usize);
    }
}

fn apply_col(worksheet: &mut Worksheet, e: &BytesStart) {
    let Some(min) = attr_u32(e, b"min") else {
        return;
    };
    let max = attr_u32(e, b"max").unwrap_or(min).max(min);
    let width = attr_f64(e, b"width");
    let hidden = attr_bool(e, b"hidden");
    if width.is_none() && !hidden {
        return;
    }
    for col in min..=max.min(crate::coordinate::MAX_COLUMN) {
        let dim = worksheet.column_dimensions.entry(col).or_default();
        dim.width = width;
        dim.hidden = hidden;
    }
}

/// Anchor of a shared formula group.
struct SharedFormula {
    formula: String,
    row: u32,
    column: u32,
}

/// Cursor state while walking `sheetData`.
struct SheetParser<'a> {
    worksheet: &'a mut Worksheet,
    shared_strings: &'a [InternedString],
    styles: &'a [Arc<CellStyle>],
    current_row: u32,
    next_col: u32,
    cell: Option<PendingCell>,
    shared_formulas: HashMap<u32, SharedFormula>,
    in_v: bool,
    in_f: bool,
    in_t: bool,
    in_phonetic: bool,
}

impl SheetParser<'_> {
    fn open(&mut self, e: &BytesStart, empty: bool) -> Result<()> {
        match e.local_name().as_ref() {
            b"v" if !empty => self.in_v = true,
            b"f" => {
                if let Some(pending) = self.cell.as_mut() {
                    if attr(e, b"t").as_deref() == Some("shared") {
                        pending.shared_index = attr_u32(e, b"si");
                    }
                }
                self.in_f = !empty;
            }
            b"t" if !empty => self.in_t = true,
            b"rPh" if !empty => self.in_phonetic = true,
            b"dimension" => reserve_from_dimension(self.worksheet, e),
            b"col" => apply_col(self.worksheet, e),
            b"mergeCell" => {
                if let Some(range) = attr(e, b"ref").and_then(|r| r.parse::<CellRange>().ok()) {
                    self.worksheet.add_merged_range(range);
                }
            }
            b"row" => {
                self.current_row = attr_u32(e, b"r").unwrap_or(self.current_row + 1);
                self.next_col = 1;
                let height = attr_f64(e, b"ht");
                let hidden = attr_bool(e, b"hidden");
                if height.is_some() || hidden {
                    let dim = self.worksheet.row_dimensions.entry(self.current_row).or_default();
                    dim.height = height;
                    dim.hidden = hidden;
                }
            }
            b"c" => {
                let (row, column) = attr(e, b"r")
                    .and_then(|r| parse_coordinate_bytes(r.as_bytes()))
                    .unwrap_or((self.current_row.max(1), self.next_col));
                self.next_col = column + 1;
                let pending = PendingCell {
                    row,
                    column,
                    kind: attr(e, b"t"),
                    style_id: attr(e, b"s").and_then(|s| parse_u32_bytes(s.as_bytes())),
                    ..Default::default()
                };
                if empty {
                    self.store(pending)?;
                } else {
                    self.cell = Some(pending);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let Some(pending) = self.cell.as_mut() else {
            return;
        };
        if self.in_f {
            pending.formula.get_or_insert_with(String::new).push_str(text);
        } else if self.in_v || (self.in_t && !self.in_phonetic) {
            pending.raw.get_or_insert_with(String::new).push_str(text);
        }
    }

    fn close(&mut self, name: &[u8]) -> Result<()> {
        match name {
            b"v" => self.in_v = false,
            b"f" => self.in_f = false,
            b"t" => self.in_t = false,
            b"rPh" => self.in_phonetic = false,
            b"c" => {
                if let Some(pending) = self.cell.take() {
                    self.store(pending)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Record a group anchor, or give a group member its own copy of the anchor formula.
    fn resolve_shared_formula(&mut self, pending: &mut PendingCell) {
        let Some(si) = pending.shared_index else {
            return;
        };
        match pending.formula.as_deref().filter(|f| !f.is_empty()) {
            Some(formula) => {
                self.shared_formulas.insert(
                    si,
                    SharedFormula {
                        formula: formula.to_string(),
                        row: pending.row,
                        column: pending.column,
                    },
                );
            }
            None => match self.shared_formulas.get(&si) {
                Some(anchor) => {
                    pending.formula = Some(translate_shared_formula(
                        &anchor.formula,
                        i64::from(pending.row) - i64::from(anchor.row),
                        i64::from(pending.column) - i64::from(anchor.column),
                    ));
                }
                None => log::warn!(
                    "shared formula {} referenced before its anchor at row {}, column {}; keeping the cached value",
                    si,
                    pending.row,
                    pending.column
                ),
            },
        }
    }

    fn store(&mut self, mut pending: PendingCell) -> Result<()> {
        self.resolve_shared_formula(&mut pending);
        let (row, column) = (pending.row, pending.column);
        let style = pending
            .style_id
            .and_then(|id| self.styles.get(id as usize).cloned());
        let value = pending.into_value(self.shared_strings)?;
        // Unstyled empty cells carry nothing worth keeping.
        if value.is_empty() && style.is_none() {
            return Ok(());
        }
        self.worksheet.set_cell_data(row, column, CellData { value, style });
        Ok(())
    }
}

/// Parse one worksheet part into `worksheet`.
pub(crate) fn parse_worksheet<R: BufRead>(
    reader: R,
    shared_strings: &[InternedString],
    styles: &[Arc<CellStyle>],
    worksheet: &mut Worksheet,
) -> Result<()> {
    let mut reader = Reader::from_reader(reader);
    // Cell text keeps its whitespace.
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut parser = SheetParser {
        worksheet,
        shared_strings,
        styles,
        current_row: 0,
        next_col: 1,
        cell: None,
        shared_formulas: HashMap::new(),
        in_v: false,
        in_f: false,
        in_t: false,
        in_phonetic: false,
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => parser.open(&e, false)?,
            Ok(Event::Empty(e)) => parser.open(&e, true)?,
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| MergeError::xml("worksheet", err))?;
                parser.text(&text);
            }
            Ok(Event::CData(e)) => parser.text(&String::from_utf8_lossy(&e)),
            Ok(Event::End(e)) => parser.close(e.local_name().as_ref())?,
            Ok(Event::Eof) => break,
            Err(e) => return Err(MergeError::xml("worksheet", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workbook_xml_active_tab() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"
          xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <bookViews><workbookView activeTab="1"/></bookViews>
  <sheets>
    <sheet name="Summary" sheetId="1" r:id="rId1"/>
    <sheet name="R&amp;D" sheetId="2" r:id="rId2"/>
  </sheets>
</workbook>"#;
        let (sheets, active) = parse_workbook_xml(&xml[..]).unwrap();
        assert_eq!(active, 1);
        let names: Vec<_> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Summary", "R&D"]);
        assert_eq!(sheets[1].rel_id, "rId2");
    }

    #[test]
    fn test_part_path() {
        assert_eq!(part_path("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(part_path("/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
    }

    #[test]
    fn test_shared_strings_rich_text_and_phonetic() {
        let xml = br#"<sst count="3" uniqueCount="3">
  <si><t xml:space="preserve"> padded </t></si>
  <si><r><t>Bold</t></r><r><t> tail</t></r><rPh sb="0" eb="1"><t>skip</t></rPh></si>
  <si/>
</sst>"#;
        let strings = parse_shared_strings(&xml[..]).unwrap();
        let strings: Vec<&str> = strings.iter().map(|s| s.as_ref()).collect();
        assert_eq!(strings, vec![" padded ", "Bold tail", ""]);
    }

    #[test]
    fn test_parse_styles() {
        let xml = br#"<styleSheet>
  <numFmts count="1"><numFmt numFmtId="164" formatCode="0.000"/></numFmts>
  <fonts count="2">
    <font><sz val="11"/><name val="Calibri"/></font>
    <font><b/><i val="0"/><u/><sz val="14"/><color rgb="FFFF0000"/><name val="Arial"/></font>
  </fonts>
  <fills count="3">
    <fill><patternFill patternType="none"/></fill>
    <fill><patternFill patternType="gray125"/></fill>
    <fill><patternFill patternType="solid"><fgColor theme="4" tint="0.4"/><bgColor indexed="64"/></patternFill></fill>
  </fills>
  <borders count="2">
    <border><left/><right/><top/><bottom/><diagonal/></border>
    <border diagonalUp="1"><left style="thin"><color auto="1"/></left><bottom style="double"/><diagonal style="hair"/></border>
  </borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="2">
    <xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
    <xf numFmtId="164" fontId="1" fillId="2" borderId="1" xfId="0" applyAlignment="1">
      <alignment horizontal="center" wrapText="1"/>
      <protection locked="0"/>
    </xf>
  </cellXfs>
  <dxfs count="1"><dxf><font><b/></font></dxf></dxfs>
</styleSheet>"#;
        let registry = parse_styles(&xml[..]).unwrap();
        assert_eq!(registry.fonts.len(), 2);
        assert_eq!(registry.fills.len(), 3);
        assert_eq!(registry.borders.len(), 2);
        assert_eq!(registry.cell_xfs.len(), 2);

        let style = registry.cell_style(1).unwrap();
        assert_eq!(style.number_format.as_deref(), Some("0.000"));

        let font = style.font.unwrap();
        assert!(font.bold);
        assert!(!font.italic);
        assert_eq!(font.underline.as_deref(), Some("single"));
        assert_eq!(font.size, Some(14.0));
        assert_eq!(font.name.as_deref(), Some("Arial"));
        assert_eq!(font.color, Some(Color::rgb("FFFF0000")));

        let fill = style.fill.unwrap();
        assert_eq!(fill.pattern_type.as_deref(), Some("solid"));
        assert_eq!(fill.fg_color, Some(Color::Theme { index: 4, tint: Some(0.4) }));
        assert_eq!(fill.bg_color, Some(Color::Indexed(64)));

        let border = style.border.unwrap();
        assert!(border.diagonal_up);
        assert_eq!(border.left, Some(BorderSide::thin().with_color(Color::Auto)));
        assert_eq!(border.bottom, Some(BorderSide::new("double")));
        assert_eq!(border.diagonal, Some(BorderSide::new("hair")));
        assert_eq!(border.top, None);

        let alignment = style.alignment.unwrap();
        assert_eq!(alignment.horizontal.as_deref(), Some("center"));
        assert!(alignment.wrap_text);
        assert_eq!(style.protection, Some(Protection { locked: false, hidden: false }));
    }

    #[test]
    fn test_parse_worksheet_values() {
        let xml = br#"<worksheet>
  <dimension ref="A1:D3"/>
  <cols><col min="2" max="3" width="18.5" customWidth="1"/><col min="4" max="4" width="9" hidden="1"/></cols>
  <sheetData>
    <row r="1" ht="30" customHeight="1">
      <c r="A1" t="s"><v>0</v></c>
      <c r="B1"><v>42</v></c>
      <c r="C1" t="b"><v>1</v></c>
      <c r="D1" t="inlineStr"><is><t>inline</t></is></c>
    </row>
    <row r="2" hidden="1">
      <c r="A2"><f>SUM(B1:B1)</f><v>42</v></c>
      <c r="B2" t="e"><v>#DIV/0!</v></c>
      <c r="C2" t="str"><f>"a"&amp;"b"</f><v>ab</v></c>
      <c r="D2" s="1"/>
    </row>
    <row>
      <c t="s"><v>1</v></c>
      <c><v>1.5</v></c>
    </row>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="A3:B3"/></mergeCells>
</worksheet>"#;
        let shared: Vec<InternedString> = vec![Arc::from("name"), Arc::from("implicit")];
        let styles = vec![
            Arc::new(CellStyle::default()),
            Arc::new(CellStyle::new().with_number_format("0.00")),
        ];
        let mut ws = Worksheet::new("Data");
        parse_worksheet(&xml[..], &shared, &styles, &mut ws).unwrap();

        assert_eq!(ws.get_cell_value(1, 1), Some(&CellValue::text("name")));
        assert_eq!(ws.get_cell_value(1, 2), Some(&CellValue::Number(42.0)));
        assert_eq!(ws.get_cell_value(1, 3), Some(&CellValue::Boolean(true)));
        assert_eq!(ws.get_cell_value(1, 4), Some(&CellValue::text("inline")));
        assert_eq!(ws.get_cell_value(2, 1), Some(&CellValue::Formula("SUM(B1:B1)".into())));
        assert_eq!(ws.get_cell_value(2, 2), Some(&CellValue::Error("#DIV/0!".into())));
        assert_eq!(ws.get_cell_value(2, 3), Some(&CellValue::Formula("\"a\"&\"b\"".into())));
        assert_eq!(ws.get_cell(2, 4).unwrap().style.as_deref(), Some(&*styles[1]));
        assert_eq!(ws.get_cell_value(3, 1), Some(&CellValue::text("implicit")));
        assert_eq!(ws.get_cell_value(3, 2), Some(&CellValue::Number(1.5)));

        assert_eq!(ws.row_dimension(1).unwrap().height, Some(30.0));
        assert!(ws.row_dimension(2).unwrap().hidden);
        assert_eq!(ws.column_dimension(2).unwrap().width, Some(18.5));
        assert_eq!(ws.column_dimension(3).unwrap().width, Some(18.5));
        assert!(ws.column_dimension(4).unwrap().hidden);
        assert_eq!(ws.merged_ranges()[0].to_string(), "A3:B3");
    }

    #[test]
    fn test_builtin_number_formats_survive_save_and_reload() {
        let xml = br#"<styleSheet>
  <fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>
  <fills count="1"><fill><patternFill patternType="none"/></fill></fills>
  <borders count="1"><border/></borders>
  <cellXfs count="3">
    <xf numFmtId="0" fontId="0" fillId="0" borderId="0"/>
    <xf numFmtId="44" fontId="0" fillId="0" borderId="0" applyNumberFormat="1"/>
    <xf numFmtId="27" fontId="0" fillId="0" borderId="0" applyNumberFormat="1"/>
  </cellXfs>
</styleSheet>"#;
        let registry = parse_styles(&xml[..]).unwrap();
        let accounting = registry.cell_style(1).unwrap();
        let locale_date = registry.cell_style(2).unwrap();
        assert!(accounting.number_format.as_deref().is_some_and(|code| code.starts_with("_(\"$\"*")));

        let mut wb = crate::workbook::Workbook::new();
        let ws = wb.create_sheet("Ledger").unwrap();
        ws.set_cell_value(1, 1, 1234.5);
        ws.set_cell_style(1, 1, accounting.clone());
        ws.set_cell_value(2, 1, 45000.0);
        ws.set_cell_style(2, 1, locale_date.clone());

        let reloaded = crate::workbook::Workbook::load_from_bytes(&wb.save_to_bytes().unwrap()).unwrap();
        let ws = reloaded.get_sheet_by_name("Ledger").unwrap();
        let style = ws.get_cell(1, 1).unwrap().style.as_deref().unwrap();
        assert_eq!(style.number_format, accounting.number_format);
        let style = ws.get_cell(2, 1).unwrap().style.as_deref().unwrap();
        assert_eq!(style.number_format, None);
        assert_eq!(style.number_format_id, Some(27));
    }

    #[test]
    fn test_shared_formula_members_get_shifted_formulas() {
        let xml = br#"<worksheet><sheetData>
  <row r="1"><c r="A1"><v>5</v></c><c r="B1"><f t="shared" ref="B1:C3" si="0">A1*2+$A$1</f><v>15</v></c>
    <c r="C1"><f t="shared" si="0"/><v>35</v></c></row>
  <row r="2"><c r="A2"><v>7</v></c><c r="B2"><f t="shared" si="0"/><v>19</v></c></row>
  <row r="3"><c r="B3" s="1"><f t="shared" si="0"/><v>5</v></c>
    <c r="D3"><f t="shared" ref="D3:D4" si="1">SUM(A1:B3)</f><v>1</v></c></row>
  <row r="4"><c r="D4"><f t="shared" si="1"/><v>2</v></c></row>
</sheetData></worksheet>"#;
        let styles = vec![Arc::new(CellStyle::default()), Arc::new(CellStyle::new().with_number_format("0.0"))];
        let mut ws = Worksheet::new("Data");
        parse_worksheet(&xml[..], &[], &styles, &mut ws).unwrap();

        let formula = |row, col| ws.get_cell_value(row, col).cloned();
        assert_eq!(formula(1, 2), Some(CellValue::Formula("A1*2+$A$1".into())));
        assert_eq!(formula(1, 3), Some(CellValue::Formula("B1*2+$A$1".into())));
        assert_eq!(formula(2, 2), Some(CellValue::Formula("A2*2+$A$1".into())));
        assert_eq!(formula(3, 2), Some(CellValue::Formula("A3*2+$A$1".into())));
        assert_eq!(ws.get_cell(3, 2).unwrap().style.as_deref(), Some(&*styles[1]));
        assert_eq!(formula(3, 4), Some(CellValue::Formula("SUM(A1:B3)".into())));
        assert_eq!(formula(4, 4), Some(CellValue::Formula("SUM(A2:B4)".into())));
    }

    #[test]
    fn test_shared_formula_member_without_anchor_keeps_value() {
        let xml = br#"<worksheet><sheetData><row r="2"><c r="B2"><f t="shared" si="3"/><v>10</v></c></row></sheetData></worksheet>"#;
        let mut ws = Worksheet::new("Data");
        parse_worksheet(&xml[..], &[], &[], &mut ws).unwrap();
        assert_eq!(ws.get_cell_value(2, 2), Some(&CellValue::Number(10.0)));
    }

    #[test]
    fn test_malformed_entity_is_an_error() {
        let xml = br#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>R&bogus;D</t></is></c></row></sheetData></worksheet>"#;
        let mut ws = Worksheet::new("Data");
        let err = parse_worksheet(&xml[..], &[], &[], &mut ws).unwrap_err();
        assert!(matches!(err, MergeError::ParseError(_)));

        let sst = br#"<sst><si><t>R&bogus;D</t></si></sst>"#;
        assert!(matches!(parse_shared_strings(&sst[..]), Err(MergeError::ParseError(_))));
    }

    #[test]
    fn test_shared_string_index_out_of_range() {
        let xml = br#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>5</v></c></row></sheetData></worksheet>"#;
        let mut ws = Worksheet::new("Data");
        let err = parse_worksheet(&xml[..], &[], &[], &mut ws).unwrap_err();
        assert!(matches!(err, MergeError::ParseError(_)));
    }
}
