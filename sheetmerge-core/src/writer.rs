//! xlsx package writer.
//!
//! Every part is rendered into a `String` and written to the archive in one call.
//! Styles are collected from the cells at save time, so a workbook assembled from
//! several sources gets one consistent `styles.xml`.

#[cfg(feature = "fast-hash")]
use hashbrown::HashMap;
#[cfg(not(feature = "fast-hash"))]
use std::collections::HashMap;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::{Seek, Write};
use std::sync::Arc;

use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::cell::{CellValue, InternedString};
use crate::coordinate::coordinate_from_row_col;
use crate::error::Result;
use crate::style::{Alignment, Border, BorderSide, CellStyle, Color, Fill, Font, Protection, StyleRegistry};
use crate::worksheet::{split_cell_key, Worksheet};

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
"#;
const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Escape text for use in element content or attribute values.
pub fn escape_xml(s: &str) -> std::borrow::Cow<'_, str> {
    escape(s)
}

/// Shared string table: strings in first-use order plus their indices.
pub(crate) struct SharedStrings {
    pub strings: Vec<InternedString>,
    pub index: HashMap<InternedString, u32>,
}

impl SharedStrings {
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Collect string cell values across all sheets, row-major per sheet.
pub(crate) fn collect_shared_strings(worksheets: &[Worksheet]) -> SharedStrings {
    let mut strings = Vec::new();
    let mut index: HashMap<InternedString, u32> = HashMap::new();
    for worksheet in worksheets {
        for key in worksheet.sorted_keys() {
            if let Some(CellValue::String(s)) = worksheet.cells.get(&key).map(|cell| &cell.value) {
                if !index.contains_key(s) {
                    index.insert(s.clone(), strings.len() as u32);
                    strings.push(s.clone());
                }
            }
        }
    }
    SharedStrings { strings, index }
}

/// Style table for a save: the registry plus a lookup from each cell's `Arc` to its xf index.
pub(crate) struct StyleTable {
    pub registry: StyleRegistry,
    xf_by_ptr: HashMap<usize, usize>,
}

impl StyleTable {
    pub fn xf_index(&self, style: &Arc<CellStyle>) -> usize {
        self.xf_by_ptr
            .get(&(Arc::as_ptr(style) as usize))
            .copied()
            .unwrap_or(0)
    }
}

pub(crate) fn collect_styles(worksheets: &[Worksheet]) -> StyleTable {
    let mut registry = StyleRegistry::new();
    let mut xf_by_ptr = HashMap::new();
    for worksheet in worksheets {
        for key in worksheet.sorted_keys() {
            let Some(style) = worksheet.cells.get(&key).and_then(|cell| cell.style.as_ref()) else {
                continue;
            };
            let ptr = Arc::as_ptr(style) as usize;
            if !xf_by_ptr.contains_key(&ptr) {
                let xf = registry.get_or_add_cell_xf(style);
                xf_by_ptr.insert(ptr, xf);
            }
        }
    }
    StyleTable { registry, xf_by_ptr }
}

pub(crate) fn write_content_types<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    sheet_count: usize,
    has_shared_strings: bool,
) -> Result<()> {
    zip.start_file("[Content_Types].xml", options)?;

    let mut content = String::from(XML_HEADER);
    content.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>
"#);
    for i in 1..=sheet_count {
        let _ = writeln!(
            content,
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            i
        );
    }
    if has_shared_strings {
        content.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>
"#);
    }
    content.push_str("</Types>");

    zip.write_all(content.as_bytes())?;
    Ok(())
}

pub(crate) fn write_rels<W: Write + Seek>(zip: &mut ZipWriter<W>, options: SimpleFileOptions) -> Result<()> {
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(XML_HEADER.as_bytes())?;
    zip.write_all(br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#)?;
    Ok(())
}

pub(crate) fn write_doc_props<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    sheet_names: &[&str],
) -> Result<()> {
    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");

    zip.start_file("docProps/core.xml", options)?;
    let mut core = String::from(XML_HEADER);
    let _ = write!(
        core,
        r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:creator>sheetmerge</dc:creator>
<dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created>
<dcterms:modified xsi:type="dcterms:W3CDTF">{now}</dcterms:modified>
</cp:coreProperties>"#
    );
    zip.write_all(core.as_bytes())?;

    zip.start_file("docProps/app.xml", options)?;
    let mut app = String::from(XML_HEADER);
    let _ = write!(
        app,
        r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">
<Application>sheetmerge</Application>
<TitlesOfParts><vt:vector size="{}" baseType="lpstr">"#,
        sheet_names.len()
    );
    for name in sheet_names {
        let _ = write!(app, "<vt:lpstr>{}</vt:lpstr>", escape_xml(name));
    }
    app.push_str("</vt:vector></TitlesOfParts>\n</Properties>");
    zip.write_all(app.as_bytes())?;
    Ok(())
}

pub(crate) fn write_workbook_xml<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    sheet_names: &[&str],
    active: usize,
) -> Result<()> {
    zip.start_file("xl/workbook.xml", options)?;

    let mut content = String::from(XML_HEADER);
    let _ = write!(
        content,
        "<workbook xmlns=\"{}\" xmlns:r=\"{}\">\n<bookViews><workbookView activeTab=\"{}\"/></bookViews>\n<sheets>\n",
        NS_MAIN, NS_REL, active
    );
    for (i, name) in sheet_names.iter().enumerate() {
        let _ = writeln!(
            content,
            "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
            escape_xml(name),
            i + 1,
            i + 1
        );
    }
    content.push_str("</sheets>\n</workbook>");

    zip.write_all(content.as_bytes())?;
    Ok(())
}

pub(crate) fn write_workbook_rels<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    sheet_count: usize,
    has_shared_strings: bool,
) -> Result<()> {
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;

    let mut content = String::from(XML_HEADER);
    content.push_str("<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\n");
    for i in 1..=sheet_count {
        let _ = writeln!(
            content,
            "<Relationship Id=\"rId{}\" Type=\"{}/worksheet\" Target=\"worksheets/sheet{}.xml\"/>",
            i, NS_REL, i
        );
    }
    let _ = writeln!(
        content,
        "<Relationship Id=\"rId{}\" Type=\"{}/styles\" Target=\"styles.xml\"/>",
        sheet_count + 1,
        NS_REL
    );
    if has_shared_strings {
        let _ = writeln!(
            content,
            "<Relationship Id=\"rId{}\" Type=\"{}/sharedStrings\" Target=\"sharedStrings.xml\"/>",
            sheet_count + 2,
            NS_REL
        );
    }
    content.push_str("</Relationships>");

    zip.write_all(content.as_bytes())?;
    Ok(())
}

pub(crate) fn write_shared_strings<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    shared: &SharedStrings,
) -> Result<()> {
    zip.start_file("xl/sharedStrings.xml", options)?;

    let mut content = String::with_capacity(64 + shared.strings.len() * 32);
    content.push_str(XML_HEADER);
    let _ = write!(
        content,
        "<sst xmlns=\"{}\" count=\"{}\" uniqueCount=\"{}\">",
        NS_MAIN,
        shared.strings.len(),
        shared.strings.len()
    );
    for s in &shared.strings {
        let needs_preserve = s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace);
        if needs_preserve {
            let _ = write!(content, "<si><t xml:space=\"preserve\">{}</t></si>", escape_xml(s));
        } else {
            let _ = write!(content, "<si><t>{}</t></si>", escape_xml(s));
        }
    }
    content.push_str("</sst>");

    zip.write_all(content.as_bytes())?;
    Ok(())
}

fn write_color(out: &mut String, tag: &str, color: &Color) {
    match color {
        Color::Rgb(rgb) => {
            let _ = write!(out, "<{} rgb=\"{}\"/>", tag, escape_xml(rgb));
        }
        Color::Theme { index, tint } => {
            let _ = write!(out, "<{} theme=\"{}\"", tag, index);
            if let Some(tint) = tint {
                let _ = write!(out, " tint=\"{}\"", tint);
            }
            out.push_str("/>");
        }
        Color::Indexed(index) => {
            let _ = write!(out, "<{} indexed=\"{}\"/>", tag, index);
        }
        Color::Auto => {
            let _ = write!(out, "<{} auto=\"1\"/>", tag);
        }
    }
}

fn write_font(out: &mut String, font: &Font) {
    out.push_str("<font>");
    if font.bold {
        out.push_str("<b/>");
    }
    if font.italic {
        out.push_str("<i/>");
    }
    if font.strike {
        out.push_str("<strike/>");
    }
    match font.underline.as_deref() {
        Some("single") => out.push_str("<u/>"),
        Some(kind) => {
            let _ = write!(out, "<u val=\"{}\"/>", escape_xml(kind));
        }
        None => {}
    }
    if let Some(vert_align) = &font.vert_align {
        let _ = write!(out, "<vertAlign val=\"{}\"/>", escape_xml(vert_align));
    }
    if let Some(size) = font.size {
        let _ = write!(out, "<sz val=\"{}\"/>", size);
    }
    if let Some(color) = &font.color {
        write_color(out, "color", color);
    }
    if let Some(name) = &font.name {
        let _ = write!(out, "<name val=\"{}\"/>", escape_xml(name));
    }
    if let Some(family) = font.family {
        let _ = write!(out, "<family val=\"{}\"/>", family);
    }
    if let Some(scheme) = &font.scheme {
        let _ = write!(out, "<scheme val=\"{}\"/>", escape_xml(scheme));
    }
    out.push_str("</font>");
}

fn write_fill(out: &mut String, fill: &Fill) {
    out.push_str("<fill><patternFill");
    if let Some(pattern) = &fill.pattern_type {
        let _ = write!(out, " patternType=\"{}\"", escape_xml(pattern));
    }
    if fill.fg_color.is_none() && fill.bg_color.is_none() {
        out.push_str("/></fill>");
        return;
    }
    out.push('>');
    if let Some(color) = &fill.fg_color {
        write_color(out, "fgColor", color);
    }
    if let Some(color) = &fill.bg_color {
        write_color(out, "bgColor", color);
    }
    out.push_str("</patternFill></fill>");
}

fn write_border_side(out: &mut String, tag: &str, side: Option<&BorderSide>) {
    let Some(side) = side else {
        let _ = write!(out, "<{}/>", tag);
        return;
    };
    let _ = write!(out, "<{} style=\"{}\"", tag, escape_xml(&side.style));
    match &side.color {
        Some(color) => {
            out.push('>');
            write_color(out, "color", color);
            let _ = write!(out, "</{}>", tag);
        }
        None => out.push_str("/>"),
    }
}

fn write_border(out: &mut String, border: &Border) {
    out.push_str("<border");
    if border.diagonal_up {
        out.push_str(" diagonalUp=\"1\"");
    }
    if border.diagonal_down {
        out.push_str(" diagonalDown=\"1\"");
    }
    out.push('>');
    write_border_side(out, "left", border.left.as_ref());
    write_border_side(out, "right", border.right.as_ref());
    write_border_side(out, "top", border.top.as_ref());
    write_border_side(out, "bottom", border.bottom.as_ref());
    write_border_side(out, "diagonal", border.diagonal.as_ref());
    out.push_str("</border>");
}

fn write_alignment(out: &mut String, alignment: &Alignment) {
    out.push_str("<alignment");
    if let Some(horizontal) = &alignment.horizontal {
        let _ = write!(out, " horizontal=\"{}\"", escape_xml(horizontal));
    }
    if let Some(vertical) = &alignment.vertical {
        let _ = write!(out, " vertical=\"{}\"", escape_xml(vertical));
    }
    if let Some(rotation) = alignment.text_rotation {
        let _ = write!(out, " textRotation=\"{}\"", rotation);
    }
    if alignment.wrap_text {
        out.push_str(" wrapText=\"1\"");
    }
    if let Some(indent) = alignment.indent {
        let _ = write!(out, " indent=\"{}\"", indent);
    }
    if alignment.shrink_to_fit {
        out.push_str(" shrinkToFit=\"1\"");
    }
    out.push_str("/>");
}

fn write_protection(out: &mut String, protection: &Protection) {
    let _ = write!(
        out,
        "<protection locked=\"{}\" hidden=\"{}\"/>",
        u8::from(protection.locked),
        u8::from(protection.hidden)
    );
}

/// Render `styles.xml` from a registry.
pub(crate) fn render_styles_xml(registry: &StyleRegistry) -> String {
    let mut out = String::from(XML_HEADER);
    let _ = write!(out, "<styleSheet xmlns=\"{}\">\n", NS_MAIN);

    if !registry.num_fmts.is_empty() {
        let _ = write!(out, "<numFmts count=\"{}\">", registry.num_fmts.len());
        for (id, code) in &registry.num_fmts {
            let _ = write!(out, "<numFmt numFmtId=\"{}\" formatCode=\"{}\"/>", id, escape_xml(code));
        }
        out.push_str("</numFmts>\n");
    }

    let _ = write!(out, "<fonts count=\"{}\">", registry.fonts.len());
    for font in &registry.fonts {
        write_font(&mut out, font);
    }
    out.push_str("</fonts>\n");

    let _ = write!(out, "<fills count=\"{}\">", registry.fills.len());
    for fill in &registry.fills {
        write_fill(&mut out, fill);
    }
    out.push_str("</fills>\n");

    let _ = write!(out, "<borders count=\"{}\">", registry.borders.len());
    for border in &registry.borders {
        write_border(&mut out, border);
    }
    out.push_str("</borders>\n");

    out.push_str("<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>\n");

    let _ = write!(out, "<cellXfs count=\"{}\">", registry.cell_xfs.len());
    for xf in &registry.cell_xfs {
        let _ = write!(
            out,
            "<xf numFmtId=\"{}\" fontId=\"{}\" fillId=\"{}\" borderId=\"{}\" xfId=\"0\"",
            xf.num_fmt_id, xf.font_id, xf.fill_id, xf.border_id
        );
        if xf.num_fmt_id != 0 {
            out.push_str(" applyNumberFormat=\"1\"");
        }
        if xf.font_id != 0 {
            out.push_str(" applyFont=\"1\"");
        }
        if xf.fill_id != 0 {
            out.push_str(" applyFill=\"1\"");
        }
        if xf.border_id != 0 {
            out.push_str(" applyBorder=\"1\"");
        }
        if xf.alignment.is_some() {
            out.push_str(" applyAlignment=\"1\"");
        }
        if xf.protection.is_some() {
            out.push_str(" applyProtection=\"1\"");
        }
        if xf.alignment.is_none() && xf.protection.is_none() {
            out.push_str("/>");
            continue;
        }
        out.push('>');
        if let Some(alignment) = &xf.alignment {
            write_alignment(&mut out, alignment);
        }
        if let Some(protection) = &xf.protection {
            write_protection(&mut out, protection);
        }
        out.push_str("</xf>");
    }
    out.push_str("</cellXfs>\n");

    out.push_str("<cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>\n");
    out.push_str("</styleSheet>");
    out
}

pub(crate) fn write_styles_xml<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    registry: &StyleRegistry,
) -> Result<()> {
    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(render_styles_xml(registry).as_bytes())?;
    Ok(())
}

/// Append a number the way Excel stores it: integers without a fraction, others shortest round-trip.
fn push_number(out: &mut String, n: f64) {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        let mut buf = itoa::Buffer::new();
        out.push_str(buf.format(n as i64));
    } else {
        let mut buf = ryu::Buffer::new();
        out.push_str(buf.format_finite(n));
    }
}

fn push_cell(out: &mut String, coord: &str, value: &CellValue, xf: usize, shared: &SharedStrings) {
    let _ = write!(out, "<c r=\"{}\"", coord);
    if xf != 0 {
        let _ = write!(out, " s=\"{}\"", xf);
    }
    match value {
        CellValue::Empty => out.push_str("/>"),
        CellValue::String(s) => match shared.index.get(s) {
            Some(idx) => {
                let _ = write!(out, " t=\"s\"><v>{}</v></c>", idx);
            }
            None => {
                let _ = write!(out, " t=\"inlineStr\"><is><t>{}</t></is></c>", escape_xml(s));
            }
        },
        CellValue::Number(n) if n.is_finite() => {
            out.push_str("><v>");
            push_number(out, *n);
            out.push_str("</v></c>");
        }
        CellValue::Number(_) => out.push_str(" t=\"e\"><v>#NUM!</v></c>"),
        CellValue::Boolean(b) => {
            let _ = write!(out, " t=\"b\"><v>{}</v></c>", u8::from(*b));
        }
        CellValue::Date(d) => {
            let _ = write!(out, " t=\"d\"><v>{}</v></c>", escape_xml(d));
        }
        CellValue::Formula(formula) => {
            let formula = formula.strip_prefix('=').unwrap_or(formula);
            let _ = write!(out, "><f>{}</f></c>", escape_xml(formula));
        }
        CellValue::Error(e) => {
            let _ = write!(out, " t=\"e\"><v>{}</v></c>", escape_xml(e));
        }
    }
}

/// Render one worksheet part.
pub(crate) fn render_worksheet_xml(
    worksheet: &Worksheet,
    selected: bool,
    shared: &SharedStrings,
    styles: &StyleTable,
) -> String {
    let keys = worksheet.sorted_keys();
    let mut out = String::with_capacity(512 + keys.len() * 40);
    out.push_str(XML_HEADER);
    let _ = write!(
        out,
        "<worksheet xmlns=\"{}\" xmlns:r=\"{}\">\n<dimension ref=\"{}\"/>\n",
        NS_MAIN,
        NS_REL,
        worksheet.dimension_ref()
    );
    let _ = write!(
        out,
        "<sheetViews><sheetView{} workbookViewId=\"0\"/></sheetViews>\n<sheetFormatPr defaultRowHeight=\"15\"/>\n",
        if selected { " tabSelected=\"1\"" } else { "" }
    );

    if !worksheet.column_dimensions.is_empty() {
        out.push_str("<cols>");
        for (col, dim) in &worksheet.column_dimensions {
            let _ = write!(out, "<col min=\"{}\" max=\"{}\"", col, col);
            if let Some(width) = dim.width {
                let _ = write!(out, " width=\"{}\" customWidth=\"1\"", width);
            }
            if dim.hidden {
                out.push_str(" hidden=\"1\"");
            }
            out.push_str("/>");
        }
        out.push_str("</cols>\n");
    }

    let rows: BTreeSet<u32> = keys
        .iter()
        .map(|&key| split_cell_key(key).0)
        .chain(worksheet.row_dimensions.keys().copied())
        .collect();

    out.push_str("<sheetData>");
    let mut next = 0usize;
    for row in rows {
        let _ = write!(out, "<row r=\"{}\"", row);
        if let Some(dim) = worksheet.row_dimension(row) {
            if let Some(height) = dim.height {
                let _ = write!(out, " ht=\"{}\" customHeight=\"1\"", height);
            }
            if dim.hidden {
                out.push_str(" hidden=\"1\"");
            }
        }
        out.push('>');
        while let Some(&key) = keys.get(next) {
            let (cell_row, col) = split_cell_key(key);
            if cell_row != row {
                break;
            }
            next += 1;
            if let Some(cell) = worksheet.cells.get(&key) {
                let xf = cell.style.as_ref().map(|s| styles.xf_index(s)).unwrap_or(0);
                push_cell(&mut out, &coordinate_from_row_col(row, col), &cell.value, xf, shared);
            }
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData>\n");

    let merged = worksheet.merged_ranges();
    if !merged.is_empty() {
        let _ = write!(out, "<mergeCells count=\"{}\">", merged.len());
        for range in merged {
            let _ = write!(out, "<mergeCell ref=\"{}\"/>", range);
        }
        out.push_str("</mergeCells>\n");
    }

    out.push_str("<pageMargins left=\"0.7\" right=\"0.7\" top=\"0.75\" bottom=\"0.75\" header=\"0.3\" footer=\"0.3\"/>\n</worksheet>");
    out
}

pub(crate) fn write_worksheet_xml<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    worksheet: &Worksheet,
    sheet_id: usize,
    selected: bool,
    shared: &SharedStrings,
    styles: &StyleTable,
) -> Result<()> {
    zip.start_file(format!("xl/worksheets/sheet{}.xml", sheet_id), options)?;
    zip.write_all(render_worksheet_xml(worksheet, selected, shared, styles).as_bytes())?;
    Ok(())
}
