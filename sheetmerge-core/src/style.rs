//! Cell styling: fonts, fills, borders, alignment, protection and number formats.
//!
//! Cells carry a fully resolved [`CellStyle`]. The index-based layout Excel uses
//! (`styles.xml` with separate font/fill/border tables joined by `cellXfs`) only
//! exists in [`StyleRegistry`], which is built when a workbook is read or written.
//! That keeps a style meaningful after a cell moves to another workbook.

/// A color as stored in SpreadsheetML.
#[derive(Clone, Debug, PartialEq)]
pub enum Color {
    /// ARGB hex, e.g. "FFFF0000".
    Rgb(String),
    /// Theme palette slot with optional tint.
    Theme { index: u32, tint: Option<f64> },
    /// Legacy indexed palette.
    Indexed(u32),
    Auto,
}

impl Color {
    pub fn rgb<S: Into<String>>(argb: S) -> Self {
        Color::Rgb(argb.into())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Font {
    pub name: Option<String>,
    pub size: Option<f64>,
    pub bold: bool,
    pub italic: bool,
    /// Underline kind: "single", "double", "singleAccounting", ...
    pub underline: Option<String>,
    pub strike: bool,
    pub color: Option<Color>,
    /// "superscript" or "subscript".
    pub vert_align: Option<String>,
    pub family: Option<u32>,
    /// "major" or "minor".
    pub scheme: Option<String>,
}

impl Font {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }

    pub fn with_italic(mut self, italic: bool) -> Self {
        self.italic = italic;
        self
    }

    pub fn with_underline<S: Into<String>>(mut self, kind: S) -> Self {
        self.underline = Some(kind.into());
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    /// The font Excel puts at index 0 of a new workbook.
    pub fn default_body() -> Self {
        Font {
            name: Some("Calibri".to_string()),
            size: Some(11.0),
            family: Some(2),
            scheme: Some("minor".to_string()),
            ..Default::default()
        }
    }
}

/// Pattern fill. Gradient fills are read as a plain pattern fill with no colors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fill {
    /// "none", "solid", "gray125", "darkGrid", ...
    pub pattern_type: Option<String>,
    pub fg_color: Option<Color>,
    pub bg_color: Option<Color>,
}

impl Fill {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solid fill in one color.
    pub fn solid(color: Color) -> Self {
        Fill {
            pattern_type: Some("solid".to_string()),
            fg_color: Some(color),
            bg_color: None,
        }
    }

    fn gray125() -> Self {
        Fill {
            pattern_type: Some("gray125".to_string()),
            ..Default::default()
        }
    }
}

/// One edge of a border.
#[derive(Clone, Debug, PartialEq)]
pub struct BorderSide {
    /// "thin", "medium", "thick", "dashed", "dotted", "double", ...
    pub style: String,
    pub color: Option<Color>,
}

impl BorderSide {
    pub fn new<S: Into<String>>(style: S) -> Self {
        BorderSide {
            style: style.into(),
            color: None,
        }
    }

    pub fn thin() -> Self {
        Self::new("thin")
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Border {
    pub left: Option<BorderSide>,
    pub right: Option<BorderSide>,
    pub top: Option<BorderSide>,
    pub bottom: Option<BorderSide>,
    pub diagonal: Option<BorderSide>,
    pub diagonal_up: bool,
    pub diagonal_down: bool,
}

impl Border {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same side on the four outer edges.
    pub fn all(side: BorderSide) -> Self {
        Border {
            left: Some(side.clone()),
            right: Some(side.clone()),
            top: Some(side.clone()),
            bottom: Some(side),
            ..Default::default()
        }
    }

    pub(crate) fn side_mut(&mut self, edge: &[u8]) -> Option<&mut Option<BorderSide>> {
        match edge {
            b"left" | b"start" => Some(&mut self.left),
            b"right" | b"end" => Some(&mut self.right),
            b"top" => Some(&mut self.top),
            b"bottom" => Some(&mut self.bottom),
            b"diagonal" => Some(&mut self.diagonal),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Alignment {
    /// "left", "center", "right", "fill", "justify", ...
    pub horizontal: Option<String>,
    /// "top", "center", "bottom", "justify", "distributed".
    pub vertical: Option<String>,
    pub wrap_text: bool,
    pub shrink_to_fit: bool,
    /// 0-180, or 255 for vertical text.
    pub text_rotation: Option<u32>,
    pub indent: Option<u32>,
}

impl Alignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_horizontal<S: Into<String>>(mut self, align: S) -> Self {
        self.horizontal = Some(align.into());
        self
    }

    pub fn with_vertical<S: Into<String>>(mut self, align: S) -> Self {
        self.vertical = Some(align.into());
        self
    }

    pub fn with_wrap_text(mut self, wrap: bool) -> Self {
        self.wrap_text = wrap;
        self
    }
}

/// Cell protection flags; only enforced when the sheet is protected.
#[derive(Clone, Debug, PartialEq)]
pub struct Protection {
    pub locked: bool,
    pub hidden: bool,
}

impl Default for Protection {
    fn default() -> Self {
        Protection {
            locked: true,
            hidden: false,
        }
    }
}

/// Complete style of one cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellStyle {
    pub number_format: Option<String>,
    /// Built-in format id with no known code; written back as-is when `number_format` is unset.
    pub number_format_id: Option<u32>,
    pub font: Option<Font>,
    pub fill: Option<Fill>,
    pub border: Option<Border>,
    pub alignment: Option<Alignment>,
    pub protection: Option<Protection>,
}

impl CellStyle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number_format<S: Into<String>>(mut self, format: S) -> Self {
        self.number_format = Some(format.into());
        self
    }

    pub fn with_font(mut self, font: Font) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_fill(mut self, fill: Fill) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn with_border(mut self, border: Border) -> Self {
        self.border = Some(border);
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn with_protection(mut self, protection: Protection) -> Self {
        self.protection = Some(protection);
        self
    }
}

/// Built-in number formats (ECMA-376 Part 1, 18.8.30). Custom formats start at 164.
const BUILTIN_NUM_FMTS: &[(u32, &str)] = &[
    (0, "General"),
    (1, "0"),
    (2, "0.00"),
    (3, "#,##0"),
    (4, "#,##0.00"),
    (5, "\"$\"#,##0_);(\"$\"#,##0)"),
    (6, "\"$\"#,##0_);[Red](\"$\"#,##0)"),
    (7, "\"$\"#,##0.00_);(\"$\"#,##0.00)"),
    (8, "\"$\"#,##0.00_);[Red](\"$\"#,##0.00)"),
    (9, "0%"),
    (10, "0.00%"),
    (11, "0.00E+00"),
    (12, "# ?/?"),
    (13, "# ??/??"),
    (14, "mm-dd-yy"),
    (15, "d-mmm-yy"),
    (16, "d-mmm"),
    (17, "mmm-yy"),
    (18, "h:mm AM/PM"),
    (19, "h:mm:ss AM/PM"),
    (20, "h:mm"),
    (21, "h:mm:ss"),
    (22, "m/d/yy h:mm"),
    (37, "#,##0 ;(#,##0)"),
    (38, "#,##0 ;[Red](#,##0)"),
    (39, "#,##0.00;(#,##0.00)"),
    (40, "#,##0.00;[Red](#,##0.00)"),
    (41, r#"_(* #,##0_);_(* \(#,##0\);_(* "-"_);_(@_)"#),
    (42, r#"_("$"* #,##0_);_("$"* \(#,##0\);_("$"* "-"_);_(@_)"#),
    (43, r#"_(* #,##0.00_);_(* \(#,##0.00\);_(* "-"??_);_(@_)"#),
    (44, r#"_("$"* #,##0.00_);_("$"* \(#,##0.00\);_("$"* "-"??_);_(@_)"#),
    (45, "mm:ss"),
    (46, "[h]:mm:ss"),
    (47, "mmss.0"),
    (48, "##0.0E+0"),
    (49, "@"),
];

pub const FIRST_CUSTOM_NUM_FMT_ID: u32 = 164;

pub fn builtin_num_fmt_id(format: &str) -> Option<u32> {
    BUILTIN_NUM_FMTS.iter().find(|(_, code)| *code == format).map(|(id, _)| *id)
}

pub fn builtin_num_fmt(id: u32) -> Option<&'static str> {
    BUILTIN_NUM_FMTS.iter().find(|(i, _)| *i == id).map(|(_, code)| *code)
}

/// One `cellXfs` entry: indices into the registry tables plus inline alignment/protection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellXf {
    pub num_fmt_id: u32,
    pub font_id: usize,
    pub fill_id: usize,
    pub border_id: usize,
    pub alignment: Option<Alignment>,
    pub protection: Option<Protection>,
}

/// Index-based style tables as laid out in `styles.xml`.
#[derive(Clone, Debug, Default)]
pub struct StyleRegistry {
    pub fonts: Vec<Font>,
    pub fills: Vec<Fill>,
    pub borders: Vec<Border>,
    /// Custom number formats as `(id, code)`.
    pub num_fmts: Vec<(u32, String)>,
    pub cell_xfs: Vec<CellXf>,
}

impl StyleRegistry {
    /// Registry with the entries Excel requires: one font, the "none" and "gray125"
    /// fills, one empty border and the default xf at index 0.
    pub fn new() -> Self {
        StyleRegistry {
            fonts: vec![Font::default_body()],
            fills: vec![Fill::default(), Fill::gray125()],
            borders: vec![Border::default()],
            num_fmts: Vec::new(),
            cell_xfs: vec![CellXf::default()],
        }
    }

    fn intern<T: PartialEq + Clone>(table: &mut Vec<T>, item: &T) -> usize {
        match table.iter().position(|existing| existing == item) {
            Some(idx) => idx,
            None => {
                table.push(item.clone());
                table.len() - 1
            }
        }
    }

    pub fn get_or_add_num_fmt(&mut self, format: &str) -> u32 {
        if let Some(id) = builtin_num_fmt_id(format) {
            return id;
        }
        if let Some((id, _)) = self.num_fmts.iter().find(|(_, code)| code == format) {
            return *id;
        }
        let id = self
            .num_fmts
            .iter()
            .map(|(id, _)| id + 1)
            .max()
            .unwrap_or(FIRST_CUSTOM_NUM_FMT_ID)
            .max(FIRST_CUSTOM_NUM_FMT_ID);
        self.num_fmts.push((id, format.to_string()));
        id
    }

    /// Number format code for an id, custom table first.
    pub fn num_fmt_code(&self, id: u32) -> Option<String> {
        self.num_fmts
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, code)| code.clone())
            .or_else(|| builtin_num_fmt(id).map(str::to_string))
    }

    /// Index of the xf describing `style`, adding table entries as needed.
    pub fn get_or_add_cell_xf(&mut self, style: &CellStyle) -> usize {
        let xf = CellXf {
            num_fmt_id: style
                .number_format
                .as_deref()
                .map(|code| self.get_or_add_num_fmt(code))
                .or(style.number_format_id)
                .unwrap_or(0),
            font_id: style.font.as_ref().map(|f| Self::intern(&mut self.fonts, f)).unwrap_or(0),
            fill_id: style.fill.as_ref().map(|f| Self::intern(&mut self.fills, f)).unwrap_or(0),
            border_id: style
                .border
                .as_ref()
                .map(|b| Self::intern(&mut self.borders, b))
                .unwrap_or(0),
            alignment: style.alignment.clone(),
            protection: style.protection.clone(),
        };
        Self::intern(&mut self.cell_xfs, &xf)
    }

    /// Resolve an xf index back into a self-contained style.
    pub fn cell_style(&self, xf_index: usize) -> Option<CellStyle> {
        let xf = self.cell_xfs.get(xf_index)?;
        let number_format = self.num_fmt_code(xf.num_fmt_id);
        let number_format_id = match number_format {
            None if xf.num_fmt_id != 0 => Some(xf.num_fmt_id),
            _ => None,
        };
        Some(CellStyle {
            number_format,
            number_format_id,
            font: self.fonts.get(xf.font_id).cloned(),
            fill: self.fills.get(xf.fill_id).cloned(),
            border: self.borders.get(xf.border_id).cloned(),
            alignment: xf.alignment.clone(),
            protection: xf.protection.clone(),
        })
    }
}
