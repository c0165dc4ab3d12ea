//! Layout config – the intermediate representation between layout computation
//! and PDF rendering. This is the "frozen" structure that encodes exactly what
//! goes on each page.

use serde::{Deserialize, Serialize};

use crate::stylesheet::FontFamily;

/// Portrait page size in points for an upper-case size token.
pub fn page_dimensions(token: &str) -> Option<(f32, f32)> {
    let dims = match token {
        "A0" => (2383.94, 3370.39),
        "A1" => (1683.78, 2383.94),
        "A2" => (1190.55, 1683.78),
        "A3" => (841.89, 1190.55),
        "A4" => (595.28, 841.89),
        "A5" => (419.53, 595.28),
        "A6" => (297.64, 419.53),
        "B4" => (708.66, 1000.63),
        "B5" => (498.90, 708.66),
        "LETTER" => (612.0, 792.0),
        "LEGAL" => (612.0, 1008.0),
        "TABLOID" => (792.0, 1224.0),
        "EXECUTIVE" => (521.86, 756.0),
        _ => return None,
    };
    Some(dims)
}

/// A complete document layout ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    /// Width of each page in PDF points (1 pt = 1/72 inch).
    pub page_width_pt: f32,
    /// Height of each page in PDF points.
    pub page_height_pt: f32,
    /// Ordered list of pages.
    pub pages: Vec<PageLayout>,
}

/// One page of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub boxes: Vec<LayoutBox>,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    /// Position relative to page top-left, in points.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub background_color: Option<[f32; 4]>,
    /// Strokes relative to the box's top-left corner (borders, rules).
    pub lines: Vec<LineSegment>,

    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,
    pub list_marker: Option<ListMarker>,

    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub width: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped lines of text.
    pub lines: Vec<TextLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    /// Offset of the line top from the top of the box.
    pub y_offset: f32,
    pub height: f32,
    /// Offset of the baseline from the line top.
    pub baseline: f32,
    pub fragments: Vec<TextFragment>,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }
}

/// A run of text with one style on one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    pub x_offset: f32,
    pub width: f32,
    pub font_family: FontFamily,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub color: [f32; 4],
    pub background: Option<[f32; 4]>,
    pub underline: bool,
    pub strike: bool,
}

/// Bullet or number drawn in the gutter left of a list item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListMarker {
    pub text: String,
    /// Horizontal offset from the box's left edge (negative: in the gutter).
    pub x_offset: f32,
    pub baseline: f32,
    pub font_size: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub src: String,
    pub width: f32,
    pub height: f32,
}

impl LayoutConfig {
    /// An empty config for the given page size token (A4 when unknown).
    pub fn for_page_size(token: &str) -> Self {
        let (w, h) = page_dimensions(token).unwrap_or((595.28, 841.89));
        Self {
            title: String::new(),
            page_width_pt: w,
            page_height_pt: h,
            pages: Vec::new(),
        }
    }

    /// All text on a page, one entry per line, in drawing order.
    pub fn page_text(&self, page: usize) -> Vec<String> {
        fn walk(lbox: &LayoutBox, out: &mut Vec<String>) {
            if let Some(text) = &lbox.text {
                out.extend(text.lines.iter().map(TextLine::text));
            }
            for child in &lbox.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        if let Some(p) = self.pages.get(page) {
            for lbox in &p.boxes {
                walk(lbox, &mut out);
            }
        }
        out
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            lines: Vec::new(),
            text: None,
            image: None,
            list_marker: None,
            children: Vec::new(),
        }
    }
}
