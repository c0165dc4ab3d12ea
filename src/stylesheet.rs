//! Style sheet – the fixed mapping from semantic tag names (`html-h1`,
//! `html-code`, …) to visual attributes, plus the colour and spacing value
//! types shared by the content tree and the PDF engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::SemanticTag;

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    /// Build an opaque colour from a `0xRRGGBB` literal.
    pub fn rgb(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
            a: 1.0,
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    /// `#rrggbb` or `#rgb`. Anything else, including non-ASCII input, is
    /// `None`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let value = u32::from_str_radix(hex, 16).ok()?;
        let (r, g, b) = match hex.len() {
            6 => (value >> 16, (value >> 8) & 0xff, value & 0xff),
            3 => {
                let expand = |nibble: u32| nibble * 0x11;
                (expand(value >> 8), expand((value >> 4) & 0xf), expand(value & 0xf))
            }
            _ => return None,
        };
        Some(Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: 1.0,
        })
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Four-sided spacing in points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Edges {
    pub const ZERO: Self = Self {
        top: 0.0,
        right: 0.0,
        bottom: 0.0,
        left: 0.0,
    };

    pub fn uniform(v: f32) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    /// Left, top, right, bottom – the order margins are usually written in.
    pub fn ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub fn vertical(top: f32, bottom: f32) -> Self {
        Self {
            top,
            bottom,
            ..Self::ZERO
        }
    }

    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontFamily {
    Helvetica,
    Courier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decoration {
    None,
    Underline,
    LineThrough,
}

/// A closed bundle of visual attributes. Unset fields leave the inherited
/// value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleAttributes {
    pub font: Option<FontFamily>,
    pub font_size: Option<f32>,
    pub bold: Option<bool>,
    pub italics: Option<bool>,
    pub color: Option<Color>,
    /// Background behind inline text.
    pub background: Option<Color>,
    /// Fill of the whole block (table cells).
    pub fill_color: Option<Color>,
    pub decoration: Option<Decoration>,
    pub line_height: Option<f32>,
    pub margin: Option<Edges>,
}

/// Inherited text style after cascading defaults, tags and overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font: FontFamily,
    pub font_size: f32,
    pub bold: bool,
    pub italics: bool,
    pub color: Color,
    pub background: Option<Color>,
    pub decoration: Decoration,
    pub line_height: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: FontFamily::Helvetica,
            font_size: 11.0,
            bold: false,
            italics: false,
            color: Color::rgb(0x1f2328),
            background: None,
            decoration: Decoration::None,
            line_height: 1.5,
        }
    }
}

impl TextStyle {
    /// Overlay the set fields of `attrs` onto this style.
    pub fn apply(&mut self, attrs: &StyleAttributes) {
        if let Some(f) = attrs.font {
            self.font = f;
        }
        if let Some(s) = attrs.font_size {
            self.font_size = s;
        }
        if let Some(b) = attrs.bold {
            self.bold = b;
        }
        if let Some(i) = attrs.italics {
            self.italics = i;
        }
        if let Some(c) = attrs.color {
            self.color = c;
        }
        if attrs.background.is_some() {
            self.background = attrs.background;
        }
        if let Some(d) = attrs.decoration {
            self.decoration = d;
        }
        if let Some(lh) = attrs.line_height {
            self.line_height = lh;
        }
    }
}

/// Immutable tag-name → attributes table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSheet {
    entries: BTreeMap<String, StyleAttributes>,
}

impl StyleSheet {
    /// The GitHub-inspired sheet. Deterministic: every call returns an equal
    /// value.
    pub fn github() -> Self {
        let text = Color::rgb(0x1f2328);
        let muted = Color::rgb(0x656d76);
        let header_fill = Color::rgb(0xf6f8fa);

        let heading = |size: f32, top: f32, bottom: f32, color: Color| StyleAttributes {
            font_size: Some(size),
            bold: Some(true),
            color: Some(color),
            margin: Some(Edges::vertical(top, bottom)),
            ..Default::default()
        };

        let mut entries = BTreeMap::new();
        let mut add = |name: &str, attrs: StyleAttributes| {
            entries.insert(name.to_string(), attrs);
        };

        add("html-h1", heading(28.0, 16.0, 8.0, text));
        add("html-h2", heading(22.0, 14.0, 6.0, text));
        add("html-h3", heading(18.0, 12.0, 4.0, text));
        add("html-h4", heading(15.0, 10.0, 4.0, text));
        add("html-h5", heading(13.0, 8.0, 4.0, text));
        add("html-h6", heading(12.0, 8.0, 4.0, muted));
        add(
            "html-p",
            StyleAttributes {
                margin: Some(Edges::ltrb(0.0, 4.0, 0.0, 8.0)),
                line_height: Some(1.5),
                color: Some(text),
                ..Default::default()
            },
        );
        add(
            "html-code",
            StyleAttributes {
                font: Some(FontFamily::Courier),
                font_size: Some(9.0),
                color: Some(text),
                background: Some(Color::rgb(0xeff1f3)),
                ..Default::default()
            },
        );
        add(
            "html-pre",
            StyleAttributes {
                margin: Some(Edges::ltrb(0.0, 6.0, 0.0, 10.0)),
                ..Default::default()
            },
        );
        add(
            "html-a",
            StyleAttributes {
                color: Some(Color::rgb(0x0969da)),
                decoration: Some(Decoration::Underline),
                ..Default::default()
            },
        );
        let bold = StyleAttributes {
            bold: Some(true),
            ..Default::default()
        };
        let italics = StyleAttributes {
            italics: Some(true),
            ..Default::default()
        };
        add("html-strong", bold.clone());
        add("html-b", bold);
        add("html-em", italics.clone());
        add("html-i", italics);
        add(
            "html-del",
            StyleAttributes {
                decoration: Some(Decoration::LineThrough),
                ..Default::default()
            },
        );
        add(
            "html-li",
            StyleAttributes {
                margin: Some(Edges::vertical(0.0, 2.0)),
                line_height: Some(1.5),
                ..Default::default()
            },
        );
        let list = StyleAttributes {
            margin: Some(Edges::vertical(0.0, 8.0)),
            ..Default::default()
        };
        add("html-ul", list.clone());
        add("html-ol", list);
        add(
            "html-blockquote",
            StyleAttributes {
                margin: Some(Edges::ltrb(10.0, 4.0, 0.0, 4.0)),
                italics: Some(true),
                color: Some(muted),
                ..Default::default()
            },
        );
        add(
            "html-th",
            StyleAttributes {
                bold: Some(true),
                fill_color: Some(header_fill),
                color: Some(text),
                font_size: Some(10.0),
                ..Default::default()
            },
        );
        add(
            "html-td",
            StyleAttributes {
                color: Some(text),
                font_size: Some(10.0),
                ..Default::default()
            },
        );
        add(
            "html-table",
            StyleAttributes {
                margin: Some(Edges::vertical(0.0, 10.0)),
                ..Default::default()
            },
        );
        add(
            "html-hr",
            StyleAttributes {
                margin: Some(Edges::vertical(10.0, 10.0)),
                color: Some(Color::rgb(0xd0d7de)),
                ..Default::default()
            },
        );

        Self { entries }
    }

    pub fn get(&self, tag: SemanticTag) -> Option<&StyleAttributes> {
        self.entries.get(tag.style_name())
    }

    pub fn get_by_name(&self, name: &str) -> Option<&StyleAttributes> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Margin contributed by the last tag in `tags` that defines one.
    pub fn margin_for(&self, tags: &[SemanticTag]) -> Option<Edges> {
        tags.iter()
            .rev()
            .find_map(|t| self.get(*t).and_then(|a| a.margin))
    }

    /// Fill colour contributed by the last tag in `tags` that defines one.
    pub fn fill_for(&self, tags: &[SemanticTag]) -> Option<Color> {
        tags.iter()
            .rev()
            .find_map(|t| self.get(*t).and_then(|a| a.fill_color))
    }

    /// Cascade `tags` (in order) onto `parent`.
    pub fn cascade(&self, parent: &TextStyle, tags: &[SemanticTag]) -> TextStyle {
        let mut style = parent.clone();
        for tag in tags {
            if let Some(attrs) = self.get(*tag) {
                style.apply(attrs);
            }
        }
        style
    }
}

impl Default for StyleSheet {
    fn default() -> Self {
        Self::github()
    }
}
