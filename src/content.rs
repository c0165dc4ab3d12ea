//! Content tree – the renderer-agnostic document representation produced by
//! the mapper, rewritten by the post-processor and consumed by the PDF engine.
//!
//! Nodes coming out of the mapper carry only [`SemanticTag`]s. Rendering
//! instructions ([`TableLayout`], [`CanvasNode`], explicit code-box styling)
//! are introduced by [`crate::postprocess`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::stylesheet::{Color, Edges, FontFamily};

/// Image key → `data:` URI.
pub type ImageTable = BTreeMap<String, String>;

/// The document role of a node, independent of how it looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SemanticTag {
    Heading(u8),
    Paragraph,
    Preformatted,
    Code,
    Link,
    Strong,
    Emphasis,
    Bold,
    Italic,
    Strikethrough,
    UnorderedList,
    OrderedList,
    ListItem,
    Blockquote,
    Rule,
    Table,
    TableHeader,
    TableCell,
    Image,
    Span,
    Division,
}

impl SemanticTag {
    /// The style sheet key for this tag.
    pub fn style_name(self) -> &'static str {
        match self {
            SemanticTag::Heading(1) => "html-h1",
            SemanticTag::Heading(2) => "html-h2",
            SemanticTag::Heading(3) => "html-h3",
            SemanticTag::Heading(4) => "html-h4",
            SemanticTag::Heading(5) => "html-h5",
            SemanticTag::Heading(_) => "html-h6",
            SemanticTag::Paragraph => "html-p",
            SemanticTag::Preformatted => "html-pre",
            SemanticTag::Code => "html-code",
            SemanticTag::Link => "html-a",
            SemanticTag::Strong => "html-strong",
            SemanticTag::Emphasis => "html-em",
            SemanticTag::Bold => "html-b",
            SemanticTag::Italic => "html-i",
            SemanticTag::Strikethrough => "html-del",
            SemanticTag::UnorderedList => "html-ul",
            SemanticTag::OrderedList => "html-ol",
            SemanticTag::ListItem => "html-li",
            SemanticTag::Blockquote => "html-blockquote",
            SemanticTag::Rule => "html-hr",
            SemanticTag::Table => "html-table",
            SemanticTag::TableHeader => "html-th",
            SemanticTag::TableCell => "html-td",
            SemanticTag::Image => "html-img",
            SemanticTag::Span => "html-span",
            SemanticTag::Division => "html-div",
        }
    }
}

/// One renderable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentNode {
    Text(TextNode),
    Stack(StackNode),
    Table(TableNode),
    Image(ImageNode),
    Canvas(CanvasNode),
}

impl ContentNode {
    /// Plain text run with no tags.
    pub fn text(s: impl Into<String>) -> Self {
        ContentNode::Text(TextNode::plain(s))
    }

    pub fn tags(&self) -> &[SemanticTag] {
        match self {
            ContentNode::Text(t) => &t.tags,
            ContentNode::Stack(s) => &s.tags,
            ContentNode::Table(t) => &t.tags,
            ContentNode::Image(i) => &i.tags,
            ContentNode::Canvas(_) => &[],
        }
    }

    pub fn has_tag(&self, tag: SemanticTag) -> bool {
        self.tags().contains(&tag)
    }

    /// Block-level nodes cannot live inside a line of inline runs.
    pub fn is_block(&self) -> bool {
        match self {
            ContentNode::Text(t) => t.tags.iter().any(|tag| {
                matches!(
                    tag,
                    SemanticTag::Heading(_)
                        | SemanticTag::Paragraph
                        | SemanticTag::Preformatted
                        | SemanticTag::ListItem
                        | SemanticTag::TableHeader
                        | SemanticTag::TableCell
                        | SemanticTag::Division
                )
            }),
            _ => true,
        }
    }
}

/// The body of a text node: a literal string or a sequence of inline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextBody {
    Plain(String),
    Runs(Vec<ContentNode>),
}

/// Explicit per-node overrides. Empty on mapper output except for colours and
/// weights coming from inline `style` attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextOverrides {
    pub font: Option<FontFamily>,
    pub font_size: Option<f32>,
    pub bold: Option<bool>,
    pub italics: Option<bool>,
    pub color: Option<Color>,
    pub line_height: Option<f32>,
    pub margin: Option<Edges>,
    #[serde(default)]
    pub preserve_leading_spaces: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub body: TextBody,
    pub tags: Vec<SemanticTag>,
    #[serde(default)]
    pub overrides: TextOverrides,
    pub link: Option<String>,
}

impl TextNode {
    pub fn plain(s: impl Into<String>) -> Self {
        Self {
            body: TextBody::Plain(s.into()),
            tags: Vec::new(),
            overrides: TextOverrides::default(),
            link: None,
        }
    }

    pub fn runs(runs: Vec<ContentNode>, tags: Vec<SemanticTag>) -> Self {
        Self {
            body: TextBody::Runs(runs),
            tags,
            overrides: TextOverrides::default(),
            link: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListStyle {
    Bullet,
    Ordered { start: u32 },
}

impl ListStyle {
    /// The marker drawn in front of the `index`-th (0-based) item.
    pub fn marker(&self, index: usize) -> String {
        match self {
            ListStyle::Bullet => "\u{2022}".to_string(),
            ListStyle::Ordered { start } => format!("{}.", *start as usize + index),
        }
    }
}

/// Children rendered top to bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackNode {
    pub children: Vec<ContentNode>,
    pub tags: Vec<SemanticTag>,
    pub list: Option<ListStyle>,
}

impl StackNode {
    pub fn new(children: Vec<ContentNode>, tags: Vec<SemanticTag>) -> Self {
        Self {
            children,
            tags,
            list: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnWidth {
    Auto,
    Star,
    Fixed(f32),
}

/// Which rows receive a background fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFill {
    None,
    All(Color),
    HeaderOnly(Color),
}

/// Border, padding and fill rules for a table. One stroke width and colour
/// applies to every grid line; the fill is chosen per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableLayout {
    pub line_width: f32,
    pub line_color: Color,
    pub padding: Edges,
    pub fill: RowFill,
}

impl TableLayout {
    pub fn fill_color(&self, row: usize) -> Option<Color> {
        match self.fill {
            RowFill::None => None,
            RowFill::All(c) => Some(c),
            RowFill::HeaderOnly(c) if row == 0 => Some(c),
            RowFill::HeaderOnly(_) => None,
        }
    }

    pub fn padding(&self) -> Edges {
        self.padding
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableNode {
    pub widths: Vec<ColumnWidth>,
    pub body: Vec<Vec<ContentNode>>,
    pub header_rows: usize,
    pub tags: Vec<SemanticTag>,
    pub layout: Option<TableLayout>,
    /// Outer margin; `None` falls back to the style sheet.
    pub margin: Option<Edges>,
}

impl TableNode {
    pub fn columns(&self) -> usize {
        self.widths
            .len()
            .max(self.body.iter().map(Vec::len).max().unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// A URI (normally `data:`) carried on the node itself.
    Inline(String),
    /// A key into the document's [`ImageTable`].
    Reference(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageNode {
    pub source: ImageSource,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub tags: Vec<SemanticTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        line_width: f32,
        color: Color,
    },
}

/// Explicit drawing instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasNode {
    pub shapes: Vec<Shape>,
    pub margin: Edges,
}
