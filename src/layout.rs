//! Layout engine – uses Taffy to compute a flex-column flow from the content
//! tree, then converts the result into a list of positioned boxes in document
//! coordinates (before page splitting).
//!
//! Text is wrapped at build time against the width its parent hands down, so
//! every text node becomes a fixed-height leaf. Tables are a column of flex
//! rows whose cells share the row width equally (fixed widths excepted).

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use taffy::prelude::*;

use crate::content::{
    CanvasNode, ColumnWidth, ContentNode, ImageNode, ImageSource, ImageTable, SemanticTag, Shape,
    StackNode, TableLayout, TableNode, TextBody, TextNode, TextOverrides,
};
use crate::document::DocumentDescription;
use crate::error::{Error, Result};
use crate::fonts::{break_word, FontKey, FontManager};
use crate::layout_config::{ImageContent, LineSegment, ListMarker, TextFragment, TextLine};
use crate::stylesheet::{Color, Decoration, Edges, StyleSheet, TextStyle};

/// Left indent of list items; markers are drawn in this gutter.
pub const LIST_INDENT: f32 = 18.0;

/// Cell padding for tables that carry no explicit layout.
const DEFAULT_CELL_PADDING: Edges = Edges {
    top: 2.0,
    right: 4.0,
    bottom: 2.0,
    left: 4.0,
};

// ---------------------------------------------------------------------------
// Intermediate layout tree (pre-pagination)
// ---------------------------------------------------------------------------

/// A positioned box in document coordinates (before page splitting).
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub content: BoxContent,
    pub fill: Option<[f32; 4]>,
    pub rules: Option<RowRules>,
    pub marker: Option<ListMarker>,
    pub children: Vec<PositionedBox>,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    /// Wrapped lines, offsets relative to the box top.
    Text(Vec<TextLine>),
    Image(ImageContent),
    /// Strokes relative to the box's top-left corner.
    Lines(Vec<LineSegment>),
    /// A table; its children are rows.
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub width: f32,
    pub color: [f32; 4],
}

impl Rule {
    fn new(width: f32, color: Color) -> Option<Self> {
        (width > 0.0).then(|| Self {
            width,
            color: color.to_array(),
        })
    }
}

/// Border strokes belonging to one table row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowRules {
    pub top: Option<Rule>,
    pub bottom: Option<Rule>,
    /// One slot per column boundary, left to right.
    pub column_rules: Vec<Option<Rule>>,
    /// Resolved vertical strokes: x relative to the row, and the rule.
    pub verticals: Vec<(f32, Rule)>,
}

impl RowRules {
    /// Every row draws its top edge; only the last row draws the bottom one.
    fn for_row(layout: &TableLayout, row: usize, rows: usize, columns: usize) -> Self {
        let rule = Rule::new(layout.line_width, layout.line_color);
        Self {
            top: rule,
            bottom: if row + 1 == rows { rule } else { None },
            column_rules: vec![rule; columns + 1],
            verticals: Vec::new(),
        }
    }

    /// Resolve column boundaries from the laid-out cells.
    fn place_verticals(&mut self, cells: &[PositionedBox], row_x: f32, row_width: f32) {
        self.verticals = self
            .column_rules
            .iter()
            .enumerate()
            .filter_map(|(i, rule)| {
                let x = cells.get(i).map(|c| c.x - row_x).unwrap_or(row_width);
                rule.map(|r| (x, r))
            })
            .collect();
    }

    /// Stroke used to close a row cut across a page boundary.
    pub fn cut_rule(&self) -> Option<Rule> {
        self.top.or(self.bottom)
    }

    pub fn segments(&self, width: f32, height: f32) -> Vec<LineSegment> {
        let seg = |x1: f32, y1: f32, x2: f32, y2: f32, r: &Rule| LineSegment {
            x1,
            y1,
            x2,
            y2,
            width: r.width,
            color: r.color,
        };
        let mut out = Vec::new();
        if let Some(r) = &self.top {
            out.push(seg(0.0, 0.0, width, 0.0, r));
        }
        if let Some(r) = &self.bottom {
            out.push(seg(0.0, height, width, height, r));
        }
        for (x, r) in &self.verticals {
            out.push(seg(*x, 0.0, *x, height, r));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Inline text wrapping
// ---------------------------------------------------------------------------

/// A styled piece of inline text before wrapping.
#[derive(Debug, Clone)]
struct Run {
    text: String,
    style: TextStyle,
}

fn font_key(style: &TextStyle) -> FontKey {
    FontKey::new(style.font, style.bold, style.italics)
}

enum Token<'t> {
    Word(&'t str),
    Space,
    Newline,
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(start) = word_start.take() {
                tokens.push(Token::Word(&text[start..i]));
            }
            tokens.push(if ch == '\n' {
                Token::Newline
            } else {
                Token::Space
            });
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }
    if let Some(start) = word_start {
        tokens.push(Token::Word(&text[start..]));
    }
    tokens
}

/// Accumulates fragments into lines of at most `max_width`.
struct LineBuilder<'a> {
    fonts: &'a FontManager,
    max_width: f32,
    lines: Vec<TextLine>,
    /// Pending fragments with their run index and line height factor.
    current: Vec<(usize, f32, TextFragment)>,
    x: f32,
    y: f32,
    /// Metrics for an empty line: (font size, line height factor, key).
    empty_metrics: (f32, f32, FontKey),
}

impl<'a> LineBuilder<'a> {
    fn new(fonts: &'a FontManager, max_width: f32, base: &TextStyle) -> Self {
        Self {
            fonts,
            max_width,
            lines: Vec::new(),
            current: Vec::new(),
            x: 0.0,
            y: 0.0,
            empty_metrics: (base.font_size, base.line_height, font_key(base)),
        }
    }

    fn width_of(&self, text: &str, style: &TextStyle) -> f32 {
        self.fonts
            .measure_text_width(text, style.font_size, font_key(style))
    }

    fn push(&mut self, run: usize, text: &str, style: &TextStyle) {
        let width = self.width_of(text, style);
        self.empty_metrics = (style.font_size, style.line_height, font_key(style));
        if let Some((last_run, _, frag)) = self.current.last_mut() {
            if *last_run == run {
                frag.text.push_str(text);
                frag.width += width;
                self.x += width;
                return;
            }
        }
        self.current.push((
            run,
            style.line_height,
            TextFragment {
                text: text.to_string(),
                x_offset: self.x,
                width,
                font_family: style.font,
                font_size: style.font_size,
                bold: style.bold,
                italic: style.italics,
                color: style.color.to_array(),
                background: style.background.map(Color::to_array),
                underline: style.decoration == Decoration::Underline,
                strike: style.decoration == Decoration::LineThrough,
            },
        ));
        self.x += width;
    }

    fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    fn finish_line(&mut self) {
        let pending: Vec<(usize, f32, TextFragment)> = self.current.drain(..).collect();
        let (height, baseline) = if pending.is_empty() {
            let (size, factor, key) = self.empty_metrics;
            let h = self.fonts.line_height_px(size, factor);
            (h, (h - size) / 2.0 + self.fonts.ascender_px(size, key))
        } else {
            let mut height = 0.0f32;
            let mut baseline = 0.0f32;
            for (_, factor, f) in &pending {
                let h = self.fonts.line_height_px(f.font_size, *factor);
                let key = FontKey::new(f.font_family, f.bold, f.italic);
                height = height.max(h);
                baseline = baseline
                    .max((h - f.font_size) / 2.0 + self.fonts.ascender_px(f.font_size, key));
            }
            (height, baseline)
        };
        let fragments = pending.into_iter().map(|(_, _, f)| f).collect();
        self.lines.push(TextLine {
            y_offset: self.y,
            height,
            baseline,
            fragments,
        });
        self.y += height;
        self.x = 0.0;
    }

    /// Flowing text: whitespace collapses, lines break between words.
    fn flow(&mut self, runs: &[Run]) {
        let mut pending_space: Option<usize> = None;
        for (idx, run) in runs.iter().enumerate() {
            for token in tokenize(&run.text) {
                match token {
                    Token::Newline => {
                        self.finish_line();
                        pending_space = None;
                    }
                    Token::Space => {
                        if !self.is_empty() {
                            pending_space = Some(idx);
                        }
                    }
                    Token::Word(word) => self.place_word(idx, word, runs, &mut pending_space),
                }
            }
        }
        if !self.is_empty() {
            self.finish_line();
        }
    }

    fn place_word(
        &mut self,
        idx: usize,
        word: &str,
        runs: &[Run],
        pending_space: &mut Option<usize>,
    ) {
        let style = &runs[idx].style;
        let word_w = self.width_of(word, style);
        let space_w = pending_space
            .map(|s| self.width_of(" ", &runs[s].style))
            .unwrap_or(0.0);

        if !self.is_empty() && self.x + space_w + word_w > self.max_width {
            self.finish_line();
            *pending_space = None;
        } else if let Some(s) = pending_space.take() {
            self.push(s, " ", &runs[s].style);
        }

        if word_w <= self.max_width - self.x {
            self.push(idx, word, style);
            return;
        }
        let pieces = break_word(
            word,
            style.font_size,
            font_key(style),
            self.max_width,
            self.fonts,
        );
        let count = pieces.len();
        for (i, piece) in pieces.into_iter().enumerate() {
            self.push(idx, &piece, style);
            if i + 1 < count {
                self.finish_line();
            }
        }
    }

    /// Preformatted text: every character is kept, lines break on `\n` and
    /// between characters when a line overflows.
    fn preformatted(&mut self, runs: &[Run]) {
        let mut buf = [0u8; 4];
        for (idx, run) in runs.iter().enumerate() {
            for ch in run.text.chars() {
                match ch {
                    '\n' => self.finish_line(),
                    '\r' => {}
                    '\t' => {
                        for _ in 0..4 {
                            self.push_char_wrapped(idx, " ", &run.style);
                        }
                    }
                    c => {
                        let s: &str = c.encode_utf8(&mut buf);
                        self.push_char_wrapped(idx, s, &run.style);
                    }
                }
            }
        }
        if !self.is_empty() {
            self.finish_line();
        }
    }

    fn push_char_wrapped(&mut self, idx: usize, s: &str, style: &TextStyle) {
        let w = self.width_of(s, style);
        if !self.is_empty() && self.x + w > self.max_width {
            self.finish_line();
        }
        self.push(idx, s, style);
    }
}

// ---------------------------------------------------------------------------
// Build Taffy tree from content nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct NodeInfo {
    content: Option<BoxContent>,
    fill: Option<[f32; 4]>,
    rules: Option<RowRules>,
    marker: Option<ListMarker>,
}

fn layout_err(e: taffy::TaffyError) -> Error {
    Error::Layout(e.to_string())
}

fn margin_rect(m: Edges) -> Rect<LengthPercentageAuto> {
    Rect {
        top: LengthPercentageAuto::Length(m.top),
        right: LengthPercentageAuto::Length(m.right),
        bottom: LengthPercentageAuto::Length(m.bottom),
        left: LengthPercentageAuto::Length(m.left),
    }
}

fn padding_rect(p: Edges) -> Rect<LengthPercentage> {
    Rect {
        top: LengthPercentage::Length(p.top),
        right: LengthPercentage::Length(p.right),
        bottom: LengthPercentage::Length(p.bottom),
        left: LengthPercentage::Length(p.left),
    }
}

fn column_style(margin: Edges, padding: Edges) -> Style {
    Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        flex_shrink: 0.0,
        margin: margin_rect(margin),
        padding: padding_rect(padding),
        ..Default::default()
    }
}

fn apply_overrides(style: &mut TextStyle, o: &TextOverrides) {
    if let Some(f) = o.font {
        style.font = f;
    }
    if let Some(s) = o.font_size {
        style.font_size = s;
    }
    if let Some(b) = o.bold {
        style.bold = b;
    }
    if let Some(i) = o.italics {
        style.italics = i;
    }
    if let Some(c) = o.color {
        style.color = c;
    }
    if let Some(lh) = o.line_height {
        style.line_height = lh;
    }
}

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    styles: &'a StyleSheet,
    images: &'a ImageTable,
    max_image_height: f32,
    info: HashMap<NodeId, NodeInfo>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(
        fonts: &'a FontManager,
        styles: &'a StyleSheet,
        images: &'a ImageTable,
        max_image_height: f32,
    ) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            styles,
            images,
            max_image_height,
            info: HashMap::new(),
        }
    }

    fn info_mut(&mut self, node: NodeId) -> &mut NodeInfo {
        self.info.entry(node).or_default()
    }

    fn build_node(&mut self, node: &ContentNode, parent: &TextStyle, width: f32) -> Result<NodeId> {
        match node {
            ContentNode::Text(t) => self.build_text(t, parent, width),
            ContentNode::Stack(s) => self.build_stack(s, parent, width),
            ContentNode::Table(t) => self.build_table(t, parent, width),
            ContentNode::Image(i) => self.build_image(i, width),
            ContentNode::Canvas(c) => self.build_canvas(c, width),
        }
    }

    fn resolve_style(&self, parent: &TextStyle, tags: &[SemanticTag], o: &TextOverrides) -> TextStyle {
        let mut style = self.styles.cascade(parent, tags);
        apply_overrides(&mut style, o);
        style
    }

    fn collect_runs(&self, body: &TextBody, style: &TextStyle, out: &mut Vec<Run>) {
        match body {
            TextBody::Plain(s) => out.push(Run {
                text: s.clone(),
                style: style.clone(),
            }),
            TextBody::Runs(children) => {
                for child in children {
                    match child {
                        ContentNode::Text(t) => {
                            let child_style = self.resolve_style(style, &t.tags, &t.overrides);
                            self.collect_runs(&t.body, &child_style, out);
                        }
                        other => log::debug!("ignoring non-text node inside inline runs: {:?}", other.tags()),
                    }
                }
            }
        }
    }

    fn wrap(&self, t: &TextNode, style: &TextStyle, max_width: f32) -> Vec<TextLine> {
        let mut runs = Vec::new();
        self.collect_runs(&t.body, style, &mut runs);
        let mut builder = LineBuilder::new(self.fonts, max_width, style);
        if t.overrides.preserve_leading_spaces || t.tags.contains(&SemanticTag::Preformatted) {
            builder.preformatted(&runs);
        } else {
            builder.flow(&runs);
        }
        builder.lines
    }

    fn build_text(&mut self, t: &TextNode, parent: &TextStyle, width: f32) -> Result<NodeId> {
        let style = self.resolve_style(parent, &t.tags, &t.overrides);
        let margin = t
            .overrides
            .margin
            .or_else(|| self.styles.margin_for(&t.tags))
            .unwrap_or(Edges::ZERO);
        let inner = (width - margin.horizontal()).max(1.0);
        let lines = self.wrap(t, &style, inner);
        let height = lines.last().map(|l| l.y_offset + l.height).unwrap_or(0.0);

        let node = self
            .taffy
            .new_leaf(Style {
                size: Size {
                    width: Dimension::Auto,
                    height: Dimension::Length(height),
                },
                flex_shrink: 0.0,
                margin: margin_rect(margin),
                ..Default::default()
            })
            .map_err(layout_err)?;
        self.info_mut(node).content = Some(BoxContent::Text(lines));
        Ok(node)
    }

    fn build_stack(&mut self, s: &StackNode, parent: &TextStyle, width: f32) -> Result<NodeId> {
        let style = self.styles.cascade(parent, &s.tags);
        let margin = self.styles.margin_for(&s.tags).unwrap_or(Edges::ZERO);
        let indent = if s.list.is_some() { LIST_INDENT } else { 0.0 };
        let inner = (width - margin.horizontal() - indent).max(1.0);

        let mut children = Vec::with_capacity(s.children.len());
        for (i, child) in s.children.iter().enumerate() {
            let id = self.build_node(child, &style, inner)?;
            if let Some(list) = &s.list {
                let marker = self.marker(list.marker(i), &style, id);
                self.info_mut(id).marker = Some(marker);
            }
            children.push(id);
        }

        let padding = Edges {
            left: indent,
            ..Edges::ZERO
        };
        self.taffy
            .new_with_children(column_style(margin, padding), &children)
            .map_err(layout_err)
    }

    /// A list marker aligned with the first text line of `item`.
    fn marker(&self, text: String, style: &TextStyle, item: NodeId) -> ListMarker {
        let key = font_key(style);
        let width = self.fonts.measure_text_width(&text, style.font_size, key);
        let baseline = match self.info.get(&item).and_then(|i| i.content.as_ref()) {
            Some(BoxContent::Text(lines)) if !lines.is_empty() => lines[0].baseline,
            _ => {
                let h = self.fonts.line_height_px(style.font_size, style.line_height);
                (h - style.font_size) / 2.0 + self.fonts.ascender_px(style.font_size, key)
            }
        };
        ListMarker {
            text,
            x_offset: -(width + 6.0),
            baseline,
            font_size: style.font_size,
            color: style.color.to_array(),
        }
    }

    fn build_table(&mut self, t: &TableNode, parent: &TextStyle, width: f32) -> Result<NodeId> {
        let style = self.styles.cascade(parent, &t.tags);
        let margin = t
            .margin
            .or_else(|| self.styles.margin_for(&t.tags))
            .or_else(|| self.styles.get(SemanticTag::Table).and_then(|a| a.margin))
            .unwrap_or(Edges::ZERO);
        let layout = t.layout.as_ref();
        let padding = layout.map(TableLayout::padding).unwrap_or(DEFAULT_CELL_PADDING);

        let columns = t.columns().max(1);
        let spec = |c: usize| t.widths.get(c).copied().unwrap_or(ColumnWidth::Auto);
        let fixed: f32 = (0..columns)
            .filter_map(|c| match spec(c) {
                ColumnWidth::Fixed(w) => Some(w),
                _ => None,
            })
            .sum();
        let flexible = (0..columns)
            .filter(|&c| !matches!(spec(c), ColumnWidth::Fixed(_)))
            .count()
            .max(1);
        let inner = width - margin.horizontal();
        let flex_width = ((inner - fixed) / flexible as f32).max(1.0);

        let rows = t.body.len();
        let mut row_ids = Vec::with_capacity(rows);
        for (r, row) in t.body.iter().enumerate() {
            let row_fill = layout.and_then(|l| l.fill_color(r));
            let mut cell_ids = Vec::with_capacity(columns);
            for c in 0..columns {
                let (col_width, grow, basis) = match spec(c) {
                    ColumnWidth::Fixed(w) => (w, 0.0, Dimension::Length(w)),
                    _ => (flex_width, 1.0, Dimension::Length(0.0)),
                };
                let cell = row.get(c);
                let content_width = (col_width - padding.horizontal()).max(1.0);
                let mut kids = Vec::new();
                if let Some(cell) = cell {
                    kids.push(self.build_node(cell, &style, content_width)?);
                }
                let cell_style = Style {
                    display: taffy::Display::Flex,
                    flex_direction: taffy::FlexDirection::Column,
                    flex_grow: grow,
                    flex_shrink: 1.0,
                    flex_basis: basis,
                    min_size: Size {
                        width: Dimension::Length(0.0),
                        height: Dimension::Auto,
                    },
                    padding: padding_rect(padding),
                    ..Default::default()
                };
                let id = self
                    .taffy
                    .new_with_children(cell_style, &kids)
                    .map_err(layout_err)?;
                if row_fill.is_none() {
                    if let Some(fill) = cell.and_then(|n| self.styles.fill_for(n.tags())) {
                        self.info_mut(id).fill = Some(fill.to_array());
                    }
                }
                cell_ids.push(id);
            }

            let row_id = self
                .taffy
                .new_with_children(
                    Style {
                        display: taffy::Display::Flex,
                        flex_direction: taffy::FlexDirection::Row,
                        align_items: Some(taffy::AlignItems::Stretch),
                        flex_shrink: 0.0,
                        ..Default::default()
                    },
                    &cell_ids,
                )
                .map_err(layout_err)?;
            let info = self.info_mut(row_id);
            info.fill = row_fill.map(Color::to_array);
            info.rules = layout.map(|l| RowRules::for_row(l, r, rows, columns));
            row_ids.push(row_id);
        }

        let node = self
            .taffy
            .new_with_children(column_style(margin, Edges::ZERO), &row_ids)
            .map_err(layout_err)?;
        self.info_mut(node).content = Some(BoxContent::Table);
        Ok(node)
    }

    fn build_image(&mut self, img: &ImageNode, width: f32) -> Result<NodeId> {
        let src = match &img.source {
            ImageSource::Inline(uri) => Some(uri.clone()),
            ImageSource::Reference(key) => {
                let found = self.images.get(key).cloned();
                if found.is_none() {
                    log::warn!("image reference {key:?} missing from image table");
                }
                found
            }
        };

        let resolved = src.and_then(|src| match intrinsic_size(&src) {
            Some((px_w, px_h)) => {
                let (w, h) = fit_image(
                    px_w,
                    px_h,
                    img.width,
                    img.height,
                    width,
                    self.max_image_height,
                );
                Some(ImageContent {
                    src,
                    width: w,
                    height: h,
                })
            }
            None => {
                let preview: String = src.chars().take(60).collect();
                log::warn!("skipping image that is not a decodable data URI: {preview}");
                None
            }
        });

        let (w, h) = resolved
            .as_ref()
            .map(|i| (i.width, i.height))
            .unwrap_or((0.0, 0.0));
        let node = self
            .taffy
            .new_leaf(Style {
                size: Size {
                    width: Dimension::Length(w),
                    height: Dimension::Length(h),
                },
                flex_shrink: 0.0,
                margin: margin_rect(Edges::vertical(0.0, if h > 0.0 { 8.0 } else { 0.0 })),
                ..Default::default()
            })
            .map_err(layout_err)?;
        if let Some(image) = resolved {
            self.info_mut(node).content = Some(BoxContent::Image(image));
        }
        Ok(node)
    }

    fn build_canvas(&mut self, c: &CanvasNode, width: f32) -> Result<NodeId> {
        let avail = (width - c.margin.horizontal()).max(0.0);
        let mut segments = Vec::with_capacity(c.shapes.len());
        let mut height = 0.0f32;
        for shape in &c.shapes {
            match shape {
                Shape::Line {
                    x1,
                    y1,
                    x2,
                    y2,
                    line_width,
                    color,
                } => {
                    let half = line_width / 2.0;
                    segments.push(LineSegment {
                        x1: x1.min(avail),
                        y1: y1 + half,
                        x2: x2.min(avail),
                        y2: y2 + half,
                        width: *line_width,
                        color: color.to_array(),
                    });
                    height = height.max(y1.max(*y2) + line_width);
                }
            }
        }

        let node = self
            .taffy
            .new_leaf(Style {
                size: Size {
                    width: Dimension::Auto,
                    height: Dimension::Length(height),
                },
                flex_shrink: 0.0,
                margin: margin_rect(c.margin),
                ..Default::default()
            })
            .map_err(layout_err)?;
        self.info_mut(node).content = Some(BoxContent::Lines(segments));
        Ok(node)
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox> {
        let layout = self.taffy.layout(node).map_err(layout_err)?;
        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;
        let (width, height) = (layout.size.width, layout.size.height);

        let children = self
            .taffy
            .children(node)
            .map_err(layout_err)?
            .into_iter()
            .map(|child| self.extract(child, x, y))
            .collect::<Result<Vec<_>>>()?;

        let info = self.info.get(&node);
        let mut rules = info.and_then(|i| i.rules.clone());
        if let Some(r) = rules.as_mut() {
            r.place_verticals(&children, x, width);
        }

        Ok(PositionedBox {
            x,
            y,
            width,
            height,
            content: info
                .and_then(|i| i.content.clone())
                .unwrap_or(BoxContent::None),
            fill: info.and_then(|i| i.fill),
            rules,
            marker: info.and_then(|i| i.marker.clone()),
            children,
        })
    }
}

// ---------------------------------------------------------------------------
// Image intrinsic-size helpers
// ---------------------------------------------------------------------------

/// Decode a base64 data URI far enough to learn its pixel dimensions.
fn intrinsic_size(src: &str) -> Option<(f32, f32)> {
    if !src.starts_with("data:") || !src.contains(";base64,") {
        return None;
    }
    let comma = src.find(',')?;
    let bytes = BASE64_STD.decode(src[comma + 1..].trim()).ok()?;
    let img = ::image::load_from_memory(&bytes).ok()?;
    let (w, h) = (img.width() as f32, img.height() as f32);
    (w > 0.0 && h > 0.0).then_some((w, h))
}

/// Resolve the drawn size of an image: explicit dimensions win, a single
/// explicit dimension keeps the aspect ratio, and the result is scaled down
/// to fit the available box.
fn fit_image(
    px_w: f32,
    px_h: f32,
    want_w: Option<f32>,
    want_h: Option<f32>,
    max_w: f32,
    max_h: f32,
) -> (f32, f32) {
    let aspect = px_w / px_h;
    let (w, h) = match (want_w, want_h) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, w / aspect),
        (None, Some(h)) => (h * aspect, h),
        (None, None) => (px_w, px_h),
    };
    let scale = (max_w / w).min(max_h / h).min(1.0);
    ((w * scale).max(1.0), (h * scale).max(1.0))
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute layout for a document description, returning the top-level
/// positioned boxes in document coordinates. `x` already includes the left
/// page margin; `y` starts at zero.
pub fn compute_layout(
    doc: &DocumentDescription,
    fonts: &FontManager,
    page_width: f32,
    page_height: f32,
) -> Result<Vec<PositionedBox>> {
    let margins = doc.page_margins;
    let content_width = (page_width - margins.horizontal()).max(1.0);
    let content_height = (page_height - margins.top - margins.bottom).max(1.0);
    let mut builder = LayoutBuilder::new(fonts, &doc.styles, &doc.images, content_height);

    let mut child_ids = Vec::with_capacity(doc.content.len());
    for node in &doc.content {
        child_ids.push(builder.build_node(node, &doc.default_style, content_width)?);
    }

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: Dimension::Length(content_width),
            height: Dimension::Auto,
        },
        ..Default::default()
    };
    let root = builder
        .taffy
        .new_with_children(root_style, &child_ids)
        .map_err(layout_err)?;

    builder
        .taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(content_width),
                height: AvailableSpace::MaxContent,
            },
        )
        .map_err(layout_err)?;

    let root_box = builder.extract(root, margins.left, 0.0)?;
    log::debug!(
        "laid out {} top-level boxes, document height {:.1}pt",
        root_box.children.len(),
        root_box.height
    );
    Ok(root_box.children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ListStyle, RowFill};
    use crate::document::{assemble, PageRequest};
    use crate::postprocess::{code_block_table, horizontal_rule};
    use std::path::Path;

    fn doc(content: Vec<ContentNode>) -> DocumentDescription {
        assemble(
            content,
            ImageTable::new(),
            StyleSheet::github(),
            &PageRequest {
                page_size: "A4",
                margin: 40.0,
                title: None,
            },
            Path::new("t.md"),
        )
    }

    fn layout(content: Vec<ContentNode>) -> Vec<PositionedBox> {
        compute_layout(&doc(content), &FontManager::default(), 595.28, 841.89).unwrap()
    }

    fn lines_of(b: &PositionedBox) -> Vec<String> {
        match &b.content {
            BoxContent::Text(lines) => lines.iter().map(TextLine::text).collect(),
            _ => b.children.iter().flat_map(lines_of).collect(),
        }
    }

    fn tagged(s: &str, tag: SemanticTag) -> ContentNode {
        let mut t = TextNode::plain(s);
        t.tags = vec![tag];
        ContentNode::Text(t)
    }

    #[test]
    fn layout_simple_paragraph() {
        let boxes = layout(vec![tagged("Hello world", SemanticTag::Paragraph)]);
        assert_eq!(boxes.len(), 1);
        let first = &boxes[0];
        assert!(first.width > 0.0, "Box should have width");
        assert!(first.height > 0.0, "Box should have height");
        assert!((first.x - 40.0).abs() < 0.01);
        assert_eq!(lines_of(first), vec!["Hello world"]);
    }

    #[test]
    fn long_paragraph_wraps_within_content_width() {
        let text = "lorem ipsum dolor sit amet ".repeat(40);
        let boxes = layout(vec![tagged(&text, SemanticTag::Paragraph)]);
        let BoxContent::Text(lines) = &boxes[0].content else {
            panic!("expected text");
        };
        assert!(lines.len() > 3);
        for line in lines {
            let right = line.fragments.last().map(|f| f.x_offset + f.width).unwrap();
            assert!(right <= boxes[0].width + 0.01, "line overflows: {right}");
        }
    }

    #[test]
    fn code_block_keeps_lines_and_indentation() {
        let boxes = layout(vec![code_block_table("fn main() {\n    body();\n}")]);
        assert!(matches!(boxes[0].content, BoxContent::Table));
        assert_eq!(lines_of(&boxes[0]), vec!["fn main() {", "    body();", "}"]);

        let row = &boxes[0].children[0];
        assert!(row.fill.is_some());
        let rules = row.rules.as_ref().unwrap();
        assert!(rules.top.is_some() && rules.bottom.is_some());
        assert_eq!(rules.verticals.len(), 2);
    }

    #[test]
    fn row_rules_close_only_the_last_row() {
        let mut grid = TableLayout {
            line_width: 0.5,
            line_color: Color::BLACK,
            padding: Edges::uniform(5.0),
            fill: RowFill::None,
        };
        let first = RowRules::for_row(&grid, 0, 2, 3);
        let last = RowRules::for_row(&grid, 1, 2, 3);
        assert_eq!(first.top.map(|r| r.width), Some(0.5));
        assert!(first.bottom.is_none());
        assert!(last.bottom.is_some());
        assert_eq!(first.column_rules.len(), 4);

        grid.line_width = 0.0;
        let bare = RowRules::for_row(&grid, 1, 2, 3);
        assert!(bare.top.is_none() && bare.bottom.is_none());
        assert!(bare.column_rules.iter().all(Option::is_none));
    }

    #[test]
    fn table_cells_share_the_row() {
        let table = TableNode {
            widths: vec![ColumnWidth::Auto; 2],
            body: vec![
                vec![tagged("h1", SemanticTag::TableHeader), tagged("h2", SemanticTag::TableHeader)],
                vec![tagged("a", SemanticTag::TableCell), tagged("b", SemanticTag::TableCell)],
            ],
            header_rows: 1,
            tags: vec![SemanticTag::Table],
            layout: Some(TableLayout {
                line_width: 0.5,
                line_color: Color::BLACK,
                padding: Edges::uniform(5.0),
                fill: RowFill::HeaderOnly(Color::rgb(0xf6f8fa)),
            }),
            margin: None,
        };
        let boxes = layout(vec![ContentNode::Table(table)]);
        let rows = &boxes[0].children;
        assert_eq!(rows.len(), 2);
        let cells = &rows[0].children;
        assert!((cells[0].width - cells[1].width).abs() < 0.5);
        assert!(rows[0].fill.is_some());
        assert!(rows[1].fill.is_none());
        assert_eq!(rows[1].rules.as_ref().unwrap().verticals.len(), 3);
    }

    #[test]
    fn rule_is_clipped_to_content_width() {
        let narrow = compute_layout(
            &assemble(
                vec![horizontal_rule()],
                ImageTable::new(),
                StyleSheet::github(),
                &PageRequest {
                    page_size: "A6",
                    margin: 40.0,
                    title: None,
                },
                Path::new("t.md"),
            ),
            &FontManager::default(),
            297.64,
            419.53,
        )
        .unwrap();
        let BoxContent::Lines(segs) = &narrow[0].content else {
            panic!("expected lines");
        };
        assert!(segs[0].x2 <= 297.64 - 80.0 + 0.01);
    }

    #[test]
    fn list_items_get_markers() {
        let list = ContentNode::Stack(StackNode {
            children: vec![
                tagged("one", SemanticTag::ListItem),
                tagged("two", SemanticTag::ListItem),
            ],
            tags: vec![SemanticTag::OrderedList],
            list: Some(ListStyle::Ordered { start: 1 }),
        });
        let boxes = layout(vec![list]);
        let items = &boxes[0].children;
        assert_eq!(items[0].marker.as_ref().unwrap().text, "1.");
        assert_eq!(items[1].marker.as_ref().unwrap().text, "2.");
        assert!(items[0].x > boxes[0].x);
    }

    #[test]
    fn undecodable_image_collapses() {
        let boxes = layout(vec![ContentNode::Image(ImageNode {
            source: ImageSource::Inline("https://example.com/a.png".into()),
            width: None,
            height: None,
            tags: vec![SemanticTag::Image],
        })]);
        assert_eq!(boxes[0].height, 0.0);
        assert!(matches!(boxes[0].content, BoxContent::None));
    }

    #[test]
    fn image_is_scaled_to_fit() {
        assert_eq!(fit_image(100.0, 50.0, None, None, 500.0, 700.0), (100.0, 50.0));
        assert_eq!(fit_image(1000.0, 500.0, None, None, 500.0, 700.0), (500.0, 250.0));
        assert_eq!(fit_image(100.0, 50.0, Some(40.0), None, 500.0, 700.0), (40.0, 20.0));
    }

    #[test]
    fn inline_runs_keep_their_styles() {
        let strong = ContentNode::Text(TextNode::runs(
            vec![ContentNode::text("bold")],
            vec![SemanticTag::Strong],
        ));
        let p = ContentNode::Text(TextNode::runs(
            vec![ContentNode::text("plain "), strong],
            vec![SemanticTag::Paragraph],
        ));
        let boxes = layout(vec![p]);
        let BoxContent::Text(lines) = &boxes[0].content else {
            panic!("expected text");
        };
        let frags = &lines[0].fragments;
        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].text, "plain ");
        assert!(!frags[0].bold);
        assert_eq!(frags[1].text, "bold");
        assert!(frags[1].bold);
    }
}
