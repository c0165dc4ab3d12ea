//! HTML → content tree mapper.
//!
//! Produces a generic tree tagged only with [`SemanticTag`]s: paragraphs and
//! headings become text nodes made of inline runs, containers become stacks,
//! tables become bare grids. No borders, fills or drawing instructions are
//! produced here; that is the post-processor's job.

use crate::content::{
    ColumnWidth, ContentNode, ImageNode, ImageSource, ImageTable, ListStyle, SemanticTag,
    StackNode, TableNode, TextBody, TextNode, TextOverrides,
};
use crate::dom::{body_children, parse_html, DomNode, ElementNode, Tag};
use crate::stylesheet::Color;

/// Mapper switches.
#[derive(Debug, Clone, Copy)]
pub struct MapOptions {
    /// Move `data:` image payloads into the image table and reference them by
    /// key.
    pub images_by_reference: bool,
    /// Drop whitespace-only text between blocks and collapse whitespace runs.
    pub remove_extra_blanks: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            images_by_reference: true,
            remove_extra_blanks: true,
        }
    }
}

/// Mapper output: top-level content plus the images it referenced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedContent {
    pub content: Vec<ContentNode>,
    pub images: ImageTable,
}

/// Map an HTML string to a content tree.
pub fn map_html(html: &str, options: &MapOptions) -> MappedContent {
    let dom = parse_html(html);
    let nodes = body_children(&dom);
    let mut mapper = Mapper {
        options: *options,
        images: ImageTable::new(),
    };
    let content = mapper.map_blocks(&nodes);
    log::debug!(
        "mapped {} top-level nodes, {} referenced images",
        content.len(),
        mapper.images.len()
    );
    MappedContent {
        content,
        images: mapper.images,
    }
}

struct Mapper {
    options: MapOptions,
    images: ImageTable,
}

impl Mapper {
    /// Map a sequence of siblings in block context. Runs of inline siblings
    /// are gathered into one anonymous text node; a run that maps to a single
    /// tagged text node is kept as is.
    fn map_blocks(&mut self, nodes: &[DomNode]) -> Vec<ContentNode> {
        let mut out = Vec::new();
        let mut inline: Vec<&DomNode> = Vec::new();

        for node in nodes {
            let is_inline = match node {
                DomNode::Text(_) => true,
                DomNode::Element(e) => e.tag.is_inline() && !has_block_content(&e.children),
            };
            if is_inline {
                inline.push(node);
                continue;
            }
            self.flush_inline(&mut inline, &mut out);
            if let DomNode::Element(e) = node {
                if e.tag.is_inline() {
                    // An inline wrapper around block content (`<a><img></a>`).
                    out.extend(self.map_blocks(&e.children));
                } else if let Some(mapped) = self.map_block(e) {
                    out.push(mapped);
                }
            }
        }
        self.flush_inline(&mut inline, &mut out);
        out
    }

    fn flush_inline(&mut self, pending: &mut Vec<&DomNode>, out: &mut Vec<ContentNode>) {
        if pending.is_empty() {
            return;
        }
        let owned: Vec<DomNode> = pending.drain(..).cloned().collect();
        let mut runs = self.map_inlines(&owned, false);
        trim_runs(&mut runs);
        if let [ContentNode::Text(lone)] = runs.as_slice() {
            if !lone.tags.is_empty() {
                out.extend(runs);
                return;
            }
        }
        if !runs.is_empty() || !self.options.remove_extra_blanks {
            out.push(ContentNode::Text(TextNode::runs(runs, Vec::new())));
        }
    }

    fn map_block(&mut self, e: &ElementNode) -> Option<ContentNode> {
        let node = match &e.tag {
            Tag::H(level) => self.textual_block(e, SemanticTag::Heading(*level)),
            Tag::P => self.textual_block(e, SemanticTag::Paragraph),
            Tag::Pre => {
                let runs = self.map_inlines(&e.children, true);
                let mut text = TextNode::runs(runs, vec![SemanticTag::Preformatted]);
                text.overrides.preserve_leading_spaces = true;
                ContentNode::Text(text)
            }
            Tag::Blockquote => ContentNode::Stack(StackNode::new(
                self.map_blocks(&e.children),
                vec![SemanticTag::Blockquote],
            )),
            Tag::Ul => self.list(e, ListStyle::Bullet, SemanticTag::UnorderedList),
            Tag::Ol => {
                let start = e
                    .attr("start")
                    .and_then(|s| s.trim().parse::<u32>().ok())
                    .unwrap_or(1);
                self.list(e, ListStyle::Ordered { start }, SemanticTag::OrderedList)
            }
            Tag::Li => self.textual_block(e, SemanticTag::ListItem),
            Tag::Hr => ContentNode::Stack(StackNode::new(Vec::new(), vec![SemanticTag::Rule])),
            Tag::Table => self.table(e),
            Tag::Img => self.image(e),
            Tag::Head | Tag::Script | Tag::Style => return None,
            _ => self.textual_block(e, SemanticTag::Division),
        };
        Some(node)
    }

    /// A block whose content is either a line of inline runs (→ text node) or
    /// further blocks (→ stack).
    fn textual_block(&mut self, e: &ElementNode, tag: SemanticTag) -> ContentNode {
        if has_block_content(&e.children) {
            return ContentNode::Stack(StackNode::new(self.map_blocks(&e.children), vec![tag]));
        }
        let mut runs = self.map_inlines(&e.children, false);
        trim_runs(&mut runs);
        let mut text = TextNode::runs(runs, vec![tag]);
        text.overrides = overrides_from_style(e.inline_style());
        ContentNode::Text(text)
    }

    fn list(&mut self, e: &ElementNode, style: ListStyle, tag: SemanticTag) -> ContentNode {
        let mut items = Vec::new();
        for child in &e.children {
            match child {
                DomNode::Element(li) if li.tag == Tag::Li => {
                    items.push(self.textual_block(li, SemanticTag::ListItem));
                }
                DomNode::Element(other) => {
                    if let Some(mapped) = self.map_block(other) {
                        items.push(mapped);
                    }
                }
                DomNode::Text(_) => {}
            }
        }
        let mut stack = StackNode::new(items, vec![tag]);
        stack.list = Some(style);
        ContentNode::Stack(stack)
    }

    fn table(&mut self, e: &ElementNode) -> ContentNode {
        let mut rows: Vec<(&ElementNode, bool)> = Vec::new();
        collect_rows(&e.children, false, &mut rows);

        let mut header_rows = rows.iter().filter(|(_, in_head)| *in_head).count();
        if header_rows == 0 {
            header_rows = rows
                .iter()
                .take_while(|(tr, _)| {
                    let cells = row_cells(tr);
                    !cells.is_empty() && cells.iter().all(|c| c.tag == Tag::Th)
                })
                .count();
        }

        let mut body: Vec<Vec<ContentNode>> = rows
            .iter()
            .map(|(tr, _)| {
                row_cells(tr)
                    .into_iter()
                    .map(|cell| {
                        let tag = if cell.tag == Tag::Th {
                            SemanticTag::TableHeader
                        } else {
                            SemanticTag::TableCell
                        };
                        self.textual_block(cell, tag)
                    })
                    .collect()
            })
            .collect();

        let columns = body.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut body {
            while row.len() < columns {
                row.push(ContentNode::Text(TextNode::runs(
                    Vec::new(),
                    vec![SemanticTag::TableCell],
                )));
            }
        }

        ContentNode::Table(TableNode {
            widths: vec![ColumnWidth::Auto; columns],
            body,
            header_rows,
            tags: vec![SemanticTag::Table],
            layout: None,
            margin: None,
        })
    }

    fn image(&mut self, e: &ElementNode) -> ContentNode {
        let src = e.src().unwrap_or_default().to_string();
        let source = if self.options.images_by_reference && src.starts_with("data:") {
            let key = format!("img_ref_{}", self.images.len());
            self.images.insert(key.clone(), src);
            ImageSource::Reference(key)
        } else {
            ImageSource::Inline(src)
        };
        ContentNode::Image(ImageNode {
            source,
            width: e.attr("width").and_then(parse_length),
            height: e.attr("height").and_then(parse_length),
            tags: vec![SemanticTag::Image],
        })
    }

    /// Map siblings in inline context into text runs.
    fn map_inlines(&mut self, nodes: &[DomNode], pre: bool) -> Vec<ContentNode> {
        let mut runs = Vec::new();
        for node in nodes {
            match node {
                DomNode::Text(s) => {
                    let text = if pre || !self.options.remove_extra_blanks {
                        s.clone()
                    } else {
                        collapse_whitespace(s)
                    };
                    if !text.is_empty() {
                        runs.push(ContentNode::text(text));
                    }
                }
                DomNode::Element(e) => {
                    if let Some(run) = self.map_inline_element(e, pre) {
                        runs.push(run);
                    }
                }
            }
        }
        runs
    }

    fn map_inline_element(&mut self, e: &ElementNode, pre: bool) -> Option<ContentNode> {
        let tag = match &e.tag {
            Tag::Br => return Some(ContentNode::text("\n")),
            Tag::Input => {
                let checked = e.attributes.contains_key("checked");
                return Some(ContentNode::text(if checked { "[x] " } else { "[ ] " }));
            }
            Tag::Img => {
                // Images cannot sit inside a line of text; keep the alt text.
                return e.attr("alt").filter(|a| !a.is_empty()).map(ContentNode::text);
            }
            Tag::Code => Some(SemanticTag::Code),
            Tag::A => Some(SemanticTag::Link),
            Tag::Strong => Some(SemanticTag::Strong),
            Tag::B => Some(SemanticTag::Bold),
            Tag::Em => Some(SemanticTag::Emphasis),
            Tag::I => Some(SemanticTag::Italic),
            Tag::Del => Some(SemanticTag::Strikethrough),
            Tag::Span => Some(SemanticTag::Span),
            Tag::Head | Tag::Script | Tag::Style => return None,
            _ => None,
        };
        let runs = self.map_inlines(&e.children, pre || e.tag == Tag::Pre);
        let mut text = TextNode::runs(runs, tag.into_iter().collect());
        text.overrides = overrides_from_style(e.inline_style());
        if e.tag == Tag::A {
            text.link = e.attr("href").map(str::to_string);
        }
        Some(ContentNode::Text(text))
    }
}

/// True when `nodes` hold anything that cannot be laid out inside a line.
fn has_block_content(nodes: &[DomNode]) -> bool {
    nodes.iter().any(|n| match n {
        DomNode::Text(_) => false,
        DomNode::Element(e) => {
            e.tag == Tag::Img || !e.tag.is_inline() || has_block_content(&e.children)
        }
    })
}

fn collect_rows<'a>(nodes: &'a [DomNode], in_head: bool, rows: &mut Vec<(&'a ElementNode, bool)>) {
    for node in nodes {
        if let DomNode::Element(e) = node {
            match e.tag {
                Tag::Tr => rows.push((e, in_head)),
                Tag::Thead => collect_rows(&e.children, true, rows),
                Tag::Tbody | Tag::Tfoot => collect_rows(&e.children, in_head, rows),
                _ => {}
            }
        }
    }
}

fn row_cells(tr: &ElementNode) -> Vec<&ElementNode> {
    tr.children
        .iter()
        .filter_map(|c| match c {
            DomNode::Element(e) if matches!(e.tag, Tag::Th | Tag::Td) => Some(e),
            _ => None,
        })
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for c in s.chars() {
        if c.is_whitespace() && c != '\u{00A0}' {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn parse_length(s: &str) -> Option<f32> {
    s.trim().trim_end_matches("px").trim().parse::<f32>().ok()
}

/// Explicit overrides from an inline `style` attribute. Only the properties
/// syntax highlighters and hand-written HTML commonly use are honoured.
fn overrides_from_style(style: Option<&str>) -> TextOverrides {
    let mut o = TextOverrides::default();
    let Some(style) = style else {
        return o;
    };
    for decl in style.split(';') {
        let Some((prop, val)) = decl.split_once(':') else {
            continue;
        };
        let val = val.trim();
        match prop.trim().to_ascii_lowercase().as_str() {
            "color" => o.color = Color::from_hex(val),
            "font-weight" => o.bold = Some(val == "bold" || val.parse::<u32>().is_ok_and(|w| w >= 600)),
            "font-style" => o.italics = Some(val == "italic"),
            _ => {}
        }
    }
    o
}

/// Trim leading whitespace from the first leaf and trailing whitespace from
/// the last leaf, dropping runs that become empty.
fn trim_runs(runs: &mut Vec<ContentNode>) {
    while let Some(first) = runs.first_mut() {
        if trim_edge(first, true) {
            runs.remove(0);
        } else {
            break;
        }
    }
    while let Some(last) = runs.last_mut() {
        if trim_edge(last, false) {
            runs.pop();
        } else {
            break;
        }
    }
}

/// Returns true when the node is left empty.
fn trim_edge(node: &mut ContentNode, start: bool) -> bool {
    let ContentNode::Text(text) = node else {
        return false;
    };
    match &mut text.body {
        TextBody::Plain(s) => {
            let trimmed = if start { s.trim_start() } else { s.trim_end() };
            *s = trimmed.to_string();
            s.is_empty()
        }
        TextBody::Runs(children) => {
            if start {
                while let Some(first) = children.first_mut() {
                    if trim_edge(first, true) {
                        children.remove(0);
                    } else {
                        break;
                    }
                }
            } else {
                while let Some(last) = children.last_mut() {
                    if trim_edge(last, false) {
                        children.pop();
                    } else {
                        break;
                    }
                }
            }
            children.is_empty()
        }
    }
}
