//! HTML parser – converts the renderer's HTML (plus any raw HTML the author
//! wrote in the Markdown) into a simple DOM tree for the mapper.
//!
//! The input is mostly the HTML subset a Markdown renderer emits, so a small
//! tokenizer plus a stack of open elements is enough: void elements are
//! recognised, stray closing tags are tolerated, omitted end tags are implied
//! and whitespace inside `<pre>` is kept intact.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// The tag name of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Html,
    Head,
    Body,
    Div,
    P,
    H(u8),
    Pre,
    Code,
    A,
    Strong,
    B,
    Em,
    I,
    Del,
    Span,
    Br,
    Hr,
    Blockquote,
    Ul,
    Ol,
    Li,
    Table,
    Thead,
    Tbody,
    Tfoot,
    Tr,
    Th,
    Td,
    Img,
    Input,
    Sup,
    Script,
    Style,
    /// Catch-all for unknown tags – they are kept as generic containers.
    Unknown(String),
}

impl Tag {
    pub fn from_name(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "html" => Tag::Html,
            "head" => Tag::Head,
            "body" => Tag::Body,
            "div" | "section" | "article" | "main" | "details" | "summary" | "figure" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H(1),
            "h2" => Tag::H(2),
            "h3" => Tag::H(3),
            "h4" => Tag::H(4),
            "h5" => Tag::H(5),
            "h6" => Tag::H(6),
            "pre" => Tag::Pre,
            "code" | "kbd" | "samp" | "tt" => Tag::Code,
            "a" => Tag::A,
            "strong" => Tag::Strong,
            "b" => Tag::B,
            "em" => Tag::Em,
            "i" => Tag::I,
            "del" | "s" | "strike" => Tag::Del,
            "span" => Tag::Span,
            "br" => Tag::Br,
            "hr" => Tag::Hr,
            "blockquote" => Tag::Blockquote,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tfoot" => Tag::Tfoot,
            "tr" => Tag::Tr,
            "th" => Tag::Th,
            "td" => Tag::Td,
            "img" => Tag::Img,
            "input" => Tag::Input,
            "sup" => Tag::Sup,
            "script" => Tag::Script,
            "style" => Tag::Style,
            other => Tag::Unknown(other.to_string()),
        }
    }

    /// Elements that never have children or a closing tag.
    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Br | Tag::Hr | Tag::Img | Tag::Input)
            || matches!(self, Tag::Unknown(n) if matches!(n.as_str(), "meta" | "link" | "wbr" | "source"))
    }

    /// Block elements whose start tag ends an open `<p>`.
    pub fn closes_paragraph(&self) -> bool {
        matches!(
            self,
            Tag::Div
                | Tag::P
                | Tag::H(_)
                | Tag::Pre
                | Tag::Hr
                | Tag::Blockquote
                | Tag::Ul
                | Tag::Ol
                | Tag::Table
        )
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Tag::Code
                | Tag::A
                | Tag::Strong
                | Tag::B
                | Tag::Em
                | Tag::I
                | Tag::Del
                | Tag::Span
                | Tag::Br
                | Tag::Input
                | Tag::Sup
        )
    }
}

/// A node in our DOM tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attr("style")
    }

    pub fn src(&self) -> Option<&str> {
        self.attr("src")
    }
}

// ---------------------------------------------------------------------------
// Parser – tokenizer feeding a stack of open elements
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of DOM nodes.
///
/// Unclosed elements are closed at the end of input, stray closing tags are
/// dropped, and the end tags HTML lets authors omit (`</p>`, `</li>`,
/// `</tr>`, `</td>`) are implied when the next sibling opens.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut cursor = Cursor::new(html);
    let mut tree = TreeBuilder::default();

    while !cursor.done() {
        let rest = cursor.rest();
        if rest.starts_with("<!--") {
            cursor.skip_past("-->");
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            cursor.skip_past(">");
        } else if rest.starts_with("</") && starts_with_letter(&rest[2..]) {
            cursor.pos += 2;
            let name = cursor.take_while(is_name_char);
            cursor.skip_past(">");
            tree.close(&Tag::from_name(name));
        } else if rest.starts_with('<') && starts_with_letter(&rest[1..]) {
            let (name, attributes, self_closing) = cursor.open_tag();
            let mut elem = ElementNode::new(Tag::from_name(&name));
            elem.attributes = attributes;
            if matches!(elem.tag, Tag::Script | Tag::Style) {
                cursor.skip_raw_text(&name);
                tree.append(DomNode::Element(elem));
            } else if self_closing || elem.tag.is_void() {
                tree.close_implied(&elem.tag);
                tree.append(DomNode::Element(elem));
            } else {
                tree.open(elem);
            }
        } else {
            let text = cursor.text();
            tree.text(decode_entities(text));
        }
    }
    tree.finish()
}

fn starts_with_letter(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | ':')
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn done(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn bump(&mut self) {
        if let Some(c) = self.rest().chars().next() {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, prefix: &str) -> bool {
        let hit = self.rest().starts_with(prefix);
        if hit {
            self.pos += prefix.len();
        }
        hit
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += end;
        &rest[..end]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    /// Move past the next occurrence of `needle`, or to the end.
    fn skip_past(&mut self, needle: &str) {
        self.pos = match self.rest().find(needle) {
            Some(i) => self.pos + i + needle.len(),
            None => self.src.len(),
        };
    }

    /// Text up to the next `<`. A `<` at the start is literal.
    fn text(&mut self) -> &'a str {
        let start = self.pos;
        self.bump();
        self.take_while(|c| c != '<');
        &self.src[start..self.pos]
    }

    /// Consume `<name attr=…>` and return the lower-cased name, the
    /// attributes, and whether the tag was written self-closing.
    fn open_tag(&mut self) -> (String, HashMap<String, String>, bool) {
        self.bump();
        let name = self.take_while(is_name_char).to_ascii_lowercase();
        let mut attributes = HashMap::new();
        loop {
            self.skip_whitespace();
            if self.done() || self.eat(">") {
                return (name, attributes, false);
            }
            if self.eat("/>") {
                return (name, attributes, true);
            }
            let key = self.take_while(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/'));
            if key.is_empty() {
                self.bump();
                continue;
            }
            self.skip_whitespace();
            let value = if self.eat("=") {
                self.skip_whitespace();
                self.attr_value()
            } else {
                String::new()
            };
            attributes.insert(key.to_ascii_lowercase(), value);
        }
    }

    fn attr_value(&mut self) -> String {
        let raw = match self.rest().chars().next() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let v = self.take_while(|c| c != quote);
                self.bump();
                v
            }
            _ => {
                let v = self.take_while(|c| !c.is_whitespace() && c != '>');
                // `<img src=a.png/>`: the slash belongs to the tag.
                match v.strip_suffix('/') {
                    Some(trimmed) if self.rest().starts_with('>') => {
                        self.pos -= 1;
                        trimmed
                    }
                    _ => v,
                }
            }
        };
        decode_entities(raw)
    }

    /// Skip the body of a raw-text element and its closing tag.
    fn skip_raw_text(&mut self, name: &str) {
        let close = format!("</{name}");
        // ASCII lower-casing keeps byte offsets.
        match self.rest().to_ascii_lowercase().find(&close) {
            Some(i) => {
                self.pos += i;
                self.skip_past(">");
            }
            None => self.pos = self.src.len(),
        }
    }
}

/// Builds the tree from a flat stream of open/close/text events.
#[derive(Default)]
struct TreeBuilder {
    roots: Vec<DomNode>,
    open: Vec<ElementNode>,
}

impl TreeBuilder {
    fn append(&mut self, node: DomNode) {
        let siblings = match self.open.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.roots,
        };
        // Adjacent text (e.g. around a literal `<`) becomes one node.
        if let (DomNode::Text(new), Some(DomNode::Text(prev))) = (&node, siblings.last_mut()) {
            prev.push_str(new);
            return;
        }
        siblings.push(node);
    }

    fn open(&mut self, elem: ElementNode) {
        self.close_implied(&elem.tag);
        self.open.push(elem);
    }

    fn pop(&mut self) {
        if let Some(elem) = self.open.pop() {
            self.append(DomNode::Element(elem));
        }
    }

    /// Close the nearest open `tag`, unless one of `scope` is reached first.
    fn close_within(&mut self, tag: &Tag, scope: &[Tag]) -> bool {
        for i in (0..self.open.len()).rev() {
            let current = &self.open[i].tag;
            if current == tag {
                while self.open.len() > i {
                    self.pop();
                }
                return true;
            }
            if scope.contains(current) {
                return false;
            }
        }
        false
    }

    /// End tags implied by opening `tag`.
    fn close_implied(&mut self, tag: &Tag) {
        match tag {
            Tag::Li => {
                self.close_within(&Tag::Li, &[Tag::Ul, Tag::Ol]);
            }
            Tag::Tr => {
                self.close_within(&Tag::Tr, &[Tag::Table]);
            }
            Tag::Td | Tag::Th => {
                if !self.close_within(&Tag::Td, &[Tag::Tr, Tag::Table]) {
                    self.close_within(&Tag::Th, &[Tag::Tr, Tag::Table]);
                }
            }
            Tag::Thead | Tag::Tbody | Tag::Tfoot => {
                self.close_within(&Tag::Tr, &[Tag::Table]);
                for section in [Tag::Thead, Tag::Tbody, Tag::Tfoot] {
                    self.close_within(&section, &[Tag::Table]);
                }
            }
            _ => {}
        }
        if tag.closes_paragraph() {
            self.close_within(&Tag::P, &[Tag::Div, Tag::Blockquote, Tag::Li, Tag::Td, Tag::Th]);
        }
    }

    /// Handle `</tag>`. Stray closing tags are ignored.
    fn close(&mut self, tag: &Tag) {
        self.close_within(tag, &[]);
    }

    fn text(&mut self, text: String) {
        let whitespace_only = text.chars().all(|c| c.is_ascii_whitespace());
        if whitespace_only && self.between_elements() {
            return;
        }
        self.append(DomNode::Text(text));
    }

    /// Whitespace directly inside these containers is formatting, not content.
    fn between_elements(&self) -> bool {
        match self.open.last() {
            None => true,
            Some(parent) => matches!(
                parent.tag,
                Tag::Html
                    | Tag::Head
                    | Tag::Body
                    | Tag::Table
                    | Tag::Thead
                    | Tag::Tbody
                    | Tag::Tfoot
                    | Tag::Tr
                    | Tag::Ul
                    | Tag::Ol
            ),
        }
    }

    fn finish(mut self) -> Vec<DomNode> {
        while !self.open.is_empty() {
            self.pop();
        }
        self.roots
    }
}

/// Decode the named entities a Markdown renderer emits plus numeric
/// character references.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest[..rest.len().min(12)].find(';') else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{00A0}'),
            _ => entity.strip_prefix('#').and_then(|num| {
                let code = match num.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => num.parse::<u32>().ok(),
                };
                code.and_then(char::from_u32)
            }),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Convenience helpers
// ---------------------------------------------------------------------------

/// Find the `<body>` element and return its children, or return all nodes if
/// no `<body>` is present.
pub fn body_children(nodes: &[DomNode]) -> Vec<DomNode> {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.tag == Tag::Body {
                return e.children.clone();
            }
            // Recurse into <html>
            if e.tag == Tag::Html {
                let inner = body_children(&e.children);
                if !inner.is_empty() {
                    return inner;
                }
            }
        }
    }
    nodes.to_vec()
}
