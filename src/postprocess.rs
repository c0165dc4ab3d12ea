//! Post-processing – a second pass over the mapper's top-level content that
//! swaps the under-styled shapes for explicit GitHub-like primitives:
//!
//! - code blocks become a single-cell, shaded, bordered table
//! - horizontal rules become a one-line canvas
//! - tables keep their grid and gain a border/padding/fill layout
//!
//! The pass is one-to-one and order preserving: output `i` is derived from
//! input `i` alone. Children of a matched node are consumed whole and never
//! re-examined. Nothing here can fail; missing structure degrades to an empty
//! string or an untouched node.

use crate::content::{
    CanvasNode, ColumnWidth, ContentNode, RowFill, SemanticTag, Shape, TableLayout, TableNode,
    TextBody, TextNode, TextOverrides,
};
use crate::stylesheet::{Color, Edges, FontFamily};

/// Length of the rule line. The engine clips it to the content width.
pub const RULE_LENGTH: f32 = 515.0;

const BORDER_GRAY: u32 = 0xd0d7de;
const CODE_FILL: u32 = 0xf6f8fa;
const HEADER_FILL: u32 = 0xf6f8fa;
const CODE_TEXT: u32 = 0x1f2328;

/// Run the pass over top-level content.
pub fn post_process(content: Vec<ContentNode>) -> Vec<ContentNode> {
    let before = content.len();
    let out: Vec<ContentNode> = content.into_iter().map(transform).collect();
    debug_assert_eq!(before, out.len());
    log::debug!("post-processed {} top-level nodes", out.len());
    out
}

/// First match wins: code block, then rule, then table, else pass-through.
pub fn transform(node: ContentNode) -> ContentNode {
    if is_code_block(&node) {
        let code = extract_text(&node);
        return code_block_table(code.trim_end_matches('\n'));
    }
    if is_horizontal_rule(&node) {
        return horizontal_rule();
    }
    match node {
        ContentNode::Table(table) => ContentNode::Table(apply_table_layout(table)),
        other => other,
    }
}

/// Tagged as preformatted, or a stack with a child tagged as code.
pub fn is_code_block(node: &ContentNode) -> bool {
    if node.has_tag(SemanticTag::Preformatted) {
        return true;
    }
    match node {
        ContentNode::Stack(stack) => stack
            .children
            .iter()
            .any(|child| child.has_tag(SemanticTag::Code)),
        _ => false,
    }
}

pub fn is_horizontal_rule(node: &ContentNode) -> bool {
    node.has_tag(SemanticTag::Rule)
}

/// Depth-first text of a node: runs concatenate, stack children join with a
/// newline, anything else contributes nothing.
pub fn extract_text(node: &ContentNode) -> String {
    match node {
        ContentNode::Text(text) => match &text.body {
            TextBody::Plain(s) => s.clone(),
            TextBody::Runs(runs) => extract_text_all(runs),
        },
        ContentNode::Stack(stack) => stack
            .children
            .iter()
            .map(extract_text)
            .collect::<Vec<_>>()
            .join("\n"),
        ContentNode::Table(_) | ContentNode::Image(_) | ContentNode::Canvas(_) => String::new(),
    }
}

/// Concatenated text of a list of nodes.
pub fn extract_text_all(nodes: &[ContentNode]) -> String {
    nodes.iter().map(extract_text).collect()
}

/// A fenced-code box: one shaded, bordered cell of monospace text.
pub fn code_block_table(code: &str) -> ContentNode {
    let cell = TextNode {
        body: TextBody::Plain(code.to_string()),
        tags: Vec::new(),
        overrides: TextOverrides {
            font: Some(FontFamily::Courier),
            font_size: Some(9.0),
            bold: None,
            italics: None,
            color: Some(Color::rgb(CODE_TEXT)),
            line_height: Some(1.4),
            margin: Some(Edges::uniform(10.0)),
            preserve_leading_spaces: true,
        },
        link: None,
    };
    ContentNode::Table(TableNode {
        widths: vec![ColumnWidth::Star],
        body: vec![vec![ContentNode::Text(cell)]],
        header_rows: 0,
        tags: Vec::new(),
        layout: Some(TableLayout {
            line_width: 0.5,
            line_color: Color::rgb(BORDER_GRAY),
            padding: Edges::ZERO,
            fill: RowFill::All(Color::rgb(CODE_FILL)),
        }),
        margin: Some(Edges::ltrb(0.0, 4.0, 0.0, 10.0)),
    })
}

/// A single gray line with vertical breathing room.
pub fn horizontal_rule() -> ContentNode {
    ContentNode::Canvas(CanvasNode {
        shapes: vec![Shape::Line {
            x1: 0.0,
            y1: 0.0,
            x2: RULE_LENGTH,
            y2: 0.0,
            line_width: 1.0,
            color: Color::rgb(BORDER_GRAY),
        }],
        margin: Edges::vertical(10.0, 10.0),
    })
}

/// Thin borders everywhere, fixed padding, shaded header row.
pub fn github_table_layout() -> TableLayout {
    TableLayout {
        line_width: 0.5,
        line_color: Color::rgb(BORDER_GRAY),
        padding: Edges {
            top: 5.0,
            right: 8.0,
            bottom: 5.0,
            left: 8.0,
        },
        fill: RowFill::HeaderOnly(Color::rgb(HEADER_FILL)),
    }
}

fn apply_table_layout(mut table: TableNode) -> TableNode {
    table.layout = Some(github_table_layout());
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ImageNode, ImageSource, StackNode};
    use crate::mapper::{map_html, MapOptions};

    fn tagged_text(s: &str, tags: Vec<SemanticTag>) -> ContentNode {
        let mut t = TextNode::plain(s);
        t.tags = tags;
        ContentNode::Text(t)
    }

    fn code_cell_text(node: &ContentNode) -> &str {
        let ContentNode::Table(t) = node else {
            panic!("expected table, got {node:?}");
        };
        let ContentNode::Text(cell) = &t.body[0][0] else {
            panic!("expected text cell");
        };
        let TextBody::Plain(s) = &cell.body else {
            panic!("expected plain text");
        };
        s
    }

    #[test]
    fn preformatted_stack_flattens_lines_in_order() {
        let node = ContentNode::Stack(StackNode::new(
            vec![
                ContentNode::text("first"),
                ContentNode::text("  second"),
                ContentNode::text("third"),
            ],
            vec![SemanticTag::Preformatted],
        ));
        let out = transform(node);
        assert_eq!(code_cell_text(&out), "first\n  second\nthird");
    }

    #[test]
    fn pre_with_nested_code_runs_is_concatenated() {
        let code = ContentNode::Text(TextNode::runs(
            vec![
                ContentNode::text("let x"),
                ContentNode::text(" = 1;\n"),
                ContentNode::text("x\n"),
            ],
            vec![SemanticTag::Code],
        ));
        let pre = ContentNode::Text(TextNode::runs(vec![code], vec![SemanticTag::Preformatted]));
        let out = transform(pre);
        assert_eq!(code_cell_text(&out), "let x = 1;\nx");

        let ContentNode::Table(t) = &out else { unreachable!() };
        assert_eq!(t.widths, vec![ColumnWidth::Star]);
        let layout = t.layout.as_ref().unwrap();
        assert_eq!(layout.line_width, 0.5);
        assert_eq!(layout.fill_color(0), Some(Color::rgb(CODE_FILL)));
        let ContentNode::Text(cell) = &t.body[0][0] else { unreachable!() };
        assert_eq!(cell.overrides.font, Some(FontFamily::Courier));
        assert!(cell.overrides.preserve_leading_spaces);
    }

    #[test]
    fn stack_with_code_child_is_code_block() {
        let node = ContentNode::Stack(StackNode::new(
            vec![tagged_text("a", vec![SemanticTag::Code])],
            vec![SemanticTag::Division],
        ));
        assert!(is_code_block(&node));
    }

    #[test]
    fn mapped_division_with_code_becomes_code_block() {
        let mapped = map_html(
            "<div>\n<p>a</p>\n<code>x</code>\n</div>\n",
            &MapOptions::default(),
        );
        let out = post_process(mapped.content);
        assert_eq!(out.len(), 1);
        assert_eq!(code_cell_text(&out[0]), "a\nx");
    }

    #[test]
    fn paragraph_with_inline_code_is_not_code_block() {
        let p = ContentNode::Text(TextNode::runs(
            vec![tagged_text("x", vec![SemanticTag::Code])],
            vec![SemanticTag::Paragraph],
        ));
        assert!(!is_code_block(&p));
        assert_eq!(transform(p.clone()), p);
    }

    #[test]
    fn rule_always_becomes_single_line_canvas() {
        let with_content = ContentNode::Stack(StackNode::new(
            vec![ContentNode::text("ignored")],
            vec![SemanticTag::Rule],
        ));
        for node in [tagged_text("", vec![SemanticTag::Rule]), with_content] {
            let ContentNode::Canvas(c) = transform(node) else {
                panic!("expected canvas");
            };
            assert_eq!(c.shapes.len(), 1);
            let Shape::Line { line_width, .. } = c.shapes[0];
            assert_eq!(line_width, 1.0);
        }
    }

    #[test]
    fn table_keeps_body_and_gains_layout() {
        let body = vec![
            vec![ContentNode::text("h1"), ContentNode::text("h2")],
            vec![ContentNode::text("a"), ContentNode::text("b")],
        ];
        let table = ContentNode::Table(TableNode {
            widths: vec![ColumnWidth::Auto; 2],
            body: body.clone(),
            header_rows: 1,
            tags: Vec::new(),
            layout: None,
            margin: None,
        });
        let ContentNode::Table(out) = transform(table) else {
            panic!("expected table");
        };
        assert_eq!(out.body, body);
        let layout = out.layout.expect("layout attached");
        assert!(layout.fill_color(0).is_some());
        assert!(layout.fill_color(1).is_none());
        assert_eq!(layout.line_width, 0.5);
        assert_eq!(layout.padding().left, 8.0);
    }

    #[test]
    fn count_and_order_are_preserved() {
        let input = vec![
            tagged_text("Title", vec![SemanticTag::Heading(1)]),
            ContentNode::Stack(StackNode::new(Vec::new(), vec![SemanticTag::Rule])),
            ContentNode::Image(ImageNode {
                source: ImageSource::Inline("http://x/y.png".into()),
                width: None,
                height: None,
                tags: vec![SemanticTag::Image],
            }),
            tagged_text("body", vec![SemanticTag::Paragraph]),
        ];
        let out = post_process(input.clone());
        assert_eq!(out.len(), input.len());
        assert_eq!(out[0], input[0]);
        assert!(matches!(out[1], ContentNode::Canvas(_)));
        assert_eq!(out[2], input[2]);
        assert_eq!(out[3], input[3]);
    }

    #[test]
    fn extraction_degrades_to_empty() {
        assert_eq!(extract_text(&horizontal_rule()), "");
        let empty_pre = ContentNode::Text(TextNode::runs(Vec::new(), vec![SemanticTag::Preformatted]));
        assert_eq!(code_cell_text(&transform(empty_pre)), "");
    }
}
