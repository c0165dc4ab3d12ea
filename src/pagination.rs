//! Pagination – splits a flat list of positioned boxes into pages.
//!
//! Handles:
//! - page boundaries for any page size and margin
//! - table splitting between rows
//! - boxes taller than a page (long code blocks, huge paragraphs), which are
//!   cut between text lines; a cut table row is closed with its border on
//!   both pages

use std::collections::VecDeque;

use crate::layout::{BoxContent, PositionedBox};
use crate::layout_config::*;
use crate::stylesheet::Edges;

/// Recursively expand any pure-container box whose height exceeds a single
/// page so its children can be split across pages individually.
fn flatten_for_pagination(boxes: &[PositionedBox], content_height: f32) -> Vec<&PositionedBox> {
    let mut result = Vec::new();
    for pbox in boxes {
        if pbox.height > content_height
            && matches!(pbox.content, BoxContent::None)
            && pbox.rules.is_none()
            && !pbox.children.is_empty()
        {
            result.extend(flatten_for_pagination(&pbox.children, content_height));
        } else {
            result.push(pbox);
        }
    }
    result
}

/// Convert positioned boxes into a paginated LayoutConfig.
pub fn paginate(
    boxes: &[PositionedBox],
    page_width: f32,
    page_height: f32,
    margins: Edges,
) -> LayoutConfig {
    let mut config = LayoutConfig {
        title: String::new(),
        page_width_pt: page_width,
        page_height_pt: page_height,
        pages: Vec::new(),
    };

    let content_height = (page_height - margins.top - margins.bottom).max(1.0);

    let mut queue: VecDeque<PositionedBox> = flatten_for_pagination(boxes, content_height)
        .into_iter()
        .cloned()
        .collect();

    let mut current_page = PageLayout {
        page_index: 0,
        boxes: Vec::new(),
    };

    // Document-space y at which the current page begins. All PositionedBox.y
    // values are document coordinates, so `pbox.y - page_start_doc_y` is the
    // y-on-page of any box.
    let mut page_start_doc_y = 0.0f32;

    while let Some(pbox) = queue.pop_front() {
        let y_on_page = (pbox.y - page_start_doc_y).max(0.0);

        if y_on_page + pbox.height > content_height {
            let page_empty = current_page.boxes.is_empty();
            if is_splittable(&pbox, content_height) {
                let cut = page_start_doc_y + content_height;
                match split_box(&pbox, cut, content_height) {
                    (Some(head), tail) => {
                        let y = (head.y - page_start_doc_y).max(0.0);
                        current_page
                            .boxes
                            .push(positioned_to_layout_box(&head, margins.top, y));
                        if let Some(tail) = tail {
                            start_new_page(&mut config, &mut current_page);
                            page_start_doc_y = tail.y;
                            queue.push_front(tail);
                        }
                        continue;
                    }
                    (None, Some(tail)) if !page_empty => {
                        start_new_page(&mut config, &mut current_page);
                        page_start_doc_y = tail.y;
                        queue.push_front(tail);
                        continue;
                    }
                    // Nothing fits even on an empty page: place it whole.
                    _ => {}
                }
            }
            if !page_empty {
                start_new_page(&mut config, &mut current_page);
                page_start_doc_y = pbox.y;
            }
        }

        let y_on_page = (pbox.y - page_start_doc_y).max(0.0);
        current_page
            .boxes
            .push(positioned_to_layout_box(&pbox, margins.top, y_on_page));
    }

    if !current_page.boxes.is_empty() {
        config.pages.push(current_page);
    }
    if config.pages.is_empty() {
        config.pages.push(PageLayout {
            page_index: 0,
            boxes: Vec::new(),
        });
    }
    log::debug!("paginated into {} page(s)", config.pages.len());
    config
}

fn start_new_page(config: &mut LayoutConfig, current_page: &mut PageLayout) {
    let next = PageLayout {
        page_index: config.pages.len() + 1,
        boxes: Vec::new(),
    };
    config.pages.push(std::mem::replace(current_page, next));
}

fn is_splittable(pbox: &PositionedBox, content_height: f32) -> bool {
    matches!(pbox.content, BoxContent::Table) || pbox.height > content_height
}

/// Split `pbox` at document y `cut`. The head holds what ends above the cut,
/// the tail everything else. Table rows no taller than a page are never cut.
fn split_box(
    pbox: &PositionedBox,
    cut: f32,
    page_height: f32,
) -> (Option<PositionedBox>, Option<PositionedBox>) {
    if pbox.y + pbox.height <= cut {
        return (Some(pbox.clone()), None);
    }
    if pbox.y >= cut {
        return (None, Some(pbox.clone()));
    }
    match &pbox.content {
        BoxContent::Text(lines) => split_text(pbox, lines, cut),
        BoxContent::None | BoxContent::Table if !pbox.children.is_empty() => {
            split_children(pbox, cut, page_height)
        }
        _ => (None, Some(pbox.clone())),
    }
}

fn split_text(
    pbox: &PositionedBox,
    lines: &[TextLine],
    cut: f32,
) -> (Option<PositionedBox>, Option<PositionedBox>) {
    let limit = cut - pbox.y;
    let n = lines
        .iter()
        .take_while(|l| l.y_offset + l.height <= limit)
        .count();
    if n == 0 {
        return (None, Some(pbox.clone()));
    }
    if n == lines.len() {
        return (Some(pbox.clone()), None);
    }

    let shift = lines[n].y_offset;
    let tail_lines = lines[n..]
        .iter()
        .cloned()
        .map(|mut l| {
            l.y_offset -= shift;
            l
        })
        .collect();

    let mut head = shell(pbox, pbox.y, shift, Vec::new());
    head.content = BoxContent::Text(lines[..n].to_vec());
    let mut tail = shell(pbox, pbox.y + shift, pbox.height - shift, Vec::new());
    tail.content = BoxContent::Text(tail_lines);
    tail.marker = None;
    (Some(head), Some(tail))
}

fn split_children(
    pbox: &PositionedBox,
    cut: f32,
    page_height: f32,
) -> (Option<PositionedBox>, Option<PositionedBox>) {
    let keep_rows_whole = matches!(pbox.content, BoxContent::Table);
    let mut head = Vec::new();
    let mut tail = Vec::new();
    for child in &pbox.children {
        let straddles = child.y < cut && child.y + child.height > cut;
        let (h, t) = if keep_rows_whole && straddles && child.height <= page_height {
            (None, Some(child.clone()))
        } else {
            split_box(child, cut, page_height)
        };
        head.extend(h);
        tail.extend(t);
    }
    if head.is_empty() {
        return (None, Some(pbox.clone()));
    }
    if tail.is_empty() {
        return (Some(pbox.clone()), None);
    }

    // Keep the original padding around the children on both halves.
    let bottom = pbox.y + pbox.height;
    let first_top = pbox.children.iter().map(|c| c.y).fold(f32::INFINITY, f32::min);
    let last_bottom = pbox
        .children
        .iter()
        .map(|c| c.y + c.height)
        .fold(f32::NEG_INFINITY, f32::max);
    let top_inset = (first_top - pbox.y).max(0.0);
    let bottom_inset = (bottom - last_bottom).max(0.0);

    let head_bottom = head
        .iter()
        .map(|c| c.y + c.height)
        .fold(pbox.y, f32::max)
        + bottom_inset;
    let tail_top = tail.iter().map(|c| c.y).fold(f32::INFINITY, f32::min) - top_inset;

    let mut head_box = shell(pbox, pbox.y, head_bottom.min(cut) - pbox.y, head);
    let mut tail_box = shell(pbox, tail_top, bottom - tail_top, tail);
    tail_box.marker = None;
    if let (Some(h), Some(t)) = (head_box.rules.as_mut(), tail_box.rules.as_mut()) {
        let cut_rule = h.cut_rule();
        h.bottom = cut_rule;
        t.top = cut_rule;
    }
    (Some(head_box), Some(tail_box))
}

/// A copy of `pbox` with new geometry and children.
fn shell(pbox: &PositionedBox, y: f32, height: f32, children: Vec<PositionedBox>) -> PositionedBox {
    PositionedBox {
        x: pbox.x,
        y,
        width: pbox.width,
        height,
        content: match pbox.content {
            BoxContent::Table => BoxContent::Table,
            _ => BoxContent::None,
        },
        fill: pbox.fill,
        rules: pbox.rules.clone(),
        marker: pbox.marker.clone(),
        children,
    }
}

/// Convert a PositionedBox to a LayoutBox with page-absolute coordinates.
/// Taffy's layout already encodes margin spacing into `pbox.y`, so margins
/// are not added separately.
fn positioned_to_layout_box(pbox: &PositionedBox, top_margin: f32, y_on_page: f32) -> LayoutBox {
    build_layout_box(pbox, top_margin + y_on_page)
}

/// Recursively build a LayoutBox tree where every box carries page-absolute
/// x/y coordinates (origin = top-left of the physical page).
///
/// PositionedBox.y values are document-space absolutes, so
/// `child_abs_y = parent_abs_y + (child.y − parent.y)`.
fn build_layout_box(pbox: &PositionedBox, abs_y: f32) -> LayoutBox {
    let mut lb = LayoutBox::new(pbox.x, abs_y, pbox.width, pbox.height);
    lb.background_color = pbox.fill;
    lb.list_marker = pbox.marker.clone();
    if let Some(rules) = &pbox.rules {
        lb.lines = rules.segments(pbox.width, pbox.height);
    }

    match &pbox.content {
        BoxContent::Text(lines) => {
            lb.text = Some(TextContent {
                lines: lines.clone(),
            });
        }
        BoxContent::Image(img) => lb.image = Some(img.clone()),
        BoxContent::Lines(segments) => lb.lines.extend(segments.iter().cloned()),
        BoxContent::None | BoxContent::Table => {}
    }

    for child in &pbox.children {
        let child_abs_y = abs_y + (child.y - pbox.y);
        lb.children.push(build_layout_box(child, child_abs_y));
    }
    lb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentNode, ImageTable, SemanticTag, TextNode};
    use crate::document::{assemble, PageRequest};
    use crate::fonts::FontManager;
    use crate::layout::compute_layout;
    use crate::postprocess::{code_block_table, transform};
    use crate::stylesheet::StyleSheet;
    use std::path::Path;

    const MARGIN: f32 = 40.0;

    fn paginate_content(content: Vec<ContentNode>) -> LayoutConfig {
        let doc = assemble(
            content,
            ImageTable::new(),
            StyleSheet::github(),
            &PageRequest {
                page_size: "A4",
                margin: MARGIN,
                title: None,
            },
            Path::new("t.md"),
        );
        let boxes = compute_layout(&doc, &FontManager::default(), 595.28, 841.89).unwrap();
        paginate(&boxes, 595.28, 841.89, doc.page_margins)
    }

    fn paragraph(s: &str) -> ContentNode {
        let mut t = TextNode::plain(s);
        t.tags = vec![SemanticTag::Paragraph];
        ContentNode::Text(t)
    }

    fn all_boxes(lb: &LayoutBox, out: &mut Vec<LayoutBox>) {
        out.push(lb.clone());
        for c in &lb.children {
            all_boxes(c, out);
        }
    }

    #[test]
    fn single_page() {
        let config = paginate_content(vec![paragraph("Short text")]);
        assert_eq!(config.pages.len(), 1);
        assert_eq!(config.page_text(0), vec!["Short text"]);
    }

    #[test]
    fn empty_document_has_one_page() {
        let config = paginate_content(Vec::new());
        assert_eq!(config.pages.len(), 1);
        assert!(config.pages[0].boxes.is_empty());
    }

    #[test]
    fn multiple_pages() {
        let content = (0..60)
            .map(|i| paragraph(&format!("Paragraph {i} with some text")))
            .collect();
        let config = paginate_content(content);
        assert!(
            config.pages.len() > 1,
            "Expected multiple pages, got {}",
            config.pages.len()
        );
        for page in &config.pages {
            for lbox in &page.boxes {
                assert!(lbox.y >= MARGIN - 0.01);
                assert!(lbox.y + lbox.height <= 841.89 - MARGIN + 0.01);
            }
        }
    }

    #[test]
    fn long_code_block_is_cut_between_lines() {
        let code: Vec<String> = (0..200).map(|i| format!("line {i}")).collect();
        let config = paginate_content(vec![code_block_table(&code.join("\n"))]);
        assert!(config.pages.len() >= 3, "got {} pages", config.pages.len());

        let mut seen = Vec::new();
        for page in 0..config.pages.len() {
            seen.extend(config.page_text(page));
        }
        assert_eq!(seen, code);

        // Every page's slice of the box is closed top and bottom.
        for page in &config.pages {
            let mut boxes = Vec::new();
            for lb in &page.boxes {
                all_boxes(lb, &mut boxes);
            }
            let row = boxes
                .iter()
                .find(|b| b.background_color.is_some())
                .expect("shaded row on every page");
            assert!(row.lines.iter().any(|l| l.y1 == 0.0 && l.y2 == 0.0));
            assert!(row.lines.iter().any(|l| l.y1 == row.height && l.y2 == row.height));
        }
    }

    #[test]
    fn table_rows_are_not_cut() {
        let mut content: Vec<ContentNode> = (0..45).map(|i| paragraph(&format!("filler {i}"))).collect();
        let rows: Vec<Vec<ContentNode>> = (0..30)
            .map(|i| vec![ContentNode::text(format!("r{i}a")), ContentNode::text(format!("r{i}b"))])
            .collect();
        content.push(transform(ContentNode::Table(crate::content::TableNode {
            widths: vec![crate::content::ColumnWidth::Auto; 2],
            body: rows,
            header_rows: 0,
            tags: vec![SemanticTag::Table],
            layout: None,
            margin: None,
        })));
        let config = paginate_content(content);
        assert!(config.pages.len() >= 2);

        let mut cells = Vec::new();
        for page in 0..config.pages.len() {
            cells.extend(config.page_text(page).into_iter().filter(|t| t.starts_with('r')));
        }
        let expected: Vec<String> = (0..30)
            .flat_map(|i| [format!("r{i}a"), format!("r{i}b")])
            .collect();
        assert_eq!(cells, expected);
    }
}
