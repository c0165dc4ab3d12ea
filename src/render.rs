//! PDF engine – lays out a [`DocumentDescription`], paginates it and emits
//! PDF bytes with `printpdf` (v0.8 ops-based API) using the builtin
//! Helvetica and Courier faces.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use printpdf::*;

use crate::document::DocumentDescription;
use crate::error::{Error, Result};
use crate::layout::compute_layout;
use crate::layout_config::{page_dimensions, LayoutBox, LayoutConfig, LineSegment, TextFragment};
use crate::pagination::paginate;
use crate::pipeline::RendererContext;
use crate::stylesheet::FontFamily;

const A4: (f32, f32) = (595.28, 841.89);

/// Turns document descriptions into PDF documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfEngine;

impl PdfEngine {
    /// Lay out, paginate and render `doc`. Unknown page sizes fall back to A4.
    pub fn build(doc: &DocumentDescription, ctx: &RendererContext) -> Result<PdfHandle> {
        let (width, height) = page_dimensions(&doc.page_size).unwrap_or_else(|| {
            log::warn!("unknown page size {:?}, using A4", doc.page_size);
            A4
        });
        let m = doc.page_margins;
        if width - m.horizontal() <= 0.0 || height - m.top - m.bottom <= 0.0 {
            return Err(Error::Render(format!(
                "margins of {}pt leave no printable area on a {}x{}pt page",
                m.left, width, height
            )));
        }

        let boxes = compute_layout(doc, ctx.fonts(), width, height)?;
        let mut layout = paginate(&boxes, width, height, m);
        layout.title = doc.info.title.clone();
        let bytes = render_pdf(&layout)?;
        log::debug!(
            "rendered {} page(s), {} bytes",
            layout.pages.len(),
            bytes.len()
        );
        Ok(PdfHandle { bytes, layout })
    }
}

/// A finished PDF held in memory until written.
#[derive(Debug, Clone)]
pub struct PdfHandle {
    bytes: Vec<u8>,
    layout: LayoutConfig,
}

impl PdfHandle {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn page_count(&self) -> usize {
        self.layout.pages.len()
    }

    /// The per-page layout the PDF was drawn from.
    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Write the PDF to `path`, creating missing parent directories.
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }
        tokio::fs::write(path, &self.bytes)
            .await
            .map_err(|e| Error::io(path, e))
    }
}

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Render a LayoutConfig into PDF bytes.
///
/// Images whose `src` is not a base64 data URI, or whose bytes cannot be
/// decoded, are skipped with a warning.
pub fn render_pdf(config: &LayoutConfig) -> Result<Vec<u8>> {
    let page_w = Mm(config.page_width_pt * 0.352778); // pt → mm
    let page_h = Mm(config.page_height_pt * 0.352778);

    let mut doc = PdfDocument::new(&config.title);

    let mut all_srcs: HashSet<&str> = HashSet::new();
    for page_layout in &config.pages {
        for lbox in &page_layout.boxes {
            collect_image_srcs(lbox, &mut all_srcs);
        }
    }

    let mut image_resources: HashMap<String, ImageResource> = HashMap::new();
    let mut img_warnings: Vec<PdfWarnMsg> = Vec::new();

    for src in &all_srcs {
        let bytes = match parse_data_uri(src) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("skipping image: {e}");
                continue;
            }
        };
        let dyn_img = match ::image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("skipping image: decode error: {e}");
                continue;
            }
        };
        let (px_width, px_height) = (dyn_img.width(), dyn_img.height());
        let raw = match RawImage::decode_from_bytes(&bytes, &mut img_warnings) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("skipping image: PDF encode error: {e}");
                continue;
            }
        };
        let xobj_id = doc.add_image(&raw);
        image_resources.insert(
            src.to_string(),
            ImageResource {
                xobj_id,
                px_width,
                px_height,
            },
        );
    }

    let mut pages = Vec::with_capacity(config.pages.len().max(1));
    for page_layout in &config.pages {
        let mut ops = Vec::new();
        for lbox in &page_layout.boxes {
            render_box(&mut ops, lbox, config.page_height_pt, &image_resources);
        }
        pages.push(PdfPage::new(page_w, page_h, ops));
    }
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    doc.with_pages(pages);
    Ok(doc.save(&PdfSaveOptions::default(), &mut Vec::new()))
}

/// Characters above U+00FF that WinAnsiEncoding still has a code for.
const WINANSI_EXTRAS: [char; 27] = [
    '\u{20AC}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{017D}', '\u{2018}',
    '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}', '\u{02DC}',
    '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{017E}', '\u{0178}',
];

/// Restrict `s` to what the builtin fonts can show. printpdf encodes the
/// result to WinAnsiEncoding itself; anything without a code becomes `?`.
fn winansi_text(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{00A0}' => ' ',
            c if (c as u32) < 0x80 || ('\u{00A1}'..='\u{00FF}').contains(&c) => c,
            c if WINANSI_EXTRAS.contains(&c) => c,
            _ => '?',
        })
        .collect()
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
fn parse_data_uri(src: &str) -> std::result::Result<Vec<u8>, String> {
    let Some(rest) = src.strip_prefix("data:") else {
        let preview: String = src.chars().take(80).collect();
        return Err(format!("not a data URI: {preview:?}"));
    };
    let comma = rest
        .find(',')
        .ok_or_else(|| "invalid data URI: missing ','".to_string())?;
    if !rest[..comma].contains(";base64") {
        return Err("only base64-encoded data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(rest[comma + 1..].trim())
        .map_err(|e| format!("base64 decode error: {e}"))
}

fn collect_image_srcs<'a>(lbox: &'a LayoutBox, srcs: &mut HashSet<&'a str>) {
    if let Some(img) = &lbox.image {
        srcs.insert(img.src.as_str());
    }
    for child in &lbox.children {
        collect_image_srcs(child, srcs);
    }
}

fn builtin_font(family: FontFamily, bold: bool, italic: bool) -> BuiltinFont {
    match (family, bold, italic) {
        (FontFamily::Helvetica, false, false) => BuiltinFont::Helvetica,
        (FontFamily::Helvetica, true, false) => BuiltinFont::HelveticaBold,
        (FontFamily::Helvetica, false, true) => BuiltinFont::HelveticaOblique,
        (FontFamily::Helvetica, true, true) => BuiltinFont::HelveticaBoldOblique,
        (FontFamily::Courier, false, false) => BuiltinFont::Courier,
        (FontFamily::Courier, true, false) => BuiltinFont::CourierBold,
        (FontFamily::Courier, false, true) => BuiltinFont::CourierOblique,
        (FontFamily::Courier, true, true) => BuiltinFont::CourierBoldOblique,
    }
}

fn rgb(c: [f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Filled rectangle between two corners, in PDF coordinates.
fn fill_rect(ops: &mut Vec<Op>, x1: f32, y1: f32, x2: f32, y2: f32, color: [f32; 4]) {
    ops.push(Op::SetFillColor { col: rgb(color) });
    ops.push(Op::DrawPolygon {
        polygon: Polygon {
            rings: vec![PolygonRing {
                points: vec![point(x1, y1), point(x2, y1), point(x2, y2), point(x1, y2)],
            }],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        },
    });
}

fn stroke_line(ops: &mut Vec<Op>, from: (f32, f32), to: (f32, f32), width: f32, color: [f32; 4]) {
    ops.push(Op::SetOutlineColor { col: rgb(color) });
    ops.push(Op::SetOutlineThickness { pt: Pt(width) });
    ops.push(Op::DrawLine {
        line: Line {
            points: vec![point(from.0, from.1), point(to.0, to.1)],
            is_closed: false,
        },
    });
}

fn write_text(ops: &mut Vec<Op>, x: f32, y: f32, text: &str, size: f32, font: BuiltinFont, color: [f32; 4]) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point { x: Pt(x), y: Pt(y) },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(size),
        font,
    });
    ops.push(Op::SetFillColor { col: rgb(color) });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(winansi_text(text))],
        font,
    });
    ops.push(Op::EndTextSection);
}

fn render_fragment(ops: &mut Vec<Op>, frag: &TextFragment, x: f32, baseline: f32) {
    if let Some(bg) = frag.background {
        fill_rect(
            ops,
            x,
            baseline - frag.font_size * 0.25,
            x + frag.width,
            baseline + frag.font_size * 0.85,
            bg,
        );
    }
    if !frag.text.trim().is_empty() {
        let font = builtin_font(frag.font_family, frag.bold, frag.italic);
        write_text(ops, x, baseline, &frag.text, frag.font_size, font, frag.color);
    }
    let thickness = (frag.font_size / 18.0).max(0.5);
    if frag.underline {
        let y = baseline - frag.font_size * 0.12;
        stroke_line(ops, (x, y), (x + frag.width, y), thickness, frag.color);
    }
    if frag.strike {
        let y = baseline + frag.font_size * 0.28;
        stroke_line(ops, (x, y), (x + frag.width, y), thickness, frag.color);
    }
}

fn render_segment(ops: &mut Vec<Op>, seg: &LineSegment, left: f32, top: f32) {
    stroke_line(
        ops,
        (left + seg.x1, top - seg.y1),
        (left + seg.x2, top - seg.y2),
        seg.width,
        seg.color,
    );
}

/// Recursively render a LayoutBox and its children into PDF ops.
fn render_box(
    ops: &mut Vec<Op>,
    lbox: &LayoutBox,
    page_height: f32,
    images: &HashMap<String, ImageResource>,
) {
    // PDF origin is bottom-left; layout origin is top-left.
    let pdf_y = page_height - lbox.y;

    if let Some(bg) = lbox.background_color {
        fill_rect(ops, lbox.x, pdf_y - lbox.height, lbox.x + lbox.width, pdf_y, bg);
    }

    if let Some(text) = &lbox.text {
        for line in &text.lines {
            let baseline = pdf_y - line.y_offset - line.baseline;
            for frag in &line.fragments {
                render_fragment(ops, frag, lbox.x + frag.x_offset, baseline);
            }
        }
    }

    if let Some(marker) = &lbox.list_marker {
        write_text(
            ops,
            lbox.x + marker.x_offset,
            pdf_y - marker.baseline,
            &marker.text,
            marker.font_size,
            BuiltinFont::Helvetica,
            marker.color,
        );
    }

    if let Some(img) = &lbox.image {
        if let Some(res) = images.get(&img.src) {
            // At dpi=72 printpdf renders 1 px = 1 pt, so scale = pt / px.
            let scale_x = if res.px_width > 0 {
                img.width / res.px_width as f32
            } else {
                1.0
            };
            let scale_y = if res.px_height > 0 {
                img.height / res.px_height as f32
            } else {
                1.0
            };
            ops.push(Op::UseXobject {
                id: res.xobj_id.clone(),
                transform: XObjectTransform {
                    translate_x: Some(Pt(lbox.x)),
                    translate_y: Some(Pt(pdf_y - img.height)),
                    dpi: Some(72.0),
                    scale_x: Some(scale_x),
                    scale_y: Some(scale_y),
                    rotate: None,
                },
            });
        }
    }

    for child in &lbox.children {
        render_box(ops, child, page_height, images);
    }

    // Strokes go last so borders sit on top of cell fills.
    for seg in &lbox.lines {
        render_segment(ops, seg, lbox.x, pdf_y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout_config::{PageLayout, TextContent, TextLine};

    #[test]
    fn render_empty_page() {
        let config = LayoutConfig::for_page_size("A4");
        let bytes = render_pdf(&config).unwrap();
        assert!(bytes.len() > 100, "PDF should have content");
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn render_text_lines_and_rules() {
        let mut config = LayoutConfig::for_page_size("LETTER");
        let mut lbox = LayoutBox::new(40.0, 40.0, 200.0, 20.0);
        lbox.background_color = Some([0.9, 0.9, 0.9, 1.0]);
        lbox.lines.push(LineSegment {
            x1: 0.0,
            y1: 0.0,
            x2: 200.0,
            y2: 0.0,
            width: 0.5,
            color: [0.0, 0.0, 0.0, 1.0],
        });
        lbox.text = Some(TextContent {
            lines: vec![TextLine {
                y_offset: 0.0,
                height: 16.5,
                baseline: 12.0,
                fragments: vec![TextFragment {
                    text: "caf\u{e9} \u{2014} done".into(),
                    x_offset: 0.0,
                    width: 60.0,
                    font_family: FontFamily::Courier,
                    font_size: 11.0,
                    bold: true,
                    italic: false,
                    color: [0.1, 0.1, 0.1, 1.0],
                    background: Some([0.93, 0.94, 0.95, 1.0]),
                    underline: true,
                    strike: true,
                }],
            }],
        });
        config.pages.push(PageLayout {
            page_index: 0,
            boxes: vec![lbox],
        });
        let bytes = render_pdf(&config).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn text_is_limited_to_winansi() {
        let typographic = "\u{201C}caf\u{e9}\u{201D} \u{2014} 5\u{20AC}";
        assert_eq!(winansi_text(typographic), typographic);
        assert_eq!(winansi_text("a\u{00A0}b"), "a b");
        assert_eq!(winansi_text("\u{4e2d}\u{6587}"), "??");
        assert_eq!(winansi_text("\u{1F600}x"), "?x");
    }

    #[test]
    fn data_uri_parsing() {
        assert_eq!(parse_data_uri("data:image/png;base64,aGk=").unwrap(), b"hi");
        assert!(parse_data_uri("https://x/y.png").is_err());
        assert!(parse_data_uri("data:image/png,raw").is_err());
    }
}
