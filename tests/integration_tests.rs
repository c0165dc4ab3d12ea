//! Integration tests for the Markdown → PDF pipeline.
//!
//! These tests validate:
//! - The document description has the expected shape for common Markdown
//! - Inputs are validated before any conversion work
//! - PDF output exists and has a valid header
//! - Local images are embedded and conversions can run side by side

use std::fs;
use std::path::Path;
use std::sync::Arc;

use mdpdf_forge::content::{ContentNode, ImageSource, RowFill, Shape, TextBody};
use mdpdf_forge::pipeline::{convert, describe, ConvertOptions, RendererContext};
use mdpdf_forge::{Error, PdfEngine};

// =====================================================================
// Helpers
// =====================================================================

const SAMPLE: &str = "# Title\n\
\n\
Some paragraph text.\n\
\n\
```\n\
a\n\
b\n\
```\n\
\n\
---\n\
\n\
| Name | Value |\n\
|------|-------|\n\
| x    | 1     |\n";

fn write_md(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

// =====================================================================
// Document description
// =====================================================================

#[test]
fn sample_document_has_five_blocks_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_md(dir.path(), "sample.md", SAMPLE);
    let ctx = RendererContext::new();

    let doc = describe(&ConvertOptions::new(&input), &ctx).unwrap();
    assert_eq!(doc.content.len(), 5, "{:#?}", doc.content);

    assert!(matches!(doc.content[0], ContentNode::Text(_)));
    assert!(matches!(doc.content[1], ContentNode::Text(_)));

    let ContentNode::Table(code) = &doc.content[2] else {
        panic!("expected code table, got {:?}", doc.content[2]);
    };
    assert_eq!(code.body.len(), 1);
    assert_eq!(code.body[0].len(), 1);
    let ContentNode::Text(cell) = &code.body[0][0] else {
        panic!("expected text cell");
    };
    assert_eq!(cell.body, TextBody::Plain("a\nb".to_string()));
    let layout = code.layout.as_ref().expect("code table has borders");
    assert_eq!(layout.line_width, 0.5);
    assert!(matches!(layout.fill, RowFill::All(_)));

    let ContentNode::Canvas(rule) = &doc.content[3] else {
        panic!("expected rule canvas, got {:?}", doc.content[3]);
    };
    assert_eq!(rule.shapes.len(), 1);
    assert!(matches!(rule.shapes[0], Shape::Line { .. }));

    let ContentNode::Table(table) = &doc.content[4] else {
        panic!("expected table, got {:?}", doc.content[4]);
    };
    assert_eq!(table.body.len(), 2);
    assert_eq!(table.header_rows, 1);
    let layout = table.layout.as_ref().expect("table gains a layout");
    assert!(matches!(layout.fill, RowFill::HeaderOnly(_)));
}

#[test]
fn description_defaults_follow_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_md(dir.path(), "weekly-report.md", "hello\n");
    let ctx = RendererContext::new();

    let mut opts = ConvertOptions::new(&input);
    opts.page_size = "letter".into();
    let doc = describe(&opts, &ctx).unwrap();
    assert_eq!(doc.info.title, "weekly-report");
    assert_eq!(doc.info.producer, "mdpdf-forge");
    assert_eq!(doc.page_size, "LETTER");
    assert_eq!(doc.page_margins.left, 40.0);
    assert!(doc.to_json().contains("\"producer\""));
}

// =====================================================================
// Input validation
// =====================================================================

#[tokio::test]
async fn non_markdown_input_is_rejected_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_md(dir.path(), "notes.txt", "# not markdown by name\n");
    let ctx = RendererContext::new();

    let err = convert(&ConvertOptions::new(&input), &ctx).await.unwrap_err();
    assert!(matches!(err, Error::NotMarkdown { .. }));
    assert_eq!(err.to_string(), "Input file must be a .md file");
    assert!(!dir.path().join("notes.pdf").exists());
}

#[tokio::test]
async fn missing_input_reports_file_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RendererContext::new();

    let err = convert(&ConvertOptions::new(dir.path().join("absent.md")), &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("File not found: "), "{err}");
}

// =====================================================================
// End-to-end conversion
// =====================================================================

#[tokio::test]
async fn converts_next_to_input_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_md(dir.path(), "report.md", SAMPLE);
    let ctx = RendererContext::new();

    let written = convert(&ConvertOptions::new(&input), &ctx).await.unwrap();
    assert_eq!(written, dir.path().join("report.pdf"));
    assert_valid_pdf(&fs::read(&written).unwrap());
}

#[tokio::test]
async fn upper_case_extension_and_nested_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_md(dir.path(), "README.MD", "# Readme\n\n- one\n- two\n");
    let ctx = RendererContext::new();

    let mut opts = ConvertOptions::new(&input);
    opts.output = Some(dir.path().join("out/deep/readme.pdf"));
    opts.title = Some("Project Readme".into());
    let written = convert(&opts, &ctx).await.unwrap();
    assert_valid_pdf(&fs::read(written).unwrap());
}

#[test]
fn long_document_spans_several_pages() {
    let dir = tempfile::tempdir().unwrap();
    let body: String = (0..200)
        .map(|i| format!("Paragraph number {i} with a few words of filler text.\n\n"))
        .collect();
    let input = write_md(dir.path(), "long.md", &body);
    let ctx = RendererContext::new();

    let doc = describe(&ConvertOptions::new(&input), &ctx).unwrap();
    let handle = PdfEngine::build(&doc, &ctx).unwrap();
    assert!(handle.page_count() > 1, "pages = {}", handle.page_count());
    assert_valid_pdf(handle.bytes());
}

#[test]
fn unknown_page_size_still_renders() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_md(dir.path(), "odd.md", "text\n");
    let ctx = RendererContext::new();

    let mut opts = ConvertOptions::new(&input);
    opts.page_size = "postcard".into();
    let doc = describe(&opts, &ctx).unwrap();
    let handle = PdfEngine::build(&doc, &ctx).unwrap();
    assert_eq!(handle.layout().page_width_pt, 595.28);
    assert_valid_pdf(handle.bytes());
}

#[test]
fn local_images_are_embedded() {
    let dir = tempfile::tempdir().unwrap();
    image::RgbImage::from_pixel(4, 3, image::Rgb([200, 30, 30]))
        .save(dir.path().join("pic.png"))
        .unwrap();
    let input = write_md(
        dir.path(),
        "img.md",
        "![pic](pic.png)\n\n![remote](http://example.com/y.png)\n",
    );
    let ctx = RendererContext::new();

    let doc = describe(&ConvertOptions::new(&input), &ctx).unwrap();
    assert_eq!(doc.images.len(), 1);
    let uri = doc.images.values().next().unwrap();
    assert!(uri.starts_with("data:image/png;base64,"));

    let json = doc.to_json();
    assert!(json.contains("http://example.com/y.png"));
    fn has_reference(node: &ContentNode) -> bool {
        match node {
            ContentNode::Image(img) => matches!(img.source, ImageSource::Reference(_)),
            ContentNode::Text(t) => match &t.body {
                TextBody::Runs(runs) => runs.iter().any(has_reference),
                TextBody::Plain(_) => false,
            },
            ContentNode::Stack(s) => s.children.iter().any(has_reference),
            _ => false,
        }
    }
    assert!(doc.content.iter().any(has_reference));

    let handle = PdfEngine::build(&doc, &ctx).unwrap();
    assert_valid_pdf(handle.bytes());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_conversions_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Arc::new(RendererContext::new());

    let mut tasks = Vec::new();
    for i in 0..4 {
        let input = write_md(dir.path(), &format!("doc{i}.md"), &format!("# Doc {i}\n\n{SAMPLE}"));
        let ctx = Arc::clone(&ctx);
        tasks.push(tokio::spawn(async move {
            convert(&ConvertOptions::new(input), &ctx).await
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let written = task.await.unwrap().unwrap();
        assert_eq!(written, dir.path().join(format!("doc{i}.pdf")));
        assert_valid_pdf(&fs::read(&written).unwrap());
    }
}
