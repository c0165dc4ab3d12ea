//! Pipeline – ties together Markdown rendering, image localization, content
//! mapping, post-processing, assembly and the PDF engine.
//!
//! Every stage runs to completion before the next starts. The only
//! asynchronous step is writing the finished PDF.

use std::path::{Path, PathBuf};

use crate::document::{assemble, DocumentDescription, PageRequest};
use crate::error::{Error, Result};
use crate::fonts::FontManager;
use crate::images::localize_images;
use crate::mapper::{map_html, MapOptions};
use crate::markdown::{render_markdown, Highlighter, SyntectHighlighter};
use crate::postprocess::post_process;
use crate::render::PdfEngine;
use crate::stylesheet::StyleSheet;

/// Default uniform page margin in points.
pub const DEFAULT_MARGIN_PT: f32 = 40.0;
pub const DEFAULT_PAGE_SIZE: &str = "A4";

/// Read-only state shared by conversions: style sheet, font table and
/// highlighter. Build it once and pass it by reference.
#[derive(Debug)]
pub struct RendererContext {
    styles: StyleSheet,
    fonts: FontManager,
    highlighter: SyntectHighlighter,
}

impl RendererContext {
    pub fn new() -> Self {
        Self {
            styles: StyleSheet::github(),
            fonts: FontManager::new(),
            highlighter: SyntectHighlighter::new(),
        }
    }

    pub fn with_styles(mut self, styles: StyleSheet) -> Self {
        self.styles = styles;
        self
    }

    pub fn styles(&self) -> &StyleSheet {
        &self.styles
    }

    pub fn fonts(&self) -> &FontManager {
        &self.fonts
    }

    pub fn highlighter(&self) -> &dyn Highlighter {
        &self.highlighter
    }
}

impl Default for RendererContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for one conversion.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub input: PathBuf,
    /// Destination; defaults to the input path with a `.pdf` extension.
    pub output: Option<PathBuf>,
    /// PDF title; defaults to the input file name without extension.
    pub title: Option<String>,
    pub page_size: String,
    pub margin: f32,
}

impl ConvertOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            title: None,
            page_size: DEFAULT_PAGE_SIZE.to_string(),
            margin: DEFAULT_MARGIN_PT,
        }
    }

    /// The path the PDF will be written to.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input))
    }
}

/// `notes/report.md` → `notes/report.pdf`.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("pdf")
}

/// Check that `input` exists and is a `.md` file (case-insensitive).
///
/// Nothing is read, so a rejected input costs no conversion work.
pub fn validate_input(input: &Path) -> Result<()> {
    if !input.exists() {
        return Err(Error::InputNotFound {
            path: input.to_path_buf(),
        });
    }
    let is_markdown = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md"));
    if !is_markdown {
        return Err(Error::NotMarkdown {
            path: input.to_path_buf(),
        });
    }
    Ok(())
}

/// Run every stage up to (not including) the PDF engine.
pub fn describe(options: &ConvertOptions, ctx: &RendererContext) -> Result<DocumentDescription> {
    validate_input(&options.input)?;
    let markdown =
        std::fs::read_to_string(&options.input).map_err(|e| Error::io(&options.input, e))?;
    Ok(describe_markdown(&markdown, options, ctx))
}

/// Build a description from Markdown text already in memory. Relative image
/// paths resolve against the directory of `options.input`.
pub fn describe_markdown(
    markdown: &str,
    options: &ConvertOptions,
    ctx: &RendererContext,
) -> DocumentDescription {
    let html = render_markdown(markdown, ctx.highlighter());
    log::debug!("rendered {} bytes of HTML", html.len());

    let base_dir = options
        .input
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let html = localize_images(&html, &base_dir);

    let mapped = map_html(&html, &MapOptions::default());
    log::debug!(
        "mapped {} top-level node(s), {} image(s)",
        mapped.content.len(),
        mapped.images.len()
    );

    let content = post_process(mapped.content);

    assemble(
        content,
        mapped.images,
        ctx.styles().clone(),
        &PageRequest {
            page_size: &options.page_size,
            margin: options.margin,
            title: options.title.as_deref(),
        },
        &options.input,
    )
}

/// Convert one Markdown file to PDF and return the path written.
pub async fn convert(options: &ConvertOptions, ctx: &RendererContext) -> Result<PathBuf> {
    let description = describe(options, ctx)?;
    let handle = PdfEngine::build(&description, ctx)?;
    let output = options.output_path();
    handle.write(&output).await?;
    log::info!(
        "wrote {} ({} bytes, {} page(s))",
        output.display(),
        handle.bytes().len(),
        handle.page_count()
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentNode;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn context_is_shareable() {
        assert_send_sync::<RendererContext>();
    }

    #[test]
    fn output_defaults_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("report.md")),
            PathBuf::from("report.pdf")
        );
        let mut opts = ConvertOptions::new("docs/a.md");
        assert_eq!(opts.output_path(), PathBuf::from("docs/a.pdf"));
        opts.output = Some("out/b.pdf".into());
        assert_eq!(opts.output_path(), PathBuf::from("out/b.pdf"));
    }

    #[test]
    fn missing_input_is_reported_first() {
        let err = validate_input(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, Error::InputNotFound { .. }));
        assert_eq!(err.to_string(), "File not found: /definitely/not/here.txt");
    }

    #[test]
    fn describe_markdown_keeps_block_order() {
        let ctx = RendererContext::new();
        let opts = ConvertOptions::new("notes.md");
        let doc = describe_markdown("# T\n\ntext\n\n---\n", &opts, &ctx);
        assert_eq!(doc.content.len(), 3);
        assert!(matches!(doc.content[2], ContentNode::Canvas(_)));
        assert_eq!(doc.info.title, "notes");
        assert_eq!(doc.page_size, "A4");
    }

    #[test]
    fn bad_inline_colour_degrades_to_default() {
        let ctx = RendererContext::new();
        let opts = ConvertOptions::new("notes.md");
        let markdown = "<p><span style=\"color:#\u{20ac}\u{20ac}\">x</span></p>\n";
        let doc = describe_markdown(markdown, &opts, &ctx);
        assert_eq!(doc.content.len(), 1);
        let ContentNode::Text(p) = &doc.content[0] else {
            panic!("expected paragraph, got {:?}", doc.content[0]);
        };
        let crate::content::TextBody::Runs(runs) = &p.body else {
            panic!("expected runs");
        };
        let ContentNode::Text(span) = &runs[0] else {
            panic!("expected span run");
        };
        assert_eq!(span.overrides.color, None);
    }
}
