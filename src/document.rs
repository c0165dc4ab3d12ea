//! Document description – the declarative bundle handed to the PDF engine,
//! and the assembler that builds it from the post-processed content.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::content::{ContentNode, ImageTable};
use crate::stylesheet::{Edges, StyleSheet, TextStyle};

pub const PRODUCER: &str = "mdpdf-forge";

/// Document metadata embedded in the PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: String,
    pub producer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDescription {
    pub content: Vec<ContentNode>,
    pub images: ImageTable,
    pub styles: StyleSheet,
    pub default_style: TextStyle,
    /// Upper-cased page size token. Not validated here.
    pub page_size: String,
    pub page_margins: Edges,
    pub info: DocumentInfo,
}

impl DocumentDescription {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Inputs to [`assemble`].
#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub page_size: &'a str,
    pub margin: f32,
    pub title: Option<&'a str>,
}

/// Combine content, images and page settings into one description.
///
/// `input` only supplies the default title (its file name without extension).
pub fn assemble(
    content: Vec<ContentNode>,
    images: ImageTable,
    styles: StyleSheet,
    request: &PageRequest<'_>,
    input: &Path,
) -> DocumentDescription {
    let title = request
        .title
        .map(str::to_string)
        .unwrap_or_else(|| default_title(input));
    DocumentDescription {
        content,
        images,
        styles,
        default_style: TextStyle::default(),
        page_size: request.page_size.to_uppercase(),
        page_margins: Edges::uniform(request.margin),
        info: DocumentInfo {
            title,
            producer: PRODUCER.to_string(),
        },
    }
}

fn default_title(input: &Path) -> String {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(page_size: &'static str, title: Option<&'static str>) -> PageRequest<'static> {
        PageRequest {
            page_size,
            margin: 40.0,
            title,
        }
    }

    #[test]
    fn page_token_is_uppercased_and_passed_through() {
        let doc = assemble(
            Vec::new(),
            ImageTable::new(),
            StyleSheet::github(),
            &request("letter", None),
            Path::new("notes.md"),
        );
        assert_eq!(doc.page_size, "LETTER");

        let doc = assemble(
            Vec::new(),
            ImageTable::new(),
            StyleSheet::github(),
            &request("weird-size", None),
            Path::new("notes.md"),
        );
        assert_eq!(doc.page_size, "WEIRD-SIZE");
    }

    #[test]
    fn margin_is_uniform() {
        let doc = assemble(
            Vec::new(),
            ImageTable::new(),
            StyleSheet::github(),
            &PageRequest {
                page_size: "A4",
                margin: 25.0,
                title: None,
            },
            Path::new("a.md"),
        );
        assert_eq!(doc.page_margins, Edges::uniform(25.0));
    }

    #[test]
    fn title_defaults_to_file_stem() {
        let doc = assemble(
            Vec::new(),
            ImageTable::new(),
            StyleSheet::github(),
            &request("A4", None),
            Path::new("/tmp/docs/report.md"),
        );
        assert_eq!(doc.info.title, "report");
        assert_eq!(doc.info.producer, PRODUCER);

        let doc = assemble(
            Vec::new(),
            ImageTable::new(),
            StyleSheet::github(),
            &request("A4", Some("Quarterly")),
            Path::new("/tmp/docs/report.md"),
        );
        assert_eq!(doc.info.title, "Quarterly");
    }

    #[test]
    fn json_contains_content_kinds() {
        let doc = assemble(
            vec![ContentNode::text("hi")],
            ImageTable::new(),
            StyleSheet::github(),
            &request("A4", None),
            Path::new("x.md"),
        );
        let json = doc.to_json();
        assert!(json.contains("\"kind\": \"text\""), "{json}");
        assert!(json.contains("\"producer\": \"mdpdf-forge\""));
    }
}
