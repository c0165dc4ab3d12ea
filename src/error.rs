//! Error types for the converter.
//!
//! Only input validation, I/O and the PDF engine can fail. Image localization
//! and post-processing degrade instead of returning errors, so they have no
//! variants here.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the conversion pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The input path does not exist.
    #[error("File not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    /// The input path exists but does not carry a `.md` extension.
    #[error("Input file must be a .md file")]
    NotMarkdown { path: PathBuf },

    /// Reading the input or writing the output failed.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The flow layout could not be computed.
    #[error("Layout failed: {0}")]
    Layout(String),

    /// printpdf could not produce the document.
    #[error("PDF generation failed: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
