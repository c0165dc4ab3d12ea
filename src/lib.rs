//! # mdpdf-forge – Markdown → PDF without a browser
//!
//! The conversion runs as a strictly sequential pipeline:
//!
//! 1. **Render** – Markdown → HTML with fenced-code highlighting ([`markdown`])
//! 2. **Localize** – inline local `<img>` files as data URIs ([`images`])
//! 3. **Map** – HTML → renderer-agnostic content tree ([`dom`], [`mapper`], [`content`])
//! 4. **Post-process** – restyle code blocks, rules and tables ([`postprocess`])
//! 5. **Assemble** – bundle content, images, styles and page settings ([`document`])
//! 6. **Build** – layout with Taffy, paginate, emit PDF via printpdf
//!    ([`layout`], [`pagination`], [`render`])
//!
//! [`pipeline::convert`] drives all of it from a [`pipeline::ConvertOptions`].

pub mod content;
pub mod document;
pub mod dom;
pub mod error;
pub mod fonts;
pub mod images;
pub mod layout;
pub mod layout_config;
pub mod mapper;
pub mod markdown;
pub mod pagination;
pub mod pipeline;
pub mod postprocess;
pub mod render;
pub mod stylesheet;

// Re-exports for convenience
pub use document::DocumentDescription;
pub use error::{Error, Result};
pub use pipeline::{convert, describe, ConvertOptions, RendererContext};
pub use render::{PdfEngine, PdfHandle};
