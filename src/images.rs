//! Image localization – rewrites `<img src>` attributes that point at local
//! files into embedded `data:` URIs so the PDF engine never touches the
//! filesystem.
//!
//! Remote (`http://`, `https://`) and already-embedded (`data:`) sources are
//! left alone. A missing or unreadable file is not an error: the reference is
//! kept as written and the image simply will not render.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img\s+([^>]*?)src=["']([^"']+)["']([^>]*?)>"#)
        .expect("img src pattern is valid")
});

/// MIME type for an image path, by extension. Unknown extensions are treated
/// as PNG.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "image/png",
    }
}

fn is_external(src: &str) -> bool {
    src.starts_with("data:") || src.starts_with("http://") || src.starts_with("https://")
}

/// Resolve one `src` against `base_dir`, returning the data URI when the file
/// can be read.
fn embed_local(src: &str, base_dir: &Path) -> Option<String> {
    let path = base_dir.join(src);
    if !path.is_file() {
        log::warn!("image not found, leaving reference as-is: {}", path.display());
        return None;
    }
    match std::fs::read(&path) {
        Ok(bytes) => {
            log::debug!("embedding {} ({} bytes)", path.display(), bytes.len());
            Some(format!(
                "data:{};base64,{}",
                mime_for_path(&path),
                BASE64_STD.encode(bytes)
            ))
        }
        Err(e) => {
            log::warn!("could not read image {}: {e}", path.display());
            None
        }
    }
}

/// Rewrite every local `<img src>` in `html` into a base64 data URI.
pub fn localize_images(html: &str, base_dir: &Path) -> String {
    IMG_SRC
        .replace_all(html, |caps: &Captures<'_>| {
            let before = &caps[1];
            let src = &caps[2];
            let after = &caps[3];
            if is_external(src) {
                return caps[0].to_string();
            }
            match embed_local(src, base_dir) {
                Some(uri) => format!("<img {before}src=\"{uri}\"{after}>"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
