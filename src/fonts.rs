//! Builtin font metrics and text measurement.
//!
//! Only the PDF base-14 Helvetica and Courier families are used, so no font
//! files are loaded. Helvetica advances come from the standard AFM tables for
//! printable ASCII; anything outside that range falls back to an average
//! width (0.5 × size, 0.55 × size for bold).

use std::collections::HashMap;

use crate::stylesheet::FontFamily;

/// Advance widths (1/1000 em) for U+0020..=U+007E.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: FontFamily,
    pub bold: bool,
    pub italic: bool,
}

impl FontKey {
    pub fn new(family: FontFamily, bold: bool, italic: bool) -> Self {
        Self {
            family,
            bold,
            italic,
        }
    }
}

/// Metrics for one builtin face.
#[derive(Debug, Clone)]
pub struct FontData {
    /// Per-character advances for printable ASCII; `None` means monospaced.
    widths: Option<&'static [u16; 95]>,
    /// Advance used for monospaced faces and characters outside the table.
    fallback_width: u16,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
}

impl FontData {
    fn advance(&self, ch: char) -> u16 {
        let code = ch as u32;
        match self.widths {
            Some(table) if (0x20..=0x7e).contains(&code) => table[(code - 0x20) as usize],
            _ => self.fallback_width,
        }
    }
}

/// Lookup table for the builtin faces.
#[derive(Debug, Clone)]
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
}

impl FontManager {
    pub fn new() -> Self {
        let mut fonts = HashMap::new();
        for bold in [false, true] {
            for italic in [false, true] {
                let (widths, fallback_width) = if bold {
                    (&HELVETICA_BOLD_WIDTHS, 550)
                } else {
                    (&HELVETICA_WIDTHS, 500)
                };
                fonts.insert(
                    FontKey::new(FontFamily::Helvetica, bold, italic),
                    FontData {
                        widths: Some(widths),
                        fallback_width,
                        units_per_em: 1000.0,
                        ascender: 718.0,
                        descender: -207.0,
                    },
                );
                fonts.insert(
                    FontKey::new(FontFamily::Courier, bold, italic),
                    FontData {
                        widths: None,
                        fallback_width: 600,
                        units_per_em: 1000.0,
                        ascender: 629.0,
                        descender: -157.0,
                    },
                );
            }
        }
        Self { fonts }
    }

    /// Every key is registered in [`FontManager::new`], so lookups only miss
    /// for a hand-built manager; those fall back to regular Helvetica.
    fn get(&self, key: &FontKey) -> Option<&FontData> {
        self.fonts.get(key).or_else(|| {
            self.fonts
                .get(&FontKey::new(FontFamily::Helvetica, false, false))
        })
    }

    /// Width of `text` in points.
    pub fn measure_text_width(&self, text: &str, font_size: f32, key: FontKey) -> f32 {
        match self.get(&key) {
            Some(data) => {
                let units: u32 = text.chars().map(|c| data.advance(c) as u32).sum();
                units as f32 * font_size / data.units_per_em
            }
            None => {
                let avg = if key.bold { 0.55 } else { 0.5 };
                text.chars().count() as f32 * font_size * avg
            }
        }
    }

    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    pub fn ascender_px(&self, font_size: f32, key: FontKey) -> f32 {
        self.get(&key)
            .map(|d| d.ascender * font_size / d.units_per_em)
            .unwrap_or(font_size * 0.75)
    }

    pub fn descender_px(&self, font_size: f32, key: FontKey) -> f32 {
        self.get(&key)
            .map(|d| -d.descender * font_size / d.units_per_em)
            .unwrap_or(font_size * 0.25)
    }
}

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Word-wrap single-style text to fit within `max_width` points. Existing
/// newlines are kept; a word wider than the line is broken between
/// characters.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    key: FontKey,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        for word in words {
            let candidate = if current_line.is_empty() {
                word.to_string()
            } else {
                format!("{current_line} {word}")
            };
            let w = fonts.measure_text_width(&candidate, font_size, key);
            if w <= max_width {
                current_line = candidate;
                continue;
            }
            if !current_line.is_empty() {
                lines.push(std::mem::take(&mut current_line));
            }
            if fonts.measure_text_width(word, font_size, key) <= max_width {
                current_line = word.to_string();
            } else {
                let mut pieces = break_word(word, font_size, key, max_width, fonts);
                current_line = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Break a single word into pieces no wider than `max_width` (at least one
/// character per piece).
pub fn break_word(
    word: &str,
    font_size: f32,
    key: FontKey,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut width = 0.0;
    for ch in word.chars() {
        let w = fonts.measure_text_width(ch.encode_utf8(&mut [0; 4]), font_size, key);
        if width + w > max_width && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            width = 0.0;
        }
        current.push(ch);
        width += w;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELV: FontKey = FontKey {
        family: FontFamily::Helvetica,
        bold: false,
        italic: false,
    };
    const MONO: FontKey = FontKey {
        family: FontFamily::Courier,
        bold: false,
        italic: false,
    };

    #[test]
    fn helvetica_uses_afm_widths() {
        let mgr = FontManager::default();
        // H=722 e=556 l=222 l=222 o=556 → 2278 units
        let w = mgr.measure_text_width("Hello", 10.0, HELV);
        assert!((w - 22.78).abs() < 0.01, "{w}");
    }

    #[test]
    fn courier_is_monospaced() {
        let mgr = FontManager::default();
        let a = mgr.measure_text_width("iiii", 9.0, MONO);
        let b = mgr.measure_text_width("MMMM", 9.0, MONO);
        assert_eq!(a, b);
        assert!((a - 4.0 * 9.0 * 0.6).abs() < 0.01);
    }

    #[test]
    fn bold_is_wider() {
        let mgr = FontManager::default();
        let bold = FontKey::new(FontFamily::Helvetica, true, false);
        assert!(
            mgr.measure_text_width("bold text", 11.0, bold)
                > mgr.measure_text_width("bold text", 11.0, HELV)
        );
    }

    #[test]
    fn word_wrap_basic() {
        let mgr = FontManager::default();
        let lines = wrap_text("Hello world foo bar", 16.0, HELV, 60.0, &mgr);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
    }

    #[test]
    fn long_word_is_broken() {
        let mgr = FontManager::default();
        let lines = wrap_text("aaaaaaaaaaaaaaaaaaaa", 10.0, MONO, 30.0, &mgr);
        // 6pt per char → 5 chars per line
        assert_eq!(lines, vec!["aaaaa"; 4]);
    }

    #[test]
    fn newlines_are_kept() {
        let mgr = FontManager::default();
        let lines = wrap_text("a\n\nb", 10.0, HELV, 500.0, &mgr);
        assert_eq!(lines, vec!["a", "", "b"]);
    }
}
