//! Markdown → HTML using `pulldown-cmark`, with fenced code blocks routed
//! through a [`Highlighter`].

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{styled_line_to_highlighted_html, IncludeBackground};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

/// Highlight hook called once per fenced block.
///
/// Returns the highlighted HTML fragment (already escaped), or `None` to let
/// the renderer escape the code itself.
pub trait Highlighter: Send + Sync {
    fn highlight(&self, code: &str, lang: &str) -> Option<String>;
}

/// Leaves every block unhighlighted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHighlight;

impl Highlighter for NoHighlight {
    fn highlight(&self, _code: &str, _lang: &str) -> Option<String> {
        None
    }
}

/// syntect-backed highlighter emitting `<span style="color:…">` runs.
pub struct SyntectHighlighter {
    syntaxes: SyntaxSet,
    theme: Theme,
}

impl SyntectHighlighter {
    pub const DEFAULT_THEME: &'static str = "InspiredGitHub";

    pub fn new() -> Self {
        Self::with_theme(Self::DEFAULT_THEME)
    }

    /// Use one of syntect's bundled themes; unknown names fall back to the
    /// default theme.
    pub fn with_theme(name: &str) -> Self {
        let mut themes = ThemeSet::load_defaults().themes;
        let theme = themes
            .remove(name)
            .or_else(|| themes.remove(Self::DEFAULT_THEME))
            .unwrap_or_default();
        Self {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            theme,
        }
    }
}

impl Default for SyntectHighlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SyntectHighlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntectHighlighter")
            .field("theme", &self.theme.name)
            .finish_non_exhaustive()
    }
}

impl Highlighter for SyntectHighlighter {
    fn highlight(&self, code: &str, lang: &str) -> Option<String> {
        if lang.is_empty() {
            return None;
        }
        let syntax = self.syntaxes.find_syntax_by_token(lang)?;
        let mut h = HighlightLines::new(syntax, &self.theme);
        let mut out = String::with_capacity(code.len() * 2);
        for line in LinesWithEndings::from(code) {
            let regions = match h.highlight_line(line, &self.syntaxes) {
                Ok(r) => r,
                Err(e) => {
                    log::debug!("highlighting {lang} failed: {e}");
                    return None;
                }
            };
            out.push_str(&styled_line_to_highlighted_html(&regions[..], IncludeBackground::No).ok()?);
        }
        Some(out)
    }
}

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options
}

/// Render Markdown to HTML. Raw HTML in the source passes through untouched.
pub fn render_markdown(markdown: &str, highlighter: &dyn Highlighter) -> String {
    let mut events: Vec<Event<'_>> = Vec::new();
    let mut code: Option<(String, String)> = None;

    for event in Parser::new_ext(markdown, options()) {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => language_token(&info).to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                code = Some((lang, String::new()));
            }
            Event::Text(text) if code.is_some() => {
                if let Some((_, buf)) = code.as_mut() {
                    buf.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((lang, buf)) = code.take() {
                    let block = code_block_html(&buf, &lang, highlighter);
                    events.push(Event::Html(CowStr::from(block)));
                }
            }
            other => events.push(other),
        }
    }

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

fn code_block_html(code: &str, lang: &str, highlighter: &dyn Highlighter) -> String {
    let body = highlighter
        .highlight(code, lang)
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| escape_html(code));
    if lang.is_empty() {
        format!("<pre><code>{body}</code></pre>\n")
    } else {
        format!(
            "<pre><code class=\"language-{}\">{body}</code></pre>\n",
            escape_html(lang)
        )
    }
}

/// First word of a fence info string (`rust,ignore` → `rust`).
fn language_token(info: &str) -> &str {
    info.split(|c: char| c.is_whitespace() || c == ',' || c == '{')
        .next()
        .unwrap_or("")
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_basic_blocks() {
        let html = render_markdown("# Title\n\nHello *there*.\n\n---\n", &NoHighlight);
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>there</em>"));
        assert!(html.contains("<hr />"));
    }

    #[test]
    fn unhighlighted_code_is_escaped() {
        let html = render_markdown("```\na < b\n```\n", &NoHighlight);
        assert!(html.contains("<pre><code>a &lt; b\n</code></pre>"), "{html}");
    }

    #[test]
    fn fenced_language_class_is_kept() {
        let html = render_markdown("```nosuchlang\nx\n```\n", &NoHighlight);
        assert!(html.contains("class=\"language-nosuchlang\""));
    }

    #[test]
    fn syntect_highlights_known_language() {
        let h = SyntectHighlighter::new();
        let out = h.highlight("fn main() {}\n", "rust").unwrap();
        assert!(out.contains("<span style=\"color:"), "{out}");
        assert!(h.highlight("x", "definitely-not-a-language").is_none());
        assert!(h.highlight("x", "").is_none());
    }

    #[test]
    fn raw_html_passes_through() {
        let html = render_markdown("<div class=\"note\">raw</div>\n", &NoHighlight);
        assert!(html.contains("<div class=\"note\">raw</div>"));
    }

    #[test]
    fn tables_are_enabled() {
        let html = render_markdown("| a | b |\n|---|---|\n| 1 | 2 |\n", &NoHighlight);
        assert!(html.contains("<table>"));
        assert!(html.contains("<th>a</th>"));
    }

    #[test]
    fn language_token_strips_attributes() {
        assert_eq!(language_token("rust,ignore"), "rust");
        assert_eq!(language_token("js title=x"), "js");
        assert_eq!(language_token(""), "");
    }
}
