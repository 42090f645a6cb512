//! pulldown-cmark based [`Renderer`].
//!
//! Renders CommonMark plus tables and strikethrough to an XHTML fragment.
//! A leading `---` YAML block is split off as front-matter before parsing,
//! code blocks go through [`CodeHighlighter`], and raw HTML in the source is
//! passed through verbatim.

use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html};
use regex::Regex;

use super::highlight::{CodeHighlighter, DEFAULT_THEME};
use super::{Rendered, Renderer};
use crate::error::Result;

/// A `---` line at the very start, then everything up to the first line that
/// is exactly `---` or `...`.
static FRONT_MATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)\A---[ \t]*\r?\n(.*?)(?:\r?\n)?^(?:---|\.\.\.)[ \t]*\r?$\n?")
        .expect("front-matter pattern is valid")
});

/// Split a leading YAML front-matter block from the Markdown body.
///
/// Blank lines inside the block are allowed, including right after the
/// opening fence. Without a closed block the whole input is the body.
///
/// ```
/// use mdepub::markdown::render::split_front_matter;
///
/// let (front, body) = split_front_matter("---\n\ntitle: Git\n---\n\nBody\n");
/// assert_eq!(front, Some("\ntitle: Git"));
/// assert_eq!(body, "\nBody\n");
/// ```
pub fn split_front_matter(source: &str) -> (Option<&str>, &str) {
    match FRONT_MATTER_RE.captures(source) {
        Some(caps) => {
            let block = caps.get(1).map_or("", |m| m.as_str());
            let end = caps.get(0).map_or(0, |m| m.end());
            (Some(block), &source[end..])
        }
        None => (None, source),
    }
}

/// Configuration for the Markdown renderer.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// syntect theme name used for code blocks.
    pub theme: String,
    /// Tab stop width inside code blocks.
    pub tab_width: usize,
    /// Prefix each code line with its number.
    pub line_numbers: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.to_string(),
            tab_width: 2,
            line_numbers: true,
        }
    }
}

/// Markdown to XHTML renderer.
///
/// # Example
///
/// ```
/// use mdepub::markdown::{MarkdownRenderer, Renderer};
///
/// let renderer = MarkdownRenderer::new()?;
/// let out = renderer.render("---\ntitle: Hi\nnav_order: 1\n---\n\n# Hi\n")?;
/// assert_eq!(out.html, "<h1>Hi</h1>\n");
/// assert!(out.front_matter.unwrap().contains("title: Hi"));
/// # Ok::<(), mdepub::Error>(())
/// ```
pub struct MarkdownRenderer {
    highlighter: CodeHighlighter,
}

impl MarkdownRenderer {
    /// Create a renderer with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(RenderConfig::default())
    }

    /// Create a renderer with custom settings.
    pub fn with_config(config: RenderConfig) -> Result<Self> {
        Ok(Self {
            highlighter: CodeHighlighter::new(
                &config.theme,
                config.tab_width,
                config.line_numbers,
            )?,
        })
    }

    fn options() -> Options {
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH
    }
}

/// A code block being accumulated between its start and end events.
struct PendingCode {
    lang: Option<String>,
    text: String,
}

impl Renderer for MarkdownRenderer {
    fn render(&self, source: &str) -> Result<Rendered> {
        let (front_matter, body) = split_front_matter(source);
        let mut code: Option<PendingCode> = None;
        let mut events: Vec<Event<'_>> = Vec::new();

        for event in Parser::new_ext(body, Self::options()) {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    code = Some(PendingCode {
                        lang,
                        text: String::new(),
                    });
                }
                Event::Text(text) if code.is_some() => {
                    if let Some(pending) = code.as_mut() {
                        pending.text.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some(pending) = code.take() {
                        let block = self
                            .highlighter
                            .highlight(&pending.text, pending.lang.as_deref())?;
                        events.push(Event::Html(CowStr::from(block)));
                    }
                }
                other => events.push(other),
            }
        }

        let mut out = String::with_capacity(body.len() * 3 / 2);
        html::push_html(&mut out, events.into_iter());

        Ok(Rendered {
            html: out,
            front_matter: front_matter.map(str::to_string),
        })
    }
}
