//! Syntax highlighting for fenced and indented code blocks.
//!
//! Produces self-contained XHTML: colors are inlined as `style` attributes so
//! the book does not depend on a generated stylesheet.

use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::error::{Error, Result};

/// Theme used when none is configured.
pub const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Highlights code blocks with line numbers and a fixed tab width.
pub struct CodeHighlighter {
    syntaxes: SyntaxSet,
    theme: Theme,
    tab_width: usize,
    line_numbers: bool,
}

impl CodeHighlighter {
    /// Load the bundled syntaxes and the named theme.
    pub fn new(theme: &str, tab_width: usize, line_numbers: bool) -> Result<Self> {
        let mut themes = ThemeSet::load_defaults();
        let theme = themes.themes.remove(theme).ok_or_else(|| {
            let mut known: Vec<_> = themes.themes.keys().cloned().collect();
            known.sort();
            Error::Render(format!(
                "unknown highlight theme '{theme}' (available: {})",
                known.join(", ")
            ))
        })?;

        Ok(Self {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            theme,
            tab_width,
            line_numbers,
        })
    }

    /// Render `code` as a `<pre>` block.
    ///
    /// `lang` is the fence info string token; unknown or missing languages
    /// are highlighted as plain text.
    pub fn highlight(&self, code: &str, lang: Option<&str>) -> Result<String> {
        let syntax = lang
            .and_then(|token| self.syntaxes.find_syntax_by_token(token))
            .unwrap_or_else(|| self.syntaxes.find_syntax_plain_text());
        let mut highlighter = HighlightLines::new(syntax, &self.theme);

        let mut out = String::new();
        out.push_str("<pre class=\"highlight\" style=\"white-space:pre-wrap;");
        if let Some(bg) = self.theme.settings.background {
            out.push_str(&format!("background-color:#{:02x}{:02x}{:02x};", bg.r, bg.g, bg.b));
        }
        if let Some(fg) = self.theme.settings.foreground {
            out.push_str(&format!("color:#{:02x}{:02x}{:02x};", fg.r, fg.g, fg.b));
        }
        out.push_str("\"><code>");

        let expanded = expand_tabs(code, self.tab_width);
        for (index, line) in LinesWithEndings::from(&expanded).enumerate() {
            let regions = highlighter
                .highlight_line(line, &self.syntaxes)
                .map_err(|e| Error::Render(e.to_string()))?;
            let html = styled_line_to_highlighted_html(&regions[..], IncludeBackground::No)
                .map_err(|e| Error::Render(e.to_string()))?;

            if self.line_numbers {
                out.push_str(&format!(
                    "<span class=\"line\"><span class=\"ln\" style=\"margin-right:0.8em;opacity:0.6;\">{}</span>{}</span>",
                    index + 1,
                    html
                ));
            } else {
                out.push_str(&html);
            }
        }

        out.push_str("</code></pre>\n");
        Ok(out)
    }
}

/// Replace tabs with spaces up to the next multiple of `width`.
fn expand_tabs(text: &str, width: usize) -> String {
    if width == 0 || !text.contains('\t') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut column = 0;
    for c in text.chars() {
        match c {
            '\t' => {
                let pad = width - column % width;
                out.extend(std::iter::repeat_n(' ', pad));
                column += pad;
            }
            '\n' => {
                out.push(c);
                column = 0;
            }
            _ => {
                out.push(c);
                column += 1;
            }
        }
    }
    out
}
