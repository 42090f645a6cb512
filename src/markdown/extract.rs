//! Front-matter and body extraction for a single document.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Renderer;
use crate::error::{Error, Result};

/// Kramdown inline attribute lists, e.g. `{: .no_toc }`.
static DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{:[^}]*\}").expect("directive pattern is valid"));

/// Jekyll table-of-contents placeholder.
const TOC_MARKER: &str = "- TOC";

/// Metadata decoded from a document's front-matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterMeta {
    pub title: String,
    /// Sort key among siblings. Only relative magnitude matters.
    #[serde(rename = "nav_order", alias = "order")]
    pub order: i64,
}

/// The pieces of a document the tree builder needs.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Source text after legacy directive stripping.
    pub content: String,
    /// Normalized markup.
    pub html: String,
    pub meta: ChapterMeta,
}

/// Remove publishing artifacts that must not reach the renderer.
///
/// Strips every `{:...}` attribute span and every literal `- TOC` marker.
pub fn strip_legacy_directives(source: &str) -> String {
    DIRECTIVE_RE.replace_all(source, "").replace(TOC_MARKER, "")
}

/// Rewrite line breaks to their self-closing form for XHTML containers.
pub fn normalize_markup(html: &str) -> String {
    html.replace("<br>", "<br/>")
}

/// Strip, render and decode one document.
///
/// Errors carry an empty path; callers that know the file attach it with
/// [`Error::with_path`].
pub fn extract_document<R: Renderer>(renderer: &R, source: &str) -> Result<ExtractedDocument> {
    let content = strip_legacy_directives(source);
    let rendered = renderer.render(&content)?;

    let front_matter = rendered.front_matter.ok_or(Error::MissingFrontMatter {
        path: PathBuf::new(),
    })?;
    let meta: ChapterMeta =
        serde_yaml::from_str(&front_matter).map_err(|source| Error::FrontMatter {
            path: PathBuf::new(),
            source,
        })?;

    Ok(ExtractedDocument {
        html: normalize_markup(&rendered.html),
        content,
        meta,
    })
}
