//! Markdown document processing.
//!
//! This module turns the raw text of one source document into the pieces a
//! [`Chapter`](crate::Chapter) is made of. The design separates the pure
//! text transformations from the rendering engine:
//!
//! - [`extract`]: legacy directive stripping, markup normalization and
//!   front-matter decoding
//! - [`scan`]: discovery of embedded image references
//! - [`render`]: the pulldown-cmark based [`Renderer`] implementation
//! - [`highlight`]: syntect code block highlighting used by the renderer
//!
//! The tree builder ([`crate::book::tree`]) handles I/O, calling these
//! functions once per document.

pub mod extract;
pub mod highlight;
pub mod render;
pub mod scan;

pub use extract::{
    ChapterMeta, ExtractedDocument, extract_document, normalize_markup, strip_legacy_directives,
};
pub use highlight::{CodeHighlighter, DEFAULT_THEME};
pub use render::{MarkdownRenderer, RenderConfig};
pub use scan::scan_images;

use crate::error::Result;

/// Output of one render call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    /// The rendered XHTML body fragment.
    pub html: String,
    /// Raw text of the YAML front-matter block, if the document had one.
    pub front_matter: Option<String>,
}

/// A Markdown rendering engine.
///
/// Implementations must be deterministic: identical input yields identical
/// output. The front-matter is only reachable through a render result.
pub trait Renderer {
    /// Render a document to markup and collect its front-matter.
    fn render(&self, source: &str) -> Result<Rendered>;
}

impl<R: Renderer + ?Sized> Renderer for &R {
    fn render(&self, source: &str) -> Result<Rendered> {
        (**self).render(source)
    }
}
