//! The chapter tree and the passes that run over it.
//!
//! - [`tree`]: builds the ordered [`Chapter`] forest from a directory
//! - [`images`]: registers every referenced image once and rewrites markup
//! - [`sections`]: emits one packaged section per chapter, depth-first

pub mod images;
pub mod sections;
pub mod tree;

use std::path::Path;

use serde::Serialize;

use crate::epub::Packager;
use crate::error::Result;
use crate::markdown::{ChapterMeta, ExtractedDocument, Renderer};

pub use images::{AssetResolver, ImageRegistry, register_images};
pub use sections::emit_sections;
pub use tree::build_chapters;

/// One Markdown document plus the documents nested under it.
#[derive(Debug, Clone, Serialize)]
pub struct Chapter {
    /// File stem of the source document.
    pub filename: String,
    pub meta: ChapterMeta,
    /// Source text after legacy directive stripping.
    #[serde(skip)]
    pub content: String,
    /// Rendered markup. Image references are rewritten in place by
    /// [`images::register_images`].
    #[serde(skip)]
    pub html: String,
    /// Raw image targets in occurrence order, duplicates kept.
    pub images: Vec<String>,
    pub children: Vec<Chapter>,
}

impl Chapter {
    /// Build a leaf chapter from an extracted document.
    pub fn new(filename: impl Into<String>, document: ExtractedDocument, images: Vec<String>) -> Self {
        Self {
            filename: filename.into(),
            meta: document.meta,
            content: document.content,
            html: document.html,
            images,
            children: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.meta.title
    }

    /// Number of chapters in this subtree, including `self`.
    pub fn chapter_count(&self) -> usize {
        1 + count_chapters(&self.children)
    }
}

/// Total number of chapters in a forest.
pub fn count_chapters(chapters: &[Chapter]) -> usize {
    chapters.iter().map(Chapter::chapter_count).sum()
}

/// Counts reported by [`compile_book`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub chapters: usize,
    pub images: usize,
    pub sections: usize,
}

/// Run the whole pipeline: build the tree, register images, emit sections.
///
/// The tree is fully built before anything reaches `packager`, so a bad
/// document anywhere leaves the packager untouched.
pub fn compile_book<R: Renderer, P: Packager + ?Sized>(
    renderer: &R,
    packager: &mut P,
    source: impl AsRef<Path>,
    resolver: &AssetResolver,
    css: Option<&str>,
) -> Result<(Vec<Chapter>, BuildSummary)> {
    let mut chapters = build_chapters(renderer, source)?;
    let registry = register_images(packager, &mut chapters, resolver)?;
    let sections = emit_sections(packager, &chapters, css)?;

    let summary = BuildSummary {
        chapters: count_chapters(&chapters),
        images: registry.len(),
        sections,
    };
    Ok((chapters, summary))
}
