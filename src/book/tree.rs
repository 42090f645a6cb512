//! Directory to chapter tree conversion.
//!
//! A document `X.md` becomes a [`Chapter`]; a directory `X/` beside it holds
//! that chapter's children. Directories without a matching document are not
//! visited. Siblings are ordered by front-matter `order`, with ties kept in
//! file name order.

use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use tracing::debug;

use super::Chapter;
use crate::error::{Error, Result};
use crate::markdown::{Renderer, extract_document, scan_images};
use crate::util::decode_text;

/// Extension that marks a file as a chapter document.
pub const MARKDOWN_EXTENSION: &str = "md";

/// Build the ordered chapter forest rooted at `dir`.
///
/// Any unreadable file or directory, and any document with missing or
/// malformed front-matter, aborts the whole build.
///
/// # Example
///
/// ```no_run
/// use mdepub::book::tree::build_chapters;
/// use mdepub::markdown::MarkdownRenderer;
///
/// let renderer = MarkdownRenderer::new()?;
/// let chapters = build_chapters(&renderer, "docs/it")?;
/// for chapter in &chapters {
///     println!("{} ({} children)", chapter.title(), chapter.children.len());
/// }
/// # Ok::<(), mdepub::Error>(())
/// ```
pub fn build_chapters<R: Renderer>(renderer: &R, dir: impl AsRef<Path>) -> Result<Vec<Chapter>> {
    let dir = dir.as_ref();

    let mut entries = fs::read_dir(dir)
        .map_err(|e| Error::io(dir, e))?
        .map(|entry| entry.map_err(|e| Error::io(dir, e)))
        .collect::<Result<Vec<_>>>()?;

    // Listing order is platform dependent; ties in `order` must not be.
    entries.sort_by_key(|entry| entry.file_name());

    let mut chapters = Vec::new();
    for entry in entries {
        let path = entry.path();
        if !is_markdown_document(&path) {
            continue;
        }

        let mut chapter = read_chapter(renderer, &path)?;

        let children_dir = dir.join(&chapter.filename);
        if children_dir.is_dir() {
            chapter.children = build_chapters(renderer, &children_dir)?;
        }

        chapters.push(chapter);
    }

    // Stable: equal orders keep file name order.
    chapters.sort_by_key(|chapter| chapter.meta.order);

    Ok(chapters)
}

/// Read and parse one document into a chapter without children.
pub fn read_chapter<R: Renderer>(renderer: &R, path: &Path) -> Result<Chapter> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let text = decode_text(&bytes);

    let document = extract_document(renderer, &text).map_err(|e| e.with_path(path))?;
    let images = scan_images(&document.content);

    let filename = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    debug!(
        path = %path.display(),
        title = %document.meta.title,
        order = document.meta.order,
        images = images.len(),
        "parsed document"
    );

    Ok(Chapter::new(filename, document, images))
}

fn is_markdown_document(path: &Path) -> bool {
    path.extension() == Some(OsStr::new(MARKDOWN_EXTENSION)) && path.is_file()
}
