//! Image registration and reference rewriting.
//!
//! Chapters reference images by the path used on the published web site
//! (e.g. `/book/img/diagram.png`). This pass copies each distinct image into
//! the container exactly once and replaces the references in every chapter's
//! markup with the container-internal id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pulldown_cmark_escape::escape_href;
use regex::Regex;
use tracing::debug;

use super::Chapter;
use crate::epub::Packager;
use crate::error::{Error, Result};

/// URL prefix under which the published site serves its files.
pub const DEFAULT_ASSET_PREFIX: &str = "/book";

/// Maps raw image references to files on disk.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    prefix: String,
    root: PathBuf,
}

impl AssetResolver {
    /// Resolve references against `root`, stripping [`DEFAULT_ASSET_PREFIX`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            prefix: DEFAULT_ASSET_PREFIX.to_string(),
            root: root.into(),
        }
    }

    /// Use a different URL prefix. An empty prefix disables stripping.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for a raw reference.
    ///
    /// `<prefix>/img/a.png` becomes `<root>/img/a.png`; any other reference
    /// is joined onto `root` with its leading separators removed.
    pub fn resolve(&self, reference: &str) -> PathBuf {
        let relative = match reference.strip_prefix(self.prefix.as_str()) {
            Some(rest) if !self.prefix.is_empty() && (rest.is_empty() || rest.starts_with('/')) => {
                rest
            }
            _ => reference,
        };
        self.root.join(relative.trim_start_matches('/'))
    }
}

/// Flat container name for a raw reference: `/book/img/a.png` becomes
/// `book_img_a.png`.
pub fn asset_name(reference: &str) -> String {
    reference.trim_start_matches('/').replace('/', "_")
}

/// Raw reference to internal asset id, filled while the pass runs.
#[derive(Debug, Default)]
pub struct ImageRegistry {
    ids: HashMap<String, String>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Internal id of an already registered reference.
    pub fn get(&self, reference: &str) -> Option<&str> {
        self.ids.get(reference).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Return the id for `reference`, registering the image on first use.
    pub fn register<P: Packager + ?Sized>(
        &mut self,
        packager: &mut P,
        resolver: &AssetResolver,
        reference: &str,
    ) -> Result<String> {
        if let Some(id) = self.ids.get(reference) {
            return Ok(id.clone());
        }

        let path = resolver.resolve(reference);
        let id = packager
            .add_image(&path, &asset_name(reference))
            .map_err(|source| Error::Asset {
                path: path.clone(),
                source: Box::new(source),
            })?;

        debug!(reference, %id, path = %path.display(), "registered image");
        self.ids.insert(reference.to_string(), id.clone());
        Ok(id)
    }

    /// Register the images of a whole forest and rewrite each chapter's markup.
    fn register_tree<P: Packager + ?Sized>(
        &mut self,
        packager: &mut P,
        chapters: &mut [Chapter],
        resolver: &AssetResolver,
    ) -> Result<()> {
        for chapter in chapters.iter_mut() {
            let mut replacements: Vec<(&str, String)> = Vec::new();
            for reference in &chapter.images {
                if replacements.iter().any(|(r, _)| *r == reference.as_str()) {
                    continue;
                }
                let id = self.register(packager, resolver, reference)?;
                replacements.push((reference.as_str(), id));
            }

            if !replacements.is_empty() {
                chapter.html = rewrite_references(&chapter.html, &replacements)?;
            }

            self.register_tree(packager, &mut chapter.children, resolver)?;
        }
        Ok(())
    }
}

/// Register every image referenced in `chapters` and rewrite their markup.
///
/// Walks the forest depth-first in sibling order. Each distinct reference is
/// passed to [`Packager::add_image`] once; all chapters referencing it get
/// the same id. A missing image aborts the pass.
pub fn register_images<P: Packager + ?Sized>(
    packager: &mut P,
    chapters: &mut [Chapter],
    resolver: &AssetResolver,
) -> Result<ImageRegistry> {
    let mut registry = ImageRegistry::new();
    registry.register_tree(packager, chapters, resolver)?;
    Ok(registry)
}

/// Replace every occurrence of each reference with its id in a single pass.
///
/// Each reference is matched both verbatim (raw HTML in the source) and in
/// the percent-encoded form the renderer writes into `src` attributes. A
/// single pass keeps a replacement from being rewritten again when one
/// reference is a substring of another reference or of an id.
fn rewrite_references(html: &str, replacements: &[(&str, String)]) -> Result<String> {
    let mut forms: Vec<(String, &str)> = Vec::new();
    for (reference, id) in replacements {
        if reference.is_empty() {
            continue;
        }
        forms.push((reference.to_string(), id.as_str()));

        let mut href = String::new();
        escape_href(&mut href, reference).map_err(|e| Error::Render(e.to_string()))?;
        if href != *reference {
            forms.push((href, id.as_str()));
        }
    }
    if forms.is_empty() {
        return Ok(html.to_string());
    }
    // Longest first so alternation prefers the most specific reference.
    forms.sort_by_key(|(form, _)| std::cmp::Reverse(form.len()));

    let pattern = forms
        .iter()
        .map(|(form, _)| regex::escape(form))
        .collect::<Vec<_>>()
        .join("|");
    let re = Regex::new(&pattern)
        .map_err(|e| Error::Render(format!("cannot match image references: {e}")))?;

    let rewritten = re.replace_all(html, |caps: &regex::Captures<'_>| {
        let found = &caps[0];
        forms
            .iter()
            .find(|(form, _)| form == found)
            .map_or_else(|| found.to_string(), |(_, id)| id.to_string())
    });
    Ok(rewritten.into_owned())
}
