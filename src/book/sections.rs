//! Section emission.

use std::collections::HashMap;

use super::Chapter;
use crate::epub::Packager;
use crate::error::{Error, Result};

/// Joins ancestor file stems in section file names.
///
/// A stem that itself contains the separator can collide with a nested
/// chapter: `a__b.md` and `a/b.md` both map to `a__b.xhtml`. Such trees are
/// rejected by [`emit_sections`] before the second section is added.
pub const SECTION_SEPARATOR: &str = "__";

/// Extension of emitted section documents.
pub const SECTION_EXTENSION: &str = "xhtml";

/// Base name (no extension) of a section: ancestor stems and the chapter's
/// own stem joined with [`SECTION_SEPARATOR`].
pub fn section_base_name(parent_base: Option<&str>, filename: &str) -> String {
    match parent_base {
        Some(parent) => format!("{parent}{SECTION_SEPARATOR}{filename}"),
        None => filename.to_string(),
    }
}

/// Emit one section per chapter, depth-first.
///
/// Top-level chapters become sections; nested chapters become sub-sections
/// of their parent's section. Returns the number of sections emitted.
/// Two chapters mapping to the same file name are an
/// [`Error::InvalidSection`] naming both; other packaging errors are
/// returned unchanged.
pub fn emit_sections<P: Packager + ?Sized>(
    packager: &mut P,
    chapters: &[Chapter],
    css: Option<&str>,
) -> Result<usize> {
    let mut seen = HashMap::new();
    emit_level(packager, chapters, css, None, &mut seen)
}

/// The section a level of chapters is nested under.
struct Parent<'a> {
    base: &'a str,
    handle: &'a str,
    /// Chapter stems from the root, joined by `/`.
    path: &'a str,
}

/// `seen` maps emitted file names to the chapter path that took them.
fn emit_level<P: Packager + ?Sized>(
    packager: &mut P,
    chapters: &[Chapter],
    css: Option<&str>,
    parent: Option<&Parent<'_>>,
    seen: &mut HashMap<String, String>,
) -> Result<usize> {
    let mut emitted = 0;

    for chapter in chapters {
        let base = section_base_name(parent.map(|p| p.base), &chapter.filename);
        let file_name = format!("{base}.{SECTION_EXTENSION}");
        let chapter_path = match parent {
            Some(p) => format!("{}/{}", p.path, chapter.filename),
            None => chapter.filename.clone(),
        };
        if let Some(existing) = seen.get(&file_name) {
            return Err(Error::InvalidSection(format!(
                "chapters '{existing}' and '{chapter_path}' both map to section '{file_name}'"
            )));
        }

        let handle = match parent {
            Some(p) => packager.add_sub_section(
                p.handle,
                &chapter.html,
                chapter.title(),
                &file_name,
                css,
            )?,
            None => packager.add_section(&chapter.html, chapter.title(), &file_name, css)?,
        };
        emitted += 1;
        seen.insert(file_name, chapter_path.clone());

        if !chapter.children.is_empty() {
            let nested = Parent {
                base: &base,
                handle: &handle,
                path: &chapter_path,
            };
            emitted += emit_level(packager, &chapter.children, css, Some(&nested), seen)?;
        }
    }

    Ok(emitted)
}
