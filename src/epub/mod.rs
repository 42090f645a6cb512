//! EPUB packaging.
//!
//! [`Packager`] is the seam between the book builder and the container
//! format; [`EpubBuilder`] is the EPUB 3 implementation.

pub mod writer;

use std::path::Path;

pub use writer::{BookMetadata, EpubBuilder, EpubConfig};

use crate::error::Result;

/// Receives images and sections from the book builder.
pub trait Packager {
    /// Copy the image at `source` into the container under `name`.
    ///
    /// Returns the internal asset id to use in section markup. Calling this
    /// twice with the same `name` must not overwrite the first image.
    fn add_image(&mut self, source: &Path, name: &str) -> Result<String>;

    /// Add a top-level section. Returns the section handle (its file name).
    fn add_section(
        &mut self,
        body: &str,
        title: &str,
        file_name: &str,
        css: Option<&str>,
    ) -> Result<String>;

    /// Add a section nested under the section whose file name is `parent`.
    fn add_sub_section(
        &mut self,
        parent: &str,
        body: &str,
        title: &str,
        file_name: &str,
        css: Option<&str>,
    ) -> Result<String>;
}
