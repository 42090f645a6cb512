//! # mdepub
//!
//! Build an EPUB book from a directory tree of Markdown documents.
//!
//! ## Source layout
//!
//! Every `*.md` file is a chapter. Its YAML front-matter gives the chapter
//! title and its position among siblings:
//!
//! ```text
//! ---
//! title: Version control
//! nav_order: 3
//! ---
//! ```
//!
//! A directory named after a document's stem holds that chapter's
//! sub-chapters, to any depth:
//!
//! ```text
//! docs/
//! ├── intro.md
//! ├── tools.md
//! └── tools/
//!     ├── git.md
//!     └── editors.md
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use mdepub::book::{AssetResolver, compile_book};
//! use mdepub::epub::{BookMetadata, EpubBuilder};
//! use mdepub::markdown::MarkdownRenderer;
//!
//! let renderer = MarkdownRenderer::new()?;
//! let mut epub = EpubBuilder::new(BookMetadata::new("My Book").with_language("en"));
//! let resolver = AssetResolver::new("site");
//!
//! compile_book(&renderer, &mut epub, "docs", &resolver, None)?;
//! epub.write("my-book.epub")?;
//! # Ok::<(), mdepub::Error>(())
//! ```
//!
//! ## Pipeline
//!
//! 1. [`book::build_chapters`] reads the tree into ordered [`Chapter`]s.
//! 2. [`book::register_images`] copies each referenced image into the book
//!    once and rewrites the chapters' markup to point at it.
//! 3. [`book::emit_sections`] adds one section per chapter, nesting
//!    sub-chapters under their parent.
//!
//! Every step is all-or-nothing: the first error aborts the build.

pub mod book;
pub mod epub;
pub mod error;
pub mod markdown;
pub(crate) mod util;

pub use book::{BuildSummary, Chapter, compile_book};
pub use epub::{BookMetadata, EpubBuilder, EpubConfig, Packager};
pub use error::{Error, Result};
pub use markdown::{ChapterMeta, MarkdownRenderer, RenderConfig, Renderer};
