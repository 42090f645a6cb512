//! Error types for mdepub operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while building or packaging a book.
///
/// Every variant is fatal for the run: there is no partial book.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Write(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{}: document has no front-matter", path.display())]
    MissingFrontMatter { path: PathBuf },

    #[error("{}: invalid front-matter: {source}", path.display())]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to add image {}: {source}", path.display())]
    Asset {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid section: {0}")]
    InvalidSection(String),

    #[error("Render error: {0}")]
    Render(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Attach a document path to errors raised before the path was known.
    ///
    /// Front-matter errors coming out of the extractor carry an empty path;
    /// the tree builder fills it in. Other errors pass through untouched.
    pub fn with_path(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        match self {
            Error::MissingFrontMatter { path: p } if p.as_os_str().is_empty() => {
                Error::MissingFrontMatter { path }
            }
            Error::FrontMatter { path: p, source } if p.as_os_str().is_empty() => {
                Error::FrontMatter { path, source }
            }
            Error::Write(source) => Error::Io { path, source },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
