//! Centralized error types for htmedit.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the htmedit library.
///
/// `Asset`, `ManifestWrite` and save-time `Structure` errors are non-fatal:
/// the pipeline records them in [`SaveReport::warnings`](crate::pipeline::SaveReport)
/// instead of aborting the save.
#[derive(Error, Debug)]
pub enum EditError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The document has no usable body region, or the body could not be
    /// merged back into the original text.
    #[error("Document structure error: {0}")]
    Structure(String),

    /// The editing surface returned nothing that looks like HTML.
    #[error("Nothing to save: {0}")]
    NoContent(String),

    /// A single image could not be decoded, copied or persisted.
    #[error("Image '{reference}' could not be saved: {reason}")]
    Asset { reference: String, reason: String },

    /// `filelist.xml` could not be written.
    #[error("Failed to write manifest '{path}': {source}")]
    ManifestWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Save was requested before any document was loaded.
    #[error("No document is loaded")]
    NotLoaded,

    /// Another load or save is still in flight.
    #[error("Cannot {0} while a save is in progress")]
    Busy(&'static str),

    /// An invalid path was provided.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Convenience alias for `Result<T, EditError>`.
pub type Result<T> = std::result::Result<T, EditError>;

impl EditError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an `Asset` variant for a reference that failed to resolve.
    pub fn asset(reference: &str, reason: impl std::fmt::Display) -> Self {
        Self::Asset {
            reference: shorten_reference(reference),
            reason: reason.to_string(),
        }
    }
}

/// Data URLs can be megabytes long; keep error messages readable.
fn shorten_reference(reference: &str) -> String {
    const MAX: usize = 80;
    if reference.len() <= MAX {
        return reference.to_string();
    }
    let mut end = MAX;
    while !reference.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &reference[..end])
}

/// Allow `?` on `std::io::Error` inside functions returning `EditError`
/// when no path context is available (rare, prefer `EditError::io`).
impl From<std::io::Error> for EditError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
