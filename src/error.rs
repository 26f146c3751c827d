//! Domain error kinds, per spec §7. Library code returns these; orchestration
//! glue (traversal driver, cache bootstrap) uses `anyhow` to stitch independent
//! fallible steps together, same split as the teacher's `anyhow::Context` usage.

use std::path::PathBuf;

use thiserror::Error;

use crate::file::Where;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("{path}: hash mismatch for {member} (expected {expected}, found {found})")]
    HashMismatch {
        path: PathBuf,
        member: String,
        expected: String,
        found: String,
    },

    #[error("catalog has no entry for {0}")]
    CatalogMissing(String),

    #[error("{archive}: could not find a unique name for {0}", archive = .archive.display())]
    NameCollision { archive: PathBuf, name: String },

    #[error("{archive}: archive is read-only, cannot {op}", archive = .archive.display())]
    ReadOnly { archive: PathBuf, op: String },

    #[error(
        "{archive}/{member}: operation {op} invalid while member is {state:?}",
        archive = .archive.display()
    )]
    State {
        archive: PathBuf,
        member: String,
        state: Where,
        op: String,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
