use std::path::PathBuf;

/// Errors surfaced by the data model layer and shared across crates that
/// depend on `chronicle-types` for a common vocabulary of failure kinds.
///
/// Variants correspond to the error taxonomy: local-recovery kinds
/// (`InputMalformed`, `EmptyParse`, `LineTooLarge`) are expected to be caught
/// and turned into skip-cache entries by callers rather than propagated raw.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed input at {path}: {reason}")]
    InputMalformed { path: PathBuf, reason: String },

    #[error("file unreadable: {path}: {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no usable sessions in {0}")]
    EmptyParse(PathBuf),

    #[error("line exceeds maximum size at {path} offset {offset}")]
    LineTooLarge { path: PathBuf, offset: u64 },

    #[error("cursor invalid: {0}")]
    CursorInvalid(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
