#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Types(#[from] chronicle_types::Error),

    #[error("sqlite error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("cursor invalid: {0}")]
    CursorInvalid(String),

    #[error("schema incompatible, rebuilding database: {0}")]
    SchemaIncompatible(String),

    #[error("full-text search index is unavailable")]
    FTSUnavailable,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
