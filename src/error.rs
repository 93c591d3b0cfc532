use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InstallError>;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pickle decoding error: {0}")]
    Pickle(#[from] serde_pickle::Error),

    #[error("Index decoding error: {0}")]
    IndexDecode(String),

    #[error("JSON decoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("Ambiguous bundle: {0}")]
    AmbiguousBundle(String),

    #[error("Invalid measurement file name: {0}")]
    InvalidFilename(String),

    #[error(
        "{} holds {values} values but the index holds {dates} dates",
        .file.display()
    )]
    LengthMismatch {
        file: PathBuf,
        values: usize,
        dates: usize,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
