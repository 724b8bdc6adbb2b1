use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StrataError>;

#[derive(Debug, Error)]
pub enum StrataError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store file not found: '{0}'")]
    FileNotFound(PathBuf),

    #[error("invalid store format: {0}")]
    InvalidFormat(String),

    #[error("dedup index corruption: {0}")]
    IndexCorrupt(String),

    #[error("version {requested} not found (store holds {available} versions)")]
    VersionNotFound { requested: u64, available: u64 },

    #[error("restore consistency violation: {0}")]
    RestoreInconsistent(String),

    #[error(
        "arrangement accounting mismatch for volume {volume}: expected {expected} bytes, wrote {actual}"
    )]
    ArrangementMismatch {
        volume: u64,
        expected: u64,
        actual: u64,
    },

    #[error("short read in '{path}': wanted {wanted} bytes, got {got}")]
    ShortRead {
        path: PathBuf,
        wanted: u64,
        got: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl StrataError {
    /// True for the "expected absence" class of errors, as opposed to
    /// corruption or hard I/O failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StrataError::FileNotFound(_))
    }
}
