//src/error.rs

use thiserror::Error;

/// Errors surfaced by the index build/load and the profiling phases.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic bytes: not a gene index file")]
    InvalidMagic,

    #[error("File truncated: {0}")]
    Truncated(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Worker panicked during {0}")]
    WorkerPanicked(&'static str),

    #[error("Phase cancelled after a peer worker failed")]
    Cancelled,

    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

pub type Result<T> = std::result::Result<T, ProfileError>;

impl ProfileError {
    /// Maps an unexpected EOF onto `Truncated`, leaving other IO errors alone.
    pub(crate) fn from_read(err: std::io::Error, what: &str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ProfileError::Truncated(format!("unexpected end of data while reading {what}"))
        } else {
            ProfileError::Io(err)
        }
    }
}
