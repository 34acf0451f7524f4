use std::path::PathBuf;
use thiserror::Error;

/// Every variant means "no usable bytes" and maps to `InvalidSource`.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Filesystem access is unavailable, cannot read {0}")]
    FilesystemUnavailable(PathBuf),

    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File handle could not be read: {0}")]
    Handle(#[source] std::io::Error),
}

pub type SourceResult<T> = Result<T, SourceError>;
