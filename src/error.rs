use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while uploading a file or a directory tree
#[derive(Debug, Error)]
pub enum Error {
    /// Reading the source data failed
    #[error("failed to read source data: {0}")]
    Io(#[from] std::io::Error),

    /// A call against the remote store failed
    #[error("{operation} failed for {bucket}/{key}: {message}")]
    Remote {
        operation: &'static str,
        bucket: String,
        key: String,
        message: String,
    },

    /// The destination bucket cannot be reached before any upload starts
    #[error("bucket {bucket} is not accessible: {message}")]
    BucketUnavailable { bucket: String, message: String },

    /// The remote store answered without a value the protocol needs
    #[error("{operation} response is missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    /// The object needs more parts than one session may hold
    #[error("{key} needs more than {limit} parts; raise the part size")]
    TooManyParts { key: String, limit: usize },

    /// A part upload task panicked or was cancelled
    #[error("part upload task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot derive an object key from {0}")]
    InvalidPath(PathBuf),
}

impl Error {
    pub(crate) fn remote(
        operation: &'static str,
        bucket: &str,
        key: &str,
        message: impl Into<String>,
    ) -> Self {
        Error::Remote {
            operation,
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
