//! Error types for the Clipfetch core.
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a metadata fetch or a download, as seen by the caller.
#[derive(Debug, Error)]
pub enum ClipError {
    /// The submitted URL was empty. The collaborator is never invoked.
    #[error("Please enter a video URL first!")]
    Validation,

    #[error("Error extracting video info: {0}")]
    Resolution(String),

    #[error("Error downloading video: {0}")]
    Download(String),

    /// The transfer reported success but the output file is not on disk.
    #[error("Download finished but the output file is missing ({})", describe_expected(.expected))]
    IncompleteDownload { expected: Option<PathBuf> },

    #[error("An unexpected error occurred: {0}")]
    Unexpected(#[source] Box<dyn std::error::Error + Send + Sync>),
}

fn describe_expected(expected: &Option<PathBuf>) -> String {
    match expected {
        Some(path) => path.display().to_string(),
        None => "no output path reported".to_string(),
    }
}

impl ClipError {
    /// Map a collaborator error raised while resolving metadata.
    pub fn from_resolution(err: ServiceError) -> Self {
        match err {
            ServiceError::Reported(message) => ClipError::Resolution(message),
            other => ClipError::Unexpected(Box::new(other)),
        }
    }

    /// Map a collaborator error raised during the transfer.
    pub fn from_transfer(err: ServiceError) -> Self {
        match err {
            ServiceError::Reported(message) => ClipError::Download(message),
            other => ClipError::Unexpected(Box::new(other)),
        }
    }

    pub fn unexpected(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ClipError::Unexpected(Box::new(err))
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ClipError::Validation => "validation",
            ClipError::Resolution(_) => "resolution",
            ClipError::Download(_) => "download",
            ClipError::IncompleteDownload { .. } => "incomplete_download",
            ClipError::Unexpected(_) => "unexpected",
        }
    }
}

/// Errors raised by a [`MediaService`](crate::service::MediaService) implementation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The tool ran and reported a failure. Carries its diagnostic text verbatim.
    #[error("{0}")]
    Reported(String),

    #[error("yt-dlp binary not found: {0}")]
    NotFound(String),

    #[error("Failed to spawn yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yt-dlp returned invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ClipResult<T> = Result<T, ClipError>;
