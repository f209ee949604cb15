//! Request-scoped data model shared by the fetcher, orchestrator and presenter.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::ClipError;

/// Output name template handed to the collaborator. The title and the
/// negotiated extension are filled in (and sanitized) by yt-dlp itself.
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Format selector: the collaborator's own "best" combined audio+video stream.
pub const BEST_FORMAT: &str = "best";

/// Descriptive metadata for a single media item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uploader: Option<String>,
    /// Length in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Length as formatted by the collaborator, e.g. `"2:00"`.
    #[serde(default)]
    pub duration_string: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub extractor: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// A single download submission.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub target_dir: PathBuf,
    single_item_only: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            target_dir: target_dir.into(),
            single_item_only: true,
        }
    }

    /// Request targeting the current working directory.
    pub fn in_current_dir(url: impl Into<String>) -> Self {
        Self::new(url, ".")
    }

    /// Playlists are never expanded; only the primary item is fetched.
    pub fn single_item_only(&self) -> bool {
        self.single_item_only
    }

    /// Build the job handed to the collaborator. The URL must already be validated.
    pub fn transfer_job(&self, url: &str) -> TransferJob {
        TransferJob {
            url: url.to_string(),
            output_template: self.target_dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned(),
            format: BEST_FORMAT.to_string(),
            single_item_only: self.single_item_only,
        }
    }
}

/// Trim the URL and reject empty input.
pub fn validate_url(url: &str) -> Result<&str, ClipError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ClipError::Validation);
    }
    Ok(url)
}

/// What the collaborator is asked to do for one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub url: String,
    /// Full path template, `<target_dir>/%(title)s.%(ext)s`.
    pub output_template: String,
    pub format: String,
    pub single_item_only: bool,
}

impl TransferJob {
    pub fn target_dir(&self) -> &Path {
        Path::new(&self.output_template)
            .parent()
            .unwrap_or_else(|| Path::new("."))
    }
}

/// What the collaborator reports after a transfer that did not fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Final on-disk path after the name template was expanded.
    pub file_path: Option<PathBuf>,
}

/// Transfer status carried by a progress sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Downloading,
    Finished,
    Error,
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressStatus::Downloading => write!(f, "downloading"),
            ProgressStatus::Finished => write!(f, "finished"),
            ProgressStatus::Error => write!(f, "error"),
        }
    }
}

/// One point-in-time measurement of transfer progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    pub status: ProgressStatus,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    /// Bytes per second.
    pub speed: Option<f64>,
    /// Seconds remaining.
    pub eta: Option<u64>,
}

impl ProgressSample {
    pub fn downloading(downloaded: u64, total: Option<u64>) -> Self {
        Self {
            status: ProgressStatus::Downloading,
            downloaded_bytes: Some(downloaded),
            total_bytes: total,
            speed: None,
            eta: None,
        }
    }

    pub fn finished() -> Self {
        Self {
            status: ProgressStatus::Finished,
            downloaded_bytes: None,
            total_bytes: None,
            speed: None,
            eta: None,
        }
    }

    pub fn error() -> Self {
        Self {
            status: ProgressStatus::Error,
            ..Self::finished()
        }
    }

    pub fn with_rate(mut self, speed: f64, eta: u64) -> Self {
        self.speed = Some(speed);
        self.eta = Some(eta);
        self
    }
}

/// A completed download whose file was verified on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub file_path: PathBuf,
    pub size_bytes: u64,
    pub file_name: String,
}

impl DownloadResult {
    /// Open the file for streaming back to the user.
    pub async fn open(&self) -> std::io::Result<tokio::fs::File> {
        tokio::fs::File::open(&self.file_path).await
    }
}
