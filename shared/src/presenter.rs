//! Display models for media info and terminal download state.
use serde::Serialize;
use std::path::Path;

use crate::errors::ClipError;
use crate::models::{DownloadResult, MediaInfo};

const NOT_AVAILABLE: &str = "N/A";

/// Media details panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoView {
    pub title: String,
    pub uploader: String,
    pub duration: String,
    pub views: String,
    pub thumbnail: Option<String>,
}

pub fn present_info(info: &MediaInfo) -> InfoView {
    let title = info.title.trim();
    InfoView {
        title: if title.is_empty() { NOT_AVAILABLE.to_string() } else { title.to_string() },
        uploader: info
            .uploader
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(NOT_AVAILABLE)
            .to_string(),
        duration: info
            .duration_string
            .clone()
            .or_else(|| info.duration.map(format_duration))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        views: info
            .view_count
            .map(format_thousands)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        thumbnail: info.thumbnail.clone().filter(|t| !t.is_empty()),
    }
}

/// Whether a failure is the user's input or the download itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileView {
    pub file_name: String,
    pub size_bytes: u64,
    /// e.g. `"12.34 MB"`.
    pub size_label: String,
    pub path: String,
    pub content_type: String,
    /// Where the file can be fetched from, if the caller offers one.
    pub retrieval_href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureView {
    pub kind: String,
    pub severity: Severity,
    pub message: String,
}

/// Terminal state of a submission, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DisplayModel {
    Success(FileView),
    Failure(FailureView),
}

impl DisplayModel {
    /// Attach a retrieval link to a success model. Failures are returned unchanged.
    pub fn with_retrieval(self, href: impl Into<String>) -> Self {
        match self {
            DisplayModel::Success(mut file) => {
                file.retrieval_href = Some(href.into());
                DisplayModel::Success(file)
            }
            failure => failure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DisplayModel::Success(_))
    }
}

pub fn present(result: &Result<DownloadResult, ClipError>) -> DisplayModel {
    match result {
        Ok(file) => DisplayModel::Success(present_file(file)),
        Err(err) => DisplayModel::Failure(present_error(err)),
    }
}

pub fn present_file(file: &DownloadResult) -> FileView {
    FileView {
        file_name: file.file_name.clone(),
        size_bytes: file.size_bytes,
        size_label: format_megabytes(file.size_bytes),
        path: file.file_path.display().to_string(),
        content_type: content_type_for(&file.file_name).to_string(),
        retrieval_href: None,
    }
}

/// One human-readable message per error kind. Internal causes are not exposed.
pub fn present_error(err: &ClipError) -> FailureView {
    let (severity, message) = match err {
        ClipError::Validation => (Severity::Warning, err.to_string()),
        ClipError::Resolution(diagnostic) => (
            Severity::Error,
            format!(
                "Failed to fetch video information. Please check the URL and try again. ({})",
                diagnostic
            ),
        ),
        ClipError::Download(diagnostic) => {
            (Severity::Error, format!("Download failed: {}", diagnostic))
        }
        ClipError::IncompleteDownload { .. } => {
            (Severity::Error, "Download failed. Please try again.".to_string())
        }
        ClipError::Unexpected(_) => (
            Severity::Error,
            "An unexpected error occurred. Please try again.".to_string(),
        ),
    };
    FailureView {
        kind: err.kind().to_string(),
        severity,
        message,
    }
}

/// Bytes to megabytes (1024 * 1024) with two decimals.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// `1500` → `"1,500"`.
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Seconds to `HH:MM:SS`.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds.round() as u64 } else { 0 };
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("flv") => "video/x-flv",
        Some("3gp") => "video/3gpp",
        Some("mp3") => "audio/mpeg",
        Some("m4a") | Some("aac") => "audio/mp4",
        Some("opus") | Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}
