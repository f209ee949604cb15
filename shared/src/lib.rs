//! Clipfetch core: resolve a media URL, download it with yt-dlp, report
//! progress, and present the result.
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod presenter;
pub mod progress;
pub mod protocol;
pub mod service;
pub mod ytdlp;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use errors::{ClipError, ClipResult, ServiceError};
pub use models::{
    validate_url, DownloadRequest, DownloadResult, MediaInfo, ProgressSample, ProgressStatus,
    TransferJob, TransferOutcome,
};
pub use orchestrator::Orchestrator;
pub use presenter::{present, present_info, DisplayModel, InfoView};
pub use progress::{ProgressReport, ProgressReporter, ProgressView};
pub use service::MediaService;
pub use ytdlp::YtDlp;
