//! Metadata fetching and download orchestration over a [`MediaService`].
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::ClipError;
use crate::models::{validate_url, DownloadRequest, DownloadResult, MediaInfo, ProgressSample};
use crate::service::MediaService;

/// Runs the fetch and download stages for one submission at a time.
#[derive(Clone)]
pub struct Orchestrator {
    service: Arc<dyn MediaService>,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn MediaService>) -> Self {
        Self { service }
    }

    pub fn backend_name(&self) -> &'static str {
        self.service.name()
    }

    /// Resolve descriptive metadata without downloading anything.
    pub async fn fetch_metadata(&self, url: &str) -> Result<MediaInfo, ClipError> {
        let url = validate_url(url)?;
        debug!("Fetching metadata via {}: {}", self.service.name(), url);

        let info = self
            .service
            .resolve_metadata(url)
            .await
            .map_err(ClipError::from_resolution)?;

        if info.title.trim().is_empty() {
            return Err(ClipError::Resolution(format!(
                "no title reported for {}",
                url
            )));
        }

        info!("Metadata resolved: title={:?} uploader={:?}", info.title, info.uploader);
        Ok(info)
    }

    /// Download the single primary item behind `request.url` into `request.target_dir`.
    ///
    /// `on_progress` is called synchronously for every tick of the transfer.
    /// Existing files with the same derived name are overwritten.
    pub async fn download<F>(
        &self,
        request: &DownloadRequest,
        mut on_progress: F,
    ) -> Result<DownloadResult, ClipError>
    where
        F: FnMut(ProgressSample) + Send,
    {
        let url = validate_url(&request.url)?;

        tokio::fs::create_dir_all(&request.target_dir)
            .await
            .map_err(ClipError::unexpected)?;

        let job = request.transfer_job(url);
        info!("Downloading {} into {}", url, request.target_dir.display());

        let outcome = self
            .service
            .transfer(&job, &mut on_progress)
            .await
            .map_err(ClipError::from_transfer)?;

        let Some(reported) = outcome.file_path else {
            warn!("Transfer of {} finished without reporting a file path", url);
            return Err(ClipError::IncompleteDownload { expected: None });
        };

        verify_output(&reported).await
    }
}

/// Stat the reported file and build the result from what is actually on disk.
async fn verify_output(reported: &Path) -> Result<DownloadResult, ClipError> {
    let incomplete = || ClipError::IncompleteDownload {
        expected: Some(reported.to_path_buf()),
    };

    let metadata = match tokio::fs::metadata(reported).await {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Err(incomplete()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Reported output {} does not exist", reported.display());
            return Err(incomplete());
        }
        Err(e) => return Err(ClipError::unexpected(e)),
    };

    let file_path = std::path::absolute(reported).map_err(ClipError::unexpected)?;
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(incomplete)?;

    info!("Download complete: {} ({} bytes)", file_path.display(), metadata.len());
    Ok(DownloadResult {
        file_path,
        size_bytes: metadata.len(),
        file_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProgressStatus;
    use crate::progress::ProgressReporter;
    use crate::testing::{FakeOutcome, FakeService};

    fn demo_info() -> MediaInfo {
        MediaInfo {
            title: "Demo Clip".into(),
            duration: Some(120.0),
            duration_string: Some("00:02:00".into()),
            view_count: Some(1500),
            ..Default::default()
        }
    }

    fn demo_service() -> Arc<FakeService> {
        Arc::new(
            FakeService::new(Ok(demo_info()))
                .with_samples(vec![
                    ProgressSample::downloading(0, Some(1_000_000)),
                    ProgressSample::downloading(500_000, Some(1_000_000)),
                    ProgressSample::finished(),
                ])
                .with_outcome(FakeOutcome::File { ext: "mp4".into(), size: 1_000_000 }),
        )
    }

    #[tokio::test]
    async fn test_demo_clip_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let service = demo_service();
        let orchestrator = Orchestrator::new(service.clone());

        let info = orchestrator.fetch_metadata("https://example.com/demo").await.unwrap();
        assert_eq!(info.title, "Demo Clip");
        assert_eq!(info.duration_string.as_deref(), Some("00:02:00"));
        assert_eq!(info.view_count, Some(1500));

        let reporter = ProgressReporter::new();
        let mut fractions = Vec::new();
        let request = DownloadRequest::new("https://example.com/demo", dir.path());
        let result = orchestrator
            .download(&request, |sample| {
                reporter.update(&sample);
                fractions.push(reporter.current_fraction());
            })
            .await
            .unwrap();

        assert_eq!(fractions, vec![0.0, 0.5, 1.0]);
        assert_eq!(result.file_name, "Demo Clip.mp4");
        assert_eq!(result.size_bytes, 1_000_000);
        assert!(result.file_path.is_absolute());
        assert_eq!(reporter.snapshot().status, Some(ProgressStatus::Finished));
    }

    #[tokio::test]
    async fn test_missing_target_dir_is_created_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("downloads");
        let orchestrator = Orchestrator::new(demo_service());
        let request = DownloadRequest::new("https://example.com/demo", &target);

        orchestrator.download(&request, |_| {}).await.unwrap();
        assert!(target.is_dir());

        // Second run overwrites the same derived file name
        let again = orchestrator.download(&request, |_| {}).await.unwrap();
        assert_eq!(again.file_name, "Demo Clip.mp4");
    }

    #[tokio::test]
    async fn test_empty_url_never_reaches_service() {
        let dir = tempfile::tempdir().unwrap();
        let service = demo_service();
        let orchestrator = Orchestrator::new(service.clone());

        let err = orchestrator.fetch_metadata("  ").await.unwrap_err();
        assert!(matches!(err, ClipError::Validation));

        let request = DownloadRequest::new("", dir.path().join("never"));
        let err = orchestrator.download(&request, |_| {}).await.unwrap_err();
        assert!(matches!(err, ClipError::Validation));

        assert_eq!(service.metadata_calls(), 0);
        assert_eq!(service.transfer_calls(), 0);
        assert!(!dir.path().join("never").exists());
    }

    #[tokio::test]
    async fn test_resolution_fault_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let diagnostic = "ERROR: [generic] 'not-a-url' is not a valid URL";
        let service = Arc::new(FakeService::new(Err(diagnostic.to_string())));
        let orchestrator = Orchestrator::new(service);

        let err = orchestrator.fetch_metadata("not-a-url").await.unwrap_err();
        match err {
            ClipError::Resolution(message) => assert_eq!(message, diagnostic),
            other => panic!("Expected Resolution, got {:?}", other),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_title_is_resolution_error() {
        let service = Arc::new(FakeService::new(Ok(MediaInfo::default())));
        let err = Orchestrator::new(service)
            .fetch_metadata("https://example.com/x")
            .await
            .unwrap_err();
        assert!(matches!(err, ClipError::Resolution(_)));
    }

    #[tokio::test]
    async fn test_reported_but_missing_file_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(
            FakeService::new(Ok(demo_info())).with_outcome(FakeOutcome::ReportOnly { ext: "mp4".into() }),
        );
        let request = DownloadRequest::new("https://example.com/demo", dir.path());
        let err = Orchestrator::new(service).download(&request, |_| {}).await.unwrap_err();
        match err {
            ClipError::IncompleteDownload { expected: Some(path) } => {
                assert!(path.ends_with("Demo Clip.mp4"));
            }
            other => panic!("Expected IncompleteDownload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_reported_path_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeService::new(Ok(demo_info())).with_outcome(FakeOutcome::NoPath));
        let request = DownloadRequest::new("https://example.com/demo", dir.path());
        let err = Orchestrator::new(service).download(&request, |_| {}).await.unwrap_err();
        assert!(matches!(err, ClipError::IncompleteDownload { expected: None }));
    }

    #[tokio::test]
    async fn test_transfer_failure_passes_message_through() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(
            FakeService::new(Ok(demo_info()))
                .with_outcome(FakeOutcome::Fail("ERROR: The uploader has not made this video available in your country".into())),
        );
        let request = DownloadRequest::new("https://example.com/demo", dir.path());
        let err = Orchestrator::new(service).download(&request, |_| {}).await.unwrap_err();
        match err {
            ClipError::Download(message) => assert!(message.contains("not made this video available")),
            other => panic!("Expected Download, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_faults_are_unexpected() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeService::new(Ok(demo_info())).with_outcome(FakeOutcome::Crash));
        let request = DownloadRequest::new("https://example.com/demo", dir.path());
        let err = Orchestrator::new(service).download(&request, |_| {}).await.unwrap_err();
        assert_eq!(err.kind(), "unexpected");
    }
}
