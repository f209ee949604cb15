//! Scriptable in-memory [`MediaService`] for tests.
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::ServiceError;
use crate::models::{MediaInfo, ProgressSample, TransferJob, TransferOutcome};
use crate::service::{MediaService, ProgressSink};

/// How a scripted transfer ends.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    /// Write `size` bytes to the expanded output template.
    File { ext: String, size: usize },
    /// Report the expanded path without writing anything.
    ReportOnly { ext: String },
    /// Finish cleanly without reporting a path.
    NoPath,
    /// Fail with a tool diagnostic.
    Fail(String),
    /// Fail with a fault that is not a tool diagnostic.
    Crash,
}

pub struct FakeService {
    info: Result<MediaInfo, String>,
    samples: Vec<ProgressSample>,
    outcome: FakeOutcome,
    metadata_calls: AtomicUsize,
    transfer_calls: AtomicUsize,
}

impl FakeService {
    /// `Err` is returned from metadata resolution as a reported diagnostic.
    pub fn new(info: Result<MediaInfo, String>) -> Self {
        Self {
            info,
            samples: Vec::new(),
            outcome: FakeOutcome::File { ext: "mp4".into(), size: 1024 },
            metadata_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_samples(mut self, samples: Vec<ProgressSample>) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_outcome(mut self, outcome: FakeOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    fn expand(&self, job: &TransferJob, ext: &str) -> PathBuf {
        let title = match &self.info {
            Ok(info) => info.title.as_str(),
            Err(_) => "video",
        };
        PathBuf::from(
            job.output_template
                .replace("%(title)s", title)
                .replace("%(ext)s", ext),
        )
    }
}

#[async_trait]
impl MediaService for FakeService {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn resolve_metadata(&self, _url: &str) -> Result<MediaInfo, ServiceError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.info.clone().map_err(ServiceError::Reported)
    }

    async fn transfer(
        &self,
        job: &TransferJob,
        sink: &mut ProgressSink<'_>,
    ) -> Result<TransferOutcome, ServiceError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        for sample in &self.samples {
            sink(sample.clone());
            tokio::task::yield_now().await;
        }

        match &self.outcome {
            FakeOutcome::File { ext, size } => {
                let path = self.expand(job, ext);
                tokio::fs::write(&path, vec![0u8; *size]).await?;
                Ok(TransferOutcome { file_path: Some(path) })
            }
            FakeOutcome::ReportOnly { ext } => Ok(TransferOutcome {
                file_path: Some(self.expand(job, ext)),
            }),
            FakeOutcome::NoPath => Ok(TransferOutcome::default()),
            FakeOutcome::Fail(message) => Err(ServiceError::Reported(message.clone())),
            FakeOutcome::Crash => Err(ServiceError::Io(std::io::Error::other("fake backend crashed"))),
        }
    }
}
