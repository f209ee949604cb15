//! In-memory registry of download jobs.
//!
//! One job per submission: fetch metadata, then download, sequentially on a
//! spawned task. Nothing is persisted; finished jobs are purged after a
//! retention window while the downloaded files stay on disk.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use clipfetch_shared::{
    present, present_info, ClipError, DisplayModel, DownloadRequest, DownloadResult, InfoView,
    MediaInfo, Orchestrator, ProgressReport, ProgressReporter,
};

/// Lifecycle of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Idle,
    FetchingMetadata,
    Downloading,
    Done,
    Error,
}

impl JobStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Done | JobStage::Error)
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStage::Idle => write!(f, "idle"),
            JobStage::FetchingMetadata => write!(f, "fetching_metadata"),
            JobStage::Downloading => write!(f, "downloading"),
            JobStage::Done => write!(f, "done"),
            JobStage::Error => write!(f, "error"),
        }
    }
}

#[derive(Default)]
struct JobState {
    media: Option<MediaInfo>,
    file: Option<DownloadResult>,
    display: Option<DisplayModel>,
    finished_at: Option<DateTime<Utc>>,
}

/// JSON view of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub url: String,
    pub stage: JobStage,
    pub media: Option<MediaInfo>,
    pub info: Option<InfoView>,
    pub progress: ProgressReport,
    pub result: Option<DisplayModel>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub struct Job {
    pub id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    /// Owned by this job only; never shared across submissions.
    pub reporter: ProgressReporter,
    stage: watch::Sender<JobStage>,
    state: Mutex<JobState>,
}

impl Job {
    pub fn new(url: impl Into<String>) -> Self {
        let (stage, _rx) = watch::channel(JobStage::Idle);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            created_at: Utc::now(),
            reporter: ProgressReporter::new(),
            stage,
            state: Mutex::new(JobState::default()),
        }
    }

    pub fn stage(&self) -> JobStage {
        *self.stage.borrow()
    }

    pub fn subscribe_stage(&self) -> watch::Receiver<JobStage> {
        self.stage.subscribe()
    }

    pub fn retrieval_href(&self) -> String {
        format!("/api/jobs/{}/file", self.id)
    }

    /// The verified download, once the job is done.
    pub async fn file(&self) -> Option<DownloadResult> {
        self.state.lock().await.file.clone()
    }

    pub async fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.finished_at
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        let state = self.state.lock().await;
        JobSnapshot {
            id: self.id.clone(),
            url: self.url.clone(),
            stage: self.stage(),
            info: state.media.as_ref().map(present_info),
            media: state.media.clone(),
            progress: self.reporter.report(),
            result: state.display.clone(),
            created_at: self.created_at,
            finished_at: state.finished_at,
        }
    }

    fn set_stage(&self, stage: JobStage) {
        debug!("Job {} -> {}", self.id, stage);
        self.stage.send_replace(stage);
    }

    /// Fetch metadata, then download into `target_dir`.
    pub async fn run(self: Arc<Self>, orchestrator: Orchestrator, target_dir: PathBuf) {
        let short_id: String = self.id.chars().take(8).collect();
        info!("Job {} started: {}", short_id, self.url);

        self.set_stage(JobStage::FetchingMetadata);
        let media = match orchestrator.fetch_metadata(&self.url).await {
            Ok(media) => media,
            Err(err) => {
                self.finish(&short_id, Err(err)).await;
                return;
            }
        };
        self.state.lock().await.media = Some(media);

        self.set_stage(JobStage::Downloading);
        let request = DownloadRequest::new(self.url.clone(), target_dir);
        let reporter = &self.reporter;
        let result = orchestrator
            .download(&request, |sample| reporter.update(&sample))
            .await;

        self.finish(&short_id, result).await;
    }

    async fn finish(&self, short_id: &str, result: Result<DownloadResult, ClipError>) {
        match &result {
            Ok(file) => info!(
                "Job {} done: {} ({} bytes)",
                short_id,
                file.file_path.display(),
                file.size_bytes
            ),
            Err(err @ ClipError::Unexpected(_)) => {
                error!("Job {} failed unexpectedly: {:?}", short_id, err)
            }
            Err(err) => warn!("Job {} failed: {}", short_id, err),
        }

        let display = present(&result).with_retrieval(self.retrieval_href());
        let stage = if display.is_success() { JobStage::Done } else { JobStage::Error };
        {
            let mut state = self.state.lock().await;
            state.file = result.ok();
            state.display = Some(display);
            state.finished_at = Some(Utc::now());
        }
        self.set_stage(stage);
    }
}

/// Tracks jobs by id.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, Arc<Job>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Arc<Job>) {
        self.jobs.lock().await.insert(job.id.clone(), job);
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Job>> {
        self.jobs.lock().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Drop finished jobs older than `max_age`. Returns how many were removed.
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let jobs: Vec<Arc<Job>> = self.jobs.lock().await.values().cloned().collect();

        let mut expired = Vec::new();
        for job in jobs {
            if let Some(finished_at) = job.finished_at().await {
                if finished_at <= cutoff {
                    expired.push(job.id.clone());
                }
            }
        }

        let mut map = self.jobs.lock().await;
        for id in &expired {
            map.remove(id);
        }
        expired.len()
    }
}
