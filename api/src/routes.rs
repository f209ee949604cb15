//! HTTP routes for the single-page downloader.
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use clipfetch_shared::presenter::{content_type_for, present_error, FailureView};
use clipfetch_shared::{present_info, validate_url, ClipError, ProgressReport, ProgressView};

use crate::jobs::{Job, JobStage};
use crate::AppState;

const INDEX_HTML: &str = include_str!("../static/index.html");

// ====== REQUEST / RESPONSE TYPES ======

#[derive(Deserialize)]
pub struct UrlBody {
    #[serde(default)]
    pub url: String,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

impl ErrorBody {
    fn not_found(what: &str) -> (StatusCode, Json<ErrorBody>) {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("{} not found", what),
                kind: "not_found".to_string(),
            }),
        )
    }
}

impl From<FailureView> for ErrorBody {
    fn from(view: FailureView) -> Self {
        Self {
            error: view.message,
            kind: view.kind,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Unwrap a JSON body, turning axum's plain-text rejection into an `ErrorBody`.
fn url_body(body: Result<Json<UrlBody>, JsonRejection>) -> Result<UrlBody, ApiError> {
    body.map(|Json(body)| body).map_err(|rejection| {
        (
            rejection.status(),
            Json(ErrorBody {
                error: rejection.body_text(),
                kind: "validation".to_string(),
            }),
        )
    })
}

fn clip_error_response(err: &ClipError) -> ApiError {
    let status = match err {
        ClipError::Validation => StatusCode::BAD_REQUEST,
        ClipError::Resolution(_) | ClipError::Download(_) => StatusCode::BAD_GATEWAY,
        ClipError::IncompleteDownload { .. } | ClipError::Unexpected(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(present_error(err).into()))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/metadata", post(fetch_metadata))
        .route("/api/jobs", post(submit_job))
        .route("/api/jobs/:id", get(get_job))
        .route("/api/jobs/:id/events", get(job_events))
        .route("/api/jobs/:id/file", get(job_file))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// GET /
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.orchestrator.backend_name(),
        "jobs": state.jobs.len().await,
    }))
}

// ====== METADATA ======

/// POST /api/metadata - Resolve info without downloading
pub async fn fetch_metadata(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UrlBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = url_body(body)?;
    let media = state.orchestrator.fetch_metadata(&body.url).await.map_err(|err| {
        warn!("Metadata fetch failed for {:?}: {}", body.url, err);
        clip_error_response(&err)
    })?;

    let info = present_info(&media);
    Ok(Json(serde_json::json!({ "media": media, "info": info })))
}

// ====== JOBS ======

/// POST /api/jobs - Start fetch + download for one URL
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UrlBody>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let body = url_body(body)?;
    let url = validate_url(&body.url).map_err(|err| clip_error_response(&err))?;

    let job = Arc::new(Job::new(url));
    state.jobs.insert(job.clone()).await;
    info!("Job queued: id={} url={}", job.id, job.url);

    tokio::spawn(
        job.clone()
            .run(state.orchestrator.clone(), state.download_dir.clone()),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "job_id": job.id,
            "stage": job.stage(),
            "events": format!("/api/jobs/{}/events", job.id),
        })),
    ))
}

/// GET /api/jobs/:id
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .jobs
        .get(&job_id)
        .await
        .ok_or_else(|| ErrorBody::not_found("Job"))?;
    Ok(Json(job.snapshot().await))
}

/// Turns job state changes into SSE events until the job reaches a terminal stage.
struct EventFeed {
    job: Arc<Job>,
    progress: watch::Receiver<ProgressView>,
    stage: watch::Receiver<JobStage>,
    sent_snapshot: bool,
    finished: bool,
}

impl EventFeed {
    fn new(job: Arc<Job>) -> Self {
        Self {
            progress: job.reporter.subscribe(),
            stage: job.subscribe_stage(),
            job,
            sent_snapshot: false,
            finished: false,
        }
    }

    async fn next_event(&mut self) -> Option<SseEvent> {
        if self.finished {
            return None;
        }
        if !self.sent_snapshot {
            self.sent_snapshot = true;
            self.stage.borrow_and_update();
            self.progress.borrow_and_update();
            return Some(json_event("snapshot", &self.job.snapshot().await));
        }

        loop {
            let stage = *self.stage.borrow_and_update();
            if stage.is_terminal() {
                self.finished = true;
                let name = if stage == JobStage::Done { "done" } else { "failed" };
                return Some(json_event(name, &self.job.snapshot().await));
            }

            tokio::select! {
                changed = self.progress.changed() => {
                    if changed.is_err() {
                        self.finished = true;
                        return None;
                    }
                    let report = ProgressReport::from(self.progress.borrow_and_update().clone());
                    return Some(json_event("progress", &report));
                }
                changed = self.stage.changed() => {
                    if changed.is_err() {
                        self.finished = true;
                        return None;
                    }
                    let stage = *self.stage.borrow();
                    if !stage.is_terminal() {
                        self.stage.borrow_and_update();
                        return Some(json_event("stage", &serde_json::json!({ "stage": stage })));
                    }
                }
            }
        }
    }
}

fn json_event<T: Serialize>(name: &str, value: &T) -> SseEvent {
    match SseEvent::default().event(name).json_data(value) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to serialize {} event: {}", name, e);
            SseEvent::default()
                .event("failed")
                .data(r#"{"error":"serialization failed"}"#)
        }
    }
}

/// GET /api/jobs/:id/events - Server-sent progress events
pub async fn job_events(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let job = state
        .jobs
        .get(&job_id)
        .await
        .ok_or_else(|| ErrorBody::not_found("Job"))?;

    let stream = futures::stream::unfold(EventFeed::new(job), |mut feed| async move {
        feed.next_event()
            .await
            .map(|event| (Ok::<_, Infallible>(event), feed))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .map(|c| if c == '"' || c == '\\' { '_' } else { c })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}

/// GET /api/jobs/:id/file - Serve the downloaded file
pub async fn job_file(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .jobs
        .get(&job_id)
        .await
        .ok_or_else(|| ErrorBody::not_found("Job"))?;

    let download = job
        .file()
        .await
        .ok_or_else(|| ErrorBody::not_found("Downloaded file"))?;

    let file = download.open().await.map_err(|e| {
        warn!("Cannot open {}: {}", download.file_path.display(), e);
        ErrorBody::not_found("File on disk")
    })?;

    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type_for(&download.file_name).to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&download.file_name)),
            (header::CONTENT_LENGTH, download.size_bytes.to_string()),
        ],
        body,
    ))
}
