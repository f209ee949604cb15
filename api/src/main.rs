/// Clipfetch web server
///
/// Serves the single-page downloader and the JSON/SSE API behind it.
mod config;
mod jobs;
mod routes;

use clipfetch_shared::{Orchestrator, YtDlp};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Settings;
use crate::jobs::JobRegistry;

/// Shared application state for all API handlers.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub jobs: JobRegistry,
    pub download_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "clipfetch_web=info,clipfetch_shared=info,tower_http=info".into()
            }),
        )
        .init();

    // Config
    let settings = Settings::from_env()?;
    info!("Download directory: {}", settings.download_dir.display());

    // Downloader backend
    let ytdlp = YtDlp::discover(settings.ytdlp_bin.as_deref())?;
    match ytdlp.version().await {
        Ok(version) => info!("yt-dlp version {}", version),
        Err(e) => warn!("Could not query yt-dlp version: {}", e),
    }

    // App state
    let state = Arc::new(AppState {
        orchestrator: Orchestrator::new(Arc::new(ytdlp)),
        jobs: JobRegistry::new(),
        download_dir: settings.download_dir.clone(),
    });

    // Background job cleanup
    let cleanup_jobs = state.jobs.clone();
    let retention = settings.job_retention;
    // interval() panics on a zero period
    let cleanup_interval = settings.cleanup_interval.max(std::time::Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            let removed = cleanup_jobs.cleanup(retention).await;
            if removed > 0 {
                info!("Cleaned up {} finished jobs", removed);
            }
        }
    });

    let app = routes::router(state);

    // Bind
    let addr = settings.bind_addr();
    info!("Clipfetch listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
