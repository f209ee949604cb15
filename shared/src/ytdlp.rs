//! yt-dlp subprocess backend.
//!
//! Spawns the yt-dlp binary per operation. Tagged stdout/stderr lines are
//! decoded by [`crate::protocol`]; everything else is forwarded to tracing.
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::ServiceError;
use crate::models::{MediaInfo, ProgressSample, ProgressStatus, TransferJob, TransferOutcome};
use crate::protocol::{self, ToolLine};
use crate::service::{MediaService, ProgressSink};

/// Number of trailing output lines kept for failure messages without an `ERROR:` line.
const TAIL_LINES: usize = 5;

/// Locate the yt-dlp binary.
/// Checks the configured path first, then `PATH`, then common install locations.
fn discover_binary(configured: Option<&Path>) -> Result<PathBuf, ServiceError> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        // Allow bare command names like "yt-dlp-nightly"
        return which::which(path).map_err(|e| {
            ServiceError::NotFound(format!("{}: {}", path.display(), e))
        });
    }

    if let Ok(path) = which::which("yt-dlp") {
        return Ok(path);
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if cfg!(target_os = "windows") {
        if let Ok(local_app) = std::env::var("LOCALAPPDATA") {
            candidates.push(
                PathBuf::from(local_app)
                    .join("Microsoft")
                    .join("WinGet")
                    .join("Links")
                    .join("yt-dlp.exe"),
            );
        }
    } else {
        if let Ok(home) = std::env::var("HOME") {
            candidates.push(PathBuf::from(home).join(".local").join("bin").join("yt-dlp"));
        }
        for dir in ["/usr/local/bin", "/usr/bin", "/snap/bin", "/opt/homebrew/bin"] {
            candidates.push(PathBuf::from(dir).join("yt-dlp"));
        }
    }

    candidates
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| ServiceError::NotFound("yt-dlp is not on PATH".to_string()))
}

/// [`MediaService`] backed by the yt-dlp command line tool.
#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: PathBuf,
}

impl YtDlp {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    /// Find the binary (see [`discover_binary`]) and build the backend.
    pub fn discover(configured: Option<&Path>) -> Result<Self, ServiceError> {
        let bin = discover_binary(configured)?;
        info!("Using yt-dlp binary at {}", bin.display());
        Ok(Self { bin })
    }

    pub fn binary(&self) -> &Path {
        &self.bin
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// `yt-dlp --version`.
    pub async fn version(&self) -> Result<String, ServiceError> {
        let output = self
            .command()
            .arg("--version")
            .output()
            .await
            .map_err(ServiceError::Spawn)?;
        if !output.status.success() {
            return Err(ServiceError::Reported(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Per-transfer accumulation of what the tool printed.
#[derive(Default)]
struct TransferState {
    file_path: Option<PathBuf>,
    saw_finished: bool,
    diagnostics: Vec<String>,
    tail: Vec<String>,
}

impl TransferState {
    fn consume(&mut self, line: &str, sink: &mut ProgressSink<'_>) {
        match protocol::classify_line(line) {
            ToolLine::Progress(sample) => {
                if sample.status == ProgressStatus::Finished {
                    self.saw_finished = true;
                }
                sink(sample);
            }
            ToolLine::FilePath(path) => match &self.file_path {
                Some(first) => warn!(
                    "Ignoring extra output {} (already have {})",
                    path.display(),
                    first.display()
                ),
                None => {
                    debug!("yt-dlp final path: {}", path.display());
                    self.file_path = Some(path);
                }
            },
            ToolLine::Diagnostic(message) => {
                warn!(target: "yt_dlp", "{}", message);
                self.diagnostics.push(message);
            }
            ToolLine::Other => {
                let line = line.trim();
                if line.is_empty() {
                    return;
                }
                debug!(target: "yt_dlp", "{}", line);
                if self.tail.len() == TAIL_LINES {
                    self.tail.remove(0);
                }
                self.tail.push(line.to_string());
            }
        }
    }
}

#[async_trait]
impl MediaService for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve_metadata(&self, url: &str) -> Result<MediaInfo, ServiceError> {
        let args = protocol::metadata_args(url);
        debug!("yt-dlp metadata args: {:?}", args);

        let output = self
            .command()
            .args(&args)
            .output()
            .await
            .map_err(ServiceError::Spawn)?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut diagnostics = Vec::new();
        let mut tail = Vec::new();
        for line in stderr.lines().map(str::trim).filter(|l| !l.is_empty()) {
            debug!(target: "yt_dlp", "{}", line);
            if let ToolLine::Diagnostic(message) = protocol::classify_line(line) {
                diagnostics.push(message);
            } else {
                tail.push(line.to_string());
            }
        }

        if !output.status.success() {
            let skip = tail.len().saturating_sub(TAIL_LINES);
            return Err(ServiceError::Reported(protocol::failure_message(
                &diagnostics,
                &tail[skip..],
                output.status,
            )));
        }

        protocol::parse_media_info(&output.stdout)
    }

    async fn transfer(
        &self,
        job: &TransferJob,
        sink: &mut ProgressSink<'_>,
    ) -> Result<TransferOutcome, ServiceError> {
        let args = protocol::transfer_args(job);
        info!("Starting yt-dlp transfer: url={} template={}", job.url, job.output_template);
        debug!("yt-dlp transfer args: {:?}", args);

        let mut child = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ServiceError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ServiceError::Io(std::io::Error::other("no stdout handle")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ServiceError::Io(std::io::Error::other("no stderr handle")))?;

        // Both streams are drained on this task so the sink runs inline with the transfer.
        // read_until keeps partial lines in the buffer, so losing a select! race drops nothing.
        let mut out_reader = BufReader::new(stdout);
        let mut err_reader = BufReader::new(stderr);
        let mut out_buf = Vec::new();
        let mut err_buf = Vec::new();
        let mut out_open = true;
        let mut err_open = true;
        let mut state = TransferState::default();

        while out_open || err_open {
            tokio::select! {
                read = out_reader.read_until(b'\n', &mut out_buf), if out_open => {
                    if read? == 0 {
                        out_open = false;
                    } else {
                        state.consume(&protocol::decode_line(&out_buf), sink);
                        out_buf.clear();
                    }
                }
                read = err_reader.read_until(b'\n', &mut err_buf), if err_open => {
                    if read? == 0 {
                        err_open = false;
                    } else {
                        state.consume(&protocol::decode_line(&err_buf), sink);
                        err_buf.clear();
                    }
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            sink(ProgressSample::error());
            return Err(ServiceError::Reported(protocol::failure_message(
                &state.diagnostics,
                &state.tail,
                status,
            )));
        }

        if state.file_path.is_some() && !state.saw_finished {
            sink(ProgressSample::finished());
        }

        info!("yt-dlp transfer finished: {:?}", state.file_path);
        Ok(TransferOutcome {
            file_path: state.file_path,
        })
    }
}
