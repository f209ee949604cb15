//! Line protocol spoken with the yt-dlp process.
//!
//! Arguments are built so that progress ticks come back as tagged JSON lines
//! (`--progress-template`) and the final file path as a tagged `--print` line.
//! Untagged `[download]` progress lines are parsed as a fallback.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::ExitStatus;

use crate::errors::ServiceError;
use crate::models::{MediaInfo, ProgressSample, ProgressStatus, TransferJob};

/// Prefix of progress lines produced by our progress template.
pub const PROGRESS_MARKER: &str = "[clipfetch:progress]";
/// Prefix of the final file path printed after post-processing.
pub const FILE_MARKER: &str = "[clipfetch:file]";

// ====== ARGUMENTS ======

/// Arguments for a metadata-only resolution of the first item behind `url`.
pub fn metadata_args(url: &str) -> Vec<String> {
    vec![
        "--dump-single-json".to_string(),
        "--skip-download".to_string(),
        "--no-playlist".to_string(),
        "--playlist-items".to_string(),
        "1".to_string(),
        "--encoding".to_string(),
        "utf-8".to_string(),
        "--no-warnings".to_string(),
        "--".to_string(),
        url.to_string(),
    ]
}

/// Arguments for a transfer with tagged progress output.
pub fn transfer_args(job: &TransferJob) -> Vec<String> {
    let mut args = vec!["-f".to_string(), job.format.clone()];
    if job.single_item_only {
        // --no-playlist alone does not limit a URL that is only a playlist
        args.extend([
            "--no-playlist".to_string(),
            "--playlist-items".to_string(),
            "1".to_string(),
        ]);
    }
    args.extend([
        "--encoding".to_string(),
        "utf-8".to_string(),
        "--newline".to_string(),
        "--progress".to_string(),
        "--no-warnings".to_string(),
        "--force-overwrites".to_string(),
        "--no-simulate".to_string(),
        "--progress-template".to_string(),
        format!("download:{}%(progress)j", PROGRESS_MARKER),
        "--print".to_string(),
        format!("after_move:{}%(filepath)s", FILE_MARKER),
        "-o".to_string(),
        job.output_template.clone(),
        "--".to_string(),
        job.url.clone(),
    ]);
    args
}

// ====== OUTPUT ======

/// Classified line of tool output.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolLine {
    Progress(ProgressSample),
    FilePath(PathBuf),
    /// An `ERROR:` line, kept verbatim.
    Diagnostic(String),
    Other,
}

/// Progress dictionary as yt-dlp serializes it. Numbers may arrive as floats.
#[derive(Debug, Deserialize)]
struct RawProgress {
    status: ProgressStatus,
    #[serde(default)]
    downloaded_bytes: Option<f64>,
    #[serde(default)]
    total_bytes: Option<f64>,
    #[serde(default)]
    total_bytes_estimate: Option<f64>,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    eta: Option<f64>,
}

impl From<RawProgress> for ProgressSample {
    fn from(raw: RawProgress) -> Self {
        ProgressSample {
            status: raw.status,
            downloaded_bytes: raw.downloaded_bytes.and_then(non_negative),
            total_bytes: raw
                .total_bytes
                .and_then(non_negative)
                .or_else(|| raw.total_bytes_estimate.and_then(non_negative)),
            speed: raw.speed.filter(|s| s.is_finite() && *s >= 0.0),
            eta: raw.eta.and_then(non_negative),
        }
    }
}

fn non_negative(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0).then(|| value as u64)
}

// [download]  42.5% of ~ 150.00MiB at  5.20MiB/s ETA 00:15
// Only seen when the binary ignores --progress-template (builds older than
// 2021.10) or is a wrapper printing yt-dlp's default progress line.
static DOWNLOAD_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[download\]\s+(?P<pct>\d+(?:\.\d+)?)%\s+of\s+~?\s*(?P<size>\d+(?:\.\d+)?)(?P<unit>[KMGT]?i?B)(?:\s+at\s+(?P<speed>\d+(?:\.\d+)?)(?P<sunit>[KMGT]?i?B)/s)?(?:\s+ETA\s+(?P<eta>\d+(?::\d+){0,2}))?"
    ).expect("download line regex is valid")
});

/// Decode one raw output line. Invalid UTF-8 is replaced, not rejected.
pub fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Classify one line of stdout or stderr.
pub fn classify_line(line: &str) -> ToolLine {
    let line = line.trim();

    if let Some(json) = line.strip_prefix(PROGRESS_MARKER) {
        return match serde_json::from_str::<RawProgress>(json) {
            Ok(raw) => ToolLine::Progress(raw.into()),
            Err(_) => ToolLine::Other,
        };
    }

    if let Some(path) = line.strip_prefix(FILE_MARKER) {
        let path = path.trim();
        if path.is_empty() || path == "NA" {
            return ToolLine::Other;
        }
        return ToolLine::FilePath(PathBuf::from(path));
    }

    if line.starts_with("ERROR:") {
        return ToolLine::Diagnostic(line.to_string());
    }

    parse_download_line(line)
        .map(ToolLine::Progress)
        .unwrap_or(ToolLine::Other)
}

/// Parse an untagged `[download]` progress line.
pub fn parse_download_line(line: &str) -> Option<ProgressSample> {
    let caps = DOWNLOAD_LINE_RE.captures(line)?;
    let pct: f64 = caps.name("pct")?.as_str().parse().ok()?;
    let size: f64 = caps.name("size")?.as_str().parse().ok()?;
    let total = size * unit_multiplier(caps.name("unit")?.as_str());
    let downloaded = total * (pct / 100.0).clamp(0.0, 1.0);

    let speed = match (caps.name("speed"), caps.name("sunit")) {
        (Some(s), Some(u)) => s
            .as_str()
            .parse::<f64>()
            .ok()
            .map(|v| v * unit_multiplier(u.as_str())),
        _ => None,
    };
    let eta = caps.name("eta").and_then(|m| parse_clock(m.as_str()));

    Some(ProgressSample {
        status: ProgressStatus::Downloading,
        downloaded_bytes: Some(downloaded as u64),
        total_bytes: Some(total as u64),
        speed,
        eta,
    })
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit {
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => 1.0,
    }
}

/// `SS`, `MM:SS` or `HH:MM:SS` to seconds.
fn parse_clock(clock: &str) -> Option<u64> {
    clock
        .split(':')
        .try_fold(0u64, |acc, part| part.parse::<u64>().ok().map(|v| acc * 60 + v))
}

/// Parse `--dump-single-json` output.
///
/// When the URL still resolves to a collection, the first entry is used.
pub fn parse_media_info(stdout: &[u8]) -> Result<MediaInfo, ServiceError> {
    let mut value: serde_json::Value = serde_json::from_slice(stdout)?;

    if value.get("_type").and_then(|v| v.as_str()) == Some("playlist") {
        value = value
            .get_mut("entries")
            .and_then(|v| v.as_array_mut())
            .and_then(|entries| entries.iter_mut().find(|e| !e.is_null()))
            .map(serde_json::Value::take)
            .ok_or_else(|| ServiceError::Reported("ERROR: playlist has no entries".to_string()))?;
    }

    Ok(serde_json::from_value(value)?)
}

/// Build the failure message for a non-zero exit.
///
/// `ERROR:` lines are preferred. Otherwise the last lines of output are used.
pub fn failure_message(diagnostics: &[String], tail: &[String], status: ExitStatus) -> String {
    if !diagnostics.is_empty() {
        return diagnostics.join("\n");
    }
    if !tail.is_empty() {
        return tail.join("\n");
    }
    format!("yt-dlp exited with {}", status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_args() {
        let job = TransferJob {
            url: "https://example.com/watch?v=1".into(),
            output_template: "/tmp/out/%(title)s.%(ext)s".into(),
            format: "best".into(),
            single_item_only: true,
        };
        let args = transfer_args(&job);
        assert_eq!(&args[..2], &["-f".to_string(), "best".to_string()]);
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"/tmp/out/%(title)s.%(ext)s".to_string()));
        assert!(args.windows(2).any(|w| w == ["--playlist-items", "1"]));
        assert!(args.windows(2).any(|w| w == ["--encoding", "utf-8"]));
        assert_eq!(args.last().unwrap(), "https://example.com/watch?v=1");
        assert_eq!(args[args.len() - 2], "--");
    }

    #[test]
    fn test_playlist_url_is_limited_to_first_item() {
        let url = "https://example.com/playlist?list=PL1";
        let meta = metadata_args(url);
        assert!(meta.windows(2).any(|w| w == ["--playlist-items", "1"]));
        assert!(meta.windows(2).any(|w| w == ["--encoding", "utf-8"]));
        assert_eq!(meta.last().map(String::as_str), Some(url));

        let job = TransferJob {
            url: url.into(),
            output_template: "%(title)s.%(ext)s".into(),
            format: "best".into(),
            single_item_only: true,
        };
        let args = transfer_args(&job);
        let limit = args.iter().position(|a| a == "--playlist-items").unwrap();
        assert_eq!(args[limit + 1], "1");
        assert!(limit < args.iter().position(|a| a == "--").unwrap());
    }

    #[test]
    fn test_decode_line_is_lossy() {
        assert_eq!(decode_line(b"[download] Destination: Caf\xe9.mp4\r\n"), "[download] Destination: Caf\u{fffd}.mp4");
        assert_eq!(decode_line(b"plain\n"), "plain");
    }

    #[test]
    fn test_progress_json_line() {
        let line = format!(
            r#"{}{{"status":"downloading","downloaded_bytes":500000,"total_bytes":1000000,"speed":1048576.0,"eta":3,"filename":"x.mp4"}}"#,
            PROGRESS_MARKER
        );
        match classify_line(&line) {
            ToolLine::Progress(sample) => {
                assert_eq!(sample.status, ProgressStatus::Downloading);
                assert_eq!(sample.downloaded_bytes, Some(500_000));
                assert_eq!(sample.total_bytes, Some(1_000_000));
                assert_eq!(sample.eta, Some(3));
            }
            other => panic!("Expected progress, got {:?}", other),
        }
    }

    #[test]
    fn test_progress_uses_estimate_when_total_missing() {
        let line = format!(
            r#"{}{{"status":"downloading","downloaded_bytes":10,"total_bytes":null,"total_bytes_estimate":40.7,"speed":null,"eta":null}}"#,
            PROGRESS_MARKER
        );
        let ToolLine::Progress(sample) = classify_line(&line) else {
            panic!("Expected progress");
        };
        assert_eq!(sample.total_bytes, Some(40));
        assert_eq!(sample.speed, None);
    }

    #[test]
    fn test_finished_json_line() {
        let line = format!(r#"{}{{"status":"finished","total_bytes":1000}}"#, PROGRESS_MARKER);
        assert!(matches!(
            classify_line(&line),
            ToolLine::Progress(ProgressSample { status: ProgressStatus::Finished, .. })
        ));
    }

    #[test]
    fn test_file_and_error_lines() {
        let line = format!("{}/tmp/out/Demo Clip.mp4", FILE_MARKER);
        assert_eq!(classify_line(&line), ToolLine::FilePath(PathBuf::from("/tmp/out/Demo Clip.mp4")));

        let err = "ERROR: [generic] 'not-a-url' is not a valid URL";
        assert_eq!(classify_line(err), ToolLine::Diagnostic(err.to_string()));

        assert_eq!(classify_line("[info] Downloading webpage"), ToolLine::Other);
    }

    #[test]
    fn test_fallback_download_line() {
        let sample = parse_download_line("[download]  50.0% of ~ 2.00MiB at  1.00MiB/s ETA 00:01").unwrap();
        assert_eq!(sample.total_bytes, Some(2 * 1024 * 1024));
        assert_eq!(sample.downloaded_bytes, Some(1024 * 1024));
        assert_eq!(sample.speed, Some(1024.0 * 1024.0));
        assert_eq!(sample.eta, Some(1));

        assert!(parse_download_line("[download] Destination: foo.mp4").is_none());
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("15"), Some(15));
        assert_eq!(parse_clock("01:30"), Some(90));
        assert_eq!(parse_clock("1:02:03"), Some(3723));
    }

    #[test]
    fn test_media_info_from_playlist_takes_first_entry() {
        let json = br#"{"_type":"playlist","title":"List","entries":[{"title":"First","view_count":7},{"title":"Second"}]}"#;
        let info = parse_media_info(json).unwrap();
        assert_eq!(info.title, "First");
        assert_eq!(info.view_count, Some(7));
    }

    #[test]
    fn test_media_info_single_video() {
        let json = br#"{"id":"abc","title":"Demo Clip","uploader":"Someone","duration":120,"duration_string":"2:00","view_count":1500,"thumbnail":"https://img/1.jpg"}"#;
        let info = parse_media_info(json).unwrap();
        assert_eq!(info.title, "Demo Clip");
        assert_eq!(info.duration, Some(120.0));
        assert_eq!(info.thumbnail.as_deref(), Some("https://img/1.jpg"));
    }
}
