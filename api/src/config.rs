//! Server settings read from the environment (after `.env` is loaded).
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Where downloaded files are written. Created on first download.
    pub download_dir: PathBuf,
    /// Explicit yt-dlp binary; discovered on PATH when unset.
    pub ytdlp_bin: Option<PathBuf>,
    /// How long finished jobs stay queryable.
    pub job_retention: Duration,
    pub cleanup_interval: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: non_empty("CLIPFETCH_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&non_empty, "CLIPFETCH_PORT", "port number", 8080)?,
            download_dir: non_empty("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            ytdlp_bin: non_empty("YTDLP_BIN").map(PathBuf::from),
            job_retention: Duration::from_secs(parse_or(
                &non_empty,
                "JOB_RETENTION_SECS",
                "number of seconds",
                3600,
            )?),
            cleanup_interval: Duration::from_secs(parse_or(
                &non_empty,
                "JOB_CLEANUP_INTERVAL",
                "number of seconds",
                300,
            )?),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.bind_addr(), "0.0.0.0:8080");
        assert_eq!(s.download_dir, PathBuf::from("."));
        assert!(s.ytdlp_bin.is_none());
        assert_eq!(s.job_retention, Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("CLIPFETCH_PORT", "9000"),
            ("DOWNLOAD_DIR", "/data/videos"),
            ("YTDLP_BIN", "/opt/yt-dlp"),
            ("JOB_CLEANUP_INTERVAL", "10"),
        ])
        .unwrap();
        assert_eq!(s.port, 9000);
        assert_eq!(s.download_dir, PathBuf::from("/data/videos"));
        assert_eq!(s.ytdlp_bin, Some(PathBuf::from("/opt/yt-dlp")));
        assert_eq!(s.cleanup_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = settings(&[("CLIPFETCH_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("CLIPFETCH_PORT"));
    }

    #[test]
    fn test_blank_values_fall_back() {
        let s = settings(&[("DOWNLOAD_DIR", "  "), ("CLIPFETCH_PORT", "")]).unwrap();
        assert_eq!(s.download_dir, PathBuf::from("."));
        assert_eq!(s.port, 8080);
    }
}
