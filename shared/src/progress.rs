//! Per-request progress reporter.
//!
//! Samples arrive on the transfer's task; readers observe snapshots through a
//! `watch` channel, which is the synchronization point with the presentation layer.
use serde::Serialize;
use tokio::sync::watch;

use crate::models::{ProgressSample, ProgressStatus};

/// Normalized progress state exposed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    /// `None` until the first accepted sample.
    pub status: Option<ProgressStatus>,
    /// Always in `[0, 1]`.
    pub fraction: f64,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub speed: Option<f64>,
    pub eta: Option<u64>,
}

impl Default for ProgressView {
    fn default() -> Self {
        Self {
            status: None,
            fraction: 0.0,
            downloaded_bytes: None,
            total_bytes: None,
            speed: None,
            eta: None,
        }
    }
}

impl ProgressView {
    /// Fold one sample into the view. Returns false when the sample was ignored.
    fn apply(&mut self, sample: &ProgressSample) -> bool {
        match sample.status {
            ProgressStatus::Finished => {
                self.status = Some(ProgressStatus::Finished);
                self.fraction = 1.0;
                if sample.total_bytes.is_some() {
                    self.total_bytes = sample.total_bytes;
                    self.downloaded_bytes = sample.downloaded_bytes.or(sample.total_bytes);
                }
                self.speed = None;
                self.eta = None;
                true
            }
            ProgressStatus::Error => {
                self.status = Some(ProgressStatus::Error);
                true
            }
            ProgressStatus::Downloading => {
                if sample.downloaded_bytes.is_none() && sample.total_bytes.is_none() {
                    return false;
                }
                self.status = Some(ProgressStatus::Downloading);
                if sample.downloaded_bytes.is_some() {
                    self.downloaded_bytes = sample.downloaded_bytes;
                }
                if let Some(total) = sample.total_bytes.filter(|t| *t > 0) {
                    self.total_bytes = Some(total);
                    if let Some(done) = sample.downloaded_bytes {
                        self.fraction = (done as f64 / total as f64).clamp(0.0, 1.0);
                    }
                }
                self.speed = sample.speed;
                self.eta = sample.eta;
                true
            }
        }
    }

    /// Percentage with one decimal, e.g. `42.5`.
    pub fn percent(&self) -> f64 {
        (self.fraction * 1000.0).round() / 10.0
    }

    /// `Speed: 1.2 MB/s | ETA: 5s | Progress: 42.0%` when both speed and ETA are known.
    pub fn status_line(&self) -> Option<String> {
        let speed = self.speed?;
        let eta = self.eta?;
        Some(format!(
            "Speed: {:.1} MB/s | ETA: {}s | Progress: {:.1}%",
            speed / 1024.0 / 1024.0,
            eta,
            self.fraction * 100.0
        ))
    }
}

/// Serializable form of a [`ProgressView`] including derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    #[serde(flatten)]
    pub view: ProgressView,
    pub percent: f64,
    pub status_line: Option<String>,
}

impl From<ProgressView> for ProgressReport {
    fn from(view: ProgressView) -> Self {
        Self {
            percent: view.percent(),
            status_line: view.status_line(),
            view,
        }
    }
}

/// Stateful progress sink. Safe to update from any task or thread.
#[derive(Debug)]
pub struct ProgressReporter {
    state: watch::Sender<ProgressView>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (state, _rx) = watch::channel(ProgressView::default());
        Self { state }
    }

    /// Point-in-time overwrite with the given sample. Malformed samples are ignored.
    pub fn update(&self, sample: &ProgressSample) {
        self.state.send_if_modified(|view| view.apply(sample));
    }

    pub fn current_fraction(&self) -> f64 {
        self.state.borrow().fraction
    }

    pub fn snapshot(&self) -> ProgressView {
        self.state.borrow().clone()
    }

    pub fn report(&self) -> ProgressReport {
        self.snapshot().into()
    }

    /// Receiver notified on every accepted sample.
    pub fn subscribe(&self) -> watch::Receiver<ProgressView> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_follows_bytes() {
        let reporter = ProgressReporter::new();
        reporter.update(&ProgressSample::downloading(0, Some(1_000_000)));
        assert_eq!(reporter.current_fraction(), 0.0);
        reporter.update(&ProgressSample::downloading(500_000, Some(1_000_000)));
        assert_eq!(reporter.current_fraction(), 0.5);
    }

    #[test]
    fn test_monotonic_and_bounded_for_increasing_bytes() {
        let reporter = ProgressReporter::new();
        let total = 12_345u64;
        let mut last = 0.0;
        for done in (0..=total + 500).step_by(97) {
            reporter.update(&ProgressSample::downloading(done, Some(total)));
            let fraction = reporter.current_fraction();
            assert!(fraction >= last, "fraction regressed at {}", done);
            assert!((0.0..=1.0).contains(&fraction));
            last = fraction;
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn test_finished_forces_one() {
        let reporter = ProgressReporter::new();
        reporter.update(&ProgressSample::downloading(800, Some(1000)));
        assert_eq!(reporter.current_fraction(), 0.8);
        reporter.update(&ProgressSample::finished());
        assert_eq!(reporter.current_fraction(), 1.0);
        assert_eq!(reporter.snapshot().status, Some(ProgressStatus::Finished));
    }

    #[test]
    fn test_unknown_total_keeps_last_fraction() {
        let reporter = ProgressReporter::new();
        reporter.update(&ProgressSample::downloading(250, Some(1000)));
        reporter.update(&ProgressSample::downloading(400, None));
        assert_eq!(reporter.current_fraction(), 0.25);
        assert_eq!(reporter.snapshot().downloaded_bytes, Some(400));

        reporter.update(&ProgressSample::downloading(500, Some(0)));
        assert_eq!(reporter.current_fraction(), 0.25);
    }

    #[test]
    fn test_malformed_sample_is_ignored() {
        let reporter = ProgressReporter::new();
        reporter.update(&ProgressSample::downloading(10, Some(100)));
        let before = reporter.snapshot();

        let mut rx = reporter.subscribe();
        let malformed = ProgressSample {
            downloaded_bytes: None,
            ..ProgressSample::downloading(0, None)
        };
        reporter.update(&malformed);
        assert_eq!(reporter.snapshot(), before);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_error_keeps_fraction() {
        let reporter = ProgressReporter::new();
        reporter.update(&ProgressSample::downloading(30, Some(100)));
        reporter.update(&ProgressSample::error());
        assert_eq!(reporter.current_fraction(), 0.3);
        assert_eq!(reporter.snapshot().status, Some(ProgressStatus::Error));
    }

    #[test]
    fn test_overshoot_is_clamped() {
        let reporter = ProgressReporter::new();
        reporter.update(&ProgressSample::downloading(2000, Some(1000)));
        assert_eq!(reporter.current_fraction(), 1.0);
    }

    #[test]
    fn test_status_line() {
        let reporter = ProgressReporter::new();
        reporter.update(&ProgressSample::downloading(50, Some(100)).with_rate(1024.0 * 1024.0 * 1.5, 5));
        let report = reporter.report();
        assert_eq!(report.percent, 50.0);
        assert_eq!(
            report.status_line.as_deref(),
            Some("Speed: 1.5 MB/s | ETA: 5s | Progress: 50.0%")
        );

        reporter.update(&ProgressSample::downloading(60, Some(100)));
        assert_eq!(reporter.report().status_line, None);
    }

    #[tokio::test]
    async fn test_update_from_another_thread() {
        let reporter = std::sync::Arc::new(ProgressReporter::new());
        let mut rx = reporter.subscribe();
        let writer = reporter.clone();
        std::thread::spawn(move || {
            writer.update(&ProgressSample::downloading(1, Some(4)));
        })
        .join()
        .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().fraction, 0.25);
    }
}
