//! Progress reporting for the long-running phases of a run: paging through
//! playlists, probing the local library, and the similarity sweep.
//!
//! Interactive runs get indicatif bars. With `--log-only` the bars are hidden
//! and each phase emits a `[phase] n/total` line at a fixed interval, which
//! reads better when the output is tailed from a log file.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// `1.5s` under a minute, `2.3m` above.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Paging through the configured playlists
    Fetch,
    /// Checking which inventory paths exist under the music root
    Probe,
    /// Scoring residual files against candidate records
    Fuzzy,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Fetch => "fetch",
            Phase::Probe => "probe",
            Phase::Fuzzy => "fuzzy",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Phase::Fetch => "Fetching playlists",
            Phase::Probe => "Probing local files",
            Phase::Fuzzy => "Fuzzy matching",
        }
    }

    /// Items between two log-only progress lines. Probing is a stat per
    /// file, a sweep step scores one file against every candidate.
    fn log_interval(self) -> u64 {
        match self {
            Phase::Fetch => 1,
            Phase::Probe => 1000,
            Phase::Fuzzy => 100,
        }
    }
}

fn hidden() -> bool {
    is_log_only() || cfg!(test)
}

/// Spinner shown while playlists are paged in; the message names the
/// playlist currently being fetched.
pub fn fetch_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if hidden() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{msg} {spinner} [{elapsed_precise}]")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb.set_message(Phase::Fetch.message());
    pb
}

/// Counted progress for a phase whose items are processed on the worker
/// pool. `tick` may be called from any worker.
pub struct PhaseProgress {
    phase: Phase,
    bar: ProgressBar,
    done: AtomicU64,
    total: u64,
}

impl PhaseProgress {
    pub fn new(phase: Phase, total: u64) -> Self {
        let bar = ProgressBar::new(total);
        if hidden() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")
                    .unwrap()
                    .progress_chars("=> "),
            );
        }
        bar.set_message(phase.message());
        Self {
            phase,
            bar,
            done: AtomicU64::new(0),
            total,
        }
    }

    pub fn tick(&self) {
        self.bar.inc(1);
        let n = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if is_log_only() && (n % self.phase.log_interval() == 0 || n == self.total) {
            let pct = 100.0 * n as f64 / self.total.max(1) as f64;
            info!("[{}] {}/{} ({:.1}%)", self.phase.label(), n, self.total, pct);
        }
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// Clear the bar and log the phase summary.
    pub fn finish(&self, summary: &str) {
        self.bar.finish_and_clear();
        info!("{}", summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(Phase::Probe.label(), "probe");
        assert_eq!(Phase::Fuzzy.label(), "fuzzy");
        assert_eq!(Phase::Fetch.label(), "fetch");
    }

    #[test]
    fn test_ticks_counted_across_threads() {
        let progress = PhaseProgress::new(Phase::Probe, 400);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        progress.tick();
                    }
                });
            }
        });
        assert_eq!(progress.done(), 400);
        progress.finish("Found 400 local files");
    }
}
