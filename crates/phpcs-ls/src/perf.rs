// perf.rs - Timing and run counters for phpcs-ls
//
// Controlled via the PHPCS_LS_PERF environment variable.
//
// Usage:
//   PHPCS_LS_PERF=1 phpcs-ls --stdio        # Log how long each phpcs run takes
//   PHPCS_LS_PERF=verbose phpcs-ls --stdio  # Also warn about runs over their threshold

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Global flag indicating whether performance timing is enabled
static PERF_ENABLED: OnceLock<bool> = OnceLock::new();

/// Global flag indicating verbose mode (includes threshold warnings)
static PERF_VERBOSE: OnceLock<bool> = OnceLock::new();

/// Check if performance timing is enabled
pub fn is_enabled() -> bool {
    *PERF_ENABLED.get_or_init(|| {
        std::env::var("PHPCS_LS_PERF")
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    })
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    *PERF_VERBOSE.get_or_init(|| {
        std::env::var("PHPCS_LS_PERF")
            .map(|v| v.to_lowercase() == "verbose")
            .unwrap_or(false)
    })
}

/// RAII timing guard that logs duration on drop
///
/// ```
/// use phpcs_ls::perf::TimingGuard;
///
/// let _guard = TimingGuard::new("operation_name");
/// // ... do work ...
/// ```
pub struct TimingGuard {
    start: Instant,
    name: &'static str,
    threshold_warn_ms: Option<u64>,
    enabled: bool,
}

impl TimingGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
            threshold_warn_ms: None,
            enabled: is_enabled(),
        }
    }

    /// Create a timing guard that warns (in verbose mode) past `threshold_ms`
    pub fn with_threshold(name: &'static str, threshold_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            name,
            threshold_warn_ms: Some(threshold_ms),
            enabled: is_enabled(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }

        let elapsed = self.start.elapsed();
        log::info!("[PERF] {} completed in {:?}", self.name, elapsed);

        if let Some(threshold) = self.threshold_warn_ms {
            if elapsed.as_millis() > threshold as u128 && is_verbose() {
                log::warn!(
                    "[PERF] {} exceeded threshold ({}ms > {}ms)",
                    self.name,
                    elapsed.as_millis(),
                    threshold
                );
            }
        }
    }
}

static RUNS_STARTED: AtomicUsize = AtomicUsize::new(0);
static RUNS_CANCELLED: AtomicUsize = AtomicUsize::new(0);
static RUNS_FAILED: AtomicUsize = AtomicUsize::new(0);

/// Snapshot of the process-wide run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub started: usize,
    pub cancelled: usize,
    pub failed: usize,
}

pub fn increment_runs_started() {
    RUNS_STARTED.fetch_add(1, Ordering::Relaxed);
}

pub fn increment_runs_cancelled() {
    RUNS_CANCELLED.fetch_add(1, Ordering::Relaxed);
}

pub fn increment_runs_failed() {
    RUNS_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub fn run_counters() -> RunCounters {
    RunCounters {
        started: RUNS_STARTED.load(Ordering::Relaxed),
        cancelled: RUNS_CANCELLED.load(Ordering::Relaxed),
        failed: RUNS_FAILED.load(Ordering::Relaxed),
    }
}

/// Log the run counters (on shutdown)
pub fn log_summary() {
    if !is_enabled() {
        return;
    }
    let counters = run_counters();
    log::info!(
        "[PERF] phpcs runs: {} started, {} cancelled, {} failed",
        counters.started,
        counters.cancelled,
        counters.failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_guard_elapsed() {
        let guard = TimingGuard::with_threshold("test", 1);
        std::thread::sleep(Duration::from_millis(10));
        assert!(guard.elapsed().as_millis() >= 10);
    }

    #[test]
    fn test_timing_guard_without_threshold() {
        let guard = TimingGuard::new("test");
        assert_eq!(guard.name, "test");
        assert!(guard.threshold_warn_ms.is_none());
    }

    #[test]
    fn test_counters_are_monotonic() {
        let before = run_counters();
        increment_runs_started();
        increment_runs_cancelled();
        increment_runs_failed();
        let after = run_counters();
        assert!(after.started > before.started);
        assert!(after.cancelled > before.cancelled);
        assert!(after.failed > before.failed);
    }
}
