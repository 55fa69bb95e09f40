//! Scoped timing for pipeline stages.
//!
//! A [`TimingGuard`] records when it was created and logs the elapsed time on
//! drop. Guards only log when telemetry has been switched on via [`configure`]
//! and the logger accepts the requested level for [`TELEMETRY_TARGET`], so an
//! idle guard costs one `Instant::now()`.

use std::{
    borrow::Cow,
    sync::atomic::{AtomicU8, Ordering},
    time::Instant,
};

use log::{Level, LevelFilter, log, log_enabled};

/// Log target used by every timing entry.
pub const TELEMETRY_TARGET: &str = "faceattr::telemetry";

// 0 = disabled, otherwise the LevelFilter ordinal (1 = error .. 5 = trace).
static TELEMETRY_THRESHOLD: AtomicU8 = AtomicU8::new(0);

/// RAII helper that logs how long an operation took when dropped.
pub struct TimingGuard {
    label: Cow<'static, str>,
    level: Level,
    start: Instant,
    active: bool,
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let elapsed = self.start.elapsed();
        log!(
            target: TELEMETRY_TARGET,
            self.level,
            "{} took {:.3}ms",
            self.label,
            elapsed.as_secs_f64() * 1000.0
        );
    }
}

/// Guard that logs at `level` whenever telemetry allows it.
pub fn timing_guard(label: impl Into<Cow<'static, str>>, level: Level) -> TimingGuard {
    let active = telemetry_allows(level) && log_enabled!(target: TELEMETRY_TARGET, level);
    TimingGuard {
        label: label.into(),
        level,
        start: Instant::now(),
        active,
    }
}

/// Switch telemetry on or off and set the most verbose level it may log at.
pub fn configure(enabled: bool, level: LevelFilter) {
    let threshold = if enabled { level as u8 } else { 0 };
    TELEMETRY_THRESHOLD.store(threshold, Ordering::Relaxed);
}

/// Returns `true` when telemetry is on and `level` is within the threshold.
pub fn telemetry_allows(level: Level) -> bool {
    let threshold = TELEMETRY_THRESHOLD.load(Ordering::Relaxed);
    threshold > 0 && (level as u8) <= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    // Telemetry state is process-global, so the checks share one test.
    #[test]
    fn configure_controls_threshold() {
        configure(true, LevelFilter::Info);
        assert!(telemetry_allows(Level::Warn));
        assert!(telemetry_allows(Level::Info));
        assert!(!telemetry_allows(Level::Debug));

        configure(true, LevelFilter::Trace);
        assert!(telemetry_allows(Level::Trace));

        configure(false, LevelFilter::Trace);
        assert!(!telemetry_allows(Level::Error));
        assert!(!timing_guard("disabled", Level::Error).active);
    }
}
