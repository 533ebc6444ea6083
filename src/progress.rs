//! Progress reporter (spec.md §4.6).

use std::time::{Duration, Instant};

use chrono::Local;

/// Tracks pages-since-last-notify and prints a progress line at the
/// configured rate. Percentage and ETA are meaningless in sampling mode
/// (there is no "whole image" denominator to extrapolate against) and
/// are omitted there.
pub struct ProgressReporter {
    notify_rate: u64,
    notify_ctr: u64,
    quiet: bool,
    sampling: bool,
    started: Option<Instant>,
}

impl ProgressReporter {
    pub fn new(notify_rate: u64, quiet: bool, sampling: bool) -> Self {
        Self { notify_rate, notify_ctr: 0, quiet, sampling, started: None }
    }

    /// Call once per submitted candidate page. Returns the formatted
    /// line when the notify rate is reached (and prints it, unless
    /// quiet), resetting the counter.
    pub fn tick(&mut self, position_label: &str, fraction_done: f64) -> Option<String> {
        let started = *self.started.get_or_insert_with(Instant::now);

        if self.notify_rate == 0 {
            return None;
        }
        self.notify_ctr += 1;
        if self.notify_ctr < self.notify_rate {
            return None;
        }
        self.notify_ctr = 0;

        let line = self.format_line(position_label, fraction_done, started.elapsed());
        if !self.quiet {
            println!("{line}");
        }
        Some(line)
    }

    fn format_line(&self, position_label: &str, fraction_done: f64, elapsed: Duration) -> String {
        let now = Local::now().format("%H:%M:%S");
        if self.sampling {
            format!("{now} {position_label}")
        } else {
            let pct = (fraction_done * 100.0).min(100.0);
            let (eta_text, eta_clock) = estimate_eta(fraction_done, elapsed);
            format!("{now} {position_label} ({pct:.1}%) Done in {eta_text} at {eta_clock}")
        }
    }
}

/// Extrapolates remaining wall-clock time from the fraction of the image
/// done so far and the elapsed time since the first tick:
/// `remaining = elapsed / fraction_done * (1 - fraction_done)`.
fn estimate_eta(fraction_done: f64, elapsed: Duration) -> (String, String) {
    if fraction_done <= 0.0 {
        return ("unknown".to_string(), "unknown".to_string());
    }
    let remaining_secs = elapsed.as_secs_f64() / fraction_done * (1.0 - fraction_done);
    let remaining = Duration::from_secs_f64(remaining_secs.max(0.0));

    let eta_text = format_duration(remaining);
    let offset = chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero());
    let eta_clock = (Local::now() + offset).format("%H:%M:%S").to_string();
    (eta_text, eta_clock)
}

fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (h, rem) = (total / 3600, total % 3600);
    let (m, s) = (rem / 60, rem % 60);
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_only_at_notify_rate() {
        let mut reporter = ProgressReporter::new(3, true, false);
        assert!(reporter.tick("0", 0.0).is_none());
        assert!(reporter.tick("1", 0.1).is_none());
        assert!(reporter.tick("2", 0.2).is_some());
        assert!(reporter.tick("3", 0.3).is_none());
    }

    #[test]
    fn sampling_mode_omits_percentage() {
        let mut reporter = ProgressReporter::new(1, true, true);
        let line = reporter.tick("500", 0.0).unwrap();
        assert!(!line.contains('%'));
    }

    #[test]
    fn zero_notify_rate_never_emits() {
        let mut reporter = ProgressReporter::new(0, true, false);
        for i in 0..10 {
            assert!(reporter.tick(&i.to_string(), 0.0).is_none());
        }
    }

    #[test]
    fn eta_is_unknown_at_zero_progress_and_real_once_underway() {
        let mut reporter = ProgressReporter::new(1, true, false);
        let line = reporter.tick("0", 0.0).unwrap();
        assert!(line.contains("unknown"));

        std::thread::sleep(Duration::from_millis(5));
        let line = reporter.tick("1", 0.5).unwrap();
        assert!(!line.contains("unknown"));
    }
}
