//! Progress tracking for polling coordinators.
//!
//! This module provides the `PollerStatsTracker`, which counts the fetch cycles of one poller:
//! how many started, succeeded, failed or were skipped because a fetch was already in flight, the
//! current run of consecutive failures and when the last success happened. Pollers log a summary
//! periodically and on shutdown.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Log a progress line every this many finished cycles.
const LOG_EVERY_CYCLES: u64 = 20;

/// Consecutive failures after which each further failure is logged as a warning.
const FAILURE_WARN_THRESHOLD: u64 = 3;

/// Service for tracking poll cycle outcomes
#[derive(Debug, Clone)]
pub struct PollerStatsTracker {
    poller: &'static str,
    cycles_started: u64,
    cycles_succeeded: u64,
    cycles_failed: u64,
    cycles_skipped: u64,
    consecutive_failures: u64,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
    /// Finished cycles at the time of the last progress log
    last_logged_cycle: u64,
}

impl PollerStatsTracker {
    pub fn new(poller: &'static str) -> Self {
        Self {
            poller,
            cycles_started: 0,
            cycles_succeeded: 0,
            cycles_failed: 0,
            cycles_skipped: 0,
            consecutive_failures: 0,
            last_success: None,
            last_error: None,
            last_logged_cycle: 0,
        }
    }

    pub fn record_started(&mut self) {
        self.cycles_started += 1;
    }

    pub fn record_success(&mut self) {
        self.cycles_succeeded += 1;
        self.consecutive_failures = 0;
        self.last_success = Some(Utc::now());
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: &str) {
        self.cycles_failed += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());

        if self.consecutive_failures >= FAILURE_WARN_THRESHOLD {
            warn!(
                "Poller {} has failed {} cycles in a row: {}",
                self.poller, self.consecutive_failures, error
            );
        }
    }

    /// A tick arrived while a fetch was still in flight.
    pub fn record_skipped(&mut self) {
        self.cycles_skipped += 1;
    }

    fn cycles_finished(&self) -> u64 {
        self.cycles_succeeded + self.cycles_failed
    }

    /// Log progress at regular intervals or when forced
    pub fn log_progress(&mut self, force: bool) {
        let finished = self.cycles_finished();
        let should_log = force || finished.saturating_sub(self.last_logged_cycle) >= LOG_EVERY_CYCLES;

        if should_log && self.cycles_started > 0 {
            info!("{}", self.get_stats().summary());
            self.last_logged_cycle = finished;
        }
    }

    pub fn get_stats(&self) -> PollerStats {
        PollerStats {
            poller: self.poller,
            cycles_started: self.cycles_started,
            cycles_succeeded: self.cycles_succeeded,
            cycles_failed: self.cycles_failed,
            cycles_skipped: self.cycles_skipped,
            consecutive_failures: self.consecutive_failures,
            last_success: self.last_success,
            last_error: self.last_error.clone(),
        }
    }
}

/// Statistics about one poller
#[derive(Debug, Clone)]
pub struct PollerStats {
    pub poller: &'static str,
    pub cycles_started: u64,
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    pub cycles_skipped: u64,
    pub consecutive_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PollerStats {
    /// Get a human-readable summary of the poller statistics
    pub fn summary(&self) -> String {
        format!(
            "Poller {}: {} cycles, {} ok, {} failed, {} skipped, last success {}{}",
            self.poller,
            self.cycles_started,
            self.cycles_succeeded,
            self.cycles_failed,
            self.cycles_skipped,
            self.last_success
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
            if self.consecutive_failures == 0 {
                String::new()
            } else {
                format!(" ({} consecutive failures)", self.consecutive_failures)
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_failure_streak() {
        let mut tracker = PollerStatsTracker::new("balances");
        tracker.record_started();
        tracker.record_failure("timeout");
        tracker.record_started();
        tracker.record_failure("timeout");
        assert_eq!(tracker.get_stats().consecutive_failures, 2);

        tracker.record_started();
        tracker.record_success();
        let stats = tracker.get_stats();
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.cycles_failed, 2);
        assert_eq!(stats.cycles_succeeded, 1);
        assert!(stats.last_success.is_some());
        assert!(stats.last_error.is_none());
    }

    #[test]
    fn summary_mentions_streak_only_when_failing() {
        let mut tracker = PollerStatsTracker::new("prices");
        tracker.record_started();
        tracker.record_success();
        assert!(!tracker.get_stats().summary().contains("consecutive"));

        tracker.record_started();
        tracker.record_failure("status 502");
        assert!(tracker.get_stats().summary().contains("1 consecutive failures"));
    }
}
