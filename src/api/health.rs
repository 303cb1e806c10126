//! Shared health state for the /health endpoint.
//! Updated by the refresh orchestrator after every run.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::refresh::RefreshReport;

/// Shared health metrics. Updated by the orchestrator, read by API.
pub struct HealthState {
    started_at: DateTime<Utc>,
    /// Completed refresh runs since startup.
    refresh_runs: AtomicU64,
    /// Unix millis when the last run finished (0 = none yet).
    last_refresh_at_ms: AtomicI64,
    /// Categories that failed in the last run.
    last_refresh_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            refresh_runs: AtomicU64::new(0),
            last_refresh_at_ms: AtomicI64::new(0),
            last_refresh_failures: AtomicU64::new(0),
        }
    }

    pub fn record_refresh(&self, report: &RefreshReport) {
        self.refresh_runs.fetch_add(1, Ordering::Relaxed);
        self.last_refresh_at_ms
            .store(report.finished_at.timestamp_millis(), Ordering::Relaxed);
        self.last_refresh_failures
            .store(report.failed() as u64, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    pub fn refresh_runs(&self) -> u64 {
        self.refresh_runs.load(Ordering::Relaxed)
    }

    pub fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        match self.last_refresh_at_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    pub fn last_refresh_failures(&self) -> u64 {
        self.last_refresh_failures.load(Ordering::Relaxed)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}
