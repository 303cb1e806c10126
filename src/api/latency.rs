//! In-memory latency histograms for refresh instrumentation.
//! One histogram per source, recording each unit's fetch → upsert duration.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

/// Values stored in microseconds. Tracks 1us to 10min, 3 significant figures.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl LatencyStats {
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 600_000_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    /// Durations above the upper bound are clamped to it.
    pub fn record(&self, d: Duration) {
        let us = d.as_micros().min(u128::from(u64::MAX)) as u64;
        if let Ok(mut h) = self.inner.lock() {
            h.saturating_record(us.max(1));
        }
    }

    pub fn summary(&self) -> LatencySummary {
        let Ok(h) = self.inner.lock() else {
            return LatencySummary::default();
        };
        if h.len() == 0 {
            return LatencySummary::default();
        }
        let ms = |q: f64| Some(h.value_at_quantile(q) as f64 / 1000.0);
        LatencySummary {
            samples: h.len(),
            p50_ms: ms(0.5),
            p95_ms: ms(0.95),
            p99_ms: ms(0.99),
            max_ms: Some(h.max() as f64 / 1000.0),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

/// Refresh orchestrator records, API reads.
#[derive(Default)]
pub struct SourceLatency {
    by_source: DashMap<&'static str, LatencyStats>,
}

impl SourceLatency {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, source: &'static str, d: Duration) {
        self.by_source.entry(source).or_default().record(d);
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, LatencySummary> {
        self.by_source
            .iter()
            .map(|entry| (*entry.key(), entry.value().summary()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let summary = LatencyStats::new().summary();
        assert_eq!(summary.samples, 0);
        assert!(summary.p50_ms.is_none());
    }

    #[test]
    fn records_per_source() {
        let latency = SourceLatency::new();
        latency.record("cnn_fear_greed", Duration::from_millis(120));
        latency.record("cnn_fear_greed", Duration::from_millis(180));
        latency.record("polygon_premarket", Duration::from_millis(40));

        let snapshot = latency.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["cnn_fear_greed"].samples, 2);
        let p99 = snapshot["polygon_premarket"].p99_ms.unwrap();
        assert!((p99 - 40.0).abs() < 0.1);
    }
}
