//! In-memory per-bucket aggregation.
//!
//! [`Registry`] owns every aggregator. Buckets are created lazily on first
//! event, keep the kind they were created with for the life of the process,
//! and are never removed. Counters and distribution windows reset on each
//! report; gauges and meters are sticky.

mod counter;
mod distribution;
mod gauge;
mod meter;
mod reservoir;

pub use counter::CounterCell;
pub use distribution::{DistributionCell, DistributionSummary};
pub use gauge::GaugeCell;
pub use meter::{MeterCell, MeterSummary};
pub use reservoir::Reservoir;

use crate::proto::MetricKind;
use ahash::RandomState;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Default number of samples kept per distribution bucket.
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

/// An event arrived for a bucket already bound to a different kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindConflict {
    pub bucket: String,
    pub bound: MetricKind,
    pub incoming: MetricKind,
}

impl fmt::Display for KindConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bucket {:?} is a {}, dropping {} event",
            self.bucket, self.bound, self.incoming
        )
    }
}

impl Error for KindConflict {}

/// One bucket's rendered summary in a report snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSnapshot {
    pub bucket: String,
    pub kind: MetricKind,
    #[serde(flatten)]
    pub summary: Summary,
}

/// Kind-specific summary values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Summary {
    Counter { sum: f64, rate: f64 },
    Gauge { value: f64 },
    Distribution(DistributionSummary),
    Meter(MeterSummary),
}

enum MetricCell {
    Counter(CounterCell),
    Gauge(GaugeCell),
    Distribution(DistributionCell),
    Meter(MeterCell),
}

struct BucketEntry {
    kind: MetricKind,
    cell: MetricCell,
}

impl BucketEntry {
    fn new(kind: MetricKind, reservoir_size: usize) -> BucketEntry {
        let cell = match kind {
            MetricKind::Counter => MetricCell::Counter(CounterCell::new()),
            MetricKind::Gauge => MetricCell::Gauge(GaugeCell::new()),
            MetricKind::Timer | MetricKind::Histogram => {
                MetricCell::Distribution(DistributionCell::new(reservoir_size))
            }
            MetricKind::Meter => MetricCell::Meter(MeterCell::new()),
        };
        BucketEntry { kind, cell }
    }

    fn update(&self, bucket: &str, kind: MetricKind, value: f64) -> Result<(), KindConflict> {
        if self.kind != kind {
            return Err(KindConflict {
                bucket: bucket.to_string(),
                bound: self.kind,
                incoming: kind,
            });
        }
        match &self.cell {
            MetricCell::Counter(cell) => cell.add(value),
            MetricCell::Gauge(cell) => cell.set(value),
            MetricCell::Distribution(cell) => cell.record(value),
            MetricCell::Meter(cell) => cell.mark(value),
        }
        Ok(())
    }
}

/// The aggregation store: bucket name to typed aggregator.
///
/// The outer map takes a write lock only to insert a new bucket; updates
/// and snapshots run under the read lock with synchronization inside each
/// cell, so traffic on one bucket never waits on another.
pub struct Registry {
    buckets: RwLock<HashMap<String, BucketEntry, RandomState>>,
    reservoir_size: usize,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::with_reservoir_size(DEFAULT_RESERVOIR_SIZE)
    }

    pub fn with_reservoir_size(reservoir_size: usize) -> Registry {
        Registry {
            buckets: RwLock::new(HashMap::default()),
            reservoir_size,
        }
    }

    /// Applies one value to its bucket, creating the aggregator on first
    /// sight. Fails without touching anything when the bucket is already
    /// bound to a different kind.
    pub fn apply(&self, bucket: &str, kind: MetricKind, value: f64) -> Result<(), KindConflict> {
        {
            let buckets = self.buckets.read();
            if let Some(entry) = buckets.get(bucket) {
                return entry.update(bucket, kind, value);
            }
        }
        let mut buckets = self.buckets.write();
        // Another writer may have created the bucket between the two locks.
        let entry = buckets
            .entry(bucket.to_string())
            .or_insert_with(|| BucketEntry::new(kind, self.reservoir_size));
        entry.update(bucket, kind, value)
    }

    /// Renders every known bucket and applies the per-kind reset policy:
    /// counter sums and distribution windows are cleared, gauges and meters
    /// are left alone. Each bucket resets atomically against concurrent
    /// `apply` calls. `window` is the report period, used for counter
    /// per-second rates.
    pub fn snapshot_and_reset(&self, window: Duration) -> Vec<BucketSnapshot> {
        let window_secs = window.as_secs_f64();
        let buckets = self.buckets.read();
        let mut snapshot = Vec::with_capacity(buckets.len());
        for (name, entry) in buckets.iter() {
            let summary = match &entry.cell {
                MetricCell::Counter(cell) => {
                    let sum = cell.take();
                    let rate = if window_secs > 0.0 { sum / window_secs } else { 0.0 };
                    Summary::Counter { sum, rate }
                }
                MetricCell::Gauge(cell) => Summary::Gauge {
                    value: cell.value(),
                },
                MetricCell::Distribution(cell) => Summary::Distribution(cell.snapshot_and_reset()),
                MetricCell::Meter(cell) => Summary::Meter(cell.snapshot()),
            };
            snapshot.push(BucketSnapshot {
                bucket: name.clone(),
                kind: entry.kind,
                summary,
            });
        }
        drop(buckets);
        snapshot.sort_by(|a, b| a.bucket.cmp(&b.bucket));
        snapshot
    }

    /// Number of known buckets.
    pub fn len(&self) -> usize {
        self.buckets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.read().is_empty()
    }

    /// The kind a bucket is bound to, if it exists yet.
    pub fn kind_of(&self, bucket: &str) -> Option<MetricKind> {
        self.buckets.read().get(bucket).map(|entry| entry.kind)
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_summary(snapshot: &[BucketSnapshot], bucket: &str) -> (f64, f64) {
        let entry = snapshot
            .iter()
            .find(|s| s.bucket == bucket)
            .unwrap_or_else(|| panic!("bucket {:?} missing from snapshot", bucket));
        match entry.summary {
            Summary::Counter { sum, rate } => (sum, rate),
            ref other => panic!("expected counter summary, got {:?}", other),
        }
    }

    #[test]
    fn test_counter_sums_and_resets_per_window() {
        let registry = Registry::new();
        registry.apply("requests", MetricKind::Counter, 4.0).unwrap();
        registry.apply("requests", MetricKind::Counter, 6.0).unwrap();

        let first = registry.snapshot_and_reset(Duration::from_secs(10));
        assert_eq!(counter_summary(&first, "requests"), (10.0, 1.0));

        // The bucket stays known and reports an empty window.
        let second = registry.snapshot_and_reset(Duration::from_secs(10));
        assert_eq!(counter_summary(&second, "requests"), (0.0, 0.0));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_gauge_keeps_last_value_across_windows() {
        let registry = Registry::new();
        registry.apply("temp", MetricKind::Gauge, 10.0).unwrap();
        registry.apply("temp", MetricKind::Gauge, 21.5).unwrap();

        for _ in 0..2 {
            let snapshot = registry.snapshot_and_reset(Duration::from_secs(10));
            assert_eq!(
                snapshot[0].summary,
                Summary::Gauge { value: 21.5 },
                "gauge must survive reporting"
            );
        }
    }

    #[test]
    fn test_timer_and_histogram_share_distribution_semantics() {
        let registry = Registry::new();
        registry.apply("lat", MetricKind::Timer, 100.0).unwrap();
        registry.apply("lat", MetricKind::Timer, 300.0).unwrap();
        registry.apply("size", MetricKind::Histogram, 7.0).unwrap();

        let snapshot = registry.snapshot_and_reset(Duration::from_secs(10));
        let lat = snapshot.iter().find(|s| s.bucket == "lat").unwrap();
        assert_eq!(lat.kind, MetricKind::Timer);
        match &lat.summary {
            Summary::Distribution(d) => {
                assert_eq!(d.count, 2);
                assert_eq!(d.min, 100.0);
                assert_eq!(d.max, 300.0);
            }
            other => panic!("expected distribution, got {:?}", other),
        }
        let size = snapshot.iter().find(|s| s.bucket == "size").unwrap();
        assert_eq!(size.kind, MetricKind::Histogram);
    }

    #[test]
    fn test_kind_conflict_rejected_without_side_effects() {
        let registry = Registry::new();
        registry.apply("dual", MetricKind::Counter, 5.0).unwrap();

        let err = registry.apply("dual", MetricKind::Gauge, 9.0).unwrap_err();
        assert_eq!(err.bucket, "dual");
        assert_eq!(err.bound, MetricKind::Counter);
        assert_eq!(err.incoming, MetricKind::Gauge);
        assert_eq!(registry.kind_of("dual"), Some(MetricKind::Counter));

        let snapshot = registry.snapshot_and_reset(Duration::from_secs(10));
        assert_eq!(counter_summary(&snapshot, "dual"), (5.0, 0.5));
    }

    #[test]
    fn test_timer_and_histogram_kinds_do_not_mix() {
        // Same aggregation, distinct kinds: a timer bucket rejects
        // histogram events.
        let registry = Registry::new();
        registry.apply("lat", MetricKind::Timer, 1.0).unwrap();
        let err = registry.apply("lat", MetricKind::Histogram, 2.0).unwrap_err();
        assert_eq!(err.bound, MetricKind::Timer);
        assert_eq!(err.incoming, MetricKind::Histogram);
    }

    #[test]
    fn test_meter_counts_through_registry() {
        let registry = Registry::new();
        registry.apply("logins", MetricKind::Meter, 1.0).unwrap();
        registry.apply("logins", MetricKind::Meter, 1.0).unwrap();

        let snapshot = registry.snapshot_and_reset(Duration::from_secs(10));
        match &snapshot[0].summary {
            Summary::Meter(m) => assert_eq!(m.count, 2.0),
            other => panic!("expected meter, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_sorted_by_bucket_name() {
        let registry = Registry::new();
        registry.apply("zeta", MetricKind::Counter, 1.0).unwrap();
        registry.apply("alpha", MetricKind::Counter, 1.0).unwrap();
        registry.apply("mid", MetricKind::Gauge, 1.0).unwrap();

        let snapshot = registry.snapshot_and_reset(Duration::from_secs(10));
        let names: Vec<&str> = snapshot.iter().map(|s| s.bucket.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_concurrent_apply_and_snapshot_conserve_counts() {
        let registry = Registry::new();
        let total_adds = 20_000;

        let drained = std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                for _ in 0..total_adds {
                    registry.apply("hot", MetricKind::Counter, 1.0).unwrap();
                }
            });
            let snapshotter = scope.spawn(|| {
                let mut drained = 0.0;
                for _ in 0..200 {
                    for entry in registry.snapshot_and_reset(Duration::from_secs(1)) {
                        if let Summary::Counter { sum, .. } = entry.summary {
                            drained += sum;
                        }
                    }
                }
                drained
            });
            writer.join().expect("writer panicked");
            snapshotter.join().expect("snapshotter panicked")
        });

        let mut total = drained;
        for entry in registry.snapshot_and_reset(Duration::from_secs(1)) {
            if let Summary::Counter { sum, .. } = entry.summary {
                total += sum;
            }
        }
        assert_eq!(total, total_adds as f64, "windows must partition the adds");
    }

    #[test]
    fn test_snapshot_serializes_flat_json() {
        let registry = Registry::new();
        registry.apply("requests", MetricKind::Counter, 10.0).unwrap();

        let snapshot = registry.snapshot_and_reset(Duration::from_secs(10));
        let json = serde_json::to_value(&snapshot[0]).expect("snapshot should encode");
        assert_eq!(json["bucket"], "requests");
        assert_eq!(json["kind"], "counter");
        assert_eq!(json["sum"], 10.0);
        assert_eq!(json["rate"], 1.0);
    }
}
