//! The event routing seam between the listener and whatever consumes
//! metrics.

use crate::aggregate::Registry;
use crate::proto::{Event, MetricKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Capability interface for receiving decoded events, one method per kind.
///
/// Implementations differ in where events go (the aggregation store, the
/// console, a test buffer), never in how events are decoded or routed.
pub trait Backend: Send + Sync + 'static {
    fn count(&self, bucket: &str, value: f64);
    fn gauge(&self, bucket: &str, value: f64);
    fn time(&self, bucket: &str, value: f64);
    fn histogram(&self, bucket: &str, value: f64);
    fn mark(&self, bucket: &str, value: f64);

    /// Routes a decoded event to the matching per-kind method.
    ///
    /// Counter magnitudes are scaled by `1 / sample_rate`, so a client
    /// sampling at 0.5 still produces an unbiased total. Distribution and
    /// meter values pass through raw: scaling an observed timing would
    /// distort the quantiles, and window counts reflect received samples.
    fn dispatch(&self, event: &Event) {
        match event.kind {
            MetricKind::Counter => self.count(&event.bucket, event.value / event.sample_rate),
            MetricKind::Gauge => self.gauge(&event.bucket, event.value),
            MetricKind::Timer => self.time(&event.bucket, event.value),
            MetricKind::Histogram => self.histogram(&event.bucket, event.value),
            MetricKind::Meter => self.mark(&event.bucket, event.value),
        }
    }
}

/// Shared handle used across tasks.
pub type SharedBackend = Arc<dyn Backend>;

/// The production backend: forwards every event into a [`Registry`].
///
/// A kind conflict is logged and counted, and the event is dropped; the
/// existing aggregator is never disturbed.
pub struct RegistryBackend {
    registry: Arc<Registry>,
    conflicts: AtomicU64,
}

impl RegistryBackend {
    pub fn new(registry: Arc<Registry>) -> RegistryBackend {
        RegistryBackend {
            registry,
            conflicts: AtomicU64::new(0),
        }
    }

    /// Number of events dropped because their bucket was bound to another
    /// kind.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    fn apply(&self, bucket: &str, kind: MetricKind, value: f64) {
        if let Err(conflict) = self.registry.apply(bucket, kind, value) {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            warn!("{}", conflict);
        }
    }
}

impl Backend for RegistryBackend {
    fn count(&self, bucket: &str, value: f64) {
        self.apply(bucket, MetricKind::Counter, value);
    }

    fn gauge(&self, bucket: &str, value: f64) {
        self.apply(bucket, MetricKind::Gauge, value);
    }

    fn time(&self, bucket: &str, value: f64) {
        self.apply(bucket, MetricKind::Timer, value);
    }

    fn histogram(&self, bucket: &str, value: f64) {
        self.apply(bucket, MetricKind::Histogram, value);
    }

    fn mark(&self, bucket: &str, value: f64) {
        self.apply(bucket, MetricKind::Meter, value);
    }
}

/// Echoes every event to stdout in wire form. Diagnostic use: the daemon
/// selects it with `STATSD_ECHO=1` and prints what survived decoding
/// instead of aggregating it.
pub struct ConsoleBackend;

fn wire_line(kind: MetricKind, bucket: &str, value: f64) -> String {
    format!("{}:{}|{}", bucket, value, kind.wire_token())
}

impl Backend for ConsoleBackend {
    fn count(&self, bucket: &str, value: f64) {
        println!("{}", wire_line(MetricKind::Counter, bucket, value));
    }

    fn gauge(&self, bucket: &str, value: f64) {
        println!("{}", wire_line(MetricKind::Gauge, bucket, value));
    }

    fn time(&self, bucket: &str, value: f64) {
        println!("{}", wire_line(MetricKind::Timer, bucket, value));
    }

    fn histogram(&self, bucket: &str, value: f64) {
        println!("{}", wire_line(MetricKind::Histogram, bucket, value));
    }

    fn mark(&self, bucket: &str, value: f64) {
        println!("{}", wire_line(MetricKind::Meter, bucket, value));
    }
}

/// Captures events in memory for assertions.
#[derive(Default)]
pub struct RecordingBackend {
    recorded: Mutex<Vec<(MetricKind, String, f64)>>,
}

impl RecordingBackend {
    pub fn new() -> RecordingBackend {
        RecordingBackend::default()
    }

    pub fn recorded(&self) -> Vec<(MetricKind, String, f64)> {
        self.recorded.lock().clone()
    }

    /// Kind and value of every event recorded for `bucket`, in order.
    pub fn by_bucket(&self, bucket: &str) -> Vec<(MetricKind, f64)> {
        self.recorded
            .lock()
            .iter()
            .filter(|(_, recorded, _)| recorded == bucket)
            .map(|(kind, _, value)| (*kind, *value))
            .collect()
    }

    pub fn clear(&self) {
        self.recorded.lock().clear();
    }

    fn push(&self, kind: MetricKind, bucket: &str, value: f64) {
        self.recorded.lock().push((kind, bucket.to_string(), value));
    }
}

impl Backend for RecordingBackend {
    fn count(&self, bucket: &str, value: f64) {
        self.push(MetricKind::Counter, bucket, value);
    }

    fn gauge(&self, bucket: &str, value: f64) {
        self.push(MetricKind::Gauge, bucket, value);
    }

    fn time(&self, bucket: &str, value: f64) {
        self.push(MetricKind::Timer, bucket, value);
    }

    fn histogram(&self, bucket: &str, value: f64) {
        self.push(MetricKind::Histogram, bucket, value);
    }

    fn mark(&self, bucket: &str, value: f64) {
        self.push(MetricKind::Meter, bucket, value);
    }
}
