//! Periodic report generation.

use super::lifecycle::{ServiceState, Stage};
use super::sink::ReportSink;
use super::ServerError;
use crate::aggregate::{BucketSnapshot, Registry, Summary};
use crate::config::{ConfigError, ReportFormat, ServerConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error};

/// Drives the report cycle: every interval, snapshot-and-reset the registry
/// and hand the formatted lines to the sink.
///
/// The cadence is what gives counter resets their meaning, so the reporter
/// owns the interval; stopping it mid-window simply drops that window.
pub struct Reporter {
    registry: Arc<Registry>,
    sink: Arc<dyn ReportSink>,
    interval: Duration,
    format: ReportFormat,
    state: Arc<ServiceState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Reporter {
    pub fn new(registry: Arc<Registry>, sink: Arc<dyn ReportSink>, config: &ServerConfig) -> Reporter {
        Reporter {
            registry,
            sink,
            interval: config.report_interval(),
            format: config.report_format,
            state: Arc::new(ServiceState::new()),
            task: Mutex::new(None),
        }
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Spawns the report loop. The first report lands one full interval
    /// after the start, never immediately.
    ///
    /// A zero interval is refused and the stage stays [`Stage::Created`].
    pub fn start(&self) -> Result<(), ServerError> {
        if self.interval.is_zero() {
            return Err(ServerError::Config(ConfigError::ZeroInterval));
        }
        self.state.begin_running().map_err(ServerError::AlreadyStarted)?;
        debug!("reporter started with interval {:?}", self.interval);
        let task = tokio::spawn(report_loop(
            self.registry.clone(),
            self.sink.clone(),
            self.state.clone(),
            self.interval,
            self.format,
        ));
        *self.task.lock() = Some(task);
        Ok(())
    }

    /// Requests a stop and waits for the loop to exit. No final report is
    /// emitted for the partial window.
    pub async fn stop(&self) {
        if let Some(Stage::Created) = self.state.request_stop() {
            self.state.mark_stopped();
            return;
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if task.await.is_err() {
                // A dead loop never reached its own mark_stopped.
                error!("report loop task panicked");
                self.state.mark_stopped();
            }
        }
    }
}

async fn report_loop(
    registry: Arc<Registry>,
    sink: Arc<dyn ReportSink>,
    state: Arc<ServiceState>,
    interval: Duration,
    format: ReportFormat,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    loop {
        tokio::select! {
            _ = state.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = registry.snapshot_and_reset(interval);
                if snapshot.is_empty() {
                    continue;
                }
                sink.emit(&format_report(&snapshot, format));
            }
        }
    }
    state.mark_stopped();
    debug!("reporter stopped");
}

/// Renders one report, one line per bucket.
pub fn format_report(snapshot: &[BucketSnapshot], format: ReportFormat) -> Vec<String> {
    let mut lines = Vec::with_capacity(snapshot.len());
    for bucket in snapshot {
        match format {
            ReportFormat::Text => lines.push(text_line(bucket)),
            ReportFormat::Json => match serde_json::to_string(bucket) {
                Ok(line) => lines.push(line),
                Err(e) => error!("Failed to encode report line for {}: {}", bucket.bucket, e),
            },
        }
    }
    lines
}

/// One bucket as a space-separated key=value line. Raw magnitudes keep
/// their exact value; derived statistics print with two decimals.
fn text_line(snapshot: &BucketSnapshot) -> String {
    match &snapshot.summary {
        Summary::Counter { sum, rate } => {
            format!("{} kind=counter sum={} rate={:.2}", snapshot.bucket, sum, rate)
        }
        Summary::Gauge { value } => {
            format!("{} kind=gauge value={}", snapshot.bucket, value)
        }
        Summary::Distribution(d) => format!(
            "{} kind={} count={} min={:.2} max={:.2} mean={:.2} stddev={:.2} p50={:.2} p75={:.2} p95={:.2} p99={:.2}",
            snapshot.bucket,
            snapshot.kind,
            d.count,
            d.min,
            d.max,
            d.mean,
            d.stddev,
            d.p50,
            d.p75,
            d.p95,
            d.p99,
        ),
        Summary::Meter(m) => format!(
            "{} kind=meter count={} mean_rate={:.2} m1_rate={:.2} m5_rate={:.2} m15_rate={:.2}",
            snapshot.bucket, m.count, m.mean_rate, m.m1_rate, m.m5_rate, m.m15_rate,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::MetricKind;

    fn snapshot_for(registry: &Registry) -> Vec<BucketSnapshot> {
        registry.snapshot_and_reset(Duration::from_secs(10))
    }

    #[test]
    fn test_text_lines() {
        let registry = Registry::new();
        registry.apply("requests", MetricKind::Counter, 20.0).unwrap();
        registry.apply("temperature", MetricKind::Gauge, 21.5).unwrap();
        registry.apply("lat", MetricKind::Timer, 100.0).unwrap();
        registry.apply("lat", MetricKind::Timer, 300.0).unwrap();

        let lines = format_report(&snapshot_for(&registry), ReportFormat::Text);
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "lat kind=timer count=2 min=100.00 max=300.00 mean=200.00 stddev=141.42 \
             p50=200.00 p75=300.00 p95=300.00 p99=300.00"
        );
        assert_eq!(lines[1], "requests kind=counter sum=20 rate=2.00");
        assert_eq!(lines[2], "temperature kind=gauge value=21.5");
    }

    #[test]
    fn test_meter_text_line_shape() {
        let registry = Registry::new();
        registry.apply("logins", MetricKind::Meter, 1.0).unwrap();

        let lines = format_report(&snapshot_for(&registry), ReportFormat::Text);
        assert!(lines[0].starts_with("logins kind=meter count=1 "), "{}", lines[0]);
        assert!(lines[0].contains("m1_rate="), "{}", lines[0]);
    }

    #[test]
    fn test_json_lines() {
        let registry = Registry::new();
        registry.apply("requests", MetricKind::Counter, 10.0).unwrap();

        let lines = format_report(&snapshot_for(&registry), ReportFormat::Json);
        let value: serde_json::Value =
            serde_json::from_str(&lines[0]).expect("line should be valid JSON");
        assert_eq!(value["bucket"], "requests");
        assert_eq!(value["kind"], "counter");
        assert_eq!(value["sum"], 10.0);
        assert_eq!(value["rate"], 1.0);
    }

    #[test]
    fn test_json_distribution_fields_flattened() {
        let registry = Registry::new();
        registry.apply("lat", MetricKind::Timer, 5.0).unwrap();

        let lines = format_report(&snapshot_for(&registry), ReportFormat::Json);
        let value: serde_json::Value =
            serde_json::from_str(&lines[0]).expect("line should be valid JSON");
        assert_eq!(value["kind"], "timer");
        assert_eq!(value["count"], 1);
        assert_eq!(value["p99"], 5.0);
        assert!(value.get("summary").is_none(), "fields must be flattened");
    }
}
