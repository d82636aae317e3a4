use super::Reservoir;
use parking_lot::Mutex;
use serde::Serialize;

/// Window statistics for a timer or histogram bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistributionSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub p99: f64,
}

impl DistributionSummary {
    fn empty() -> DistributionSummary {
        DistributionSummary {
            count: 0,
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            stddev: 0.0,
            p50: 0.0,
            p75: 0.0,
            p95: 0.0,
            p99: 0.0,
        }
    }
}

struct DistributionState {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
    sum_of_squares: f64,
    reservoir: Reservoir,
}

/// Aggregates a stream of observed values (timings, sizes) for one bucket.
///
/// Count, min, max, mean and stddev cover every value in the window; the
/// quantiles are estimated from a bounded uniform sample so memory stays
/// fixed no matter the event volume. Snapshotting clears the window.
pub struct DistributionCell {
    inner: Mutex<DistributionState>,
}

impl DistributionCell {
    pub fn new(reservoir_size: usize) -> DistributionCell {
        DistributionCell::with_reservoir(Reservoir::new(reservoir_size))
    }

    pub fn with_reservoir(reservoir: Reservoir) -> DistributionCell {
        DistributionCell {
            inner: Mutex::new(DistributionState {
                count: 0,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
                sum: 0.0,
                sum_of_squares: 0.0,
                reservoir,
            }),
        }
    }

    pub fn record(&self, value: f64) {
        let mut state = self.inner.lock();
        state.count += 1;
        state.min = state.min.min(value);
        state.max = state.max.max(value);
        state.sum += value;
        state.sum_of_squares += value * value;
        state.reservoir.push(value);
    }

    /// Number of values recorded in the current window.
    pub fn count(&self) -> u64 {
        self.inner.lock().count
    }

    /// Renders the window summary and clears the window in one critical
    /// section, so a concurrent `record` lands cleanly in the next window.
    pub fn snapshot_and_reset(&self) -> DistributionSummary {
        let mut state = self.inner.lock();
        let summary = state.summarize();
        state.reset();
        summary
    }
}

impl DistributionState {
    fn summarize(&self) -> DistributionSummary {
        if self.count == 0 {
            return DistributionSummary::empty();
        }
        let count = self.count as f64;
        let mean = self.sum / count;
        let stddev = if self.count > 1 {
            let variance = (self.sum_of_squares - self.sum * self.sum / count) / (count - 1.0);
            // Cancellation can push the estimate a hair below zero.
            variance.max(0.0).sqrt()
        } else {
            0.0
        };

        let mut samples = self.reservoir.samples().to_vec();
        samples.sort_by(f64::total_cmp);

        DistributionSummary {
            count: self.count,
            min: self.min,
            max: self.max,
            mean,
            stddev,
            p50: quantile(&samples, 0.50),
            p75: quantile(&samples, 0.75),
            p95: quantile(&samples, 0.95),
            p99: quantile(&samples, 0.99),
        }
    }

    fn reset(&mut self) {
        self.count = 0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
        self.sum = 0.0;
        self.sum_of_squares = 0.0;
        self.reservoir.clear();
    }
}

/// Estimates quantile `q` by linear interpolation between the two sorted
/// samples straddling position `q * (n + 1)`.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let position = q * (sorted.len() + 1) as f64;
    let index = position as usize;
    if index < 1 {
        sorted[0]
    } else if index >= sorted.len() {
        sorted[sorted.len() - 1]
    } else {
        let lower = sorted[index - 1];
        let upper = sorted[index];
        lower + (position - position.floor()) * (upper - lower)
    }
}
