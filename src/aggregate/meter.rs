use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Moving rates advance in fixed five-second ticks.
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Rate summary for a meter bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeterSummary {
    pub count: f64,
    pub mean_rate: f64,
    pub m1_rate: f64,
    pub m5_rate: f64,
    pub m15_rate: f64,
}

/// One exponentially weighted moving average over a fixed window.
struct Ewma {
    alpha: f64,
    rate: f64,
    primed: bool,
}

impl Ewma {
    fn new(window_secs: f64) -> Ewma {
        Ewma {
            alpha: 1.0 - (-TICK_INTERVAL.as_secs_f64() / window_secs).exp(),
            rate: 0.0,
            primed: false,
        }
    }

    /// Folds one tick's instantaneous rate into the average. The first
    /// tick seeds the average directly instead of decaying from zero.
    fn tick(&mut self, instant_rate: f64) {
        if self.primed {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.primed = true;
        }
    }
}

struct MeterState {
    count: f64,
    uncounted: f64,
    started: Instant,
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl MeterState {
    /// Catches the averages up to `now`, one fixed-width tick at a time.
    /// Ticks past the first consume an empty interval, so idle stretches
    /// decay the rates toward zero.
    fn tick_if_due(&mut self, now: Instant) {
        while now.saturating_duration_since(self.last_tick) >= TICK_INTERVAL {
            let instant_rate = self.uncounted / TICK_INTERVAL.as_secs_f64();
            self.uncounted = 0.0;
            self.m1.tick(instant_rate);
            self.m5.tick(instant_rate);
            self.m15.tick(instant_rate);
            self.last_tick += TICK_INTERVAL;
        }
    }
}

/// Event-rate tracker for a meter bucket.
///
/// Keeps a lifetime event count plus 1, 5 and 15 minute exponentially
/// weighted moving rates. Reporting never resets a meter; the rates decay
/// on their own as ticks pass without events.
pub struct MeterCell {
    inner: Mutex<MeterState>,
}

impl MeterCell {
    pub fn new() -> MeterCell {
        MeterCell::new_at(Instant::now())
    }

    /// A meter whose clock starts at `origin`, for deterministic tests.
    pub fn new_at(origin: Instant) -> MeterCell {
        MeterCell {
            inner: Mutex::new(MeterState {
                count: 0.0,
                uncounted: 0.0,
                started: origin,
                last_tick: origin,
                m1: Ewma::new(60.0),
                m5: Ewma::new(300.0),
                m15: Ewma::new(900.0),
            }),
        }
    }

    pub fn mark(&self, value: f64) {
        self.mark_at(value, Instant::now());
    }

    pub fn mark_at(&self, value: f64, now: Instant) {
        let mut state = self.inner.lock();
        state.tick_if_due(now);
        state.count += value;
        state.uncounted += value;
    }

    pub fn snapshot(&self) -> MeterSummary {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> MeterSummary {
        let mut state = self.inner.lock();
        state.tick_if_due(now);
        let elapsed = now.saturating_duration_since(state.started).as_secs_f64();
        MeterSummary {
            count: state.count,
            mean_rate: if elapsed > 0.0 { state.count / elapsed } else { 0.0 },
            m1_rate: state.m1.rate,
            m5_rate: state.m5.rate,
            m15_rate: state.m15.rate,
        }
    }
}
