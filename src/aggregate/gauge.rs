use std::sync::atomic::{AtomicU64, Ordering};

/// Last-written value for a gauge bucket.
///
/// Values are replaced wholesale, never merged, and survive report cycles
/// until the next write.
#[derive(Debug, Default)]
pub struct GaugeCell {
    bits: AtomicU64,
}

impl GaugeCell {
    pub fn new() -> GaugeCell {
        GaugeCell {
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
