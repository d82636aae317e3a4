use std::sync::atomic::{AtomicU64, Ordering};

/// Running sum for a counter bucket.
///
/// The sum is an `f64` stored as raw bits in an atomic, so concurrent adds
/// and the snapshot-and-reset swap are lock free.
#[derive(Debug, Default)]
pub struct CounterCell {
    bits: AtomicU64,
}

impl CounterCell {
    pub fn new() -> CounterCell {
        CounterCell {
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Adds `delta` to the running sum.
    pub fn add(&self, delta: f64) {
        let _ = self.bits.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            Some((f64::from_bits(bits) + delta).to_bits())
        });
    }

    /// Current sum, without resetting.
    pub fn sum(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Returns the sum and resets it to zero in one atomic step. A
    /// concurrent `add` lands either in the returned window or the next
    /// one, never both and never neither.
    pub fn take(&self) -> f64 {
        f64::from_bits(self.bits.swap(0f64.to_bits(), Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_accumulates() {
        let cell = CounterCell::new();
        cell.add(1.0);
        cell.add(4.0);
        cell.add(2.5);
        assert_eq!(cell.sum(), 7.5);
    }

    #[test]
    fn test_negative_deltas() {
        let cell = CounterCell::new();
        cell.add(10.0);
        cell.add(-4.0);
        assert_eq!(cell.sum(), 6.0);
    }

    #[test]
    fn test_take_returns_and_resets() {
        let cell = CounterCell::new();
        cell.add(20.0);
        assert_eq!(cell.take(), 20.0);
        assert_eq!(cell.sum(), 0.0);
        assert_eq!(cell.take(), 0.0);
    }

    #[test]
    fn test_concurrent_adds_preserve_total() {
        let cell = CounterCell::new();
        let threads = 4;
        let adds_per_thread = 25_000;

        std::thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|| {
                    for _ in 0..adds_per_thread {
                        cell.add(1.0);
                    }
                });
            }
        });

        let expected = (threads * adds_per_thread) as f64;
        assert_eq!(cell.sum(), expected, "all adds must survive contention");
    }

    #[test]
    fn test_concurrent_takes_never_lose_or_double_count() {
        let cell = CounterCell::new();
        let total_adds = 50_000;

        let drained = std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                for _ in 0..total_adds {
                    cell.add(1.0);
                }
            });
            let taker = scope.spawn(|| {
                let mut drained = 0.0;
                for _ in 0..1_000 {
                    drained += cell.take();
                    std::hint::spin_loop();
                }
                drained
            });
            writer.join().expect("writer panicked");
            taker.join().expect("taker panicked")
        });

        let total = drained + cell.take();
        assert_eq!(total, total_adds as f64, "windows must partition the adds");
    }
}
