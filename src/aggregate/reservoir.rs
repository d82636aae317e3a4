use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A fixed-size uniform sample of an unbounded value stream.
///
/// Vitter's Algorithm R: the first `capacity` values are stored directly;
/// after that each value replaces a random slot with probability
/// `capacity / seen`, which keeps every value offered so far equally likely
/// to be in the sample.
pub struct Reservoir {
    samples: Vec<f64>,
    capacity: usize,
    pushed: u64,
    rng: ChaCha8Rng,
}

impl Reservoir {
    pub fn new(capacity: usize) -> Reservoir {
        Reservoir::with_rng(capacity, ChaCha8Rng::from_entropy())
    }

    /// A reservoir with a fixed seed, for deterministic sampling.
    pub fn seeded(capacity: usize, seed: u64) -> Reservoir {
        Reservoir::with_rng(capacity, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(capacity: usize, rng: ChaCha8Rng) -> Reservoir {
        Reservoir {
            samples: Vec::with_capacity(capacity),
            capacity,
            pushed: 0,
            rng,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.pushed += 1;
        if self.samples.len() < self.capacity {
            self.samples.push(value);
        } else {
            let slot = self.rng.gen_range(0..self.pushed);
            if (slot as usize) < self.capacity {
                self.samples[slot as usize] = value;
            }
        }
    }

    /// Number of values offered since the last clear.
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.pushed = 0;
    }
}
