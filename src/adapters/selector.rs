use crate::domain::ports::Selector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform draw over the pool.
#[derive(Debug, Clone)]
pub struct RandomSelector {
    rng: StdRng,
}

impl RandomSelector {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for RandomSelector {
    fn pick(&mut self, pool_len: usize) -> usize {
        if pool_len == 0 {
            return 0;
        }
        self.rng.gen_range(0..pool_len)
    }
}
