//! Prefix-sum array over a sparse support.
//!
//! The cheapest structure when the distribution is rebuilt for every
//! draw: O(support) build, O(log support) binary-search sampling.

use crate::traits::{DiscreteSampler, ResampleFrom};
use anyhow::ensure;
use rand::Rng;

/// Cumulative distribution over a sparse support.
#[derive(Debug, Clone, Default)]
pub struct CumulativeDist {
    /// Inclusive prefix sums of the weights
    cum: Vec<f64>,
    /// Outcome label per position (identity when built dense)
    space: Vec<u32>,
    used: usize,
}

impl CumulativeDist {
    /// Create an empty distribution with capacity for `k` outcomes.
    pub fn with_capacity(k: usize) -> Self {
        let mut d = CumulativeDist::default();
        d.reset(k);
        d
    }

    /// Number of active outcomes.
    pub fn len(&self) -> usize {
        self.used
    }

    /// True when no distribution has been built.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Weight of position `i` (position, not label).
    #[inline]
    pub fn weight(&self, i: usize) -> f64 {
        debug_assert!(i < self.used);
        if i == 0 {
            self.cum[0]
        } else {
            self.cum[i] - self.cum[i - 1]
        }
    }

    #[inline]
    fn search(&self, u: f64) -> u32 {
        let pos = self.cum[..self.used].partition_point(|&c| c <= u);
        let pos = pos.min(self.used - 1);
        self.space[pos]
    }
}

impl DiscreteSampler for CumulativeDist {
    fn reset(&mut self, k: usize) {
        self.cum.clear();
        self.cum.reserve(k);
        self.space.clear();
        self.space.reserve(k);
        self.used = 0;
    }

    fn reset_dist(
        &mut self,
        weights: &[f64],
        space: Option<&[u32]>,
        used: usize,
    ) -> anyhow::Result<()> {
        debug_assert!(used <= weights.len());
        self.cum.resize(used, 0.0);
        let mut running = 0.0;
        for (i, &w) in weights[..used].iter().enumerate() {
            running += w;
            self.cum[i] = running;
        }
        ensure!(
            running > 0.0 && running.is_finite(),
            "cumulative build with non-positive norm {} over {} outcomes",
            running,
            used
        );

        self.used = used;
        self.space.resize(used, 0);
        match space {
            Some(sp) => self.space.copy_from_slice(&sp[..used]),
            None => {
                for (i, s) in self.space.iter_mut().enumerate() {
                    *s = i as u32;
                }
            }
        }
        Ok(())
    }

    #[inline]
    fn norm(&self) -> f64 {
        if self.used == 0 {
            0.0
        } else {
            self.cum[self.used - 1]
        }
    }

    #[inline]
    fn sample_from<R: Rng>(&self, u: f64, _rng: &mut R) -> u32 {
        debug_assert!(self.used > 0);
        self.search(u.clamp(0.0, self.norm()))
    }
}

impl ResampleFrom for CumulativeDist {}
