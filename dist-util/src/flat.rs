//! Linear-scan sampler.
//!
//! Presents the same interface as the alias table but keeps the raw
//! weights and scans them at sample time. Preferable when every
//! sub-distribution is rebuilt per token anyway, so no build cost can be
//! amortized.

use crate::traits::{DiscreteSampler, ResampleFrom};
use anyhow::ensure;
use rand::Rng;

/// Flat weight array over a dense or sparse outcome space.
#[derive(Debug, Clone, Default)]
pub struct FlatDist {
    weights: Vec<f64>,
    space: Vec<u32>,
    used: usize,
    norm: f64,
}

impl FlatDist {
    /// Create an empty distribution with capacity for `k` outcomes.
    pub fn with_capacity(k: usize) -> Self {
        let mut d = FlatDist::default();
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
}

impl DiscreteSampler for FlatDist {
    fn reset(&mut self, k: usize) {
        self.weights.clear();
        self.weights.reserve(k);
        self.space.clear();
        self.space.reserve(k);
        self.used = 0;
        self.norm = 0.0;
    }

    fn reset_dist(
        &mut self,
        weights: &[f64],
        space: Option<&[u32]>,
        used: usize,
    ) -> anyhow::Result<()> {
        debug_assert!(used <= weights.len());
        let norm: f64 = weights[..used].iter().sum();
        ensure!(
            norm > 0.0 && norm.is_finite(),
            "flat build with non-positive norm {} over {} outcomes",
            norm,
            used
        );

        self.weights.resize(used, 0.0);
        self.weights.copy_from_slice(&weights[..used]);
        self.space.resize(used, 0);
        match space {
            Some(sp) => self.space.copy_from_slice(&sp[..used]),
            None => {
                for (i, s) in self.space.iter_mut().enumerate() {
                    *s = i as u32;
                }
            }
        }
        self.used = used;
        self.norm = norm;
        Ok(())
    }

    #[inline]
    fn norm(&self) -> f64 {
        self.norm
    }

    fn sample_from<R: Rng>(&self, u: f64, _rng: &mut R) -> u32 {
        debug_assert!(self.used > 0);
        let mut remaining = u.clamp(0.0, self.norm);
        for i in 0..self.used {
            remaining -= self.weights[i];
            if remaining < 0.0 {
                return self.space[i];
            }
        }
        self.space[self.used - 1]
    }
}

impl ResampleFrom for FlatDist {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_matches_expected_frequencies() {
        let weights = vec![1.0, 3.0];
        let mut d = FlatDist::default();
        d.reset_dist(&weights, None, 2).unwrap();

        let mut rng = SmallRng::seed_from_u64(17);
        let n = 100_000;
        let mut ones = 0usize;
        for _ in 0..n {
            let u = rng.random::<f64>() * d.norm();
            if d.sample_from(u, &mut rng) == 1 {
                ones += 1;
            }
        }
        let f = ones as f64 / n as f64;
        assert!((f - 0.75).abs() < 0.01, "P(1) = {}", f);
    }

    #[test]
    fn test_sparse_labels() {
        let weights = vec![1.0, 1.0];
        let space = vec![3u32, 9];
        let mut d = FlatDist::default();
        d.reset_dist(&weights, Some(&space), 2).unwrap();
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..50 {
            let u = rng.random::<f64>() * d.norm();
            let k = d.sample_from(u, &mut rng);
            assert!(k == 3 || k == 9);
        }
    }
}
