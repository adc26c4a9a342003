//! Walker's alias method: O(K) build, O(1) sample.

use crate::traits::{DiscreteSampler, ResampleFrom};
use anyhow::ensure;
use rand::Rng;

/// Alias table over up to K outcomes.
///
/// Each cell holds the scaled probability of keeping its own outcome and
/// the alias outcome taken otherwise. Supports a dense outcome space or a
/// sparse one via an index map.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    /// Scaled keep-probability per cell, in `[0, 1]`
    keep: Vec<f64>,
    /// Alias outcome per cell
    alias: Vec<u32>,
    /// Outcome label per cell (identity when built dense)
    space: Vec<u32>,
    /// Number of active cells
    used: usize,
    norm: f64,
}

impl AliasTable {
    /// Create an empty table with capacity for `k` outcomes.
    pub fn with_capacity(k: usize) -> Self {
        let mut t = AliasTable::default();
        t.reset(k);
        t
    }

    /// Number of active cells.
    pub fn len(&self) -> usize {
        self.used
    }

    /// True when no distribution has been built.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    // Both the cell and the keep/alias coin come out of a single uniform.
    #[inline]
    fn draw_cell(&self, u01: f64) -> u32 {
        let scaled = u01 * self.used as f64;
        let mut cell = scaled as usize;
        if cell >= self.used {
            cell = self.used - 1;
        }
        let frac = scaled - cell as f64;
        if frac < self.keep[cell] {
            self.space[cell]
        } else {
            self.space[self.alias[cell] as usize]
        }
    }
}

impl DiscreteSampler for AliasTable {
    fn reset(&mut self, k: usize) {
        self.keep.clear();
        self.keep.reserve(k);
        self.alias.clear();
        self.alias.reserve(k);
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
            "alias build with non-positive norm {} over {} outcomes",
            norm,
            used
        );

        self.used = used;
        self.norm = norm;
        self.keep.resize(used, 0.0);
        self.alias.resize(used, 0);
        self.space.resize(used, 0);
        match space {
            Some(sp) => self.space.copy_from_slice(&sp[..used]),
            None => {
                for (i, s) in self.space.iter_mut().enumerate() {
                    *s = i as u32;
                }
            }
        }

        // Scale weights so the average cell mass is 1, then pair each
        // under-full cell with an over-full donor.
        let scale = used as f64 / norm;
        let mut small: Vec<(u32, f64)> = Vec::with_capacity(used);
        let mut large: Vec<(u32, f64)> = Vec::with_capacity(used);
        for (i, &w) in weights[..used].iter().enumerate() {
            let p = w * scale;
            if p < 1.0 {
                small.push((i as u32, p));
            } else {
                large.push((i as u32, p));
            }
        }

        while !small.is_empty() && !large.is_empty() {
            let (s, ps) = small.pop().unwrap_or_default();
            let (l, pl) = large.pop().unwrap_or_default();
            self.keep[s as usize] = ps;
            self.alias[s as usize] = l;
            let rest = pl - (1.0 - ps);
            if rest < 1.0 {
                small.push((l, rest));
            } else {
                large.push((l, rest));
            }
        }
        // Leftovers are full cells up to rounding
        for (i, _) in small.drain(..).chain(large.drain(..)) {
            self.keep[i as usize] = 1.0;
            self.alias[i as usize] = i;
        }
        Ok(())
    }

    #[inline]
    fn norm(&self) -> f64 {
        self.norm
    }

    #[inline]
    fn sample_from<R: Rng>(&self, u: f64, _rng: &mut R) -> u32 {
        debug_assert!(self.used > 0);
        let u01 = (u / self.norm).clamp(0.0, 1.0 - f64::EPSILON);
        self.draw_cell(u01)
    }
}

impl ResampleFrom for AliasTable {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn chi_square_uniform(counts: &[usize], total: usize) -> f64 {
        let expect = total as f64 / counts.len() as f64;
        counts
            .iter()
            .map(|&c| {
                let d = c as f64 - expect;
                d * d / expect
            })
            .sum()
    }

    #[test]
    fn test_uniform_chi_square() {
        let k = 64;
        let weights = vec![1.0; k];
        let mut table = AliasTable::with_capacity(k);
        table.reset_dist(&weights, None, k).unwrap();

        let mut rng = SmallRng::seed_from_u64(42);
        let n = 1_000_000;
        let mut counts = vec![0usize; k];
        for _ in 0..n {
            let u = rng.random::<f64>() * table.norm();
            counts[table.sample_from(u, &mut rng) as usize] += 1;
        }

        // 63 dof: critical value at p=0.01 is ~92.0
        let x2 = chi_square_uniform(&counts, n);
        assert!(x2 < 92.0, "chi-square too large: {}", x2);
    }

    #[test]
    fn test_sparse_space_labels() {
        let weights = vec![3.0, 1.0, 2.0];
        let space = vec![10u32, 20, 30];
        let mut table = AliasTable::default();
        table.reset_dist(&weights, Some(&space), 3).unwrap();
        assert!((table.norm() - 6.0).abs() < 1e-12);

        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let u = rng.random::<f64>() * table.norm();
            let k = table.sample_from(u, &mut rng);
            assert!(space.contains(&k));
        }
    }

    #[test]
    fn test_skewed_frequencies() {
        let weights = vec![8.0, 1.0, 1.0];
        let mut table = AliasTable::default();
        table.reset_dist(&weights, None, 3).unwrap();

        let mut rng = SmallRng::seed_from_u64(3);
        let n = 200_000;
        let mut counts = [0usize; 3];
        for _ in 0..n {
            let u = rng.random::<f64>() * table.norm();
            counts[table.sample_from(u, &mut rng) as usize] += 1;
        }
        let f0 = counts[0] as f64 / n as f64;
        assert!((f0 - 0.8).abs() < 0.01, "P(0) = {} expected 0.8", f0);
    }

    #[test]
    fn test_resample_matches_corrected_target() {
        // f = [4, 2, 2]; subtract δ=2 at outcome 0 → target [2, 2, 2]
        let weights = vec![4.0, 2.0, 2.0];
        let mut table = AliasTable::default();
        table.reset_dist(&weights, None, 3).unwrap();

        let excluded = 0u32;
        let correction = 2.0 / 4.0;
        let mut rng = SmallRng::seed_from_u64(11);
        let n = 300_000;
        let mut counts = [0usize; 3];
        for _ in 0..n {
            let u = rng.random::<f64>() * table.norm();
            counts[table.resample_from(u, &mut rng, excluded, correction) as usize] += 1;
        }

        // Target is uniform over 3 outcomes; 2 dof critical value at
        // p=0.01 is ~9.21
        let x2 = chi_square_uniform(&counts, n);
        assert!(x2 < 9.21, "chi-square too large: {}, counts {:?}", x2, counts);
    }

    #[test]
    fn test_zero_norm_is_error() {
        let mut table = AliasTable::default();
        assert!(table.reset_dist(&[0.0, 0.0], None, 2).is_err());
        assert!(table.reset_dist(&[f64::NAN, 1.0], None, 2).is_err());
    }
}
