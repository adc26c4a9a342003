//! F+ tree: a complete binary tree of prefix sums.
//!
//! Stored in a 1-indexed heap layout:
//! - Root is node 1 and holds the total mass
//! - Children of node i are 2*i and 2*i + 1
//! - Leaves occupy indices `n_leaves..2*n_leaves` (1-indexed)
//!
//! Sampling walks from the root down (O(log K)); a point update walks
//! from the leaf up (O(log K)), so the tree stays exact under the
//! mass-preserving per-sample mutations of the hot loop.

use crate::traits::{DiscreteSampler, ResampleFrom};
use anyhow::ensure;
use rand::Rng;

/// Prefix-sum tree over up to K outcomes.
#[derive(Debug, Clone, Default)]
pub struct FTree {
    /// 1-indexed heap; `tree[0]` unused, `tree[1]` = total mass
    tree: Vec<f64>,
    /// Leaf count (next power of two ≥ used)
    n_leaves: usize,
    /// Outcome label per leaf (identity when built dense)
    space: Vec<u32>,
    used: usize,
}

impl FTree {
    /// Create an empty tree with capacity for `k` outcomes.
    pub fn with_capacity(k: usize) -> Self {
        let mut t = FTree::default();
        t.reset(k);
        t
    }

    /// Number of active outcomes.
    pub fn len(&self) -> usize {
        self.used
    }

    /// True when no distribution has been built.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Current weight of outcome position `i` (position, not label).
    #[inline]
    pub fn weight(&self, i: usize) -> f64 {
        debug_assert!(i < self.used);
        self.tree[self.n_leaves + i]
    }

    /// Set the weight at position `i` and propagate the difference to the
    /// root. O(log K).
    pub fn update(&mut self, i: usize, weight: f64) {
        debug_assert!(i < self.used);
        let mut node = self.n_leaves + i;
        let delta = weight - self.tree[node];
        while node >= 1 {
            self.tree[node] += delta;
            if node == 1 {
                break;
            }
            node >>= 1;
        }
    }
}

impl DiscreteSampler for FTree {
    fn reset(&mut self, k: usize) {
        let n_leaves = k.next_power_of_two().max(1);
        self.tree.clear();
        self.tree.resize(2 * n_leaves, 0.0);
        self.n_leaves = n_leaves;
        self.space.clear();
        self.used = 0;
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
            "ftree build with non-positive norm {} over {} outcomes",
            norm,
            used
        );

        let n_leaves = used.next_power_of_two().max(1);
        self.n_leaves = n_leaves;
        self.used = used;
        self.tree.clear();
        self.tree.resize(2 * n_leaves, 0.0);
        self.tree[n_leaves..n_leaves + used].copy_from_slice(&weights[..used]);
        // Bottom-up sum of internal nodes
        for node in (1..n_leaves).rev() {
            self.tree[node] = self.tree[2 * node] + self.tree[2 * node + 1];
        }

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
        if self.tree.len() > 1 {
            self.tree[1]
        } else {
            0.0
        }
    }

    fn sample_from<R: Rng>(&self, u: f64, _rng: &mut R) -> u32 {
        debug_assert!(self.used > 0);
        let mut u = u.clamp(0.0, self.norm());
        let mut node = 1;
        while node < self.n_leaves {
            let left = 2 * node;
            if u < self.tree[left] {
                node = left;
            } else {
                u -= self.tree[left];
                node = left + 1;
            }
        }
        let mut pos = node - self.n_leaves;
        if pos >= self.used {
            pos = self.used - 1;
        }
        self.space[pos]
    }
}

impl ResampleFrom for FTree {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasTable;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_norm_matches_alias() {
        let weights: Vec<f64> = (1..=17).map(|i| i as f64).collect();
        let mut tree = FTree::default();
        tree.reset_dist(&weights, None, weights.len()).unwrap();
        let mut table = AliasTable::default();
        table.reset_dist(&weights, None, weights.len()).unwrap();
        assert!((tree.norm() - table.norm()).abs() < 1e-9);
    }

    #[test]
    fn test_samples_match_alias_within_mc_error() {
        let weights: Vec<f64> = vec![1.0, 2.0, 3.0, 4.0];
        let mut tree = FTree::default();
        tree.reset_dist(&weights, None, 4).unwrap();
        let mut table = AliasTable::default();
        table.reset_dist(&weights, None, 4).unwrap();

        let mut rng = SmallRng::seed_from_u64(5);
        let n = 400_000;
        let mut tc = [0usize; 4];
        let mut ac = [0usize; 4];
        for _ in 0..n {
            let u = rng.random::<f64>();
            tc[tree.sample_from(u * tree.norm(), &mut rng) as usize] += 1;
            ac[table.sample_from(u * table.norm(), &mut rng) as usize] += 1;
        }
        for k in 0..4 {
            let ft = tc[k] as f64 / n as f64;
            let fa = ac[k] as f64 / n as f64;
            assert!(
                (ft - fa).abs() < 0.01,
                "topic {}: ftree {} vs alias {}",
                k,
                ft,
                fa
            );
        }
    }

    #[test]
    fn test_point_update_preserves_mass_elsewhere() {
        let weights = vec![1.0, 1.0, 1.0, 1.0, 1.0];
        let mut tree = FTree::default();
        tree.reset_dist(&weights, None, 5).unwrap();

        tree.update(2, 3.0);
        assert!((tree.norm() - 7.0).abs() < 1e-12);
        assert!((tree.weight(2) - 3.0).abs() < 1e-12);
        assert!((tree.weight(0) - 1.0).abs() < 1e-12);

        // Mass-preserving transfer
        tree.update(2, 1.0);
        tree.update(4, 3.0);
        assert!((tree.norm() - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_update_then_sample() {
        let weights = vec![1.0, 1.0, 1.0, 1.0];
        let mut tree = FTree::default();
        tree.reset_dist(&weights, None, 4).unwrap();
        tree.update(0, 0.0);
        tree.update(1, 0.0);
        tree.update(2, 0.0);

        let mut rng = SmallRng::seed_from_u64(9);
        for _ in 0..100 {
            let u = rng.random::<f64>() * tree.norm();
            assert_eq!(tree.sample_from(u, &mut rng), 3);
        }
    }

    #[test]
    fn test_sparse_space() {
        let weights = vec![2.0, 5.0];
        let space = vec![7u32, 42];
        let mut tree = FTree::default();
        tree.reset_dist(&weights, Some(&space), 2).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..100 {
            let u = rng.random::<f64>() * tree.norm();
            let k = tree.sample_from(u, &mut rng);
            assert!(k == 7 || k == 42);
        }
    }
}
