//! Sampling kernels.
//!
//! The word-by-word kernels walk source groups of an edge partition in
//! parallel against a frozen snapshot of the vertex caches; the
//! doc-by-doc kernel walks destination groups. Each group draws from its
//! own deterministically seeded RNG, so results are invariant to thread
//! count and group scheduling order for the kernels that do not mutate
//! shared counters.

use dist_util::{AliasTable, DiscreteSampler, FTree, ResampleFrom};
use rand::Rng;
use token_graph::edge::SourceGroup;

/// Word-by-word kernel (ZenLDA / ZenSemiLDA)
pub mod zen;

/// Metropolis–Hastings kernel (LightLDA)
pub mod light;

/// Doc-by-doc kernel (SparseLDA)
pub mod sparse;

/// Counters reported by one partition pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleStats {
    /// Token occurrences re-sampled
    pub tokens: u64,
    /// Source groups skipped (virtual terms, subsampling)
    pub skipped_groups: u64,
}

impl SampleStats {
    /// Fold another partition's counters into this one.
    pub fn merge(&mut self, other: &SampleStats) {
        self.tokens += other.tokens;
        self.skipped_groups += other.skipped_groups;
    }
}

/// Per-term distribution backing, chosen by the acceleration method.
#[derive(Debug, Clone)]
pub(crate) enum TermDist {
    Alias(AliasTable),
    Tree(FTree),
}

impl TermDist {
    /// Pick a backing for a group of `group_edges` edges. The alias
    /// table amortizes its O(support) build over long groups; short
    /// groups go to the F+ tree.
    pub(crate) fn for_group(
        accel: crate::config::AccelMethod,
        group_edges: usize,
        capacity: usize,
    ) -> Self {
        use crate::config::AccelMethod;
        match accel {
            AccelMethod::Alias => TermDist::Alias(AliasTable::with_capacity(capacity)),
            AccelMethod::Ftree => TermDist::Tree(FTree::with_capacity(capacity)),
            AccelMethod::Hybrid => {
                if group_edges >= 8 {
                    TermDist::Alias(AliasTable::with_capacity(capacity))
                } else {
                    TermDist::Tree(FTree::with_capacity(capacity))
                }
            }
        }
    }

    pub(crate) fn reset_dist(
        &mut self,
        weights: &[f64],
        space: Option<&[u32]>,
        used: usize,
    ) -> anyhow::Result<()> {
        match self {
            TermDist::Alias(t) => t.reset_dist(weights, space, used),
            TermDist::Tree(t) => t.reset_dist(weights, space, used),
        }
    }

    #[inline]
    pub(crate) fn norm(&self) -> f64 {
        match self {
            TermDist::Alias(t) => t.norm(),
            TermDist::Tree(t) => t.norm(),
        }
    }

    #[inline]
    pub(crate) fn sample_from<R: Rng>(&self, u: f64, rng: &mut R) -> u32 {
        match self {
            TermDist::Alias(t) => t.sample_from(u, rng),
            TermDist::Tree(t) => t.sample_from(u, rng),
        }
    }

    #[inline]
    pub(crate) fn resample_from<R: Rng>(
        &self,
        u: f64,
        rng: &mut R,
        excluded: u32,
        correction: f64,
    ) -> u32 {
        match self {
            TermDist::Alias(t) => t.resample_from(u, rng, excluded, correction),
            TermDist::Tree(t) => t.resample_from(u, rng, excluded, correction),
        }
    }
}

/// Deterministic RNG seed for one source group.
///
/// Mixes (seed, iteration, partition, group) so every group gets an
/// independent stream that does not depend on which worker runs it.
#[inline]
pub(crate) fn group_seed(seed: u64, iter: usize, pid: usize, num_partitions: usize, group: usize) -> u64 {
    let base = seed
        .wrapping_add(iter as u64)
        .wrapping_mul(num_partitions as u64 + 1)
        .wrapping_add(pid as u64);
    base.wrapping_mul(0x9e3779b97f4a7c15) ^ (group as u64).wrapping_mul(2654435761)
}

/// Split the edge-data array into per-group mutable slices.
///
/// Source groups tile the edge range `[0, data.len())` in order, so the
/// split is a sequence of `split_at_mut` cuts.
pub(crate) fn split_group_slices<'a>(
    mut data: &'a mut [Box<[u32]>],
    groups: &[SourceGroup],
) -> Vec<&'a mut [Box<[u32]>]> {
    let mut slices = Vec::with_capacity(groups.len());
    let mut offset = 0;
    for g in groups {
        debug_assert_eq!(g.edges.start, offset);
        let (head, tail) = data.split_at_mut(g.edges.end - offset);
        slices.push(head);
        data = tail;
        offset = g.edges.end;
    }
    debug_assert!(data.is_empty());
    slices
}
