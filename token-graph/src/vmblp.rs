//! Vertex-cut rebalancing by modified balanced label propagation.
//!
//! Iteratively moves vertices toward the partitions their neighbors live
//! in, with a flow-matching quota that keeps partition sizes balanced:
//! a vertex wishing to move i→j is admitted with probability
//! `min(M[i,j], M[j,i]) / M[i,j]`, so the net exchange between any two
//! partitions is bounded by the smaller demand.
//!
//! Proposals are computed in parallel against a frozen snapshot of the
//! assignment with deterministic per-vertex seeds, then moves are decided
//! over the demand matrix. Runs are reproducible for a fixed seed.

use crate::ids::VertexId;
use fnv::FnvHashMap;
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Options for the rebalancer.
#[derive(Debug, Clone)]
pub struct VmblpOptions {
    /// Number of label-propagation passes beyond the first
    /// (`num_iter + 1` passes run in total)
    pub num_iter: usize,
    /// Seed for the proposal and admission draws
    pub seed: u64,
}

impl Default for VmblpOptions {
    fn default() -> Self {
        VmblpOptions {
            num_iter: 3,
            seed: 42,
        }
    }
}

/// Vertex → partition assignment.
pub type Assignment = FnvHashMap<VertexId, u32>;

/// Adjacency in positional form: `adj[v]` = (neighbor position, weight).
pub struct VertexAdjacency {
    /// Sorted global ids; position in this vector is the vertex position
    pub vertices: Vec<VertexId>,
    adj: Vec<Vec<(u32, u32)>>,
}

impl VertexAdjacency {
    /// Build positional adjacency from (src, dst, weight) edges. Both
    /// directions count toward a vertex's neighborhood.
    pub fn from_edges(edges: &[(VertexId, VertexId, u32)], init: &Assignment) -> Self {
        let mut vertices: Vec<VertexId> = init.keys().copied().collect();
        vertices.sort_unstable();
        let pos: FnvHashMap<VertexId, u32> = vertices
            .iter()
            .enumerate()
            .map(|(i, &v)| (v, i as u32))
            .collect();

        let mut adj: Vec<Vec<(u32, u32)>> = vec![Vec::new(); vertices.len()];
        for &(s, d, w) in edges {
            let (si, di) = (pos[&s], pos[&d]);
            adj[si as usize].push((di, w));
            adj[di as usize].push((si, w));
        }
        VertexAdjacency { vertices, adj }
    }
}

/// One label-propagation pass.
///
/// Returns the updated positional assignment and the P×P move-demand
/// matrix `M` (row-major; stays excluded) observed before admission.
pub fn rebalance_pass(
    adjacency: &VertexAdjacency,
    current: &[u32],
    num_partitions: usize,
    pass_seed: u64,
) -> (Vec<u32>, Vec<u64>) {
    let p = num_partitions;

    // Phase 1: parallel proposals from neighbor-partition histograms
    let proposals: Vec<u32> = (0..adjacency.vertices.len())
        .into_par_iter()
        .map(|vi| {
            let mut hist = vec![0u64; p];
            for &(ni, w) in &adjacency.adj[vi] {
                hist[current[ni as usize] as usize] += w as u64;
            }
            let total: u64 = hist.iter().sum();
            if total == 0 {
                return current[vi];
            }
            let vseed = pass_seed ^ (vi as u64).wrapping_mul(2654435761);
            let mut rng = SmallRng::seed_from_u64(vseed);
            let mut u = rng.random_range(0..total);
            for (part, &h) in hist.iter().enumerate() {
                if u < h {
                    return part as u32;
                }
                u -= h;
            }
            current[vi]
        })
        .collect();

    // Phase 2: move-demand matrix
    let mut demand = vec![0u64; p * p];
    for (vi, &want) in proposals.iter().enumerate() {
        let from = current[vi];
        if want != from {
            demand[from as usize * p + want as usize] += 1;
        }
    }

    // Phase 3: flow-matched admission
    let mut next = current.to_vec();
    for (vi, &want) in proposals.iter().enumerate() {
        let from = current[vi] as usize;
        let to = want as usize;
        if to == from {
            continue;
        }
        let m_ij = demand[from * p + to];
        let m_ji = demand[to * p + from];
        let admit = m_ij.min(m_ji) as f64 / m_ij as f64;
        let vseed = pass_seed
            .rotate_left(17)
            .wrapping_add((vi as u64).wrapping_mul(0x9e3779b97f4a7c15));
        let mut rng = SmallRng::seed_from_u64(vseed);
        if rng.random::<f64>() < admit {
            next[vi] = want;
        }
    }

    (next, demand)
}

/// Rebalance a vertex assignment over `num_partitions` partitions.
pub fn rebalance(
    edges: &[(VertexId, VertexId, u32)],
    init: &Assignment,
    num_partitions: usize,
    options: &VmblpOptions,
) -> Assignment {
    let adjacency = VertexAdjacency::from_edges(edges, init);
    let mut current: Vec<u32> = adjacency.vertices.iter().map(|v| init[v]).collect();

    for pass in 0..=options.num_iter {
        let pass_seed = options.seed.wrapping_mul(pass as u64 + 1) | 1;
        let (next, _demand) = rebalance_pass(&adjacency, &current, num_partitions, pass_seed);
        let moved = next
            .iter()
            .zip(current.iter())
            .filter(|(a, b)| a != b)
            .count();
        info!(
            "vmblp pass {}/{}: {} vertices moved",
            pass + 1,
            options.num_iter + 1,
            moved
        );
        current = next;
    }

    adjacency
        .vertices
        .iter()
        .zip(current.iter())
        .map(|(&v, &part)| (v, part))
        .collect()
}

/// Per-edge partition after rebalancing: an edge follows its source.
pub fn repartition_edges(
    edges: &[(VertexId, VertexId, u32)],
    assignment: &Assignment,
) -> Vec<u32> {
    edges.iter().map(|&(s, _, _)| assignment[&s]).collect()
}
