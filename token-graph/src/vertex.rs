//! Vertex store: authoritative topic-count vectors with routing.
//!
//! Vertices are sharded over partitions by a fixed hash of the global id.
//! The routing never changes across iterations, so edge partitions can
//! reuse shipment targets from one iteration to the next.

use crate::counts::TopicCount;
use crate::ids::{self, VertexId};
use fnv::FnvHashMap;

/// One shard of the vertex store.
#[derive(Debug, Clone, Default)]
pub struct VertexPartition {
    /// Global ids by slot
    pub ids: Vec<VertexId>,
    /// Topic counts by slot
    pub values: Vec<TopicCount>,
    index: FnvHashMap<VertexId, u32>,
}

impl VertexPartition {
    /// Slot of a global id, if registered.
    #[inline]
    pub fn slot(&self, vid: VertexId) -> Option<usize> {
        self.index.get(&vid).map(|&s| s as usize)
    }

    /// Register a vertex, returning its slot.
    pub fn register(&mut self, vid: VertexId) -> usize {
        if let Some(&s) = self.index.get(&vid) {
            return s as usize;
        }
        let s = self.ids.len();
        self.ids.push(vid);
        self.values.push(TopicCount::sparse());
        self.index.insert(vid, s as u32);
        s
    }

    /// Number of registered vertices.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when the shard is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Replace all slot values. Lengths must agree.
    pub fn replace_values(&mut self, values: Vec<TopicCount>) {
        debug_assert_eq!(values.len(), self.ids.len());
        self.values = values;
    }
}

/// Sharded vertex store with hash routing.
#[derive(Debug, Clone)]
pub struct VertexStore {
    /// Shards; a vertex lives in `partitions[route(vid)]`
    pub partitions: Vec<VertexPartition>,
}

/// Stable vertex hash used for routing and edge placement.
///
/// Finalizer of splitmix64; good avalanche for sequential ids.
#[inline]
pub fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

impl VertexStore {
    /// Empty store with `num_partitions` shards.
    pub fn new(num_partitions: usize) -> Self {
        assert!(num_partitions > 0);
        VertexStore {
            partitions: vec![VertexPartition::default(); num_partitions],
        }
    }

    /// Shard owning `vid`.
    #[inline]
    pub fn route(&self, vid: VertexId) -> usize {
        (mix64(vid) % self.partitions.len() as u64) as usize
    }

    /// Register a vertex in its owning shard.
    pub fn register(&mut self, vid: VertexId) {
        let p = self.route(vid);
        self.partitions[p].register(vid);
    }

    /// Topic counts of `vid`, if registered.
    pub fn get(&self, vid: VertexId) -> Option<&TopicCount> {
        let p = self.route(vid);
        let part = &self.partitions[p];
        part.slot(vid).map(|s| &part.values[s])
    }

    /// Mutable topic counts of `vid`, if registered.
    pub fn get_mut(&mut self, vid: VertexId) -> Option<&mut TopicCount> {
        let p = self.route(vid);
        let part = &mut self.partitions[p];
        part.slot(vid).map(|s| &mut part.values[s])
    }

    /// Total number of registered vertices.
    pub fn num_vertices(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    /// Rebuild the global per-topic token counter `n_k` by summing term
    /// vertex counts.
    pub fn global_topic_counts(&self, num_topics: usize) -> Vec<u64> {
        let mut n_k = vec![0u64; num_topics];
        for part in &self.partitions {
            for (vid, tc) in part.ids.iter().zip(part.values.iter()) {
                if ids::is_term_id(*vid) {
                    tc.for_each_nonzero(|t, c| n_k[t as usize] += c as u64);
                }
            }
        }
        n_k
    }
}
