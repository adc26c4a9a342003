//! Edge partitions in a source-grouped layout.
//!
//! Edges of a partition are sorted by source (term) vertex, so all edges
//! of one term form a contiguous run — the unit of sampling work. Local
//! vertex indices map into `local_to_global` and into the per-partition
//! vertex-attribute cache, which is shed after sampling and re-attached
//! from the authoritative store before the next pass.

use crate::counts::TopicCount;
use crate::ids::VertexId;
use crate::vertex::VertexStore;
use fnv::FnvHashMap;
use std::ops::Range;

/// One (term, doc) edge with its occurrence array of topic assignments.
#[derive(Debug, Clone)]
pub struct TokenEdge {
    /// Term vertex id (tagged)
    pub term: VertexId,
    /// Document vertex id
    pub doc: VertexId,
    /// One topic per token occurrence, length ≥ 1
    pub topics: Box<[u32]>,
}

/// A run of consecutive edges sharing a source vertex.
#[derive(Debug, Clone)]
pub struct SourceGroup {
    /// Local index of the shared source vertex
    pub local_src: u32,
    /// Edge offsets of the run
    pub edges: Range<usize>,
}

/// Edge partition: source-grouped edges plus local vertex caches.
#[derive(Debug, Clone, Default)]
pub struct EdgePartition {
    /// Per-edge local source (term) index
    pub local_src_ids: Vec<u32>,
    /// Per-edge local destination (doc) index
    pub local_dst_ids: Vec<u32>,
    /// Local index → global vertex id
    pub local_to_global: Vec<VertexId>,
    /// Cached topic counts per local vertex (empty when shed)
    pub vertex_attrs: Vec<TopicCount>,
    /// Per-edge occurrence arrays, mutated in place by the samplers
    pub data: Vec<Box<[u32]>>,
    /// (local source index, first edge offset) per source group
    index: Vec<(u32, u32)>,
}

impl EdgePartition {
    /// Build a partition from an edge list. Edges are sorted by (term,
    /// doc); local indices are assigned in order of first appearance.
    pub fn from_edges(mut edges: Vec<TokenEdge>) -> Self {
        edges.sort_by(|a, b| (a.term, a.doc).cmp(&(b.term, b.doc)));

        fn local(
            vid: VertexId,
            local_of: &mut FnvHashMap<VertexId, u32>,
            l2g: &mut Vec<VertexId>,
        ) -> u32 {
            *local_of.entry(vid).or_insert_with(|| {
                l2g.push(vid);
                (l2g.len() - 1) as u32
            })
        }

        let mut local_of: FnvHashMap<VertexId, u32> = FnvHashMap::default();
        let mut local_to_global = Vec::new();

        let mut local_src_ids = Vec::with_capacity(edges.len());
        let mut local_dst_ids = Vec::with_capacity(edges.len());
        let mut data = Vec::with_capacity(edges.len());
        let mut index: Vec<(u32, u32)> = Vec::new();

        for (offset, e) in edges.into_iter().enumerate() {
            let src = local(e.term, &mut local_of, &mut local_to_global);
            let dst = local(e.doc, &mut local_of, &mut local_to_global);
            if index.last().map(|&(s, _)| s) != Some(src) {
                index.push((src, offset as u32));
            }
            local_src_ids.push(src);
            local_dst_ids.push(dst);
            data.push(e.topics);
        }

        EdgePartition {
            local_src_ids,
            local_dst_ids,
            local_to_global,
            vertex_attrs: Vec::new(),
            data,
            index,
        }
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.data.len()
    }

    /// Number of token occurrences.
    pub fn num_tokens(&self) -> u64 {
        self.data.iter().map(|o| o.len() as u64).sum()
    }

    /// Number of local vertices (terms + docs).
    pub fn num_local_vertices(&self) -> usize {
        self.local_to_global.len()
    }

    /// Iterate over `(group_key, edge_range)` source groups.
    pub fn groups(&self) -> impl Iterator<Item = SourceGroup> + '_ {
        let n = self.data.len() as u32;
        self.index.iter().enumerate().map(move |(i, &(src, first))| {
            let last = self
                .index
                .get(i + 1)
                .map(|&(_, next)| next)
                .unwrap_or(n);
            SourceGroup {
                local_src: src,
                edges: first as usize..last as usize,
            }
        })
    }

    /// Collect source groups into a vector (for indexed parallel walks).
    pub fn group_vec(&self) -> Vec<SourceGroup> {
        self.groups().collect()
    }

    /// Edge indices grouped by local destination, for doc-by-doc walks.
    pub fn dst_groups(&self) -> Vec<(u32, Vec<u32>)> {
        let mut by_dst: FnvHashMap<u32, Vec<u32>> = FnvHashMap::default();
        for (e, &dst) in self.local_dst_ids.iter().enumerate() {
            by_dst.entry(dst).or_default().push(e as u32);
        }
        let mut groups: Vec<(u32, Vec<u32>)> = by_dst.into_iter().collect();
        groups.sort_by_key(|&(dst, _)| dst);
        groups
    }

    /// Fill the vertex-attribute cache from the authoritative store.
    pub fn attach_vertex_attrs(&mut self, store: &VertexStore) {
        self.vertex_attrs = self
            .local_to_global
            .iter()
            .map(|&vid| store.get(vid).cloned().unwrap_or_else(TopicCount::sparse))
            .collect();
    }

    /// Shed the vertex-attribute cache between phases.
    pub fn without_vertex_attrs(&mut self) {
        self.vertex_attrs = Vec::new();
    }

    /// True when the vertex cache is attached.
    pub fn has_vertex_attrs(&self) -> bool {
        !self.vertex_attrs.is_empty()
    }
}
