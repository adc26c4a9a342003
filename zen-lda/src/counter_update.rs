//! Vertex-counter aggregation.
//!
//! Reconstructs the authoritative vertex counters from the occurrence
//! arrays after a sampling pass:
//!
//! 1. **Shipment** — each edge partition recounts its edges into partial
//!    per-vertex counters (sparse by default; term partials promote to
//!    dense at `K/8` active topics) and routes them to the owning vertex
//!    partition.
//! 2. **Merge** — per vertex partition, workers fold the received
//!    partials into per-slot aggregates coordinated by a 32-bit atomic
//!    mark: `0` = slot empty, `i32::MAX` = aggregate open, negative =
//!    a writer holds the slot exclusively.
//! 3. **Commit** — merged aggregates replace the partition's values and
//!    the edge partitions' vertex caches are invalidated.
//!
//! The merge is associative and commutative, so the result is identical
//! for any arrival order of the partials.

use fnv::FnvHashMap;
use rayon::prelude::*;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI32, Ordering};
use token_graph::counts::promotion_threshold;
use token_graph::{ids, TopicCount, VertexId, VertexPartition, VertexStore};

/// Counters reported by one aggregation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateStats {
    /// Partial counters shipped
    pub partials: usize,
    /// Vertices receiving at least one partial
    pub vertices: usize,
}

/// Aggregate slot shared by merge workers.
///
/// Safety: all access is serialized by the mark protocol — a writer
/// installs only after observing mark 0, and merges only while holding
/// the negative sentinel it acquired by `swap`.
struct SlotCell(UnsafeCell<Option<TopicCount>>);

unsafe impl Sync for SlotCell {}

impl SlotCell {
    fn new() -> Self {
        SlotCell(UnsafeCell::new(None))
    }
}

/// Recount one edge partition into `(vid, partial)` pairs.
pub fn ship_partials(
    local_src_ids: &[u32],
    local_dst_ids: &[u32],
    local_to_global: &[VertexId],
    data: &[Box<[u32]>],
    num_topics: usize,
) -> Vec<(VertexId, TopicCount)> {
    let threshold = promotion_threshold(num_topics);
    let mut acc: FnvHashMap<u32, TopicCount> = FnvHashMap::default();

    for (e, occ) in data.iter().enumerate() {
        for &z in occ.iter() {
            for local in [local_src_ids[e], local_dst_ids[e]] {
                let vid = local_to_global[local as usize];
                let tc = acc.entry(local).or_insert_with(TopicCount::sparse);
                tc.inc(z);
                if ids::is_term_id(vid) && tc.nnz() >= threshold {
                    tc.promote(num_topics);
                }
            }
        }
    }

    acc.into_iter()
        .map(|(local, tc)| (local_to_global[local as usize], tc))
        .collect()
}

/// Merge routed partials into one vertex partition under the per-slot
/// mark protocol. Returns the number of distinct vertices updated.
pub fn merge_partials(
    part: &mut VertexPartition,
    partials: Vec<(VertexId, TopicCount)>,
    num_topics: usize,
) -> usize {
    let threshold = promotion_threshold(num_topics);

    // Slot resolution registers unseen vertices; must precede the
    // parallel phase so the slot arrays have their final size.
    let slotted: Vec<(u32, TopicCount)> = partials
        .into_iter()
        .map(|(vid, tc)| (part.register(vid) as u32, tc))
        .collect();

    let n = part.len();
    let marks: Vec<AtomicI32> = (0..n).map(|_| AtomicI32::new(0)).collect();
    let slots: Vec<SlotCell> = (0..n).map(|_| SlotCell::new()).collect();
    let ids_by_slot = part.ids.clone();

    slotted
        .into_par_iter()
        .with_min_len(64)
        .for_each(|(slot, partial)| {
            let i = slot as usize;
            let prev = marks[i].fetch_sub(1, Ordering::AcqRel);
            if prev == 0 {
                // First writer installs directly, then opens the slot
                unsafe {
                    *slots[i].0.get() = Some(partial);
                }
                marks[i].store(i32::MAX, Ordering::Release);
            } else {
                // Spin until the slot is open, acquiring the exclusive
                // sentinel in the same swap
                loop {
                    let m = marks[i].swap(-1, Ordering::AcqRel);
                    if m > 0 {
                        break;
                    }
                    std::hint::spin_loop();
                }
                let promote = if ids::is_term_id(ids_by_slot[i]) {
                    Some(threshold)
                } else {
                    None
                };
                let agg = unsafe { &mut *slots[i].0.get() };
                match agg {
                    Some(existing) => existing.merge(&partial, num_topics, promote),
                    // Unreachable under the protocol: a positive mark is
                    // only published after install
                    None => *agg = Some(partial),
                }
                marks[i].store(i32::MAX, Ordering::Release);
            }
        });

    let mut updated = 0;
    for (i, cell) in slots.into_iter().enumerate() {
        if let Some(tc) = cell.0.into_inner() {
            part.values[i] = tc;
            updated += 1;
        }
    }
    updated
}

/// Full aggregation pass: ship, route, merge, commit.
///
/// Edge-partition vertex caches are invalidated on completion; the
/// caller re-attaches them from the committed store before the next
/// sampling pass.
pub fn update_counters(
    edge_parts: &mut [token_graph::EdgePartition],
    store: &mut VertexStore,
    num_topics: usize,
) -> UpdateStats {
    // Shipment, one task per edge partition
    let shipped: Vec<Vec<(VertexId, TopicCount)>> = edge_parts
        .par_iter()
        .map(|part| {
            ship_partials(
                &part.local_src_ids,
                &part.local_dst_ids,
                &part.local_to_global,
                &part.data,
                num_topics,
            )
        })
        .collect();

    // Routing by the owning shard
    let num_parts = store.partitions.len();
    let mut routed: Vec<Vec<(VertexId, TopicCount)>> = (0..num_parts).map(|_| Vec::new()).collect();
    let mut total_partials = 0;
    for list in shipped {
        for (vid, tc) in list {
            total_partials += 1;
            routed[store.route(vid)].push((vid, tc));
        }
    }

    // Merge + commit per shard
    let vertices: usize = store
        .partitions
        .par_iter_mut()
        .zip(routed.into_par_iter())
        .map(|(part, partials)| merge_partials(part, partials, num_topics))
        .sum();

    for part in edge_parts.iter_mut() {
        part.without_vertex_attrs();
    }

    UpdateStats {
        partials: total_partials,
        vertices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use token_graph::ids::{doc_id, term_id};

    fn partial(vid: VertexId, pairs: &[(u32, u32)]) -> (VertexId, TopicCount) {
        (vid, TopicCount::Sparse(pairs.to_vec()))
    }

    #[test]
    fn test_merge_equals_reference_sum() {
        let k = 16;
        let partials = vec![
            partial(term_id(0), &[(0, 1), (3, 2)]),
            partial(term_id(0), &[(3, 1)]),
            partial(doc_id(1), &[(5, 4)]),
            partial(term_id(0), &[(7, 1), (9, 1)]),
            partial(doc_id(1), &[(5, 1), (6, 1)]),
        ];

        // Reference: plain sequential sum
        let mut want: FnvHashMap<VertexId, Vec<u32>> = FnvHashMap::default();
        for (vid, tc) in &partials {
            let acc = want.entry(*vid).or_insert_with(|| vec![0; k]);
            tc.for_each_nonzero(|t, c| acc[t as usize] += c);
        }

        let mut part = VertexPartition::default();
        let updated = merge_partials(&mut part, partials, k);
        assert_eq!(updated, 2);

        for (vid, dense) in &want {
            let slot = part.slot(*vid).unwrap();
            assert_eq!(&part.values[slot].to_dense_vec(k), dense);
        }
    }

    #[test]
    fn test_merge_is_order_independent() {
        let k = 16;
        let base = vec![
            partial(term_id(0), &[(0, 1)]),
            partial(term_id(0), &[(1, 1)]),
            partial(term_id(0), &[(2, 1)]),
            partial(doc_id(0), &[(0, 2)]),
            partial(doc_id(0), &[(4, 1)]),
        ];

        let mut forward = VertexPartition::default();
        merge_partials(&mut forward, base.clone(), k);

        let mut reversed = VertexPartition::default();
        merge_partials(&mut reversed, base.into_iter().rev().collect(), k);

        for vid in [term_id(0), doc_id(0)] {
            let a = &forward.values[forward.slot(vid).unwrap()];
            let b = &reversed.values[reversed.slot(vid).unwrap()];
            assert_eq!(a.to_dense_vec(k), b.to_dense_vec(k));
        }
    }

    #[test]
    fn test_term_partials_promote_docs_stay_sparse() {
        let k = 16; // threshold 2
        let partials = vec![
            partial(term_id(3), &[(0, 1)]),
            partial(term_id(3), &[(9, 1)]),
            partial(doc_id(3), &[(0, 1)]),
            partial(doc_id(3), &[(9, 1)]),
        ];
        let mut part = VertexPartition::default();
        merge_partials(&mut part, partials, k);

        let term = &part.values[part.slot(term_id(3)).unwrap()];
        let doc = &part.values[part.slot(doc_id(3)).unwrap()];
        assert!(matches!(term, TopicCount::Dense(_)));
        assert!(matches!(doc, TopicCount::Sparse(_)));
    }

    #[test]
    fn test_every_vid_appears_in_output() {
        let k = 8;
        let partials: Vec<_> = (0..100u64)
            .map(|i| partial(if i % 2 == 0 { term_id(i) } else { doc_id(i) }, &[(0, 1)]))
            .collect();
        let mut part = VertexPartition::default();
        let updated = merge_partials(&mut part, partials, k);
        assert_eq!(updated, 100);
        for i in 0..100u64 {
            let vid = if i % 2 == 0 { term_id(i) } else { doc_id(i) };
            assert!(part.slot(vid).is_some(), "vid {} dropped", i);
        }
    }

    #[test]
    fn test_ship_partials_recounts_edges() {
        let k = 8;
        let l2g = vec![term_id(0), doc_id(0), doc_id(1)];
        let src = vec![0u32, 0];
        let dst = vec![1u32, 2];
        let data = vec![
            vec![1u32, 1, 2].into_boxed_slice(),
            vec![0u32].into_boxed_slice(),
        ];
        let mut partials = ship_partials(&src, &dst, &l2g, &data, k);
        partials.sort_by_key(|&(vid, _)| vid);

        let term = partials
            .iter()
            .find(|(vid, _)| *vid == term_id(0))
            .map(|(_, tc)| tc.to_dense_vec(k))
            .unwrap();
        assert_eq!(term[0], 1);
        assert_eq!(term[1], 2);
        assert_eq!(term[2], 1);

        let d0 = partials
            .iter()
            .find(|(vid, _)| *vid == doc_id(0))
            .map(|(_, tc)| tc.to_dense_vec(k))
            .unwrap();
        assert_eq!(d0[1], 2);
        assert_eq!(d0[2], 1);
    }
}
