//! Counter-update aggregation against a single-threaded reference sum.

use fnv::FnvHashMap;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Zipf};
use token_graph::ids::{doc_id, term_id};
use token_graph::{TopicCount, VertexId, VertexPartition};
use zen_lda::counter_update::merge_partials;

fn zipf_partials(n: usize, seed: u64, k: usize) -> Vec<(VertexId, TopicCount)> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let zipf = Zipf::new(1000.0, 1.1).unwrap();
    (0..n)
        .map(|_| {
            let idx = zipf.sample(&mut rng) as u64 - 1;
            let vid = if rng.random::<bool>() {
                term_id(idx)
            } else {
                doc_id(idx)
            };
            let mut tc = TopicCount::sparse();
            for _ in 0..rng.random_range(1..4) {
                tc.inc(rng.random_range(0..k) as u32);
            }
            (vid, tc)
        })
        .collect()
}

fn reference_sum(partials: &[(VertexId, TopicCount)], k: usize) -> FnvHashMap<VertexId, Vec<u32>> {
    let mut want: FnvHashMap<VertexId, Vec<u32>> = FnvHashMap::default();
    for (vid, tc) in partials {
        let acc = want.entry(*vid).or_insert_with(|| vec![0; k]);
        tc.for_each_nonzero(|t, c| acc[t as usize] += c);
    }
    want
}

#[test]
fn test_zipf_partials_match_reference_across_shuffles() {
    let k = 32;
    let partials = zipf_partials(100_000, 42, k);
    let want = reference_sum(&partials, k);

    let mut rng = SmallRng::seed_from_u64(7);
    for round in 0..10 {
        let mut shuffled = partials.clone();
        shuffled.shuffle(&mut rng);

        let mut part = VertexPartition::default();
        merge_partials(&mut part, shuffled, k);

        assert_eq!(part.len(), want.len(), "round {}: vertex count", round);
        for (vid, dense) in &want {
            let slot = part
                .slot(*vid)
                .unwrap_or_else(|| panic!("round {}: vid {:#x} dropped", round, vid));
            assert_eq!(
                &part.values[slot].to_dense_vec(k),
                dense,
                "round {}: vid {:#x}",
                round,
                vid
            );
        }
    }
}

#[test]
fn test_hot_vertex_contention() {
    // Every partial targets the same vertex: maximal mark contention
    let k = 16;
    let partials: Vec<(VertexId, TopicCount)> = (0..50_000)
        .map(|i| {
            let mut tc = TopicCount::sparse();
            tc.inc((i % k) as u32);
            (term_id(0), tc)
        })
        .collect();

    let mut part = VertexPartition::default();
    merge_partials(&mut part, partials, k);

    let got = part.values[part.slot(term_id(0)).unwrap()].to_dense_vec(k);
    let per_topic = 50_000 / k as u32;
    assert!(got.iter().all(|&c| c == per_topic), "{:?}", got);
    // The hot term crossed the promotion threshold
    assert!(matches!(
        part.values[part.slot(term_id(0)).unwrap()],
        TopicCount::Dense(_)
    ));
}
