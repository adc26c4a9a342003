//! End-to-end sampling scenarios on synthetic corpora.

use std::io::Write;
use zen_lda::config::{LdaAlgorithm, LdaConfig};
use zen_lda::input::{load_corpus, CorpusGraph, CorpusOptions};
use zen_lda::Trainer;

fn write_corpus(lines: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.txt");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(lines.as_bytes()).unwrap();
    (dir, path)
}

fn doc_topic_counts(graph: &CorpusGraph, k: usize) -> Vec<(u64, Vec<u32>)> {
    let mut out = Vec::new();
    for vp in &graph.store.partitions {
        for (vid, tc) in vp.ids.iter().zip(vp.values.iter()) {
            if token_graph::ids::is_doc_id(*vid) {
                out.push((token_graph::ids::index_of(*vid), tc.to_dense_vec(k)));
            }
        }
    }
    out.sort_by_key(|&(d, _)| d);
    out
}

fn term_topic_counts(graph: &CorpusGraph, k: usize) -> Vec<(u64, Vec<u32>)> {
    let mut out = Vec::new();
    for vp in &graph.store.partitions {
        for (vid, tc) in vp.ids.iter().zip(vp.values.iter()) {
            if token_graph::ids::is_term_id(*vid) {
                out.push((token_graph::ids::index_of(*vid), tc.to_dense_vec(k)));
            }
        }
    }
    out.sort_by_key(|&(t, _)| t);
    out
}

/// One doc with tokens [t0, t0, t1] under a concentrated prior: the doc
/// collapses onto a single topic.
#[test]
fn test_single_doc_collapses_to_one_topic() {
    let (_dir, path) = write_corpus("0 0:2 1:1\n");
    let cfg = LdaConfig {
        num_topics: 2,
        alpha: 0.1,
        beta: 0.01,
        alpha_as: 0.1,
        total_iter: 100,
        num_partitions: 1,
        seed: 7,
        ..LdaConfig::default()
    };
    let graph = load_corpus(&path, &CorpusOptions::default(), &cfg).unwrap();
    let mut trainer = Trainer::new(cfg.clone(), graph).unwrap();

    // The chain keeps mixing; accept the collapsed state any time in the
    // tail of the run
    let mut collapsed = false;
    for iter in 0..cfg.total_iter {
        trainer.run_iteration(iter).unwrap();
        if iter >= cfg.total_iter - 20 {
            let docs = doc_topic_counts(&trainer.graph, cfg.num_topics);
            assert_eq!(docs.len(), 1);
            if docs[0].1.iter().any(|&c| c == 3) {
                collapsed = true;
            }
        }
    }
    assert!(collapsed, "doc never collapsed onto a single topic");

    // Term counts always account for every token
    let terms = term_topic_counts(&trainer.graph, cfg.num_topics);
    let mass: u32 = terms.iter().flat_map(|(_, v)| v.iter()).sum();
    assert_eq!(mass, 3);
}

/// Two corpora with disjoint vocabularies: the learned topics separate
/// them.
#[test]
fn test_disjoint_corpora_recover_vocabularies() {
    // Corpus A: terms 0..10, docs 0..30; corpus B: terms 10..20, docs 30..60
    let mut lines = String::new();
    for d in 0..30 {
        let mut line = format!("{}", d);
        for w in 0..5 {
            let t = (d * 3 + w * 7) % 10;
            line.push_str(&format!(" {}:2", t));
        }
        lines.push_str(&line);
        lines.push('\n');
    }
    for d in 30..60 {
        let mut line = format!("{}", d);
        for w in 0..5 {
            let t = 10 + (d * 5 + w * 3) % 10;
            line.push_str(&format!(" {}:2", t));
        }
        lines.push_str(&line);
        lines.push('\n');
    }
    let (_dir, path) = write_corpus(&lines);

    let cfg = LdaConfig {
        num_topics: 4,
        alpha: 0.1,
        beta: 0.01,
        total_iter: 150,
        num_partitions: 2,
        seed: 13,
        ..LdaConfig::default()
    };
    let graph = load_corpus(&path, &CorpusOptions::default(), &cfg).unwrap();
    let mut trainer = Trainer::new(cfg.clone(), graph).unwrap();
    for iter in 0..cfg.total_iter {
        trainer.run_iteration(iter).unwrap();
    }

    // Per topic: top-5 terms by count must come from one corpus's
    // vocabulary with >= 80% precision
    let terms = term_topic_counts(&trainer.graph, cfg.num_topics);
    for k in 0..cfg.num_topics {
        let mut by_count: Vec<(u64, u32)> = terms
            .iter()
            .map(|(t, v)| (*t, v[k]))
            .filter(|&(_, c)| c > 0)
            .collect();
        by_count.sort_by_key(|&(_, c)| std::cmp::Reverse(c));
        let top: Vec<u64> = by_count.iter().take(5).map(|&(t, _)| t).collect();
        if top.len() < 5 {
            continue; // topic with negligible mass
        }
        let in_a = top.iter().filter(|&&t| t < 10).count();
        let hits = in_a.max(5 - in_a);
        assert!(
            hits >= 4,
            "topic {} mixes vocabularies: top terms {:?}",
            k,
            top
        );
    }
}

/// A graph with zero edges: the iteration is a no-op on every vertex.
#[test]
fn test_zero_edge_graph_is_a_noop() {
    use token_graph::ids::{doc_id, term_id};
    use token_graph::{EdgePartition, VertexStore};

    let mut store = VertexStore::new(2);
    store.register(term_id(0));
    store.register(doc_id(0));
    store.get_mut(term_id(0)).unwrap().add(1, 5);
    store.get_mut(doc_id(0)).unwrap().add(1, 5);
    let before: Vec<u64> = store.global_topic_counts(3);

    let graph = CorpusGraph {
        edge_parts: vec![
            EdgePartition::from_edges(vec![]),
            EdgePartition::from_edges(vec![]),
        ],
        store,
        num_tokens: 5,
        num_terms: 1,
        num_docs: 1,
        vocab: None,
    };
    let cfg = LdaConfig {
        num_topics: 3,
        num_partitions: 2,
        ..LdaConfig::default()
    };
    let mut trainer = Trainer::new(cfg, graph).unwrap();
    trainer.run_iteration(0).unwrap();

    assert_eq!(trainer.graph.store.global_topic_counts(3), before);
    assert_eq!(
        trainer
            .graph
            .store
            .get(term_id(0))
            .unwrap()
            .to_dense_vec(3),
        vec![0, 5, 0]
    );
}

/// SparseLDA and ZenLDA converge to comparable perplexities on the same
/// corpus.
#[test]
fn test_sparse_and_zen_reach_similar_perplexity() {
    let mut lines = String::new();
    for d in 0..40 {
        let mut line = format!("{}", d);
        for w in 0..6 {
            let t = (d / 10) * 5 + (d + w * 3) % 5;
            line.push_str(&format!(" {}:2", t));
        }
        lines.push_str(&line);
        lines.push('\n');
    }
    let (_dir, path) = write_corpus(&lines);

    let run = |algorithm: LdaAlgorithm| -> f64 {
        let cfg = LdaConfig {
            num_topics: 4,
            total_iter: 300,
            num_partitions: 2,
            algorithm,
            seed: 5,
            ..LdaConfig::default()
        };
        let graph = load_corpus(&path, &CorpusOptions::default(), &cfg).unwrap();
        let mut trainer = Trainer::new(cfg.clone(), graph).unwrap();
        // Average the tail to smooth per-state fluctuation
        let mut tail = Vec::new();
        for iter in 0..cfg.total_iter {
            trainer.run_iteration(iter).unwrap();
            if iter >= cfg.total_iter - 20 {
                tail.push(trainer.evaluate_perplexity().unwrap().joint());
            }
        }
        tail.iter().sum::<f64>() / tail.len() as f64
    };

    let zen = run(LdaAlgorithm::ZenLda);
    let sparse = run(LdaAlgorithm::SparseLda);
    let rel = (zen - sparse).abs() / zen.min(sparse);
    assert!(
        rel < 0.03,
        "perplexities diverge: zen {:.3} vs sparse {:.3}",
        zen,
        sparse
    );
}

/// Perplexity improves from the random initialization.
#[test]
fn test_perplexity_improves_over_training() {
    let mut lines = String::new();
    for d in 0..30 {
        let base = (d % 3) * 6;
        let mut line = format!("{}", d);
        for w in 0..4 {
            line.push_str(&format!(" {}:2", base + (d + w) % 6));
        }
        lines.push_str(&line);
        lines.push('\n');
    }
    let (_dir, path) = write_corpus(&lines);

    let cfg = LdaConfig {
        num_topics: 3,
        total_iter: 80,
        num_partitions: 2,
        seed: 3,
        ..LdaConfig::default()
    };
    let graph = load_corpus(&path, &CorpusOptions::default(), &cfg).unwrap();
    let mut trainer = Trainer::new(cfg.clone(), graph).unwrap();

    let before = trainer.evaluate_perplexity().unwrap().joint();
    for iter in 0..cfg.total_iter {
        trainer.run_iteration(iter).unwrap();
    }
    let after = trainer.evaluate_perplexity().unwrap().joint();
    assert!(
        after < before,
        "perplexity did not improve: {:.3} -> {:.3}",
        before,
        after
    );
}
