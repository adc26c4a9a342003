//! Corpus readers and token-graph construction.
//!
//! Three file layouts, one doc per line:
//!
//! - `raw` — whitespace-tokenized text; the vocabulary is built in order
//!   of first appearance and doc ids are line numbers.
//! - `bow` — `term:count` entries with numeric term ids; an optional
//!   leading bare integer is the doc id unless `ignore_doc_id` is set.
//! - `semi` — `bow` plus a leading `label` class in `[0, num_classes)`
//!   mapped to a virtual term vertex; occurrences beyond the first of a
//!   repeated term are kept with probability `semi_rate`.
//!
//! The loaded edges are placed into partitions by the configured
//! strategy, seeded with initial topic assignments, and the vertex store
//! is populated by one counter-update pass.

use crate::common_io::open_buf_reader;
use crate::config::{InitStrategy, InputFormat, LdaConfig, PartStrategy};
use crate::counter_update::update_counters;
use anyhow::{bail, Context, Result};
use fnv::FnvHashMap;
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::io::BufRead;
use std::path::Path;
use token_graph::ids::{doc_id, term_id, virtual_term_id};
use token_graph::vmblp::{self, VmblpOptions};
use token_graph::{EdgePartition, PartitionStrategy, TokenEdge, VertexId, VertexStore};

/// Corpus-level options beyond the main configuration.
#[derive(Debug, Clone)]
pub struct CorpusOptions {
    /// File layout
    pub format: InputFormat,
    /// Treat a leading bare integer as data, not a doc id
    pub ignore_doc_id: bool,
    /// Keep-probability for repeated-term occurrences in `semi`
    pub semi_rate: f64,
    /// Number of label classes in `semi`
    pub num_classes: usize,
}

impl Default for CorpusOptions {
    fn default() -> Self {
        CorpusOptions {
            format: InputFormat::Bow,
            ignore_doc_id: false,
            semi_rate: 1.0,
            num_classes: 0,
        }
    }
}

/// The loaded token graph: edge partitions plus the vertex store.
#[derive(Debug, Clone)]
pub struct CorpusGraph {
    /// Edge partitions holding occurrence arrays
    pub edge_parts: Vec<EdgePartition>,
    /// Authoritative vertex counters
    pub store: VertexStore,
    /// Total token occurrences
    pub num_tokens: u64,
    /// Distinct terms (including virtual label terms)
    pub num_terms: usize,
    /// Distinct docs
    pub num_docs: usize,
    /// Vocabulary (raw format only), indexed by term id
    pub vocab: Option<Vec<Box<str>>>,
}

/// One parsed doc: (doc vertex, [(term vertex, occurrence count)]).
type ParsedDoc = (VertexId, Vec<(VertexId, u32)>);

/// Load a corpus file and build the partitioned token graph.
pub fn load_corpus(path: &Path, opts: &CorpusOptions, cfg: &LdaConfig) -> Result<CorpusGraph> {
    let (docs, vocab) = parse_file(path, opts, cfg)?;
    build_graph(docs, vocab, cfg)
}

fn parse_file(
    path: &Path,
    opts: &CorpusOptions,
    cfg: &LdaConfig,
) -> Result<(Vec<ParsedDoc>, Option<Vec<Box<str>>>)> {
    let reader = open_buf_reader(path)
        .with_context(|| format!("cannot open corpus {}", path.display()))?;
    let mut rng = SmallRng::seed_from_u64(cfg.seed ^ 0x5eed_c0de);

    let mut vocab_index: FnvHashMap<Box<str>, u64> = FnvHashMap::default();
    let mut vocab: Vec<Box<str>> = Vec::new();
    let mut docs: Vec<ParsedDoc> = Vec::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') || line.starts_with('%') {
            continue;
        }
        let mut fields = line.split_whitespace();

        let doc_vid = if opts.format != InputFormat::Raw && !opts.ignore_doc_id {
            let first = fields
                .next()
                .with_context(|| format!("{}:{}: empty doc line", path.display(), lineno + 1))?;
            let id: u64 = first
                .parse()
                .with_context(|| format!("{}:{}: bad doc id {:?}", path.display(), lineno + 1, first))?;
            doc_id(id)
        } else {
            doc_id(docs.len() as u64)
        };

        let mut bag: FnvHashMap<VertexId, u32> = FnvHashMap::default();
        match opts.format {
            InputFormat::Raw => {
                for word in fields {
                    let next_id = vocab.len() as u64;
                    let tid = *vocab_index.entry(word.into()).or_insert_with(|| {
                        vocab.push(word.into());
                        next_id
                    });
                    *bag.entry(term_id(tid)).or_insert(0) += 1;
                }
            }
            InputFormat::Bow | InputFormat::Semi => {
                if opts.format == InputFormat::Semi {
                    let label = fields.next().with_context(|| {
                        format!("{}:{}: missing label class", path.display(), lineno + 1)
                    })?;
                    let class: u64 = label.parse().with_context(|| {
                        format!("{}:{}: bad label {:?}", path.display(), lineno + 1, label)
                    })?;
                    if class as usize >= opts.num_classes.max(1) {
                        bail!(
                            "{}:{}: label {} outside [0, {})",
                            path.display(),
                            lineno + 1,
                            class,
                            opts.num_classes
                        );
                    }
                    bag.insert(virtual_term_id(class), 1);
                }
                for entry in fields {
                    let (t, c) = entry.split_once(':').with_context(|| {
                        format!("{}:{}: bad entry {:?}", path.display(), lineno + 1, entry)
                    })?;
                    let tid: u64 = t.parse().with_context(|| {
                        format!("{}:{}: bad term id {:?}", path.display(), lineno + 1, t)
                    })?;
                    let count: u32 = c.parse().with_context(|| {
                        format!("{}:{}: bad count {:?}", path.display(), lineno + 1, c)
                    })?;
                    if count == 0 {
                        bail!("{}:{}: zero count for term {}", path.display(), lineno + 1, tid);
                    }
                    let kept = if opts.format == InputFormat::Semi {
                        // Keep the first occurrence; subsample the rest
                        1 + (1..count)
                            .filter(|_| rng.random::<f64>() < opts.semi_rate)
                            .count() as u32
                    } else {
                        count
                    };
                    *bag.entry(term_id(tid)).or_insert(0) += kept;
                }
            }
        }
        if !bag.is_empty() {
            let mut terms: Vec<(VertexId, u32)> = bag.into_iter().collect();
            terms.sort_unstable_by_key(|&(t, _)| t);
            docs.push((doc_vid, terms));
        }
    }

    let vocab = if opts.format == InputFormat::Raw {
        Some(vocab)
    } else {
        None
    };
    Ok((docs, vocab))
}

/// Draw initial topic assignments for one edge.
fn init_topics<R: Rng>(
    strategy: InitStrategy,
    term: VertexId,
    count: u32,
    k: usize,
    rng: &mut R,
) -> Box<[u32]> {
    match strategy {
        InitStrategy::Random => (0..count)
            .map(|_| rng.random_range(0..k) as u32)
            .collect::<Vec<_>>()
            .into_boxed_slice(),
        InitStrategy::Sparse => {
            let z = rng.random_range(0..k) as u32;
            vec![z; count as usize].into_boxed_slice()
        }
        InitStrategy::Split => {
            let z = (token_graph::ids::index_of(term) % k as u64) as u32;
            vec![z; count as usize].into_boxed_slice()
        }
    }
}

fn build_graph(
    docs: Vec<ParsedDoc>,
    vocab: Option<Vec<Box<str>>>,
    cfg: &LdaConfig,
) -> Result<CorpusGraph> {
    let k = cfg.num_topics;
    let p = cfg.num_partitions;
    let mut rng = SmallRng::seed_from_u64(cfg.seed);

    // Materialize edges with initial assignments, tracking degrees for
    // the placement strategies that need them
    let mut degrees: FnvHashMap<VertexId, u64> = FnvHashMap::default();
    let mut edges: Vec<TokenEdge> = Vec::new();
    let mut num_tokens = 0u64;
    for (dvid, terms) in &docs {
        for &(tvid, count) in terms {
            *degrees.entry(tvid).or_insert(0) += count as u64;
            *degrees.entry(*dvid).or_insert(0) += count as u64;
            num_tokens += count as u64;
            edges.push(TokenEdge {
                term: tvid,
                doc: *dvid,
                topics: init_topics(cfg.init, tvid, count, k, &mut rng),
            });
        }
    }
    if edges.is_empty() {
        bail!("corpus has no tokens");
    }

    let placement = edge_placement(&edges, &degrees, cfg)?;

    let mut per_part: Vec<Vec<TokenEdge>> = (0..p).map(|_| Vec::new()).collect();
    for (edge, part) in edges.into_iter().zip(placement) {
        per_part[part].push(edge);
    }
    let edge_parts: Vec<EdgePartition> = per_part.into_iter().map(EdgePartition::from_edges).collect();

    // Register every endpoint, then populate the counters from the
    // initial assignments with a first aggregation pass
    let mut store = VertexStore::new(p);
    for part in &edge_parts {
        for &vid in &part.local_to_global {
            store.register(vid);
        }
    }
    let num_terms = store
        .partitions
        .iter()
        .flat_map(|vp| vp.ids.iter())
        .filter(|&&v| token_graph::ids::is_term_id(v))
        .count();
    let num_docs = store.num_vertices() - num_terms;

    let mut graph = CorpusGraph {
        edge_parts,
        store,
        num_tokens,
        num_terms,
        num_docs,
        vocab,
    };
    update_counters(&mut graph.edge_parts, &mut graph.store, k);

    info!(
        "corpus: {} terms, {} docs, {} tokens over {} partitions",
        graph.num_terms, graph.num_docs, graph.num_tokens, p
    );
    Ok(graph)
}

/// Partition index per edge, by the configured strategy.
fn edge_placement(
    edges: &[TokenEdge],
    degrees: &FnvHashMap<VertexId, u64>,
    cfg: &LdaConfig,
) -> Result<Vec<usize>> {
    let p = cfg.num_partitions;
    let deg = |v: VertexId| degrees.get(&v).copied().unwrap_or(0);

    let hash_strategy = match cfg.part_strategy {
        PartStrategy::ByTerm => Some(PartitionStrategy::ByTerm),
        PartStrategy::ByDoc => Some(PartitionStrategy::ByDoc),
        PartStrategy::Edge2D => Some(PartitionStrategy::Edge2D),
        PartStrategy::Dbh => Some(PartitionStrategy::Dbh),
        PartStrategy::Vsdlp | PartStrategy::Bbr => None,
    };
    if let Some(s) = hash_strategy {
        return Ok(edges
            .iter()
            .map(|e| s.place(e.term, e.doc, p, deg))
            .collect());
    }

    // Label-propagation strategies: seed a vertex assignment, rebalance,
    // then let every edge follow its source vertex
    let weighted: Vec<(VertexId, VertexId, u32)> = edges
        .iter()
        .map(|e| (e.term, e.doc, e.topics.len() as u32))
        .collect();

    let mut init = vmblp::Assignment::default();
    match cfg.part_strategy {
        PartStrategy::Vsdlp => {
            for &(s, d, _) in &weighted {
                init.entry(s)
                    .or_insert_with(|| (token_graph::mix64(s) % p as u64) as u32);
                init.entry(d)
                    .or_insert_with(|| (token_graph::mix64(d) % p as u64) as u32);
            }
        }
        PartStrategy::Bbr => {
            // Round-robin by descending degree balances token mass
            let mut verts: Vec<VertexId> = degrees.keys().copied().collect();
            verts.sort_by_key(|v| std::cmp::Reverse(deg(*v)));
            for (i, v) in verts.into_iter().enumerate() {
                init.insert(v, (i % p) as u32);
            }
        }
        _ => unreachable!(),
    }

    let assignment = vmblp::rebalance(
        &weighted,
        &init,
        p,
        &VmblpOptions {
            num_iter: 3,
            seed: cfg.seed,
        },
    );
    Ok(vmblp::repartition_edges(&weighted, &assignment)
        .into_iter()
        .map(|x| x as usize)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_corpus(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    fn cfg(k: usize, p: usize) -> LdaConfig {
        LdaConfig {
            num_topics: k,
            num_partitions: p,
            ..LdaConfig::default()
        }
    }

    #[test]
    fn test_bow_round_trip_counts() {
        let (_dir, path) = write_corpus("0 1:2 3:1\n1 1:1\n");
        let graph = load_corpus(&path, &CorpusOptions::default(), &cfg(4, 2)).unwrap();

        assert_eq!(graph.num_tokens, 4);
        assert_eq!(graph.num_terms, 2);
        assert_eq!(graph.num_docs, 2);

        // Invariant: per-topic sums agree between term and doc sides
        let k = 4;
        let mut term_side = vec![0u64; k];
        let mut doc_side = vec![0u64; k];
        for vp in &graph.store.partitions {
            for (vid, tc) in vp.ids.iter().zip(vp.values.iter()) {
                let side = if token_graph::ids::is_term_id(*vid) {
                    &mut term_side
                } else {
                    &mut doc_side
                };
                tc.for_each_nonzero(|t, c| side[t as usize] += c as u64);
            }
        }
        assert_eq!(term_side, doc_side);
        assert_eq!(term_side.iter().sum::<u64>(), 4);
    }

    #[test]
    fn test_raw_builds_vocab() {
        let (_dir, path) = write_corpus("cat dog cat\nbird dog\n");
        let opts = CorpusOptions {
            format: InputFormat::Raw,
            ..CorpusOptions::default()
        };
        let graph = load_corpus(&path, &opts, &cfg(2, 1)).unwrap();
        let vocab = graph.vocab.unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(&*vocab[0], "cat");
        assert_eq!(graph.num_tokens, 5);
    }

    #[test]
    fn test_semi_labels_are_virtual_terms() {
        let (_dir, path) = write_corpus("0 1 5:1\n1 0 6:2\n");
        let opts = CorpusOptions {
            format: InputFormat::Semi,
            num_classes: 2,
            ..CorpusOptions::default()
        };
        let graph = load_corpus(&path, &opts, &cfg(4, 1)).unwrap();

        let mut virtual_terms = 0;
        for vp in &graph.store.partitions {
            for vid in &vp.ids {
                if token_graph::ids::is_virtual_term_id(*vid) {
                    virtual_terms += 1;
                }
            }
        }
        assert_eq!(virtual_terms, 2);
    }

    #[test]
    fn test_malformed_lines_are_fatal() {
        for bad in ["0 notanentry\n", "0 1:\n", "0 1:0\n", "x 1:2\n"] {
            let (_dir, path) = write_corpus(bad);
            assert!(
                load_corpus(&path, &CorpusOptions::default(), &cfg(2, 1)).is_err(),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_init_split_is_deterministic() {
        let (_dir, path) = write_corpus("0 1:2 2:1\n");
        let mut c = cfg(3, 1);
        c.init = InitStrategy::Split;
        let a = load_corpus(&path, &CorpusOptions::default(), &c).unwrap();
        let b = load_corpus(&path, &CorpusOptions::default(), &c).unwrap();
        assert_eq!(a.edge_parts[0].data, b.edge_parts[0].data);
        // term 1 mod 3 = 1, term 2 mod 3 = 2
        for (e, occ) in a.edge_parts[0].data.iter().enumerate() {
            let t = a.edge_parts[0].local_to_global[a.edge_parts[0].local_src_ids[e] as usize];
            let want = (token_graph::ids::index_of(t) % 3) as u32;
            assert!(occ.iter().all(|&z| z == want));
        }
    }
}
