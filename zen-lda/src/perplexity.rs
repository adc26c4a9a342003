//! Held-in perplexity evaluation.
//!
//! Walks the same source groups as the word-by-word kernels,
//! accumulating three log-likelihood sums per partition: the joint
//! `llh`, the word-conditional `wllh`, and the doc-conditional `dllh`.
//! The per-doc normalizer `1/(n_d + Σα_k)` is computed once per local
//! doc and cached behind a 0→1 atomic mark.

use crate::config::LdaConfig;
use crate::posterior::{fill_term_beta_denoms, GlobalDist};
use anyhow::ensure;
use rayon::prelude::*;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use token_graph::EdgePartition;

/// Per-run log-likelihood sums.
#[derive(Debug, Clone, Copy, Default)]
pub struct Perplexity {
    /// Joint token log-likelihood
    pub llh: f64,
    /// Word-conditional log-likelihood
    pub wllh: f64,
    /// Doc-conditional log-likelihood
    pub dllh: f64,
    /// Token count N
    pub tokens: u64,
}

impl Perplexity {
    /// `exp(-llh / N)`; lower is better.
    pub fn joint(&self) -> f64 {
        (-self.llh / self.tokens as f64).exp()
    }

    /// Word-conditional perplexity.
    pub fn word(&self) -> f64 {
        (-self.wllh / self.tokens as f64).exp()
    }

    /// Doc-conditional perplexity.
    pub fn doc(&self) -> f64 {
        (-self.dllh / self.tokens as f64).exp()
    }

    fn merge(&mut self, o: &Perplexity) {
        self.llh += o.llh;
        self.wllh += o.wllh;
        self.dllh += o.dllh;
        self.tokens += o.tokens;
    }
}

/// Per-doc denominator cache guarded by the 0→1 mark pattern:
/// 0 = empty, 1 = a writer is computing, 2 = published.
struct DocDenomCache {
    marks: Vec<AtomicI32>,
    bits: Vec<AtomicU64>,
}

impl DocDenomCache {
    fn new(n: usize) -> Self {
        DocDenomCache {
            marks: (0..n).map(|_| AtomicI32::new(0)).collect(),
            bits: (0..n).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    #[inline]
    fn get_or_compute<F: FnOnce() -> f64>(&self, i: usize, compute: F) -> f64 {
        match self.marks[i].compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed) {
            Ok(_) => {
                let v = compute();
                self.bits[i].store(v.to_bits(), Ordering::Release);
                self.marks[i].store(2, Ordering::Release);
                v
            }
            Err(_) => {
                while self.marks[i].load(Ordering::Acquire) != 2 {
                    std::hint::spin_loop();
                }
                f64::from_bits(self.bits[i].load(Ordering::Acquire))
            }
        }
    }
}

/// Evaluate perplexity over all partitions. Vertex attributes must be
/// attached and consistent with the global counters.
pub fn evaluate(
    parts: &[EdgePartition],
    global: &GlobalDist,
    cfg: &LdaConfig,
) -> anyhow::Result<Perplexity> {
    let per_part: Vec<Perplexity> = parts
        .par_iter()
        .map(|part| evaluate_partition(part, global, cfg))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut total = Perplexity::default();
    for p in &per_part {
        total.merge(p);
    }
    Ok(total)
}

fn evaluate_partition(
    part: &EdgePartition,
    global: &GlobalDist,
    cfg: &LdaConfig,
) -> anyhow::Result<Perplexity> {
    if part.num_edges() == 0 {
        return Ok(Perplexity::default());
    }
    ensure!(
        part.has_vertex_attrs(),
        "vertex attributes must be attached before evaluation"
    );
    let k = cfg.num_topics;
    let groups = part.group_vec();
    let attrs = &part.vertex_attrs;
    let cache = DocDenomCache::new(part.num_local_vertices());

    let folded = groups
        .par_iter()
        .map(|group| {
            let term = &attrs[group.local_src as usize];
            let mut term_beta = vec![0.0; k];
            fill_term_beta_denoms(global, term, &mut term_beta);

            let mut wa_sum = 0.0;
            term.for_each_nonzero(|t, c| {
                wa_sum += c as f64 * global.alphak_denoms[t as usize];
            });

            let mut acc = Perplexity::default();
            for e in group.edges.clone() {
                let dst = part.local_dst_ids[e] as usize;
                let doc = &attrs[dst];
                let doc_denom = cache
                    .get_or_compute(dst, || 1.0 / (doc.total() as f64 + global.alpha_sum));

                let mut dwb_sum = 0.0;
                doc.for_each_nonzero(|t, c| {
                    dwb_sum += c as f64 * term_beta[t as usize];
                });

                let occ = &part.data[e];
                let joint = (global.ab_norm + wa_sum + dwb_sum) * doc_denom;
                acc.llh += occ.len() as f64 * joint.ln();
                for &z in occ.iter() {
                    let zi = z as usize;
                    let n_zw = term.get(z) as f64;
                    let n_zd = doc.get(z) as f64;
                    acc.wllh += ((n_zw + cfg.beta) * global.denoms[zi]).ln();
                    acc.dllh += ((n_zd + global.alpha_k[zi]) * doc_denom).ln();
                }
                acc.tokens += occ.len() as u64;
            }
            acc
        })
        .reduce(Perplexity::default, |mut a, b| {
            a.merge(&b);
            a
        });
    Ok(folded)
}
