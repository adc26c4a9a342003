//! Metropolis–Hastings kernel (LightLDA).
//!
//! Proposals alternate between a document proposal `q_d ∝ n_kd + α_k`
//! and a word proposal `q_w ∝ (n_kw + β) / (n_k + K·β)`, both served
//! from alias tables that are allowed to go stale: the dense alpha and
//! beta tables rebuild with probability 1e-6 per token, the per-term
//! sparse table with 1e-4, and the cached per-doc table with 1e-2 (or on
//! cache miss). Accepted moves mutate the partition's counters in
//! place — term counts are owned by their source group, doc counts are
//! serialized behind per-vector mutexes, and the global topic counter
//! is a vector of atomics — so results depend on scheduling order, unlike
//! the ZenLDA family.

use crate::config::LdaConfig;
use crate::posterior::GlobalDist;
use crate::sampler::{group_seed, split_group_slices, SampleStats};
use anyhow::ensure;
use dashmap::DashMap;
use dist_util::{AliasTable, DiscreteSampler};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use token_graph::{EdgePartition, TopicCount};

/// Rebuild probability of the dense alpha/beta tables, per token.
const DENSE_REBUILD_P: f64 = 1e-6;
/// Rebuild probability of the per-term sparse table, per token.
const TERM_REBUILD_P: f64 = 1e-4;
/// Rebuild probability of the cached per-doc table, per token.
const DOC_REBUILD_P: f64 = 1e-2;
/// Bound on the per-doc alias cache (entries), sized to stay cache-resident.
const DOC_CACHE_CAP: usize = 4096;

struct DocAliasCache {
    cache: DashMap<u32, Arc<AliasTable>>,
}

impl DocAliasCache {
    fn new() -> Self {
        DocAliasCache {
            cache: DashMap::new(),
        }
    }

    /// Cached table for a doc, rebuilt on miss or on the staleness coin.
    fn get_or_build<R: Rng>(
        &self,
        local_doc: u32,
        doc: &Mutex<TopicCount>,
        rng: &mut R,
    ) -> anyhow::Result<Arc<AliasTable>> {
        let stale = rng.random::<f64>() < DOC_REBUILD_P;
        if !stale {
            if let Some(hit) = self.cache.get(&local_doc) {
                return Ok(hit.clone());
            }
        }
        let (weights, space) = {
            let tc = doc.lock().unwrap_or_else(|e| e.into_inner());
            let mut w = Vec::with_capacity(tc.nnz());
            let mut s = Vec::with_capacity(tc.nnz());
            tc.for_each_nonzero(|t, c| {
                w.push(c as f64);
                s.push(t);
            });
            (w, s)
        };
        let mut table = AliasTable::with_capacity(weights.len());
        table.reset_dist(&weights, Some(&space), weights.len())?;
        let table = Arc::new(table);

        // Bounded: drop an arbitrary entry once full
        if self.cache.len() >= DOC_CACHE_CAP {
            if let Some(victim) = self.cache.iter().next().map(|e| *e.key()) {
                self.cache.remove(&victim);
            }
        }
        self.cache.insert(local_doc, table.clone());
        Ok(table)
    }
}

/// The adjusted conditional: the current token's own count is removed
/// when evaluating its topic.
#[inline]
fn p_adjusted(
    k: u32,
    kcur: u32,
    n_kw: f64,
    n_kd: f64,
    n_k: f64,
    beta: f64,
    beta_sum: f64,
    alpha_k: &[f64],
) -> f64 {
    let d = if k == kcur { 1.0 } else { 0.0 };
    (n_kw - d + beta) * (n_kd - d + alpha_k[k as usize]) / (n_k - d + beta_sum)
}

/// Run the MH kernel over one edge partition, mutating assignments and
/// the partition's cached counters in place.
pub fn sample_partition(
    part: &mut EdgePartition,
    global: &GlobalDist,
    cfg: &LdaConfig,
    iter: usize,
    pid: usize,
) -> anyhow::Result<SampleStats> {
    if part.num_edges() == 0 {
        return Ok(SampleStats::default());
    }
    ensure!(
        part.has_vertex_attrs(),
        "vertex attributes must be attached before sampling"
    );
    let k = cfg.num_topics;
    let beta_sum = cfg.beta * k as f64;
    let alpha_ratio =
        cfg.alpha * k as f64 / (global.num_tokens as f64 + cfg.alpha_as * k as f64);

    let groups = part.group_vec();
    let local_dst_ids = &part.local_dst_ids;
    let attrs: Vec<Mutex<TopicCount>> = std::mem::take(&mut part.vertex_attrs)
        .into_iter()
        .map(Mutex::new)
        .collect();
    let slices = split_group_slices(&mut part.data, &groups);

    // Live global topic counter, shared by every group task
    let n_k_live: Vec<AtomicI64> = global
        .n_k
        .iter()
        .map(|&c| AtomicI64::new(c as i64))
        .collect();

    // Dense proposal tables, stochastically refreshed from the live counter
    let alpha_table = RwLock::new(build_alpha_table(&n_k_live, alpha_ratio, cfg)?);
    let beta_table = RwLock::new(build_beta_table(&n_k_live, cfg)?);
    let doc_cache = DocAliasCache::new();

    let stats = slices
        .into_par_iter()
        .zip(groups.par_iter())
        .enumerate()
        .map(|(gi, (slice, group))| -> anyhow::Result<SampleStats> {
            let mut stats = SampleStats::default();
            let src = group.local_src as usize;
            let mut rng = SmallRng::seed_from_u64(group_seed(
                cfg.seed,
                iter,
                pid,
                cfg.num_partitions,
                gi,
            ));

            // Per-term sparse proposal table over n_kw · denoms
            let mut term_table = build_term_table(&attrs[src], global)?;

            for (off, occ) in slice.iter_mut().enumerate() {
                let e = group.edges.start + off;
                if cfg.sample_rate < 1.0 && rng.random::<f64>() >= cfg.sample_rate {
                    continue;
                }
                let dst = local_dst_ids[e] as usize;

                for slot in occ.iter_mut() {
                    let mut kcur = *slot;

                    // Stochastic staleness: cheap tables refresh rarely
                    if rng.random::<f64>() < DENSE_REBUILD_P {
                        *alpha_table.write().unwrap_or_else(|e| e.into_inner()) =
                            build_alpha_table(&n_k_live, alpha_ratio, cfg)?;
                        *beta_table.write().unwrap_or_else(|e| e.into_inner()) =
                            build_beta_table(&n_k_live, cfg)?;
                    }
                    if rng.random::<f64>() < TERM_REBUILD_P {
                        term_table = build_term_table(&attrs[src], global)?;
                    }

                    for step in 0..cfg.mh_steps {
                        let doc_step = step % 2 == 0;
                        let (kprop, q_new, q_old) = if doc_step {
                            propose_doc(
                                dst as u32,
                                &attrs[dst],
                                &doc_cache,
                                &alpha_table,
                                global,
                                kcur,
                                &mut rng,
                            )?
                        } else {
                            propose_word(
                                &attrs[src],
                                &term_table,
                                &beta_table,
                                global,
                                cfg.beta,
                                kcur,
                                &mut rng,
                            )?
                        };
                        if kprop == kcur {
                            continue;
                        }

                        let (n_w_new, n_w_old) = {
                            let tc = attrs[src].lock().unwrap_or_else(|e| e.into_inner());
                            (tc.get(kprop) as f64, tc.get(kcur) as f64)
                        };
                        let (n_d_new, n_d_old) = {
                            let tc = attrs[dst].lock().unwrap_or_else(|e| e.into_inner());
                            (tc.get(kprop) as f64, tc.get(kcur) as f64)
                        };
                        let n_new = n_k_live[kprop as usize].load(Ordering::Relaxed) as f64;
                        let n_old = n_k_live[kcur as usize].load(Ordering::Relaxed) as f64;

                        let p_new = p_adjusted(
                            kprop, kcur, n_w_new, n_d_new, n_new, cfg.beta, beta_sum,
                            &global.alpha_k,
                        );
                        let p_old = p_adjusted(
                            kcur, kcur, n_w_old, n_d_old, n_old, cfg.beta, beta_sum,
                            &global.alpha_k,
                        );

                        let pi = (p_new * q_old) / (p_old * q_new);
                        if pi >= 1.0 || rng.random::<f64>() < pi {
                            {
                                let mut tc =
                                    attrs[src].lock().unwrap_or_else(|e| e.into_inner());
                                tc.dec(kcur);
                                tc.inc(kprop);
                            }
                            {
                                let mut tc =
                                    attrs[dst].lock().unwrap_or_else(|e| e.into_inner());
                                tc.dec(kcur);
                                tc.inc(kprop);
                            }
                            n_k_live[kcur as usize].fetch_sub(1, Ordering::Relaxed);
                            n_k_live[kprop as usize].fetch_add(1, Ordering::Relaxed);
                            *slot = kprop;
                            kcur = kprop;
                        }
                    }
                    stats.tokens += 1;
                }
            }
            Ok(stats)
        })
        .try_reduce(SampleStats::default, |mut a, b| {
            a.merge(&b);
            Ok(a)
        });

    part.vertex_attrs = attrs
        .into_iter()
        .map(|m| m.into_inner().unwrap_or_else(|e| e.into_inner()))
        .collect();
    stats
}

fn build_alpha_table(
    n_k_live: &[AtomicI64],
    alpha_ratio: f64,
    cfg: &LdaConfig,
) -> anyhow::Result<AliasTable> {
    let weights: Vec<f64> = n_k_live
        .iter()
        .map(|n| alpha_ratio * (n.load(Ordering::Relaxed).max(0) as f64 + cfg.alpha_as))
        .collect();
    let mut table = AliasTable::with_capacity(weights.len());
    table.reset_dist(&weights, None, weights.len())?;
    Ok(table)
}

fn build_beta_table(n_k_live: &[AtomicI64], cfg: &LdaConfig) -> anyhow::Result<AliasTable> {
    let beta_sum = cfg.beta * n_k_live.len() as f64;
    let weights: Vec<f64> = n_k_live
        .iter()
        .map(|n| cfg.beta / (n.load(Ordering::Relaxed).max(0) as f64 + beta_sum))
        .collect();
    let mut table = AliasTable::with_capacity(weights.len());
    table.reset_dist(&weights, None, weights.len())?;
    Ok(table)
}

fn build_term_table(
    term: &Mutex<TopicCount>,
    global: &GlobalDist,
) -> anyhow::Result<AliasTable> {
    let (weights, space) = {
        let tc = term.lock().unwrap_or_else(|e| e.into_inner());
        let mut w = Vec::with_capacity(tc.nnz());
        let mut s = Vec::with_capacity(tc.nnz());
        tc.for_each_nonzero(|t, c| {
            w.push(c as f64 * global.denoms[t as usize]);
            s.push(t);
        });
        (w, s)
    };
    let mut table = AliasTable::with_capacity(weights.len());
    table.reset_dist(&weights, Some(&space), weights.len())?;
    Ok(table)
}

/// Doc proposal: mixture of the doc's empirical topic histogram and the
/// alpha prior. Returns (proposal, q(proposal), q(current)).
fn propose_doc<R: Rng>(
    local_doc: u32,
    doc: &Mutex<TopicCount>,
    cache: &DocAliasCache,
    alpha_table: &RwLock<AliasTable>,
    global: &GlobalDist,
    kcur: u32,
    rng: &mut R,
) -> anyhow::Result<(u32, f64, f64)> {
    let doc_table = cache.get_or_build(local_doc, doc, rng)?;
    let alpha = alpha_table.read().unwrap_or_else(|e| e.into_inner());

    let total = doc_table.norm() + alpha.norm();
    let u = rng.random::<f64>() * total;
    let kprop = if u < doc_table.norm() {
        doc_table.sample_from(u, rng)
    } else {
        alpha.sample_from(u - doc_table.norm(), rng)
    };

    let (n_d_prop, n_d_cur) = {
        let tc = doc.lock().unwrap_or_else(|e| e.into_inner());
        (tc.get(kprop) as f64, tc.get(kcur) as f64)
    };
    let q_new = n_d_prop + global.alpha_k[kprop as usize];
    let q_old = n_d_cur + global.alpha_k[kcur as usize];
    Ok((kprop, q_new, q_old))
}

/// Word proposal: mixture of the term's topic histogram (over the
/// smoothing denominators) and the beta prior. Returns
/// (proposal, q(proposal), q(current)).
fn propose_word<R: Rng>(
    term: &Mutex<TopicCount>,
    term_table: &AliasTable,
    beta_table: &RwLock<AliasTable>,
    global: &GlobalDist,
    beta: f64,
    kcur: u32,
    rng: &mut R,
) -> anyhow::Result<(u32, f64, f64)> {
    let beta_dense = beta_table.read().unwrap_or_else(|e| e.into_inner());

    let total = term_table.norm() + beta_dense.norm();
    let u = rng.random::<f64>() * total;
    let kprop = if u < term_table.norm() {
        term_table.sample_from(u, rng)
    } else {
        beta_dense.sample_from(u - term_table.norm(), rng)
    };

    let (n_w_prop, n_w_cur) = {
        let tc = term.lock().unwrap_or_else(|e| e.into_inner());
        (tc.get(kprop) as f64, tc.get(kcur) as f64)
    };
    let q_new = (n_w_prop + beta) * global.denoms[kprop as usize];
    let q_old = (n_w_cur + beta) * global.denoms[kcur as usize];
    Ok((kprop, q_new, q_old))
}
