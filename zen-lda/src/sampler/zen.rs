//! Word-by-word collapsed Gibbs kernel (ZenLDA / ZenSemiLDA).
//!
//! Per source group: build the term component `wa` once, then walk the
//! group's edges re-sampling every occurrence from the three-term
//! decomposition `dwb + wa + ab`. Topic assignments are written back in
//! place; no shared counter is mutated, so the vertex counters are
//! reconstructed by the counter-update phase afterwards and the result
//! is identical for any thread count.

use crate::config::{LdaAlgorithm, LdaConfig};
use crate::posterior::{fill_dwb, fill_term_beta_denoms, fill_wa, GlobalDist};
use crate::sampler::{group_seed, split_group_slices, SampleStats, TermDist};
use anyhow::ensure;
use dist_util::{CumulativeDist, DiscreteSampler, ResampleFrom};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use token_graph::ids;
use token_graph::EdgePartition;

/// Re-sample every occurrence of one edge partition in place.
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
    let groups = part.group_vec();
    let local_dst_ids = &part.local_dst_ids;
    let local_to_global = &part.local_to_global;
    let attrs = &part.vertex_attrs;
    let slices = split_group_slices(&mut part.data, &groups);

    let semi = cfg.algorithm == LdaAlgorithm::ZenSemiLda;
    let k = cfg.num_topics;

    slices
        .into_par_iter()
        .zip(groups.par_iter())
        .enumerate()
        .map(|(gi, (slice, group))| -> anyhow::Result<SampleStats> {
            let mut stats = SampleStats::default();
            let term_vid = local_to_global[group.local_src as usize];
            if semi && ids::is_virtual_term_id(term_vid) {
                stats.skipped_groups += 1;
                return Ok(stats);
            }
            let term = &attrs[group.local_src as usize];

            let mut term_beta = vec![0.0; k];
            fill_term_beta_denoms(global, term, &mut term_beta);

            let mut wa_w = Vec::with_capacity(k);
            let mut wa_s = Vec::with_capacity(k);
            let wa_used = fill_wa(global, term, &mut wa_w, &mut wa_s);
            ensure!(wa_used > 0, "term {:#x} has no topic counts", term_vid);
            let mut term_dist = TermDist::for_group(cfg.accel, group.edges.len(), wa_used);
            term_dist.reset_dist(&wa_w, Some(&wa_s), wa_used)?;
            let wa_norm = term_dist.norm();

            let mut dwb = CumulativeDist::with_capacity(k);
            let mut dwb_w = Vec::with_capacity(k);
            let mut dwb_s = Vec::with_capacity(k);

            let mut rng = SmallRng::seed_from_u64(group_seed(
                cfg.seed,
                iter,
                pid,
                cfg.num_partitions,
                gi,
            ));

            for (off, occ) in slice.iter_mut().enumerate() {
                let e = group.edges.start + off;
                if cfg.sample_rate < 1.0 && rng.random::<f64>() >= cfg.sample_rate {
                    continue;
                }
                let doc = &attrs[local_dst_ids[e] as usize];

                if occ.len() == 1 {
                    // The token's own contribution is subtracted from the
                    // doc component directly; the term component handles
                    // it by rejection.
                    let kcur = occ[0];
                    let n_dwb =
                        fill_dwb(global, doc, &term_beta, Some(kcur), &mut dwb_w, &mut dwb_s);
                    let dwb_norm = if n_dwb > 0 {
                        dwb.reset_dist(&dwb_w, Some(&dwb_s), n_dwb)?;
                        dwb.norm()
                    } else {
                        0.0
                    };
                    let total = dwb_norm + wa_norm + global.ab_norm;
                    let u = rng.random::<f64>() * total;
                    occ[0] = if u < dwb_norm {
                        dwb.sample_from(u, &mut rng)
                    } else if u < dwb_norm + wa_norm {
                        let n_kw = term.get(kcur);
                        let corr = if n_kw > 0 { 1.0 / n_kw as f64 } else { 0.0 };
                        term_dist.resample_from(u - dwb_norm, &mut rng, kcur, corr)
                    } else {
                        global
                            .ab
                            .sample_from(u - dwb_norm - wa_norm, &mut rng)
                    };
                    stats.tokens += 1;
                } else {
                    // Multi-occurrence edge: one unadjusted doc component
                    // shared by all its tokens; both sparse components
                    // apply the one-term correction by rejection.
                    let n_dwb = fill_dwb(global, doc, &term_beta, None, &mut dwb_w, &mut dwb_s);
                    ensure!(n_dwb > 0, "doc without topic counts");
                    dwb.reset_dist(&dwb_w, Some(&dwb_s), n_dwb)?;
                    let dwb_norm = dwb.norm();
                    let total = dwb_norm + wa_norm + global.ab_norm;

                    for slot in occ.iter_mut() {
                        let kcur = *slot;
                        let u = rng.random::<f64>() * total;
                        *slot = if u < dwb_norm {
                            let n_kd = doc.get(kcur);
                            let corr = if n_kd > 0 { 1.0 / n_kd as f64 } else { 0.0 };
                            dwb.resample_from(u, &mut rng, kcur, corr)
                        } else if u < dwb_norm + wa_norm {
                            let n_kw = term.get(kcur);
                            let corr = if n_kw > 0 { 1.0 / n_kw as f64 } else { 0.0 };
                            term_dist.resample_from(u - dwb_norm, &mut rng, kcur, corr)
                        } else {
                            global
                                .ab
                                .sample_from(u - dwb_norm - wa_norm, &mut rng)
                        };
                        stats.tokens += 1;
                    }
                }
            }
            Ok(stats)
        })
        .try_reduce(SampleStats::default, |mut a, b| {
            a.merge(&b);
            Ok(a)
        })
}
