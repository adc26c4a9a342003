//! Posterior decomposition shared across the word-by-word kernels.
//!
//! The collapsed conditional for a token of term w in doc d,
//!
//! ```text
//! p(k) ∝ (n_kw + β) · (n_kd + α_k) / (n_k + K·β)
//! ```
//!
//! with the asymmetric prior `α_k = αRatio · (n_k + α′)`, splits into
//! three non-negative terms by which counts are sparse:
//!
//! - `ab[k] = β · alphak_denoms[k]` — dense, depends only on global
//!   counters; rebuilt once per iteration
//! - `wa[k] = n_kw · alphak_denoms[k]` — sparse over the term support;
//!   rebuilt once per source group
//! - `dwb[k] = n_kd · term_beta_denoms[k]` — sparse over the doc
//!   support; rebuilt per edge (or per token when adjusted)
//!
//! The denominator vectors are shared by every token of the iteration.

use crate::config::LdaConfig;
use dist_util::{AliasTable, DiscreteSampler};
use token_graph::TopicCount;

/// Per-iteration global distributions and denominator vectors.
#[derive(Debug, Clone)]
pub struct GlobalDist {
    /// `1 / (n_k + K·β)`
    pub denoms: Vec<f64>,
    /// `α_k · denoms[k]`, computed as `αRatio · (α′·denoms[k] + 1)`
    pub alphak_denoms: Vec<f64>,
    /// `β · denoms[k]`
    pub beta_denoms: Vec<f64>,
    /// Asymmetric prior mass `α_k = alphak_denoms[k] / denoms[k]`
    pub alpha_k: Vec<f64>,
    /// `Σ_k α_k`
    pub alpha_sum: f64,
    /// Dense `ab` weights `β · alphak_denoms[k]`
    pub ab_weights: Vec<f64>,
    /// Total `ab` mass
    pub ab_norm: f64,
    /// Sampler over `ab`
    pub ab: AliasTable,
    /// Global per-topic token counts this iteration
    pub n_k: Vec<u64>,
    /// Total token count N
    pub num_tokens: u64,
}

impl GlobalDist {
    /// Build the iteration-level vectors from the global topic counter.
    pub fn compute(n_k: &[u64], num_tokens: u64, cfg: &LdaConfig) -> anyhow::Result<Self> {
        let k = cfg.num_topics;
        debug_assert_eq!(n_k.len(), k);
        let beta_sum = cfg.beta * k as f64;
        let alpha_ratio =
            cfg.alpha * k as f64 / (num_tokens as f64 + cfg.alpha_as * k as f64);

        let mut denoms = vec![0.0; k];
        let mut alphak_denoms = vec![0.0; k];
        let mut beta_denoms = vec![0.0; k];
        let mut alpha_k = vec![0.0; k];
        let mut ab_weights = vec![0.0; k];
        for t in 0..k {
            denoms[t] = 1.0 / (n_k[t] as f64 + beta_sum);
            alphak_denoms[t] = alpha_ratio * (cfg.alpha_as * denoms[t] + 1.0);
            beta_denoms[t] = cfg.beta * denoms[t];
            // Prior mass consistent with alphak_denoms under division by
            // denoms, so the decomposition is exact at every k
            alpha_k[t] = alphak_denoms[t] / denoms[t];
            ab_weights[t] = cfg.beta * alphak_denoms[t];
        }
        let alpha_sum: f64 = alpha_k.iter().sum();

        let mut ab = AliasTable::with_capacity(k);
        ab.reset_dist(&ab_weights, None, k)?;
        let ab_norm = ab.norm();

        Ok(GlobalDist {
            denoms,
            alphak_denoms,
            beta_denoms,
            alpha_k,
            alpha_sum,
            ab_weights,
            ab_norm,
            ab,
            n_k: n_k.to_vec(),
            num_tokens,
        })
    }
}

/// Fill `term_beta[k] = beta_denoms[k] + denoms[k] · n_kw` for one term.
///
/// Starts from a dense copy of `beta_denoms` and adds the sparse term
/// support on top; `term_beta` must have length K.
pub fn fill_term_beta_denoms(global: &GlobalDist, term: &TopicCount, term_beta: &mut [f64]) {
    term_beta.copy_from_slice(&global.beta_denoms);
    term.for_each_nonzero(|t, c| {
        term_beta[t as usize] += global.denoms[t as usize] * c as f64;
    });
}

/// Build the sparse `wa` weights for one term into `(weights, space)`.
/// Returns the number of active entries.
pub fn fill_wa(
    global: &GlobalDist,
    term: &TopicCount,
    weights: &mut Vec<f64>,
    space: &mut Vec<u32>,
) -> usize {
    weights.clear();
    space.clear();
    term.for_each_nonzero(|t, c| {
        weights.push(c as f64 * global.alphak_denoms[t as usize]);
        space.push(t);
    });
    weights.len()
}

/// Build the sparse `dwb` weights for one doc against a prepared
/// `term_beta` vector. With `adjust = Some(kcur)` the current token's
/// own contribution is subtracted from both the doc count and the term
/// count at `kcur`, giving the exact adjusted component.
pub fn fill_dwb(
    global: &GlobalDist,
    doc: &TopicCount,
    term_beta: &[f64],
    adjust: Option<u32>,
    weights: &mut Vec<f64>,
    space: &mut Vec<u32>,
) -> usize {
    weights.clear();
    space.clear();
    doc.for_each_nonzero(|t, c| {
        let mut cnt = c as f64;
        let mut tb = term_beta[t as usize];
        if adjust == Some(t) {
            cnt -= 1.0;
            tb -= global.denoms[t as usize];
        }
        if cnt > 0.0 {
            weights.push(cnt * tb);
            space.push(t);
        }
    });
    weights.len()
}

/// The full (unadjusted) conditional mass at topic `k`, used by the
/// Metropolis–Hastings acceptance ratio and the tests.
#[inline]
pub fn conditional(
    global: &GlobalDist,
    n_kw: f64,
    n_kd: f64,
    k: usize,
    cfg: &LdaConfig,
) -> f64 {
    (n_kw + cfg.beta) * (n_kd + global.alpha_k[k]) * global.denoms[k]
}
