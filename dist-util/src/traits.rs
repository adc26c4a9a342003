//! Common capability shared by the discrete samplers.

use rand::Rng;

/// A discrete distribution over up to K outcomes, built from an
/// unnormalized weight vector.
///
/// Outcomes are `u32` labels. With a dense build the label is the weight
/// index; with a sparse build the label comes from the caller-provided
/// outcome space.
pub trait DiscreteSampler {
    /// Clear the sampler and reserve capacity for `k` outcomes.
    fn reset(&mut self, k: usize);

    /// Rebuild from the first `used` entries of `weights`.
    ///
    /// When `space` is given, outcome labels are `space[i]`; otherwise the
    /// label of entry `i` is `i` itself. Fails if the total mass is not a
    /// positive finite number (a zero or NaN norm means a corrupted
    /// counter upstream).
    fn reset_dist(
        &mut self,
        weights: &[f64],
        space: Option<&[u32]>,
        used: usize,
    ) -> anyhow::Result<()>;

    /// Total unnormalized mass of the current distribution.
    fn norm(&self) -> f64;

    /// Draw an outcome given a uniform `u` in `[0, norm())`.
    ///
    /// `rng` supplies any additional randomness the method needs beyond
    /// the routed `u` (e.g. the alias coin flip on a redraw).
    fn sample_from<R: Rng>(&self, u: f64, rng: &mut R) -> u32;
}

/// Samplers that support the one-term rejection correction.
///
/// To draw from `P(k) ∝ f(k) − δ·[k = excluded]` given a table built from
/// `f`: sample `k ~ f`; if `k == excluded`, reject with probability
/// `correction = δ / f(excluded)` and redraw. The correction never
/// requires rebuilding the table.
pub trait ResampleFrom: DiscreteSampler {
    /// Draw from the current distribution with the contribution `δ` of
    /// `excluded` subtracted, where `correction = δ / f(excluded)`.
    fn resample_from<R: Rng>(&self, u: f64, rng: &mut R, excluded: u32, correction: f64) -> u32 {
        let mut k = self.sample_from(u, rng);
        let mut tries = 0;
        while k == excluded && rng.random::<f64>() < correction {
            tries += 1;
            if tries >= MAX_REDRAWS {
                break;
            }
            k = self.sample_from(rng.random::<f64>() * self.norm(), rng);
        }
        k
    }
}

/// Cap on rejection redraws.
///
/// Only reachable when the corrected distribution has (numerically) no
/// mass outside `excluded`; the last draw is returned as-is.
pub(crate) const MAX_REDRAWS: usize = 64;
