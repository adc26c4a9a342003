//! Run configuration with startup validation.

use anyhow::{bail, Result};
use clap::ValueEnum;

/// Which Gibbs sampler variant to run.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
pub enum LdaAlgorithm {
    /// Word-by-word sampler skipping virtual (label) terms
    ZenSemiLda,
    /// Word-by-word sampler over all terms
    ZenLda,
    /// Word-by-word Metropolis–Hastings sampler with in-place counters
    LightLda,
    /// Doc-by-doc sampler with per-token rebuilt distributions
    SparseLda,
}

/// Backing structure for the per-term distribution.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
pub enum AccelMethod {
    /// Walker alias tables everywhere
    Alias,
    /// F+ trees everywhere
    Ftree,
    /// Alias for long source groups, F+ tree for short ones
    Hybrid,
}

/// How the first topic assignments are drawn.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
pub enum InitStrategy {
    /// Uniform topic per token
    Random,
    /// One topic per (term, doc) pair shared by its occurrences
    Sparse,
    /// Topic by term index modulo K
    Split,
}

/// Corpus file layout.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
pub enum InputFormat {
    /// Whitespace-tokenized text, one doc per line
    Raw,
    /// Bag-of-words `term:count` entries
    Bow,
    /// Bag-of-words with a leading label class, repeats subsampled
    Semi,
}

/// Edge placement at graph construction.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
pub enum PartStrategy {
    /// Hash by term
    ByTerm,
    /// Hash by doc
    ByDoc,
    /// 2-D grid placement
    Edge2D,
    /// Degree-based hashing
    Dbh,
    /// ByTerm seeding followed by label-propagation rebalancing
    Vsdlp,
    /// Degree-based seeding followed by label-propagation rebalancing
    Bbr,
}

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct LdaConfig {
    /// Number of topics K
    pub num_topics: usize,
    /// Doc-topic prior concentration α
    pub alpha: f64,
    /// Term-topic prior concentration β
    pub beta: f64,
    /// Asymmetric-prior hyperparameter α′
    pub alpha_as: f64,
    /// Total Gibbs iterations
    pub total_iter: usize,
    /// Number of edge partitions
    pub num_partitions: usize,
    /// Rayon worker threads (0 = rayon default)
    pub num_threads: usize,
    /// Base RNG seed
    pub seed: u64,
    /// Per-edge sampling probability per iteration
    pub sample_rate: f64,
    /// Sampler variant
    pub algorithm: LdaAlgorithm,
    /// Per-term distribution backing
    pub accel: AccelMethod,
    /// Initial topic assignment
    pub init: InitStrategy,
    /// Edge placement
    pub part_strategy: PartStrategy,
    /// Metropolis–Hastings moves per token (LightLDA)
    pub mh_steps: usize,
    /// Iteration watchdog in seconds; exceeding it fails the iteration
    pub task_timeout_secs: u64,
    /// Evaluate perplexity each iteration
    pub calc_perplexity: bool,
    /// Save the model every n iterations (0 = only at the end)
    pub save_interval: usize,
    /// Checkpoint the graph every n iterations (0 = never)
    pub chkpt_interval: usize,
}

impl Default for LdaConfig {
    fn default() -> Self {
        LdaConfig {
            num_topics: 100,
            alpha: 0.1,
            beta: 0.01,
            alpha_as: 0.1,
            total_iter: 100,
            num_partitions: 2,
            num_threads: 0,
            seed: 42,
            sample_rate: 1.0,
            algorithm: LdaAlgorithm::ZenLda,
            accel: AccelMethod::Alias,
            init: InitStrategy::Random,
            part_strategy: PartStrategy::Dbh,
            mh_steps: 8,
            task_timeout_secs: 3600,
            calc_perplexity: false,
            save_interval: 0,
            chkpt_interval: 0,
        }
    }
}

impl LdaConfig {
    /// Validate all numeric fields. Called once at startup; any failure
    /// is a usage error.
    pub fn validate(&self) -> Result<()> {
        if self.num_topics == 0 {
            bail!("numTopics must be positive");
        }
        if !(self.alpha > 0.0) {
            bail!("alpha must be positive, got {}", self.alpha);
        }
        if !(self.beta > 0.0) {
            bail!("beta must be positive, got {}", self.beta);
        }
        if !(self.alpha_as > 0.0) {
            bail!("alphaAS must be positive, got {}", self.alpha_as);
        }
        if self.total_iter == 0 {
            bail!("totalIter must be positive");
        }
        if self.num_partitions == 0 {
            bail!("numPartitions must be positive");
        }
        if !(self.sample_rate > 0.0 && self.sample_rate <= 1.0) {
            bail!("sampleRate must be in (0, 1], got {}", self.sample_rate);
        }
        if self.mh_steps == 0 {
            bail!("mhSteps must be positive");
        }
        if self.task_timeout_secs == 0 {
            bail!("taskTimeoutSecs must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(LdaConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_numerics() {
        for f in [
            |c: &mut LdaConfig| c.num_topics = 0,
            |c: &mut LdaConfig| c.alpha = 0.0,
            |c: &mut LdaConfig| c.beta = -0.5,
            |c: &mut LdaConfig| c.alpha_as = f64::NAN,
            |c: &mut LdaConfig| c.total_iter = 0,
            |c: &mut LdaConfig| c.num_partitions = 0,
            |c: &mut LdaConfig| c.sample_rate = 0.0,
            |c: &mut LdaConfig| c.sample_rate = 1.5,
        ] {
            let mut cfg = LdaConfig::default();
            f(&mut cfg);
            assert!(cfg.validate().is_err(), "accepted bad config {:?}", cfg);
        }
    }
}
