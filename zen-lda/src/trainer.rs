//! Outer Gibbs iteration loop.
//!
//! Per iteration: rebuild the global topic counter and denominator
//! vectors, re-attach the vertex caches, run the configured kernel over
//! every edge partition in parallel, then reconstruct the vertex
//! counters. Perplexity, model saves, and checkpoints hang off the
//! iteration boundary. An elapsed-time watchdog fails the iteration
//! before its counter update commits.

use crate::checkpoint::save_checkpoint;
use crate::config::{LdaAlgorithm, LdaConfig};
use crate::counter_update::update_counters;
use crate::input::CorpusGraph;
use crate::output::{save_model, ModelSink};
use crate::perplexity;
use crate::posterior::GlobalDist;
use crate::sampler::{light, sparse, zen, SampleStats};
use anyhow::{ensure, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rayon::prelude::*;
use std::path::Path;
use std::time::{Duration, Instant};

/// Owns the graph and drives the configured number of iterations.
pub struct Trainer {
    cfg: LdaConfig,
    /// The token graph being sampled
    pub graph: CorpusGraph,
}

impl Trainer {
    /// Validate the configuration and wrap the graph.
    pub fn new(cfg: LdaConfig, graph: CorpusGraph) -> Result<Self> {
        cfg.validate()?;
        Ok(Trainer { cfg, graph })
    }

    /// Run one sampling + counter-update round.
    pub fn run_iteration(&mut self, iter: usize) -> Result<SampleStats> {
        let cfg = &self.cfg;
        let k = cfg.num_topics;
        let deadline = Duration::from_secs(cfg.task_timeout_secs);

        let n_k = self.graph.store.global_topic_counts(k);
        let global = GlobalDist::compute(&n_k, self.graph.num_tokens, cfg)?;

        let store = &self.graph.store;
        let edge_parts = &mut self.graph.edge_parts;
        for part in edge_parts.iter_mut() {
            part.attach_vertex_attrs(store);
        }

        let started = Instant::now();
        let stats = edge_parts
            .par_iter_mut()
            .enumerate()
            .map(|(pid, part)| match cfg.algorithm {
                LdaAlgorithm::ZenLda | LdaAlgorithm::ZenSemiLda => {
                    zen::sample_partition(part, &global, cfg, iter, pid)
                }
                LdaAlgorithm::LightLda => light::sample_partition(part, &global, cfg, iter, pid),
                LdaAlgorithm::SparseLda => sparse::sample_partition(part, &global, cfg, iter, pid),
            })
            .try_reduce(SampleStats::default, |mut a, b| {
                a.merge(&b);
                Ok(a)
            })?;

        // Watchdog: a blown deadline fails the iteration before any
        // counter update commits
        ensure!(
            started.elapsed() <= deadline,
            "iteration {} exceeded the {}s task deadline",
            iter,
            cfg.task_timeout_secs
        );

        update_counters(&mut self.graph.edge_parts, &mut self.graph.store, k);
        Ok(stats)
    }

    /// Evaluate perplexity against the current counters.
    pub fn evaluate_perplexity(&mut self) -> Result<perplexity::Perplexity> {
        let n_k = self.graph.store.global_topic_counts(self.cfg.num_topics);
        let global = GlobalDist::compute(&n_k, self.graph.num_tokens, &self.cfg)?;
        let store = &self.graph.store;
        let edge_parts = &mut self.graph.edge_parts;
        for part in edge_parts.iter_mut() {
            part.attach_vertex_attrs(store);
        }
        perplexity::evaluate(edge_parts, &global, &self.cfg)
    }

    /// Drive all iterations, with optional model saves and checkpoints.
    pub fn run(&mut self, sink: Option<&ModelSink>, chkpt_dir: Option<&Path>) -> Result<()> {
        let total = self.cfg.total_iter;
        let pb = ProgressBar::new(total as u64).with_style(
            ProgressStyle::with_template("Gibbs {bar:40} {pos}/{len} iterations ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        for iter in 0..total {
            let started = Instant::now();
            let stats = self.run_iteration(iter)?;

            if self.cfg.calc_perplexity {
                let ppl = self.evaluate_perplexity()?;
                info!(
                    "iter {}: {} tokens in {:.2?}, perplexity {:.3} (word {:.3}, doc {:.3})",
                    iter,
                    stats.tokens,
                    started.elapsed(),
                    ppl.joint(),
                    ppl.word(),
                    ppl.doc()
                );
            } else {
                info!(
                    "iter {}: {} tokens in {:.2?}",
                    iter,
                    stats.tokens,
                    started.elapsed()
                );
            }

            if let Some(dir) = chkpt_dir {
                if self.cfg.chkpt_interval > 0 && (iter + 1) % self.cfg.chkpt_interval == 0 {
                    save_checkpoint(&self.graph, dir, iter + 1)?;
                }
            }
            if let Some(sink) = sink {
                if self.cfg.save_interval > 0 && (iter + 1) % self.cfg.save_interval == 0 {
                    save_model(&self.graph, sink, self.cfg.num_topics)?;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        if let Some(sink) = sink {
            save_model(&self.graph, sink, self.cfg.num_topics)?;
        }
        Ok(())
    }
}
