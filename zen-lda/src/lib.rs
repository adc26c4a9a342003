//! Multi-threaded collapsed Gibbs sampling for Latent Dirichlet
//! Allocation on a bipartite token graph.
//!
//! Four sampler variants share one token-graph representation: a
//! word-by-word family (`ZenLda`, `ZenSemiLda`, `LightLda`) walking
//! source-grouped edge partitions, and a doc-by-doc `SparseLda`. After
//! each sweep the authoritative vertex counters are reconstructed from
//! the mutated occurrence arrays by a lock-free counter-update phase.
//!
//! # Pipeline per iteration
//!
//! 1. Rebuild the global topic counter and denominator vectors
//! 2. Re-attach vertex caches and run the selected kernel per partition
//! 3. Ship partial counters and merge them into the vertex store
//! 4. Optionally evaluate perplexity, save the model, or checkpoint

#![deny(missing_docs)]

/// Validated configuration and algorithm enums
pub mod config;

/// Buffered gz-or-plain file I/O
pub mod common_io;

/// Corpus readers and initial topic assignment
pub mod input;

/// Posterior decomposition shared by the word-by-word kernels
pub mod posterior;

/// Sampling kernels
pub mod sampler;

/// Vertex-counter aggregation
pub mod counter_update;

/// Held-in perplexity evaluation
pub mod perplexity;

/// Outer Gibbs iteration loop
pub mod trainer;

/// Model artifact writers
pub mod output;

/// Graph state checkpointing
pub mod checkpoint;

pub use config::{AccelMethod, InitStrategy, LdaAlgorithm, LdaConfig};
pub use trainer::Trainer;
