//! Bipartite token graph for topic-model Gibbs sampling.
//!
//! Term vertices and document vertices, with edges carrying one topic
//! assignment per token occurrence of a (term, doc) pair. Edges live in
//! source-grouped partitions; the authoritative topic-count vectors live
//! in a routed vertex store and are rebuilt from the edge data once per
//! sampling iteration.

#![deny(missing_docs)]

/// Tagged 64-bit vertex identifiers
pub mod ids;

/// Dense/sparse topic-count vectors
pub mod counts;

/// Edge partitions with source-group indexing
pub mod edge;

/// Vertex store with routing
pub mod vertex;

/// Hash placement strategies for edges
pub mod partition;

/// Vertex-cut rebalancing by label propagation
pub mod vmblp;

pub use counts::TopicCount;
pub use edge::{EdgePartition, TokenEdge};
pub use ids::VertexId;
pub use partition::PartitionStrategy;
pub use vertex::{mix64, VertexPartition, VertexStore};
