//! Tagged 64-bit vertex identifiers.
//!
//! Terms and documents share one id space, split by the high bit. A
//! second tag bit marks virtual terms (label pseudo-terms), which some
//! sampling variants skip.

/// Global vertex identifier.
pub type VertexId = u64;

const TERM_TAG: u64 = 1 << 63;
const VIRTUAL_TAG: u64 = 1 << 62;
const INDEX_MASK: u64 = VIRTUAL_TAG - 1;

/// Make a term vertex id from a term index.
#[inline]
pub fn term_id(index: u64) -> VertexId {
    debug_assert!(index & !INDEX_MASK == 0);
    index | TERM_TAG
}

/// Make a virtual-term vertex id from a label class index.
#[inline]
pub fn virtual_term_id(index: u64) -> VertexId {
    debug_assert!(index & !INDEX_MASK == 0);
    index | TERM_TAG | VIRTUAL_TAG
}

/// Make a document vertex id from a doc index.
#[inline]
pub fn doc_id(index: u64) -> VertexId {
    debug_assert!(index & !INDEX_MASK == 0);
    index
}

/// True for term vertices (real or virtual).
#[inline]
pub fn is_term_id(vid: VertexId) -> bool {
    vid & TERM_TAG != 0
}

/// True for virtual term vertices.
#[inline]
pub fn is_virtual_term_id(vid: VertexId) -> bool {
    vid & TERM_TAG != 0 && vid & VIRTUAL_TAG != 0
}

/// True for document vertices.
#[inline]
pub fn is_doc_id(vid: VertexId) -> bool {
    vid & TERM_TAG == 0
}

/// Strip the tag bits, recovering the term/doc/class index.
#[inline]
pub fn index_of(vid: VertexId) -> u64 {
    vid & INDEX_MASK
}
