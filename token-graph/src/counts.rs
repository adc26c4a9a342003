//! Topic-count vectors in dense and sparse representations.
//!
//! Every hot path branches on the representation, so the two variants are
//! a tagged union with per-variant code paths rather than a trait object.
//! Sparse vectors keep sorted (topic, count) pairs; a term vector is
//! promoted to dense in place once its active size reaches `K/8`. Doc
//! vectors never promote.

/// Length-K vector of non-negative topic counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicCount {
    /// Length-K array of counts
    Dense(Vec<u32>),
    /// Sorted (topic, count) pairs, counts > 0
    Sparse(Vec<(u32, u32)>),
}

/// Promotion threshold: sparse vectors with at least `K/8` active topics
/// become dense.
#[inline]
pub fn promotion_threshold(num_topics: usize) -> usize {
    (num_topics / 8).max(1)
}

impl TopicCount {
    /// Empty sparse vector.
    pub fn sparse() -> Self {
        TopicCount::Sparse(Vec::new())
    }

    /// All-zero dense vector over `num_topics` topics.
    pub fn dense(num_topics: usize) -> Self {
        TopicCount::Dense(vec![0; num_topics])
    }

    /// Count for `topic`.
    #[inline]
    pub fn get(&self, topic: u32) -> u32 {
        match self {
            TopicCount::Dense(v) => v[topic as usize],
            TopicCount::Sparse(pairs) => match pairs.binary_search_by_key(&topic, |&(t, _)| t) {
                Ok(i) => pairs[i].1,
                Err(_) => 0,
            },
        }
    }

    /// Number of topics with a nonzero count.
    pub fn nnz(&self) -> usize {
        match self {
            TopicCount::Dense(v) => v.iter().filter(|&&c| c > 0).count(),
            TopicCount::Sparse(pairs) => pairs.len(),
        }
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        match self {
            TopicCount::Dense(v) => v.iter().map(|&c| c as u64).sum(),
            TopicCount::Sparse(pairs) => pairs.iter().map(|&(_, c)| c as u64).sum(),
        }
    }

    /// Add `delta` occurrences of `topic`.
    pub fn add(&mut self, topic: u32, delta: u32) {
        match self {
            TopicCount::Dense(v) => v[topic as usize] += delta,
            TopicCount::Sparse(pairs) => {
                match pairs.binary_search_by_key(&topic, |&(t, _)| t) {
                    Ok(i) => pairs[i].1 += delta,
                    Err(i) => pairs.insert(i, (topic, delta)),
                }
            }
        }
    }

    /// Increment the count of `topic` by one.
    #[inline]
    pub fn inc(&mut self, topic: u32) {
        self.add(topic, 1);
    }

    /// Decrement the count of `topic` by one. Sparse zero entries are
    /// removed so `nnz` stays exact.
    pub fn dec(&mut self, topic: u32) {
        match self {
            TopicCount::Dense(v) => {
                let c = &mut v[topic as usize];
                debug_assert!(*c > 0, "decrement of zero count at topic {}", topic);
                *c = c.saturating_sub(1);
            }
            TopicCount::Sparse(pairs) => {
                if let Ok(i) = pairs.binary_search_by_key(&topic, |&(t, _)| t) {
                    if pairs[i].1 <= 1 {
                        pairs.remove(i);
                    } else {
                        pairs[i].1 -= 1;
                    }
                }
            }
        }
    }

    /// Visit every (topic, count) with count > 0 in topic order.
    pub fn for_each_nonzero<F: FnMut(u32, u32)>(&self, mut f: F) {
        match self {
            TopicCount::Dense(v) => {
                for (t, &c) in v.iter().enumerate() {
                    if c > 0 {
                        f(t as u32, c);
                    }
                }
            }
            TopicCount::Sparse(pairs) => {
                for &(t, c) in pairs {
                    f(t, c);
                }
            }
        }
    }

    /// Copy into a dense length-`num_topics` vector.
    pub fn to_dense_vec(&self, num_topics: usize) -> Vec<u32> {
        let mut out = vec![0u32; num_topics];
        self.for_each_nonzero(|t, c| out[t as usize] += c);
        out
    }

    /// Promote a sparse vector to dense in place. No-op when already
    /// dense. Values are preserved exactly.
    pub fn promote(&mut self, num_topics: usize) {
        if let TopicCount::Sparse(pairs) = self {
            let mut dense = vec![0u32; num_topics];
            for &(t, c) in pairs.iter() {
                dense[t as usize] = c;
            }
            *self = TopicCount::Dense(dense);
        }
    }

    /// Merge `other` into `self` by element-wise addition.
    ///
    /// With `promote_at = Some(threshold)` the result is promoted to dense
    /// whenever its active size reaches the threshold — checked after
    /// every merge, including the sparse+sparse path. Pass `None` for doc
    /// vertices, which stay sparse.
    pub fn merge(&mut self, other: &TopicCount, num_topics: usize, promote_at: Option<usize>) {
        match (&mut *self, other) {
            (TopicCount::Dense(a), TopicCount::Dense(b)) => {
                debug_assert_eq!(a.len(), b.len());
                for (x, &y) in a.iter_mut().zip(b.iter()) {
                    *x += y;
                }
            }
            (TopicCount::Dense(a), TopicCount::Sparse(pairs)) => {
                for &(t, c) in pairs {
                    a[t as usize] += c;
                }
            }
            (TopicCount::Sparse(pairs), TopicCount::Dense(b)) => {
                let mut merged = b.clone();
                for &(t, c) in pairs.iter() {
                    merged[t as usize] += c;
                }
                *self = TopicCount::Dense(merged);
            }
            (TopicCount::Sparse(a), TopicCount::Sparse(b)) => {
                // Sorted two-way merge
                let mut out = Vec::with_capacity(a.len() + b.len());
                let (mut i, mut j) = (0, 0);
                while i < a.len() && j < b.len() {
                    match a[i].0.cmp(&b[j].0) {
                        std::cmp::Ordering::Less => {
                            out.push(a[i]);
                            i += 1;
                        }
                        std::cmp::Ordering::Greater => {
                            out.push(b[j]);
                            j += 1;
                        }
                        std::cmp::Ordering::Equal => {
                            out.push((a[i].0, a[i].1 + b[j].1));
                            i += 1;
                            j += 1;
                        }
                    }
                }
                out.extend_from_slice(&a[i..]);
                out.extend_from_slice(&b[j..]);
                *a = out;
            }
        }
        if let Some(threshold) = promote_at {
            if matches!(self, TopicCount::Sparse(p) if p.len() >= threshold) {
                self.promote(num_topics);
            }
        }
    }
}
