//! Core newtypes for the clustering run.
//!
//! These keep document identifiers, cluster indices and count vectors from
//! being mixed up with plain strings and integers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// Opaque identifier of a document (a track id in the lyrics corpus).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Create a new DocumentId.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    #[inline]
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for DocumentId {
    #[inline]
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Index of a cluster in `0..K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ClusterId(pub usize);

impl ClusterId {
    /// Create a new ClusterId.
    #[inline]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Get the raw usize value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for ClusterId {
    #[inline]
    fn from(id: usize) -> Self {
        Self(id)
    }
}

/// Number of documents assigned to each cluster, indexed by cluster id.
///
/// Compared by value between consecutive passes to detect convergence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterCounts(Vec<u64>);

impl ClusterCounts {
    /// All-zero counts for `k` clusters.
    pub fn zeros(k: usize) -> Self {
        Self(vec![0; k])
    }

    /// Wrap an existing count vector.
    pub fn from_vec(counts: Vec<u64>) -> Self {
        Self(counts)
    }

    /// Number of clusters.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no clusters.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Increment the count of one cluster.
    #[inline]
    pub fn increment(&mut self, cluster: ClusterId) {
        self.0[cluster.as_usize()] += 1;
    }

    /// Add another count vector of the same length element-wise.
    pub fn accumulate(&mut self, other: &ClusterCounts) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine += theirs;
        }
    }

    /// Total number of assigned documents.
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    /// Borrow the counts as a slice.
    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }
}

impl Index<usize> for ClusterCounts {
    type Output = u64;

    fn index(&self, index: usize) -> &u64 {
        &self.0[index]
    }
}

impl fmt::Display for ClusterCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id() {
        let id = DocumentId::new("TRAAAAV128F421A322");
        assert_eq!(id.as_str(), "TRAAAAV128F421A322");
        assert_eq!(format!("{}", id), "TRAAAAV128F421A322");

        let id2: DocumentId = "TRB".into();
        assert!(id2 > id);
    }

    #[test]
    fn test_cluster_counts() {
        let mut counts = ClusterCounts::zeros(3);
        counts.increment(ClusterId(0));
        counts.increment(ClusterId(2));
        counts.increment(ClusterId(2));
        assert_eq!(counts.as_slice(), &[1, 0, 2]);
        assert_eq!(counts.total(), 3);

        counts.accumulate(&ClusterCounts::from_vec(vec![4, 1, 0]));
        assert_eq!(counts.as_slice(), &[5, 1, 2]);
        assert_eq!(counts[0], 5);
        assert_eq!(format!("{}", counts), "[5, 1, 2]");
    }

    #[test]
    fn test_counts_equality_is_ordered() {
        let a = ClusterCounts::from_vec(vec![2, 1]);
        let b = ClusterCounts::from_vec(vec![1, 2]);
        assert_ne!(a, b);
        assert_eq!(a, ClusterCounts::from_vec(vec![2, 1]));
    }
}
