//! Local assignment of a rank's partition to the current centroids.
//!
//! Each document goes to the centroid with the highest cosine similarity;
//! ties go to the lowest cluster id. Afterwards the rank computes, for every
//! cluster it holds members of, the mean of those members: its partial
//! centroid for the reduction step.

use crate::dataset::Partition;
use crate::similarity::{cosine, magnitude, mean};
use crate::telemetry::Reporter;
use crate::types::{ClusterCounts, ClusterId, DocumentId};
use crate::vector::{Document, TermVector};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Find the most similar centroid.
///
/// Scans left to right and only moves on a strictly greater similarity, so
/// the first maximum wins. A document with no similarity to anything
/// (including an all-zero document) lands in cluster 0.
pub fn nearest_centroid(vector: &TermVector, centroids: &[TermVector]) -> (ClusterId, f64) {
    let mut best = (ClusterId(0), f64::NEG_INFINITY);
    for (i, centroid) in centroids.iter().enumerate() {
        let similarity = cosine(vector, centroid);
        if similarity > best.1 {
            best = (ClusterId(i), similarity);
        }
    }
    best
}

/// Where per-document progress is reported during a pass.
#[derive(Clone, Copy)]
pub struct ProgressHook<'a> {
    pub reporter: &'a Reporter,
    pub pass: usize,
    /// Report every this many documents.
    pub step: usize,
}

/// Result of assigning one partition.
#[derive(Debug, Clone)]
pub struct LocalAssignment {
    /// Cluster of each partition document, in partition order.
    pub assignments: Vec<ClusterId>,
    /// Similarity of each document to its chosen centroid.
    pub similarities: Vec<f64>,
    /// Local member count per cluster.
    pub counts: ClusterCounts,
    /// Local mean per cluster; `None` where this rank has no members.
    pub partials: Vec<Option<TermVector>>,
}

impl LocalAssignment {
    /// Document ids per cluster, in partition order.
    pub fn members(&self, partition: &Partition) -> Vec<Vec<DocumentId>> {
        let mut members = vec![Vec::new(); self.counts.len()];
        for (doc, cluster) in partition.documents().iter().zip(&self.assignments) {
            members[cluster.as_usize()].push(doc.id.clone());
        }
        members
    }
}

/// Assign every document of `partition` and compute the local partial
/// centroids.
pub fn assign_partition(
    partition: &Partition,
    centroids: &[TermVector],
    progress: Option<ProgressHook<'_>>,
) -> LocalAssignment {
    let documents = partition.documents();
    let total = documents.len();
    let done = AtomicUsize::new(0);

    let nearest: Vec<(ClusterId, f64)> = documents
        .par_iter()
        .map(|doc| {
            let (cluster, similarity) = nearest_centroid(&doc.vector, centroids);
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(hook) = &progress {
                if n % hook.step.max(1) == 0 || n == total {
                    hook.reporter.update_text(format!(
                        "Pass# {:3}       {}  --->  {}",
                        hook.pass, doc.id, cluster
                    ));
                    hook.reporter.update_progress(n as u64, total as u64);
                }
            }
            (cluster, similarity)
        })
        .collect();
    // Worker threads race on the slot; settle it at the full count.
    if let Some(hook) = &progress {
        hook.reporter.update_progress(total as u64, total as u64);
    }

    let empty_docs = documents.iter().filter(|d| magnitude(&d.vector) == 0.0).count();
    if empty_docs > 0 {
        tracing::debug!(
            rank = partition.rank(),
            empty_docs,
            "all-zero documents assigned to cluster 0"
        );
    }

    let k = centroids.len();
    let mut counts = ClusterCounts::zeros(k);
    let mut groups: Vec<Vec<&Document>> = vec![Vec::new(); k];
    for (doc, (cluster, _)) in documents.iter().zip(&nearest) {
        counts.increment(*cluster);
        groups[cluster.as_usize()].push(doc);
    }

    let partials = groups
        .par_iter()
        .map(|members| {
            if members.is_empty() {
                None
            } else {
                Some(mean(members.iter().map(|d| &d.vector)))
            }
        })
        .collect();

    let (assignments, similarities) = nearest.into_iter().unzip();
    LocalAssignment {
        assignments,
        similarities,
        counts,
        partials,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::ROOT;
    use crate::telemetry::Progress;

    fn tv(pairs: &[(&str, f64)]) -> TermVector {
        pairs.iter().map(|&(t, w)| (t, w)).collect()
    }

    fn partition(docs: &[(&str, TermVector)]) -> Partition {
        Partition::from_documents(
            0,
            docs.iter()
                .map(|(id, v)| Document::new(*id, v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_nearest_first_max_wins() {
        let centroids = vec![tv(&[("x", 1.0)]), tv(&[("y", 1.0)])];
        let (cluster, sim) = nearest_centroid(&tv(&[("x", 1.0), ("y", 1.0)]), &centroids);
        assert_eq!(cluster, ClusterId(0));
        assert!((sim - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);

        let (cluster, _) = nearest_centroid(&tv(&[("x", 1.0), ("y", 2.0)]), &centroids);
        assert_eq!(cluster, ClusterId(1));
    }

    #[test]
    fn test_zero_vector_goes_to_cluster_zero() {
        let centroids = vec![tv(&[("x", 1.0)]), tv(&[("y", 1.0)])];
        for _ in 0..3 {
            let (cluster, sim) = nearest_centroid(&TermVector::new(), &centroids);
            assert_eq!(cluster, ClusterId(0));
            assert_eq!(sim, 0.0);
        }
    }

    #[test]
    fn test_assign_two_clusters() {
        let part = partition(&[
            ("a", tv(&[("x", 1.0)])),
            ("b", tv(&[("x", 1.0)])),
            ("c", tv(&[("y", 1.0)])),
            ("d", tv(&[("y", 1.0)])),
        ]);
        let seeds = vec![tv(&[("x", 1.0)]), tv(&[("y", 1.0)])];
        let result = assign_partition(&part, &seeds, None);

        assert_eq!(
            result.assignments,
            vec![ClusterId(0), ClusterId(0), ClusterId(1), ClusterId(1)]
        );
        assert!(result.similarities.iter().all(|&s| (s - 1.0).abs() < 1e-12));
        assert_eq!(result.counts.as_slice(), &[2, 2]);
        assert_eq!(result.partials[0].as_ref(), Some(&seeds[0]));
        assert_eq!(result.partials[1].as_ref(), Some(&seeds[1]));

        let members = result.members(&part);
        assert_eq!(members[0], vec![DocumentId::new("a"), DocumentId::new("b")]);
        assert_eq!(members[1], vec![DocumentId::new("c"), DocumentId::new("d")]);
    }

    #[test]
    fn test_empty_local_group_has_no_partial() {
        let part = partition(&[("a", tv(&[("x", 1.0)]))]);
        let seeds = vec![tv(&[("x", 1.0)]), tv(&[("y", 1.0)])];
        let result = assign_partition(&part, &seeds, None);
        assert_eq!(result.counts.as_slice(), &[1, 0]);
        assert!(result.partials[1].is_none());
    }

    #[test]
    fn test_progress_reported() {
        let part = partition(&[("a", tv(&[("x", 1.0)])), ("b", tv(&[("y", 1.0)]))]);
        let seeds = vec![tv(&[("x", 1.0)]), tv(&[("y", 1.0)])];
        let reporter = Reporter::new(ROOT, 1);
        let hook = ProgressHook {
            reporter: &reporter,
            pass: 3,
            step: 2,
        };
        assign_partition(&part, &seeds, Some(hook));

        let board = reporter.board_snapshot().unwrap();
        assert_eq!(board.progress(0).unwrap().completed, 2);
        assert!(board.message(0).unwrap().starts_with("Pass#   3"));
    }

    #[test]
    fn test_progress_ends_at_total() {
        let docs: Vec<(String, TermVector)> = (0..2000)
            .map(|i| (format!("t{}", i), tv(&[("x", 1.0 + i as f64), ("y", 1.0)])))
            .collect();
        let part = Partition::from_documents(
            0,
            docs.iter()
                .map(|(id, v)| Document::new(id.as_str(), v.clone()))
                .collect(),
        );
        let seeds = vec![tv(&[("x", 1.0)]), tv(&[("y", 1.0)])];
        let reporter = Reporter::new(ROOT, 1);

        for _ in 0..5 {
            let hook = ProgressHook {
                reporter: &reporter,
                pass: 1,
                step: 1,
            };
            assign_partition(&part, &seeds, Some(hook));
            let board = reporter.board_snapshot().unwrap();
            assert_eq!(board.progress(0), Some(Progress::new(2000, 2000)));
        }
    }
}
