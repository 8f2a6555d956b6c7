//! Reduction and reconciliation of per-rank partial results.
//!
//! Once per pass every rank hands its partial centroids and counts to the
//! root, the root merges them, and the merged result is broadcast back so
//! every rank leaves the pass with an identical copy. A barrier closes the
//! pass.
//!
//! # Centroid merge
//!
//! With [`ReductionStrategy::AverageOfAverages`] a cluster's new centroid is
//! the unweighted mean of the partial centroids of the ranks that hold any
//! of its members. Each rank's local mean weighs the same regardless of how
//! many documents stand behind it, which biases centroids toward sparsely
//! represented ranks when partitions are unevenly filled.
//! [`ReductionStrategy::CountWeighted`] weighs each partial by its local
//! count, which equals the mean over all members.
//!
//! A cluster with no members anywhere keeps its previous centroid.

use crate::assign::LocalAssignment;
use crate::config::ReductionStrategy;
use crate::error::{ClusterError, Result};
use crate::group::{Group, Tag};
use crate::similarity::{mean, weighted_mean};
use crate::types::ClusterCounts;
use crate::vector::TermVector;
use serde::{Deserialize, Serialize};

/// The merged state every rank holds after a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciled {
    pub centroids: Vec<TermVector>,
    pub counts: ClusterCounts,
}

fn check_lengths(
    partials: &[Vec<Option<TermVector>>],
    counts: &[ClusterCounts],
    k: usize,
) -> Result<()> {
    if partials.len() != counts.len() {
        return Err(ClusterError::protocol(format!(
            "{} partial sets but {} count vectors",
            partials.len(),
            counts.len()
        )));
    }
    for (rank, (p, c)) in partials.iter().zip(counts).enumerate() {
        if p.len() != k || c.len() != k {
            return Err(ClusterError::protocol(format!(
                "rank {} reported {} partials and {} counts for {} clusters",
                rank,
                p.len(),
                c.len(),
                k
            )));
        }
    }
    Ok(())
}

/// Sum per-rank counts into the global counts.
pub fn sum_counts(counts: &[ClusterCounts], k: usize) -> Result<ClusterCounts> {
    let mut total = ClusterCounts::zeros(k);
    for (rank, c) in counts.iter().enumerate() {
        if c.len() != k {
            return Err(ClusterError::protocol(format!(
                "rank {} reported {} counts for {} clusters",
                rank,
                c.len(),
                k
            )));
        }
        total.accumulate(c);
    }
    Ok(total)
}

/// Merge per-rank partial centroids, indexed `[rank][cluster]`.
///
/// # Errors
/// Returns a protocol error if any rank reported the wrong number of
/// clusters.
pub fn merge_centroids(
    partials: &[Vec<Option<TermVector>>],
    counts: &[ClusterCounts],
    previous: &[TermVector],
    strategy: ReductionStrategy,
) -> Result<Vec<TermVector>> {
    let k = previous.len();
    check_lengths(partials, counts, k)?;

    let merged = (0..k)
        .map(|cluster| {
            let contributions: Vec<(&TermVector, u64)> = partials
                .iter()
                .zip(counts)
                .filter_map(|(p, c)| p[cluster].as_ref().map(|v| (v, c[cluster])))
                .collect();

            if contributions.is_empty() {
                tracing::debug!(cluster, "empty cluster keeps its previous centroid");
                return previous[cluster].clone();
            }

            match strategy {
                ReductionStrategy::AverageOfAverages => mean(contributions.iter().map(|(v, _)| *v)),
                ReductionStrategy::CountWeighted => {
                    weighted_mean(contributions.iter().map(|&(v, n)| (v, n as f64)))
                }
            }
        })
        .collect();

    Ok(merged)
}

/// Run one reconciliation round.
///
/// Every rank calls this with its local assignment and its copy of the
/// previous centroids, and returns the same merged result. The root
/// gathers partial centroids and counts as two separately tagged messages,
/// merges them, broadcasts the merge, and the round ends at a barrier.
pub fn reconcile<G: Group>(
    group: &G,
    local: &LocalAssignment,
    previous: &[TermVector],
    strategy: ReductionStrategy,
) -> Result<Reconciled> {
    let partials = group.gather(local.partials.clone(), Tag::Partials)?;
    let counts = group.gather(local.counts.clone(), Tag::Counts)?;

    let merged = match (partials, counts) {
        (Some(partials), Some(counts)) => {
            let k = previous.len();
            let counts_total = sum_counts(&counts, k)?;
            let centroids = merge_centroids(&partials, &counts, previous, strategy)?;
            tracing::trace!(counts = %counts_total, "merged partial results");
            Some(Reconciled {
                centroids,
                counts: counts_total,
            })
        }
        _ => None,
    };

    let reconciled: Reconciled = group.broadcast(merged, Tag::Reconciled)?;
    group.barrier()?;
    Ok(reconciled)
}
