//! The convergence loop every rank runs.
//!
//! Setup picks the initial centroids on the root and broadcasts them, then
//! each rank caches its partition. Every pass assigns the local partition,
//! reconciles across the group and compares the global counts with the
//! previous pass; the loop ends on the first pass whose counts repeat.
//! Finally the root gathers every rank's membership lists and hands the
//! result to its [`ResultSink`].
//!
//! ```no_run
//! use lyric_kmeans::{ClusterConfig, Coordinator, Corpus, LocalGroup, Reporter};
//! use lyric_kmeans::group::Group;
//!
//! let corpus = Corpus::generate(1000, 200, 20, 7);
//! let endpoint = LocalGroup::new(1).endpoints().remove(0);
//! let reporter = Reporter::new(endpoint.rank(), endpoint.size());
//! let outcome = Coordinator::init(endpoint, &corpus, ClusterConfig::new(6), reporter)?
//!     .run()?;
//! println!("{}", outcome.statistics.summary());
//! # Ok::<(), lyric_kmeans::ClusterError>(())
//! ```

use crate::assign::{assign_partition, LocalAssignment, ProgressHook};
use crate::config::{ClusterConfig, Seeding};
use crate::dataset::{partition_range, DocumentSource, Partition};
use crate::error::{ClusterError, Result};
use crate::group::{Group, Rank, Tag};
use crate::metrics::RunStatistics;
use crate::persistence::Checkpoint;
use crate::reduce::reconcile;
use crate::report::ResultSink;
use crate::telemetry::Reporter;
use crate::types::{ClusterCounts, DocumentId};
use crate::vector::TermVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

/// Final clustering, assembled on the root.
#[derive(Debug, Clone)]
pub struct ClusteringResult {
    pub centroids: Vec<TermVector>,
    pub counts: ClusterCounts,
    /// Member ids per cluster, in dataset order.
    pub clusters: Vec<Vec<DocumentId>>,
    pub statistics: RunStatistics,
}

/// What one rank ends a run with.
#[derive(Debug, Clone)]
pub struct RankOutcome {
    pub rank: Rank,
    pub centroids: Vec<TermVector>,
    pub counts: ClusterCounts,
    pub statistics: RunStatistics,
    /// Present on the root only.
    pub result: Option<ClusteringResult>,
}

/// Draw `k` distinct documents as initial centroids.
fn random_seeds<S: DocumentSource + ?Sized>(
    source: &S,
    k: usize,
    seed: Option<u64>,
) -> Result<Vec<TermVector>> {
    let ids = source.document_ids();
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    rand::seq::index::sample(&mut rng, ids.len(), k)
        .into_iter()
        .map(|i| source.vector(&ids[i]))
        .collect()
}

/// Per-rank driver of the clustering loop.
pub struct Coordinator<G: Group> {
    group: G,
    config: ClusterConfig,
    reporter: Reporter,
    partition: Partition,
    total_documents: usize,
    progress_step: usize,
    centroids: Vec<TermVector>,
    counts: ClusterCounts,
    previous: Option<ClusterCounts>,
    last: Option<LocalAssignment>,
    statistics: RunStatistics,
    sink: Option<Box<dyn ResultSink>>,
}

impl<G: Group> Coordinator<G> {
    /// Validate the run, distribute the initial centroids and cache this
    /// rank's partition.
    ///
    /// Every rank validates before communicating, so a bad configuration
    /// fails everywhere without a hang.
    ///
    /// # Errors
    /// Configuration errors, source lookup failures and stalls, annotated
    /// with the rank and pass 0.
    pub fn init<S: DocumentSource + ?Sized>(
        group: G,
        source: &S,
        config: ClusterConfig,
        reporter: Reporter,
    ) -> Result<Self> {
        let rank = group.rank();
        Self::setup(group, source, config, reporter).map_err(|e| e.at(rank, 0))
    }

    fn setup<S: DocumentSource + ?Sized>(
        group: G,
        source: &S,
        config: ClusterConfig,
        reporter: Reporter,
    ) -> Result<Self> {
        let started = Instant::now();
        let (rank, size) = (group.rank(), group.size());
        let k = config.k;

        if group.is_root() {
            reporter.update_text("Counting tracks...");
            reporter.update_progress(0, 1);
        }
        let total_documents = source.len();
        config.validate(total_documents, size)?;

        let seeds = if group.is_root() {
            reporter.update_text(format!("Picking random centroids K={}", k));
            reporter.update_progress(1, 2);
            let seeds = match &config.seeding {
                Seeding::Explicit(centroids) => centroids.clone(),
                Seeding::Random => random_seeds(source, k, config.seed)?,
            };
            reporter.update_text("Transmitting initial values");
            reporter.update_progress(2, 2);
            Some(seeds)
        } else {
            reporter.update_text("Waiting for initial centroids...");
            reporter.update_progress(0, 1);
            None
        };

        let centroids: Vec<TermVector> = group.broadcast(seeds, Tag::Seeds)?;
        if centroids.len() != k {
            return Err(ClusterError::protocol(format!(
                "received {} initial centroids for {} clusters",
                centroids.len(),
                k
            )));
        }
        reporter.update_progress(1, 1);

        let range = partition_range(total_documents, size, rank);
        reporter.update_text(format!("Caching track_ids, chunksz={}", range.len()));
        let partition = Partition::build(source, rank, size)?;
        let progress_step = ClusterConfig::progress_step(total_documents);

        reporter.update_text(format!(
            "Set up is complete, starting k-means. modpct = {} ntracks={}",
            progress_step,
            partition.len()
        ));
        tracing::debug!(
            rank,
            documents = partition.len(),
            terms = partition.term_count(),
            "partition cached"
        );

        let mut statistics = RunStatistics::new();
        statistics.setup_time = started.elapsed();

        Ok(Self {
            group,
            config,
            reporter,
            partition,
            total_documents,
            progress_step,
            centroids,
            counts: ClusterCounts::zeros(k),
            previous: None,
            last: None,
            statistics,
            sink: None,
        })
    }

    /// Send checkpoints and the final result to `sink` (used on the root
    /// only).
    pub fn with_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// This rank.
    pub fn rank(&self) -> Rank {
        self.group.rank()
    }

    /// Current centroids.
    pub fn centroids(&self) -> &[TermVector] {
        &self.centroids
    }

    /// Global counts of the last pass.
    pub fn counts(&self) -> &ClusterCounts {
        &self.counts
    }

    /// This rank's documents.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Statistics so far.
    pub fn statistics(&self) -> &RunStatistics {
        &self.statistics
    }

    /// Run one pass: assign, reconcile, compare.
    ///
    /// Returns `true` when the global counts equal those of the previous
    /// pass. The first pass never converges.
    ///
    /// # Errors
    /// Stalls and protocol errors, annotated with the rank and pass.
    pub fn step(&mut self) -> Result<bool> {
        let pass = self.statistics.passes + 1;
        let rank = self.rank();
        self.pass(pass).map_err(|e| e.at(rank, pass))
    }

    fn pass(&mut self, pass: usize) -> Result<bool> {
        let started = Instant::now();
        self.reporter.update_progress(0, self.partition.len() as u64);

        let hook = ProgressHook {
            reporter: &self.reporter,
            pass,
            step: self.progress_step,
        };
        let local = assign_partition(&self.partition, &self.centroids, Some(hook));
        self.reporter
            .update_text(format!("Recomputing centroids...{}", local.counts));

        let reconciled = reconcile(&self.group, &local, &self.centroids, self.config.reduction)?;
        if reconciled.counts.total() != self.total_documents as u64 {
            return Err(ClusterError::protocol(format!(
                "counts {} cover {} of {} documents",
                reconciled.counts,
                reconciled.counts.total(),
                self.total_documents
            )));
        }

        let converged = self.previous.as_ref() == Some(&reconciled.counts);
        self.centroids = reconciled.centroids;
        self.counts = reconciled.counts;
        self.previous = Some(self.counts.clone());
        self.last = Some(local);

        self.statistics
            .record_pass(started.elapsed(), self.counts.clone());
        if converged {
            self.statistics.mark_converged();
        }

        if self.group.is_root() {
            tracing::info!(pass, counts = %self.counts, converged, "pass complete");
            if let Some(sink) = self.sink.as_mut() {
                let checkpoint = Checkpoint {
                    pass,
                    centroids: self.centroids.clone(),
                    counts: self.counts.clone(),
                };
                if let Err(err) = sink.checkpoint(&checkpoint) {
                    tracing::warn!(pass, %err, "checkpoint not written");
                }
            }
        }

        Ok(converged)
    }

    /// Iterate until the counts stabilise (or the pass cap is hit), then
    /// gather the result.
    ///
    /// # Errors
    /// Any fatal error of a pass or of the final gather.
    pub fn run(mut self) -> Result<RankOutcome> {
        loop {
            if self.step()? {
                break;
            }
            if let Some(max) = self.config.max_passes {
                if self.statistics.passes >= max {
                    if self.group.is_root() {
                        tracing::warn!(max, "pass cap reached before convergence");
                    }
                    break;
                }
            }
        }
        self.finish()
    }

    /// Gather membership on the root and emit the result.
    ///
    /// # Errors
    /// Stalls during the gather or sink failures on the root.
    pub fn finish(mut self) -> Result<RankOutcome> {
        let rank = self.rank();
        let pass = self.statistics.passes;
        let result = self.collect().map_err(|e| e.at(rank, pass))?;

        self.reporter.update_text(match &self.statistics.converged_at {
            Some(at) => format!("Done: converged at pass {}", at),
            None => format!("Done: stopped after {} passes", pass),
        });
        self.reporter.update_progress(1, 1);

        Ok(RankOutcome {
            rank,
            centroids: self.centroids,
            counts: self.counts,
            statistics: self.statistics,
            result,
        })
    }

    fn collect(&mut self) -> Result<Option<ClusteringResult>> {
        let k = self.config.k;
        let members = match &self.last {
            Some(local) => local.members(&self.partition),
            None => vec![Vec::new(); k],
        };

        let gathered = match self.group.gather(members, Tag::Members)? {
            Some(gathered) => gathered,
            None => return Ok(None),
        };

        let mut clusters: Vec<Vec<DocumentId>> = vec![Vec::new(); k];
        for per_rank in gathered {
            if per_rank.len() != k {
                return Err(ClusterError::protocol(format!(
                    "membership for {} clusters, expected {}",
                    per_rank.len(),
                    k
                )));
            }
            for (cluster, ids) in clusters.iter_mut().zip(per_rank) {
                cluster.extend(ids);
            }
        }

        let result = ClusteringResult {
            centroids: self.centroids.clone(),
            counts: self.counts.clone(),
            clusters,
            statistics: self.statistics.clone(),
        };
        if let Some(sink) = self.sink.as_mut() {
            sink.finish(&result)?;
        }
        tracing::info!("{}", result.statistics.summary());
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Corpus;
    use crate::group::LocalGroup;
    use crate::report::MemorySink;
    use crate::vector::Document;

    fn tv(pairs: &[(&str, f64)]) -> TermVector {
        pairs.iter().map(|&(t, w)| (t, w)).collect()
    }

    fn four_docs() -> Corpus {
        [
            Document::new("a", tv(&[("x", 1.0)])),
            Document::new("b", tv(&[("x", 1.0)])),
            Document::new("c", tv(&[("y", 1.0)])),
            Document::new("d", tv(&[("y", 1.0)])),
        ]
        .into_iter()
        .collect()
    }

    fn single(
        corpus: &Corpus,
        config: ClusterConfig,
    ) -> Result<Coordinator<crate::group::LocalEndpoint>> {
        let endpoint = LocalGroup::new(1).endpoints().remove(0);
        Coordinator::init(endpoint, corpus, config, Reporter::new(0, 1))
    }

    #[test]
    fn test_first_pass_never_converges() {
        let corpus = four_docs();
        let config = ClusterConfig::new(2)
            .with_initial_centroids(vec![tv(&[("x", 1.0)]), tv(&[("y", 1.0)])]);
        let mut coordinator = single(&corpus, config).unwrap();

        assert!(!coordinator.step().unwrap());
        assert_eq!(coordinator.counts().as_slice(), &[2, 2]);
        assert_eq!(coordinator.centroids()[0], tv(&[("x", 1.0)]));
        assert!(coordinator.step().unwrap());
        assert_eq!(coordinator.statistics().converged_at, Some(1));
    }

    #[test]
    fn test_random_seeds_are_documents() {
        let corpus = Corpus::generate(30, 50, 4, 3);
        let coordinator = single(&corpus, ClusterConfig::new(5).with_seed(11)).unwrap();
        for centroid in coordinator.centroids() {
            assert!(corpus.documents().iter().any(|d| &d.vector == centroid));
        }

        let again = single(&corpus, ClusterConfig::new(5).with_seed(11)).unwrap();
        assert_eq!(coordinator.centroids(), again.centroids());
    }

    #[test]
    fn test_sink_receives_checkpoints_and_result() {
        let corpus = four_docs();
        let config = ClusterConfig::new(2)
            .with_initial_centroids(vec![tv(&[("x", 1.0)]), tv(&[("y", 1.0)])]);
        let sink = std::rc::Rc::new(std::cell::RefCell::new(MemorySink::default()));

        struct Shared(std::rc::Rc<std::cell::RefCell<MemorySink>>);
        impl ResultSink for Shared {
            fn checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()> {
                self.0.borrow_mut().checkpoint(checkpoint)
            }
            fn finish(&mut self, result: &ClusteringResult) -> Result<()> {
                self.0.borrow_mut().finish(result)
            }
        }

        let outcome = single(&corpus, config)
            .unwrap()
            .with_sink(Box::new(Shared(sink.clone())))
            .run()
            .unwrap();

        let sink = sink.borrow();
        assert_eq!(sink.checkpoints.len(), 2);
        assert_eq!(sink.checkpoints[1].pass, 2);
        let result = sink.result.as_ref().unwrap();
        assert_eq!(
            result.clusters,
            vec![
                vec![DocumentId::new("a"), DocumentId::new("b")],
                vec![DocumentId::new("c"), DocumentId::new("d")]
            ]
        );
        assert_eq!(outcome.result.unwrap().counts, result.counts);
    }

    #[test]
    fn test_max_passes_caps_the_loop() {
        let corpus = Corpus::generate(40, 30, 5, 9);
        let outcome = single(&corpus, ClusterConfig::new(3).with_seed(1).with_max_passes(1))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(outcome.statistics.passes, 1);
        assert!(outcome.statistics.converged_at.is_none());
    }

    #[test]
    fn test_bad_config_is_annotated() {
        let corpus = four_docs();
        let err = single(&corpus, ClusterConfig::new(0)).err().unwrap();
        assert!(matches!(err, ClusterError::AtRank { rank: 0, iteration: 0, .. }));
        assert!(matches!(err.root_cause(), ClusterError::InvalidConfig(_)));
    }
}
