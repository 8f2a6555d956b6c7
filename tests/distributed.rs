//! Multi-rank clustering runs over the in-process group.
//!
//! Run with: cargo test

use lyric_kmeans::group::Group;
use lyric_kmeans::{
    ClusterConfig, ClusterError, Coordinator, Corpus, Document, DocumentId, LocalGroup,
    RankOutcome, ReductionStrategy, Reporter, Result, TermVector,
};
use std::thread;
use std::time::Duration;

fn tv(pairs: &[(&str, f64)]) -> TermVector {
    pairs.iter().map(|&(t, w)| (t, w)).collect()
}

fn corpus(docs: &[(&str, TermVector)]) -> Corpus {
    docs.iter()
        .map(|(id, v)| Document::new(*id, v.clone()))
        .collect()
}

/// Run every rank on its own thread and return the outcomes in rank order.
fn run_group(
    corpus: &Corpus,
    group: LocalGroup,
    config: &ClusterConfig,
) -> Vec<Result<RankOutcome>> {
    thread::scope(|scope| {
        let handles: Vec<_> = group
            .endpoints()
            .into_iter()
            .map(|endpoint| {
                let config = config.clone();
                scope.spawn(move || {
                    let reporter = Reporter::new(endpoint.rank(), endpoint.size());
                    Coordinator::init(endpoint, corpus, config, reporter)?.run()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

fn run_ok(corpus: &Corpus, ranks: usize, config: &ClusterConfig) -> Vec<RankOutcome> {
    run_group(corpus, LocalGroup::new(ranks), config)
        .into_iter()
        .map(|r| r.expect("rank failed"))
        .collect()
}

fn ids(names: &[&str]) -> Vec<DocumentId> {
    names.iter().map(|&n| DocumentId::new(n)).collect()
}

#[test]
fn test_separated_clusters_converge_at_first_pass() {
    let corpus = corpus(&[
        ("a", tv(&[("x", 1.0)])),
        ("b", tv(&[("x", 1.0)])),
        ("c", tv(&[("y", 1.0)])),
        ("d", tv(&[("y", 1.0)])),
    ]);
    let seeds = vec![tv(&[("x", 1.0)]), tv(&[("y", 1.0)])];
    let config = ClusterConfig::new(2).with_initial_centroids(seeds.clone());

    for ranks in [1, 2, 4] {
        let outcomes = run_ok(&corpus, ranks, &config);
        let result = outcomes[0].result.as_ref().unwrap();

        assert_eq!(result.statistics.converged_at, Some(1), "ranks={}", ranks);
        assert_eq!(result.statistics.passes, 2);
        assert_eq!(result.counts.as_slice(), &[2, 2]);
        assert_eq!(result.centroids, seeds);
        assert_eq!(result.clusters, vec![ids(&["a", "b"]), ids(&["c", "d"])]);
    }
}

#[test]
fn test_two_pass_stabilisation() {
    // b drifts from cluster 1 to cluster 0 after the first recompute.
    let corpus = corpus(&[
        ("a", tv(&[("x", 1.0)])),
        ("b", tv(&[("x", 1.0), ("y", 1.0)])),
        ("c", tv(&[("y", 1.0), ("z", 1.0)])),
        ("d", tv(&[("y", 0.1), ("z", 3.0)])),
    ]);
    let seeds = vec![tv(&[("x", 1.0)]), tv(&[("x", 1.0), ("y", 1.0)])];

    for strategy in [ReductionStrategy::AverageOfAverages, ReductionStrategy::CountWeighted] {
        for ranks in [1, 2] {
            let config = ClusterConfig::new(2)
                .with_initial_centroids(seeds.clone())
                .with_reduction(strategy);
            let outcomes = run_ok(&corpus, ranks, &config);
            let stats = &outcomes[0].statistics;

            assert_eq!(stats.converged_at, Some(2), "{:?} ranks={}", strategy, ranks);
            assert_eq!(stats.passes, 3);
            let history: Vec<Vec<u64>> = stats
                .counts_history
                .iter()
                .map(|c| c.as_slice().to_vec())
                .collect();
            assert_eq!(history, vec![vec![1, 3], vec![2, 2], vec![2, 2]]);

            let result = outcomes[0].result.as_ref().unwrap();
            assert_eq!(result.clusters, vec![ids(&["a", "b"]), ids(&["c", "d"])]);
        }
    }
}

#[test]
fn test_counts_cover_dataset_every_pass() {
    let corpus = Corpus::generate(211, 80, 6, 5);
    let config = ClusterConfig::new(5).with_seed(3).with_max_passes(25);

    for outcome in run_ok(&corpus, 4, &config) {
        assert!(outcome.statistics.passes >= 1);
        for counts in &outcome.statistics.counts_history {
            assert_eq!(counts.total(), 211);
        }
    }
}

#[test]
fn test_ranks_agree_after_every_pass() {
    let corpus = Corpus::generate(150, 60, 8, 11);
    let config = ClusterConfig::new(4).with_seed(8);
    let max_passes = 25;

    // Step each rank by hand and keep the centroids every reconciliation left.
    let traces: Vec<Vec<Vec<TermVector>>> = thread::scope(|scope| {
        let handles: Vec<_> = LocalGroup::new(3)
            .endpoints()
            .into_iter()
            .map(|endpoint| {
                let config = config.clone();
                let corpus = &corpus;
                scope.spawn(move || -> Result<Vec<Vec<TermVector>>> {
                    let reporter = Reporter::new(endpoint.rank(), endpoint.size());
                    let mut coordinator = Coordinator::init(endpoint, corpus, config, reporter)?;
                    let mut trace = vec![coordinator.centroids().to_vec()];
                    for _ in 0..max_passes {
                        let converged = coordinator.step()?;
                        trace.push(coordinator.centroids().to_vec());
                        if converged {
                            break;
                        }
                    }
                    coordinator.finish()?;
                    Ok(trace)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked").expect("rank failed"))
            .collect()
    });

    let root = &traces[0];
    assert!(root.len() >= 2);
    for (rank, trace) in traces.iter().enumerate().skip(1) {
        assert_eq!(trace.len(), root.len(), "rank {} ran a different pass count", rank);
        for (pass, centroids) in trace.iter().enumerate() {
            assert_eq!(centroids, &root[pass], "rank {} diverged at pass {}", rank, pass);
        }
    }
}

#[test]
fn test_ranks_agree_after_every_run() {
    let corpus = Corpus::generate(150, 60, 8, 11);
    let config = ClusterConfig::new(4).with_seed(8).with_max_passes(25);
    let outcomes = run_ok(&corpus, 3, &config);

    let root = &outcomes[0];
    let result = root.result.as_ref().unwrap();
    for outcome in &outcomes[1..] {
        assert!(outcome.result.is_none());
        assert_eq!(outcome.centroids, root.centroids);
        assert_eq!(outcome.counts, root.counts);
        assert_eq!(outcome.statistics.counts_history, root.statistics.counts_history);
        assert_eq!(outcome.statistics.converged_at, root.statistics.converged_at);
    }

    let members: usize = result.clusters.iter().map(Vec::len).sum();
    assert_eq!(members, 150);
    for (cluster, ids) in result.clusters.iter().enumerate() {
        assert_eq!(ids.len() as u64, result.counts[cluster]);
    }
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let corpus = Corpus::generate(120, 40, 6, 2);
    let config = ClusterConfig::new(3).with_seed(99).with_max_passes(25);

    let first = run_ok(&corpus, 2, &config);
    let second = run_ok(&corpus, 2, &config);
    assert_eq!(first[0].centroids, second[0].centroids);
    assert_eq!(
        first[0].result.as_ref().unwrap().clusters,
        second[0].result.as_ref().unwrap().clusters
    );
}

#[test]
fn test_all_zero_document_lands_in_cluster_zero() {
    let corpus = corpus(&[
        ("a", tv(&[("x", 1.0)])),
        ("empty", TermVector::new()),
        ("c", tv(&[("y", 1.0)])),
        ("d", tv(&[("y", 2.0)])),
    ]);
    let config = ClusterConfig::new(2)
        .with_initial_centroids(vec![tv(&[("y", 1.0)]), tv(&[("x", 1.0)])]);

    for ranks in [1, 2] {
        let outcomes = run_ok(&corpus, ranks, &config);
        let result = outcomes[0].result.as_ref().unwrap();
        assert!(result.clusters[0].contains(&DocumentId::new("empty")));
        assert!(result.statistics.converged_at.is_some());
    }
}

#[test]
fn test_bad_config_fails_every_rank_without_communication() {
    let corpus = Corpus::generate(10, 20, 3, 1);

    for config in [ClusterConfig::new(0), ClusterConfig::new(11)] {
        let outcomes = run_group(&corpus, LocalGroup::new(3), &config);
        assert_eq!(outcomes.len(), 3);
        for (rank, outcome) in outcomes.into_iter().enumerate() {
            let err = outcome.err().expect("config must be rejected");
            assert!(matches!(err, ClusterError::AtRank { iteration: 0, .. }));
            assert!(!err.is_stall(), "rank {} stalled instead of rejecting", rank);
            assert!(matches!(
                err.root_cause(),
                ClusterError::InvalidConfig(_) | ClusterError::InsufficientDocuments { .. }
            ));
        }
    }

    let outcomes = run_group(&corpus, LocalGroup::new(11), &ClusterConfig::new(2));
    assert!(outcomes.iter().all(|o| o.is_err()));
}

#[test]
fn test_missing_rank_is_a_stall() {
    let corpus = Corpus::generate(30, 20, 4, 6);
    let config = ClusterConfig::new(2).with_seed(1);

    let mut endpoints = LocalGroup::new(3)
        .with_stall_timeout(Duration::from_secs(2))
        .endpoints();
    drop(endpoints.pop());

    let outcomes: Vec<Result<RankOutcome>> = thread::scope(|scope| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|endpoint| {
                let config = config.clone();
                let corpus = &corpus;
                scope.spawn(move || {
                    let reporter = Reporter::new(endpoint.rank(), endpoint.size());
                    Coordinator::init(endpoint, corpus, config, reporter)?.run()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for outcome in outcomes {
        let err = outcome.err().expect("run must fail");
        assert!(err.is_stall(), "unexpected error: {}", err);
    }
}
