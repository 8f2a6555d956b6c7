//! Statistics about a clustering run.
//!
//! The coordinator records one entry per pass. Use [`RunStatistics`] to see
//! how quickly a run settled and where the time went:
//!
//! ```ignore
//! let outcome = coordinator.run()?;
//! println!("{}", outcome.statistics.summary());
//! // Output:
//! // RunStatistics:
//! //   Passes: 4 (converged at pass 3)
//! //   Setup: 12.402ms
//! //   Pass time: total 1.204s, mean 301.050ms, max 402.117ms
//! //   Final counts: [31, 40, 29, 52, 18, 67]
//! ```

use crate::types::ClusterCounts;
use std::time::Duration;

/// Per-run statistics, identical on every rank except for timings.
#[derive(Clone, Debug, Default)]
pub struct RunStatistics {
    /// Number of assignment passes executed.
    pub passes: usize,
    /// The pass whose counts were repeated by the following pass, if the run
    /// converged.
    pub converged_at: Option<usize>,
    /// Time spent partitioning and seeding.
    pub setup_time: Duration,
    /// Wall time of each pass, in pass order.
    pub pass_durations: Vec<Duration>,
    /// Global counts after each pass, in pass order.
    pub counts_history: Vec<ClusterCounts>,
}

impl RunStatistics {
    /// Create empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed pass.
    pub fn record_pass(&mut self, duration: Duration, counts: ClusterCounts) {
        self.passes += 1;
        self.pass_durations.push(duration);
        self.counts_history.push(counts);
    }

    /// Record that the latest pass repeated the previous pass's counts.
    pub fn mark_converged(&mut self) {
        self.converged_at = self.passes.checked_sub(1).filter(|&p| p > 0);
    }

    /// True once the counts have stabilised.
    pub fn converged(&self) -> bool {
        self.converged_at.is_some()
    }

    /// Sum of all pass durations.
    pub fn total_pass_time(&self) -> Duration {
        self.pass_durations.iter().sum()
    }

    /// Mean pass duration, zero if no pass ran.
    pub fn mean_pass_time(&self) -> Duration {
        match self.pass_durations.len() {
            0 => Duration::ZERO,
            n => self.total_pass_time() / n as u32,
        }
    }

    /// Longest pass.
    pub fn max_pass_time(&self) -> Duration {
        self.pass_durations.iter().max().copied().unwrap_or_default()
    }

    /// Counts after the last pass.
    pub fn final_counts(&self) -> Option<&ClusterCounts> {
        self.counts_history.last()
    }

    /// Create a human-readable summary.
    pub fn summary(&self) -> String {
        let convergence = match self.converged_at {
            Some(pass) => format!("converged at pass {}", pass),
            None => "not converged".to_string(),
        };
        let counts = self
            .final_counts()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        format!(
            "RunStatistics:\n  \
             Passes: {} ({})\n  \
             Setup: {:.3}ms\n  \
             Pass time: total {:.3}s, mean {:.3}ms, max {:.3}ms\n  \
             Final counts: {}",
            self.passes,
            convergence,
            self.setup_time.as_secs_f64() * 1000.0,
            self.total_pass_time().as_secs_f64(),
            self.mean_pass_time().as_secs_f64() * 1000.0,
            self.max_pass_time().as_secs_f64() * 1000.0,
            counts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_converge() {
        let mut stats = RunStatistics::new();
        stats.record_pass(Duration::from_millis(10), ClusterCounts::from_vec(vec![1, 3]));
        stats.record_pass(Duration::from_millis(30), ClusterCounts::from_vec(vec![2, 2]));
        assert!(!stats.converged());
        stats.record_pass(Duration::from_millis(20), ClusterCounts::from_vec(vec![2, 2]));
        stats.mark_converged();

        assert_eq!(stats.passes, 3);
        assert_eq!(stats.converged_at, Some(2));
        assert_eq!(stats.total_pass_time(), Duration::from_millis(60));
        assert_eq!(stats.mean_pass_time(), Duration::from_millis(20));
        assert_eq!(stats.max_pass_time(), Duration::from_millis(30));
        assert_eq!(stats.final_counts().unwrap().as_slice(), &[2, 2]);
    }

    #[test]
    fn test_summary() {
        let mut stats = RunStatistics::new();
        assert!(stats.summary().contains("not converged"));

        stats.record_pass(Duration::from_millis(5), ClusterCounts::from_vec(vec![4, 1]));
        stats.record_pass(Duration::from_millis(5), ClusterCounts::from_vec(vec![4, 1]));
        stats.mark_converged();
        let summary = stats.summary();
        assert!(summary.contains("Passes: 2 (converged at pass 1)"));
        assert!(summary.contains("[4, 1]"));
    }

    #[test]
    fn test_empty_timings() {
        let stats = RunStatistics::new();
        assert_eq!(stats.mean_pass_time(), Duration::ZERO);
        assert_eq!(stats.max_pass_time(), Duration::ZERO);
        assert!(stats.final_counts().is_none());
    }
}
