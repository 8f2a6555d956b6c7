//! Run parameters for the clustering loop and the telemetry display.
//!
//! ```
//! use lyric_kmeans::{ClusterConfig, ReductionStrategy};
//!
//! let config = ClusterConfig::new(8)
//!     .with_reduction(ReductionStrategy::CountWeighted)
//!     .with_seed(42);
//!
//! assert!(config.validate(1000, 4).is_ok());
//! ```

use crate::constants;
use crate::error::{ClusterError, Result};
use crate::vector::TermVector;
use std::time::Duration;

/// How the root merges per-rank partial centroids into one centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReductionStrategy {
    /// Unweighted mean of every contributing rank's local mean.
    ///
    /// This is an approximation: a rank holding 3 members of a cluster
    /// counts as much as a rank holding 3000. It is the default because it
    /// reproduces the established behaviour of the clustering runs.
    #[default]
    AverageOfAverages,
    /// Global mean, weighting each rank's local mean by its local count.
    CountWeighted,
}

/// How the initial centroids are chosen.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Seeding {
    /// K documents drawn uniformly at random without replacement.
    #[default]
    Random,
    /// Caller-provided centroids, one per cluster.
    Explicit(Vec<TermVector>),
}

/// Parameters of one clustering run.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of clusters.
    pub k: usize,
    /// Centroid reduction across ranks.
    pub reduction: ReductionStrategy,
    /// Initial centroid selection.
    pub seeding: Seeding,
    /// RNG seed for random seeding; `None` draws from the thread RNG.
    pub seed: Option<u64>,
    /// Stop after this many passes even if counts still change.
    pub max_passes: Option<usize>,
    /// Fail a blocked collective after this long instead of waiting forever.
    pub stall_timeout: Option<Duration>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::new(constants::kmeans::DEFAULT_K)
    }
}

impl ClusterConfig {
    /// Create a configuration for `k` clusters with default settings.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            reduction: ReductionStrategy::default(),
            seeding: Seeding::default(),
            seed: None,
            max_passes: None,
            stall_timeout: None,
        }
    }

    /// Set the reduction strategy.
    pub fn with_reduction(mut self, reduction: ReductionStrategy) -> Self {
        self.reduction = reduction;
        self
    }

    /// Use the given centroids instead of random seeding.
    pub fn with_initial_centroids(mut self, centroids: Vec<TermVector>) -> Self {
        self.seeding = Seeding::Explicit(centroids);
        self
    }

    /// Seed the random centroid selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Cap the number of passes.
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = Some(max_passes);
        self
    }

    /// Set the collective stall timeout.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    /// Check the parameters against the dataset and group size.
    ///
    /// Every rank runs this before any communication, so a bad
    /// configuration fails the whole group without a hang.
    ///
    /// # Errors
    /// Returns a configuration error for `k == 0`, an empty group, an empty
    /// dataset, fewer documents than clusters or ranks, a mismatched number
    /// of explicit centroids, or a zero pass cap.
    pub fn validate(&self, total_documents: usize, group_size: usize) -> Result<()> {
        if self.k == 0 {
            return Err(ClusterError::invalid_config("k must be > 0"));
        }
        if group_size == 0 {
            return Err(ClusterError::invalid_config("group size must be > 0"));
        }
        if total_documents == 0 {
            return Err(ClusterError::EmptyDataset);
        }
        if total_documents < self.k {
            return Err(ClusterError::insufficient_documents(self.k, total_documents));
        }
        if total_documents < group_size {
            return Err(ClusterError::invalid_config(format!(
                "{} ranks cannot share {} documents",
                group_size, total_documents
            )));
        }
        if let Seeding::Explicit(centroids) = &self.seeding {
            if centroids.len() != self.k {
                return Err(ClusterError::invalid_config(format!(
                    "expected {} initial centroids, got {}",
                    self.k,
                    centroids.len()
                )));
            }
        }
        if self.max_passes == Some(0) {
            return Err(ClusterError::invalid_config("max_passes must be > 0"));
        }
        Ok(())
    }

    /// Report progress every this many documents.
    pub fn progress_step(total_documents: usize) -> usize {
        (total_documents / constants::kmeans::PROGRESS_STEPS).max(1)
    }
}

/// Terminal size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalGeometry {
    pub columns: usize,
    pub rows: usize,
}

impl Default for TerminalGeometry {
    fn default() -> Self {
        Self {
            columns: constants::telemetry::FALLBACK_COLUMNS,
            rows: constants::telemetry::FALLBACK_ROWS,
        }
    }
}

impl TerminalGeometry {
    /// Create a geometry.
    pub fn new(columns: usize, rows: usize) -> Self {
        Self { columns, rows }
    }

    /// Read `COLUMNS` and `LINES` from the environment, falling back to the
    /// built-in size for any value that is missing or unparsable.
    pub fn probe() -> Self {
        let fallback = Self::default();
        Self {
            columns: env_dimension("COLUMNS").unwrap_or(fallback.columns),
            rows: env_dimension("LINES").unwrap_or(fallback.rows),
        }
    }
}

fn env_dimension(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
}

/// Settings of the background telemetry task and the status display.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Time between two telemetry ticks.
    pub tick_interval: Duration,
    /// Receive attempts per tick on the root.
    pub poll_attempts: usize,
    /// Sleep between empty receive attempts.
    pub poll_sleep: Duration,
    /// Width of one status cell.
    pub cell_width: usize,
    /// Height of one status cell.
    pub cell_height: usize,
    /// Size of the terminal the display is drawn on.
    pub geometry: TerminalGeometry,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(constants::telemetry::TICK_INTERVAL_MS),
            poll_attempts: constants::telemetry::POLL_ATTEMPTS,
            poll_sleep: Duration::from_millis(constants::telemetry::POLL_SLEEP_MS),
            cell_width: constants::telemetry::CELL_WIDTH,
            cell_height: constants::telemetry::CELL_HEIGHT,
            geometry: TerminalGeometry::probe(),
        }
    }
}

impl TelemetryConfig {
    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the poll budget per tick.
    pub fn with_poll_budget(mut self, attempts: usize, sleep: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_sleep = sleep;
        self
    }

    /// Set the terminal geometry.
    pub fn with_geometry(mut self, geometry: TerminalGeometry) -> Self {
        self.geometry = geometry;
        self
    }
}
