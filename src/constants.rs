//! Named constants for configuration values.
//!
//! This module centralizes default values used throughout the codebase,
//! making them easier to find, document, and tune.

/// Constants for the clustering loop.
pub mod kmeans {
    /// Default number of clusters.
    pub const DEFAULT_K: usize = 6;

    /// Progress is reported roughly this many times per pass over the full
    /// dataset (every `max(1, total / PROGRESS_STEPS)` documents).
    pub const PROGRESS_STEPS: usize = 2000;
}

/// Constants for the process group.
pub mod group {
    /// Rank of the coordinating process.
    pub const ROOT: usize = 0;
}

/// Constants for the telemetry channel and status display.
pub mod telemetry {
    /// Tag of status-text telemetry messages.
    pub const MESSAGE_TAG: u32 = 98;

    /// Tag of progress telemetry messages.
    pub const PROGRESS_TAG: u32 = 99;

    /// Interval between telemetry ticks.
    pub const TICK_INTERVAL_MS: u64 = 1000;

    /// Receive attempts the root makes per tick before yielding.
    pub const POLL_ATTEMPTS: usize = 3;

    /// Sleep between two empty receive attempts.
    pub const POLL_SLEEP_MS: u64 = 60;

    /// Width of one status cell in terminal columns.
    pub const CELL_WIDTH: usize = 40;

    /// Height of one status cell in terminal rows.
    pub const CELL_HEIGHT: usize = 5;

    /// Terminal width used when the environment does not report one.
    pub const FALLBACK_COLUMNS: usize = 105;

    /// Terminal height used when the environment does not report one.
    pub const FALLBACK_ROWS: usize = 61;

    /// Columns of each cell used by the percentage and counters around the
    /// progress bar.
    pub const PROGRESS_DECORATION: usize = 30;
}

/// Constants for result reports.
pub mod report {
    /// Number of top-weighted terms listed per centroid.
    pub const TOP_TERMS: usize = 30;
}
