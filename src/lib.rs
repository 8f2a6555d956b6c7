//! lyric-kmeans: distributed cosine k-means over sparse TF-IDF vectors.
//!
//! A fixed group of ranks partitions a corpus of song lyrics, each rank
//! assigns its documents to the nearest centroid by cosine similarity, and
//! the root merges the per-rank partial centroids into one global set every
//! pass. The run ends when the global cluster sizes stop changing.
//!
//! # Features
//!
//! - **Sparse Term Vectors**: ordered term-weight maps with exact, symmetric
//!   cosine similarity
//! - **Pluggable Process Group**: collectives built on tagged point-to-point
//!   messages, with an in-process channel transport
//! - **Selectable Reduction**: average of per-rank averages or a
//!   count-weighted global mean
//! - **Live Telemetry**: non-blocking latest-value status reporting to a
//!   multi-pane display on the root
//! - **Parallel Assignment**: multi-core scaling within a rank with Rayon
//!
//! # Example
//!
//! ```
//! use lyric_kmeans::{cosine, TermVector};
//!
//! let a: TermVector = [("love", 0.5), ("night", 0.2)].into_iter().collect();
//! let b: TermVector = [("love", 0.4)].into_iter().collect();
//!
//! let similarity = cosine(&a, &b);
//! assert!(similarity > 0.9 && similarity <= 1.0);
//! ```

pub mod assign;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod dataset;
pub mod error;
pub mod group;
pub mod metrics;
pub mod persistence;
pub mod reduce;
pub mod report;
pub mod similarity;
pub mod telemetry;
pub mod types;
pub mod vector;

// Re-export commonly used types at crate root
pub use assign::{assign_partition, nearest_centroid, LocalAssignment};
pub use config::{ClusterConfig, ReductionStrategy, Seeding, TelemetryConfig, TerminalGeometry};
pub use coordinator::{ClusteringResult, Coordinator, RankOutcome};
pub use dataset::{partition_range, Corpus, DocumentSource, Partition};
pub use error::{ClusterError, Result};
pub use group::{Group, LocalEndpoint, LocalGroup, Rank, ROOT};
pub use metrics::RunStatistics;
pub use reduce::{merge_centroids, reconcile, Reconciled};
pub use report::{MemorySink, ReportWriter, ResultSink};
pub use similarity::{cosine, dot, magnitude, mean};
pub use telemetry::{Reporter, TelemetryMessage, TelemetryPump, TelemetryTask};
pub use types::{ClusterCounts, ClusterId, DocumentId};
pub use vector::{Document, TermVector};
