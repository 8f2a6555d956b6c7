//! Error types for lyric-kmeans operations.
//!
//! Covers configuration problems detected at startup, failures of the
//! collective protocol between ranks, and I/O or serialization errors from
//! the document source, reports and checkpoints.

use crate::group::Rank;
use crate::types::DocumentId;
use std::io;
use thiserror::Error;

/// Result type alias using [`ClusterError`].
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors that can occur during a clustering run.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Invalid run parameter (K, group size, reduction settings, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The document source holds no documents.
    #[error("empty dataset: clustering requires at least one document")]
    EmptyDataset,

    /// Fewer documents than required for the requested operation.
    #[error("insufficient documents: required {required}, got {actual}")]
    InsufficientDocuments {
        /// Minimum number of documents required.
        required: usize,
        /// Actual number of documents available.
        actual: usize,
    },

    /// The document source has no vector for the given id.
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    /// A collective operation could not complete because a peer is gone or
    /// did not answer within the configured stall timeout.
    #[error("communication stall on rank {rank} during {operation}")]
    CommunicationStall {
        /// Rank that observed the stall.
        rank: Rank,
        /// Collective or point-to-point operation that stalled.
        operation: String,
    },

    /// A peer sent a message that violates the reconciliation protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The telemetry stream to the root is closed. Never fatal.
    #[error("telemetry channel unavailable")]
    TelemetryUnavailable,

    /// I/O error while reading a corpus or writing reports.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during serialization or deserialization of a payload.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Checksum verification failed while loading a checkpoint.
    #[error("checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    /// Corpus or checkpoint file has an invalid format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// A fatal error annotated with where it happened.
    #[error("rank {rank}, pass {iteration}: {source}")]
    AtRank {
        /// Rank that failed.
        rank: Rank,
        /// Pass number (0 during setup).
        iteration: usize,
        /// Underlying error.
        #[source]
        source: Box<ClusterError>,
    },
}

impl ClusterError {
    /// Creates a new `InvalidConfig` error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Creates a new `InsufficientDocuments` error.
    pub fn insufficient_documents(required: usize, actual: usize) -> Self {
        Self::InsufficientDocuments { required, actual }
    }

    /// Creates a new `CommunicationStall` error.
    pub fn stall(rank: Rank, operation: impl Into<String>) -> Self {
        Self::CommunicationStall {
            rank,
            operation: operation.into(),
        }
    }

    /// Creates a new `Protocol` error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates a new `SerializationError`.
    pub fn serialization_error(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Creates a new `InvalidFormat` error.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Wraps this error with the rank and pass it occurred on.
    ///
    /// Already-annotated errors are returned unchanged.
    pub fn at(self, rank: Rank, iteration: usize) -> Self {
        match self {
            err @ Self::AtRank { .. } => err,
            other => Self::AtRank {
                rank,
                iteration,
                source: Box::new(other),
            },
        }
    }

    /// Returns true for errors caused by a missing or hung peer.
    pub fn is_stall(&self) -> bool {
        match self {
            Self::CommunicationStall { .. } => true,
            Self::AtRank { source, .. } => source.is_stall(),
            _ => false,
        }
    }

    /// The underlying error with any rank annotation removed.
    pub fn root_cause(&self) -> &ClusterError {
        match self {
            Self::AtRank { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<bincode::Error> for ClusterError {
    fn from(err: bincode::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
