//! Result sinks: where the root puts checkpoints and the final clustering.
//!
//! [`ReportWriter`] writes two plain-text reports next to each other,
//! `{prefix}.centroids.txt` and `{prefix}.clusters.txt`:
//!
//! ```text
//! Cluster 0 (2)
//! ===============================
//! love                   0.500000
//! baby                   0.250000
//!
//! ```

use crate::constants;
use crate::coordinator::ClusteringResult;
use crate::error::Result;
use crate::persistence::{Checkpoint, Persistable};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const RULE_WIDTH: usize = 31;

/// Receives the root's output.
pub trait ResultSink {
    /// Called after every reconciled pass.
    fn checkpoint(&mut self, _checkpoint: &Checkpoint) -> Result<()> {
        Ok(())
    }

    /// Called once with the final clustering.
    fn finish(&mut self, result: &ClusteringResult) -> Result<()>;
}

/// Sink that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub checkpoints: Vec<Checkpoint>,
    pub result: Option<ClusteringResult>,
}

impl ResultSink for MemorySink {
    fn checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        self.checkpoints.push(checkpoint.clone());
        Ok(())
    }

    fn finish(&mut self, result: &ClusteringResult) -> Result<()> {
        self.result = Some(result.clone());
        Ok(())
    }
}

fn write_header<W: Write>(out: &mut W, cluster: usize, size: u64) -> std::io::Result<()> {
    writeln!(out, "Cluster {} ({})", cluster, size)?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))
}

/// Write each centroid's size and its highest-weighted terms.
pub fn write_centroid_report<W: Write>(
    out: &mut W,
    result: &ClusteringResult,
    top: usize,
) -> std::io::Result<()> {
    for (i, centroid) in result.centroids.iter().enumerate() {
        write_header(out, i, result.counts[i])?;
        for (term, weight) in centroid.top_terms(top) {
            writeln!(out, "{:20} {:10.6}", term, weight)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Write each cluster's member ids.
pub fn write_membership_report<W: Write>(
    out: &mut W,
    result: &ClusteringResult,
) -> std::io::Result<()> {
    for (i, members) in result.clusters.iter().enumerate() {
        write_header(out, i, result.counts[i])?;
        for id in members {
            writeln!(out, "{}", id)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Writes the text reports and, optionally, a checkpoint file per pass.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    prefix: PathBuf,
    top_terms: usize,
    checkpoints: bool,
}

impl ReportWriter {
    /// Derive the report names from `prefix`.
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            top_terms: constants::report::TOP_TERMS,
            checkpoints: false,
        }
    }

    /// Number of terms listed per centroid.
    pub fn with_top_terms(mut self, n: usize) -> Self {
        self.top_terms = n;
        self
    }

    /// Overwrite `{prefix}.checkpoint` after every pass.
    pub fn with_checkpoints(mut self, enabled: bool) -> Self {
        self.checkpoints = enabled;
        self
    }

    fn path(&self, suffix: &str) -> PathBuf {
        let mut name = self.prefix.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Path of the centroid report.
    pub fn centroids_path(&self) -> PathBuf {
        self.path(".centroids.txt")
    }

    /// Path of the membership report.
    pub fn clusters_path(&self) -> PathBuf {
        self.path(".clusters.txt")
    }

    /// Path of the checkpoint file.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.path(".checkpoint")
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path)?))
}

impl ResultSink for ReportWriter {
    fn checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        if self.checkpoints {
            checkpoint.save(self.checkpoint_path())?;
        }
        Ok(())
    }

    fn finish(&mut self, result: &ClusteringResult) -> Result<()> {
        let mut out = create(&self.centroids_path())?;
        write_centroid_report(&mut out, result, self.top_terms)?;
        out.flush()?;

        let mut out = create(&self.clusters_path())?;
        write_membership_report(&mut out, result)?;
        out.flush()?;

        tracing::info!(
            centroids = %self.centroids_path().display(),
            clusters = %self.clusters_path().display(),
            "reports written"
        );
        Ok(())
    }
}
