//! Checkpoint files written by the root after each pass.
//!
//! # File Format
//!
//! ```text
//! [MAGIC 8B "LYRKMNS\0"][VERSION u32][RECORD_KIND u32][CHECKSUM u32]
//! [DATA bincode]
//! ```
//!
//! # Example
//!
//! ```ignore
//! use lyric_kmeans::persistence::{Checkpoint, Persistable};
//!
//! let checkpoint = Checkpoint::load("run.checkpoint")?;
//! println!("pass {}: {}", checkpoint.pass, checkpoint.counts);
//! ```

mod format;

pub use format::{FileHeader, RecordKind, FORMAT_VERSION, MAGIC};

use crate::error::{ClusterError, Result};
use crate::types::ClusterCounts;
use crate::vector::TermVector;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Trait for types that can be persisted to disk.
pub trait Persistable: Sized {
    /// Save to a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written or serialization fails.
    fn save(&self, path: impl AsRef<Path>) -> Result<()>;

    /// Load from a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is corrupted, or has an
    /// incompatible format.
    fn load(path: impl AsRef<Path>) -> Result<Self>;
}

/// Reconciled state after one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub pass: usize,
    pub centroids: Vec<TermVector>,
    pub counts: ClusterCounts,
}

impl Persistable for Checkpoint {
    fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = bincode::serialize(self)?;
        write_with_header(path, RecordKind::Checkpoint, &data)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path)?;
        let body = verify_header(&data, RecordKind::Checkpoint)?;
        Ok(bincode::deserialize(body)?)
    }
}

/// Verify file header and return the data section.
pub(crate) fn verify_header(data: &[u8], expected: RecordKind) -> Result<&[u8]> {
    if data.len() < FileHeader::SIZE {
        return Err(ClusterError::invalid_format("file too small for header"));
    }

    let header = FileHeader::from_bytes(&data[..FileHeader::SIZE])?;
    header.verify(expected)?;

    let data_section = &data[FileHeader::SIZE..];
    if crc32fast::hash(data_section) != header.checksum {
        return Err(ClusterError::ChecksumMismatch);
    }

    Ok(data_section)
}

/// Write header and data to file.
pub(crate) fn write_with_header(
    path: impl AsRef<Path>,
    kind: RecordKind,
    data: &[u8],
) -> Result<()> {
    use std::io::Write;

    let header = FileHeader::new(kind, crc32fast::hash(data));

    let mut file = std::fs::File::create(path)?;
    file.write_all(&header.to_bytes())?;
    file.write_all(data)?;
    file.sync_all()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn checkpoint() -> Checkpoint {
        Checkpoint {
            pass: 3,
            centroids: vec![
                [("love", 0.5), ("baby", 0.25)].into_iter().collect(),
                [("night", 1.0)].into_iter().collect(),
            ],
            counts: ClusterCounts::from_vec(vec![7, 2]),
        }
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.checkpoint");
        checkpoint().save(&path).unwrap();
        assert_eq!(Checkpoint::load(&path).unwrap(), checkpoint());
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.checkpoint");
        checkpoint().save(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            Checkpoint::load(&path),
            Err(ClusterError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short");
        std::fs::write(&path, b"LYRK").unwrap();
        assert!(matches!(
            Checkpoint::load(&path),
            Err(ClusterError::InvalidFormat(_))
        ));
    }
}
