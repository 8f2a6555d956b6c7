//! File format definitions for checkpoint files.

use crate::error::{ClusterError, Result};

/// Magic bytes identifying a checkpoint file: "LYRKMNS\0"
pub const MAGIC: [u8; 8] = *b"LYRKMNS\0";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Record type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RecordKind {
    /// Centroids and counts after one pass
    Checkpoint = 1,
}

impl RecordKind {
    /// Convert from u32.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Checkpoint),
            _ => None,
        }
    }
}

/// File header structure.
///
/// Total size: 20 bytes
/// ```text
/// [MAGIC 8B][VERSION u32][RECORD_KIND u32][CHECKSUM u32]
/// ```
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Magic bytes (must be MAGIC)
    pub magic: [u8; 8],
    /// Format version
    pub version: u32,
    /// Record kind
    pub kind: RecordKind,
    /// CRC32 checksum of the data section (everything after header)
    pub checksum: u32,
}

impl FileHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 20;

    /// Create a new header.
    pub fn new(kind: RecordKind, checksum: u32) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            kind,
            checksum,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.magic);
        bytes[8..12].copy_from_slice(&self.version.to_le_bytes());
        bytes[12..16].copy_from_slice(&(self.kind as u32).to_le_bytes());
        bytes[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(ClusterError::invalid_format("header too small"));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);

        if magic != MAGIC {
            return Err(ClusterError::invalid_format("invalid magic bytes"));
        }

        let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let kind_raw = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let checksum = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);

        let kind = RecordKind::from_u32(kind_raw)
            .ok_or_else(|| ClusterError::invalid_format("unknown record kind"))?;

        Ok(Self {
            magic,
            version,
            kind,
            checksum,
        })
    }

    /// Verify the header is valid and matches the expected kind.
    pub fn verify(&self, expected: RecordKind) -> Result<()> {
        if self.version > FORMAT_VERSION {
            return Err(ClusterError::invalid_format(format!(
                "unsupported version {} (max supported: {})",
                self.version, FORMAT_VERSION
            )));
        }

        if self.kind != expected {
            return Err(ClusterError::invalid_format(format!(
                "record kind mismatch: expected {:?}, got {:?}",
                expected, self.kind
            )));
        }

        Ok(())
    }
}
