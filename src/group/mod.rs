//! The process-group capability the clustering loop runs on.
//!
//! A [`Group`] is a fixed set of ranks `0..size` that exchange tagged byte
//! payloads. The collectives the algorithm needs (barrier, broadcast and
//! gather) are provided on top of three point-to-point primitives, so any
//! transport that can move bytes between ranks can host a run.
//!
//! Telemetry does not travel through the `Group` itself: each rank takes a
//! separate [`TelemetryLink`] whose sends are non-blocking and whose receives
//! are polled. The two streams are never read by the same receive call.

pub mod local;

pub use local::{LocalEndpoint, LocalGroup};

use crate::constants;
use crate::error::{ClusterError, Result};
use crate::telemetry::TelemetryMessage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A process's identity within the group. Rank 0 is the root.
pub type Rank = usize;

/// Rank of the coordinating process.
pub const ROOT: Rank = constants::group::ROOT;

/// Tags of the algorithm's data-stream messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Initial centroids from the root.
    Seeds,
    /// Per-rank partial centroids.
    Partials,
    /// Per-rank cluster counts.
    Counts,
    /// Merged centroids and counts from the root.
    Reconciled,
    /// Per-rank cluster membership lists after convergence.
    Members,
    /// Barrier arrival.
    Barrier,
    /// Barrier release.
    BarrierRelease,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Encode a payload for the data stream.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

/// Decode a payload from the data stream.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// A fixed-size SPMD process group.
///
/// Every rank must call the collectives in the same order. Receives block
/// until the matching message arrives; a transport may turn a dead peer or
/// an expired timeout into [`ClusterError::CommunicationStall`].
pub trait Group {
    /// Telemetry stream handed to the background reporter.
    type Link: TelemetryLink + Send + 'static;

    /// This process's rank.
    fn rank(&self) -> Rank;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Send a payload to `dest`. Must not wait for the receiver.
    fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<()>;

    /// Block until a message with `tag` arrives from any rank.
    fn recv_any(&self, tag: Tag) -> Result<(Rank, Vec<u8>)>;

    /// Block until a message with `tag` arrives from `source`.
    fn recv_from(&self, source: Rank, tag: Tag) -> Result<Vec<u8>>;

    /// Take this rank's telemetry link. A link can only be taken once.
    fn telemetry_link(&self) -> Result<Self::Link>;

    /// True on the root rank.
    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// Distribute the root's value to every rank.
    ///
    /// The root passes `Some(value)`; other ranks pass `None` and receive
    /// the root's value.
    fn broadcast<T>(&self, value: Option<T>, tag: Tag) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.is_root() {
            let value = value
                .ok_or_else(|| ClusterError::protocol("root must supply the broadcast value"))?;
            let bytes = encode(&value)?;
            for dest in (0..self.size()).filter(|&r| r != ROOT) {
                self.send(dest, tag, bytes.clone())?;
            }
            Ok(value)
        } else {
            decode(&self.recv_from(ROOT, tag)?)
        }
    }

    /// Collect one value from every rank on the root, indexed by rank.
    ///
    /// Returns `Some` on the root and `None` elsewhere. The root receives
    /// from any rank in arrival order; each rank must contribute exactly
    /// once per call.
    fn gather<T>(&self, value: T, tag: Tag) -> Result<Option<Vec<T>>>
    where
        T: Serialize + DeserializeOwned,
    {
        if !self.is_root() {
            self.send(ROOT, tag, encode(&value)?)?;
            return Ok(None);
        }

        let size = self.size();
        let mut slots: Vec<Option<T>> = (0..size).map(|_| None).collect();
        slots[ROOT] = Some(value);

        for _ in 1..size {
            let (source, bytes) = self.recv_any(tag)?;
            let slot = slots.get_mut(source).ok_or_else(|| {
                ClusterError::protocol(format!("message from unknown rank {}", source))
            })?;
            if slot.is_some() {
                return Err(ClusterError::protocol(format!(
                    "rank {} sent {} twice in one round",
                    source, tag
                )));
            }
            *slot = Some(decode(&bytes)?);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(rank, slot)| {
                slot.ok_or_else(|| ClusterError::protocol(format!("no {} from rank {}", tag, rank)))
            })
            .collect::<Result<Vec<T>>>()
            .map(Some)
    }

    /// Block until every rank has reached the barrier.
    fn barrier(&self) -> Result<()> {
        self.gather((), Tag::Barrier)?;
        let release = if self.is_root() { Some(()) } else { None };
        self.broadcast(release, Tag::BarrierRelease)
    }
}

/// Completion state of one non-blocking telemetry send.
#[derive(Debug, Clone)]
pub struct SendHandle {
    done: Arc<AtomicBool>,
}

impl SendHandle {
    /// A handle for a send that is still in flight, plus the token the
    /// transport uses to mark it delivered.
    pub fn pending() -> (Self, Completion) {
        let done = Arc::new(AtomicBool::new(false));
        (Self { done: done.clone() }, Completion { done })
    }

    /// A handle for a send that finished immediately.
    pub fn completed() -> Self {
        Self {
            done: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Test whether the message has been delivered. Never blocks.
    pub fn is_complete(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Transport side of a [`SendHandle`].
#[derive(Debug)]
pub struct Completion {
    done: Arc<AtomicBool>,
}

impl Completion {
    /// Mark the send as delivered.
    pub fn complete(self) {
        self.done.store(true, Ordering::Release);
    }
}

/// The telemetry stream of one rank.
///
/// Non-root ranks send; the root polls. Neither operation ever blocks.
pub trait TelemetryLink {
    /// Rank owning this link.
    fn rank(&self) -> Rank;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Start sending a message to the root and return immediately.
    fn isend(&self, message: TelemetryMessage) -> Result<SendHandle>;

    /// Take one inbound message from any rank if one is waiting.
    fn poll(&self) -> Result<Option<(Rank, TelemetryMessage)>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_handle() {
        let (handle, completion) = SendHandle::pending();
        assert!(!handle.is_complete());
        let clone = handle.clone();
        completion.complete();
        assert!(handle.is_complete());
        assert!(clone.is_complete());
        assert!(SendHandle::completed().is_complete());
    }

    #[test]
    fn test_codec() {
        let bytes = encode(&vec![3u64, 1, 4]).unwrap();
        let back: Vec<u64> = decode(&bytes).unwrap();
        assert_eq!(back, vec![3, 1, 4]);
        assert!(decode::<Vec<u64>>(&bytes[..3]).is_err());
    }
}
