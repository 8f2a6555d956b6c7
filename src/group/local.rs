//! In-process group: one endpoint per rank, connected by channels.
//!
//! Each endpoint is moved onto its own thread. Data messages and telemetry
//! travel on separate channels. A rank whose peers have all gone away, or
//! that waits longer than the configured stall timeout, gets a
//! [`ClusterError::CommunicationStall`] instead of blocking forever.

use super::{Completion, Group, Rank, SendHandle, Tag, TelemetryLink, ROOT};
use crate::error::{ClusterError, Result};
use crate::telemetry::TelemetryMessage;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

struct Packet {
    source: Rank,
    tag: Tag,
    payload: Vec<u8>,
}

struct TelemetryPacket {
    source: Rank,
    message: TelemetryMessage,
    completion: Completion,
}

/// Builder for a set of connected in-process endpoints.
#[derive(Debug, Clone)]
pub struct LocalGroup {
    size: usize,
    stall_timeout: Option<Duration>,
}

impl LocalGroup {
    /// A group of `size` ranks.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            stall_timeout: None,
        }
    }

    /// Fail receives that wait longer than `timeout`.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    /// Create the endpoints, indexed by rank.
    pub fn endpoints(self) -> Vec<LocalEndpoint> {
        let (senders, inboxes): (Vec<Sender<Packet>>, Vec<Receiver<Packet>>) =
            (0..self.size).map(|_| mpsc::channel()).unzip();
        let (telemetry_tx, telemetry_rx) = mpsc::channel();
        let mut telemetry_rx = Some(telemetry_rx);

        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| {
                // No endpoint holds a sender to itself, so its inbox
                // disconnects once every peer is gone.
                let peers = senders
                    .iter()
                    .enumerate()
                    .map(|(dest, tx)| (dest != rank).then(|| tx.clone()))
                    .collect();
                let link = if rank == ROOT {
                    LocalTelemetryLink {
                        rank,
                        size: self.size,
                        outbound: None,
                        inbound: telemetry_rx.take(),
                    }
                } else {
                    LocalTelemetryLink {
                        rank,
                        size: self.size,
                        outbound: Some(telemetry_tx.clone()),
                        inbound: None,
                    }
                };
                LocalEndpoint {
                    rank,
                    size: self.size,
                    peers,
                    inbox,
                    stash: RefCell::new(VecDeque::new()),
                    link: RefCell::new(Some(link)),
                    stall_timeout: self.stall_timeout,
                }
            })
            .collect()
    }
}

/// One rank of a [`LocalGroup`].
pub struct LocalEndpoint {
    rank: Rank,
    size: usize,
    peers: Vec<Option<Sender<Packet>>>,
    inbox: Receiver<Packet>,
    // Messages that arrived before anyone asked for them.
    stash: RefCell<VecDeque<Packet>>,
    link: RefCell<Option<LocalTelemetryLink>>,
    stall_timeout: Option<Duration>,
}

impl LocalEndpoint {
    fn recv_matching<F>(&self, operation: &str, matches: F) -> Result<Packet>
    where
        F: Fn(&Packet) -> bool,
    {
        {
            let mut stash = self.stash.borrow_mut();
            if let Some(pos) = stash.iter().position(&matches) {
                if let Some(packet) = stash.remove(pos) {
                    return Ok(packet);
                }
            }
        }

        loop {
            let packet = match self.stall_timeout {
                Some(timeout) => self.inbox.recv_timeout(timeout).map_err(|e| match e {
                    RecvTimeoutError::Timeout => {
                        ClusterError::stall(self.rank, format!("{} (timed out)", operation))
                    }
                    RecvTimeoutError::Disconnected => {
                        ClusterError::stall(self.rank, format!("{} (peers gone)", operation))
                    }
                })?,
                None => self.inbox.recv().map_err(|_| {
                    ClusterError::stall(self.rank, format!("{} (peers gone)", operation))
                })?,
            };

            if matches(&packet) {
                return Ok(packet);
            }
            self.stash.borrow_mut().push_back(packet);
        }
    }
}

impl Group for LocalEndpoint {
    type Link = LocalTelemetryLink;

    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<()> {
        let tx = self
            .peers
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                ClusterError::protocol(format!("rank {} cannot send to {}", self.rank, dest))
            })?;
        tx.send(Packet {
            source: self.rank,
            tag,
            payload,
        })
        .map_err(|_| ClusterError::stall(self.rank, format!("send {} to rank {}", tag, dest)))
    }

    fn recv_any(&self, tag: Tag) -> Result<(Rank, Vec<u8>)> {
        let packet = self.recv_matching(&format!("recv {}", tag), |p| p.tag == tag)?;
        Ok((packet.source, packet.payload))
    }

    fn recv_from(&self, source: Rank, tag: Tag) -> Result<Vec<u8>> {
        let operation = format!("recv {} from rank {}", tag, source);
        let packet = self.recv_matching(&operation, |p| p.tag == tag && p.source == source)?;
        Ok(packet.payload)
    }

    fn telemetry_link(&self) -> Result<LocalTelemetryLink> {
        self.link
            .borrow_mut()
            .take()
            .ok_or_else(|| ClusterError::protocol("telemetry link already taken"))
    }
}

/// Telemetry side of a [`LocalEndpoint`].
///
/// A send stays in flight until the root polls it; only then does its
/// [`SendHandle`] report completion.
pub struct LocalTelemetryLink {
    rank: Rank,
    size: usize,
    outbound: Option<Sender<TelemetryPacket>>,
    inbound: Option<Receiver<TelemetryPacket>>,
}

impl TelemetryLink for LocalTelemetryLink {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, message: TelemetryMessage) -> Result<SendHandle> {
        let tx = self.outbound.as_ref().ok_or(ClusterError::TelemetryUnavailable)?;
        let (handle, completion) = SendHandle::pending();
        tx.send(TelemetryPacket {
            source: self.rank,
            message,
            completion,
        })
        .map_err(|_| ClusterError::TelemetryUnavailable)?;
        Ok(handle)
    }

    fn poll(&self) -> Result<Option<(Rank, TelemetryMessage)>> {
        let rx = match &self.inbound {
            Some(rx) => rx,
            None => return Ok(None),
        };
        match rx.try_recv() {
            Ok(packet) => {
                packet.completion.complete();
                Ok(Some((packet.source, packet.message)))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ClusterError::TelemetryUnavailable),
        }
    }
}
