//! Asynchronous progress telemetry.
//!
//! Every rank owns a [`Reporter`] holding exactly one latest status text and
//! one latest progress pair. Updates overwrite whatever has not been sent
//! yet, so a burst of updates costs no memory and never applies
//! backpressure to the clustering loop. A background [`TelemetryTask`]
//! ships the latest values to the root over the rank's
//! [`TelemetryLink`](crate::group::TelemetryLink); on the root it polls
//! inbound updates into a [`StatusBoard`] and repaints the cells that
//! changed.
//!
//! Lost or late telemetry is never an error for the run.

pub mod board;
pub mod display;
pub mod task;

pub use board::{Progress, StatusBoard};
pub use display::{AnsiRenderer, Cell, CellPosition, CellRenderer, GridLayout};
pub use task::{TelemetryPump, TelemetryTask};

use crate::constants;
use crate::group::{Rank, SendHandle, TelemetryLink, ROOT};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A telemetry update sent from a rank to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryMessage {
    /// Free-form status line.
    Status(String),
    /// Work completed out of a total.
    Progress { completed: u64, total: u64 },
}

impl TelemetryMessage {
    /// Stream tag of this message kind.
    pub fn tag(&self) -> u32 {
        match self {
            TelemetryMessage::Status(_) => constants::telemetry::MESSAGE_TAG,
            TelemetryMessage::Progress { .. } => constants::telemetry::PROGRESS_TAG,
        }
    }
}

/// Latest-value slot with at most one send in flight.
#[derive(Debug)]
struct Slot<T> {
    pending: Option<T>,
    in_flight: Option<SendHandle>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            pending: None,
            in_flight: None,
        }
    }
}

impl<T> Slot<T> {
    fn set(&mut self, value: T) {
        self.pending = Some(value);
    }

    /// Take the pending value if the previous send has completed.
    fn ready(&mut self) -> Option<T> {
        if let Some(handle) = &self.in_flight {
            if !handle.is_complete() {
                return None;
            }
            self.in_flight = None;
        }
        self.pending.take()
    }

    fn sent(&mut self, handle: SendHandle) {
        self.in_flight = Some(handle);
    }

    fn is_idle(&self) -> bool {
        self.pending.is_none()
            && self
                .in_flight
                .as_ref()
                .map_or(true, SendHandle::is_complete)
    }
}

struct Shared {
    rank: Rank,
    text: Mutex<Slot<String>>,
    progress: Mutex<Slot<(u64, u64)>>,
    // Root only.
    board: Option<Mutex<StatusBoard>>,
}

/// Per-rank status reporter. Cheap to clone and safe to share across threads.
#[derive(Clone)]
pub struct Reporter {
    shared: Arc<Shared>,
}

impl Reporter {
    /// Create the reporter for `rank` in a group of `size` ranks.
    ///
    /// The root's reporter also owns the status board for the whole group.
    pub fn new(rank: Rank, size: usize) -> Self {
        let board = (rank == ROOT).then(|| Mutex::new(StatusBoard::new(size)));
        Self {
            shared: Arc::new(Shared {
                rank,
                text: Mutex::new(Slot::default()),
                progress: Mutex::new(Slot::default()),
                board,
            }),
        }
    }

    /// Rank this reporter belongs to.
    pub fn rank(&self) -> Rank {
        self.shared.rank
    }

    /// True for the root's reporter.
    pub fn is_root(&self) -> bool {
        self.shared.board.is_some()
    }

    /// Replace the latest status text.
    pub fn update_text(&self, message: impl Into<String>) {
        let message = message.into();
        match &self.shared.board {
            Some(board) => {
                board.lock().set_message(self.shared.rank, message);
            }
            None => self.shared.text.lock().set(message),
        }
    }

    /// Replace the latest progress pair.
    pub fn update_progress(&self, completed: u64, total: u64) {
        match &self.shared.board {
            Some(board) => {
                board
                    .lock()
                    .set_progress(self.shared.rank, Progress::new(completed, total));
            }
            None => self.shared.progress.lock().set((completed, total)),
        }
    }

    /// True when nothing is waiting to be sent and no send is in flight.
    pub fn is_idle(&self) -> bool {
        self.shared.text.lock().is_idle() && self.shared.progress.lock().is_idle()
    }

    /// Copy of the root's status board.
    pub fn board_snapshot(&self) -> Option<StatusBoard> {
        self.shared.board.as_ref().map(|b| b.lock().clone())
    }

    /// Run `f` with exclusive access to the root's status board.
    pub fn with_board<R>(&self, f: impl FnOnce(&mut StatusBoard) -> R) -> Option<R> {
        self.shared.board.as_ref().map(|b| f(&mut b.lock()))
    }

    /// Send each slot's pending value unless its previous send is still in
    /// flight. Returns the number of messages handed to the link.
    pub(crate) fn flush<L: TelemetryLink>(&self, link: &L) -> usize {
        let mut sent = 0;

        {
            let mut slot = self.shared.text.lock();
            if let Some(text) = slot.ready() {
                match link.isend(TelemetryMessage::Status(text)) {
                    Ok(handle) => {
                        slot.sent(handle);
                        sent += 1;
                    }
                    Err(err) => tracing::trace!(rank = self.rank(), %err, "status update dropped"),
                }
            }
        }

        {
            let mut slot = self.shared.progress.lock();
            if let Some((completed, total)) = slot.ready() {
                match link.isend(TelemetryMessage::Progress { completed, total }) {
                    Ok(handle) => {
                        slot.sent(handle);
                        sent += 1;
                    }
                    Err(err) => {
                        tracing::trace!(rank = self.rank(), %err, "progress update dropped")
                    }
                }
            }
        }

        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{Group, LocalGroup};

    #[test]
    fn test_message_tags() {
        assert_eq!(TelemetryMessage::Status("x".into()).tag(), 98);
        assert_eq!(
            TelemetryMessage::Progress { completed: 1, total: 2 }.tag(),
            99
        );
    }

    #[test]
    fn test_root_updates_board_directly() {
        let reporter = Reporter::new(ROOT, 3);
        assert!(reporter.is_root());
        reporter.update_text("Counting tracks...");
        reporter.update_progress(1, 2);

        let board = reporter.board_snapshot().unwrap();
        assert_eq!(board.message(0), Some("Counting tracks..."));
        assert_eq!(board.progress(0), Some(Progress::new(1, 2)));
    }

    #[test]
    fn test_updates_overwrite_while_in_flight() {
        let endpoints = LocalGroup::new(2).endpoints();
        let root_link = endpoints[0].telemetry_link().unwrap();
        let link = endpoints[1].telemetry_link().unwrap();
        let reporter = Reporter::new(1, 2);
        assert!(reporter.board_snapshot().is_none());

        reporter.update_progress(1, 100);
        assert_eq!(reporter.flush(&link), 1);

        // The first send has not been received yet, so nothing new goes out.
        for i in 2..=100 {
            reporter.update_progress(i, 100);
            assert_eq!(reporter.flush(&link), 0);
        }
        assert!(!reporter.is_idle());

        assert!(root_link.poll().unwrap().is_some());
        assert_eq!(reporter.flush(&link), 1);

        let (_, message) = root_link.poll().unwrap().unwrap();
        assert_eq!(
            message,
            TelemetryMessage::Progress { completed: 100, total: 100 }
        );
        assert!(root_link.poll().unwrap().is_none());
        assert!(reporter.is_idle());
    }
}
