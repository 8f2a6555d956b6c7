//! The root's table of per-rank status.

use super::TelemetryMessage;
use crate::group::Rank;

/// Work completed out of a total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl Progress {
    /// Create a progress pair.
    pub fn new(completed: u64, total: u64) -> Self {
        Self { completed, total }
    }

    /// Completed fraction in `[0, 1]`; 0 when the total is 0.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.completed as f64 / self.total as f64).clamp(0.0, 1.0)
        }
    }
}

/// Latest status text and progress of every rank, with dirty tracking.
///
/// Every cell starts dirty so the first repaint draws the whole grid.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    messages: Vec<String>,
    progress: Vec<Progress>,
    dirty: Vec<bool>,
}

impl StatusBoard {
    /// A board for `size` ranks.
    pub fn new(size: usize) -> Self {
        Self {
            messages: vec![String::new(); size],
            progress: vec![Progress::default(); size],
            dirty: vec![true; size],
        }
    }

    /// Number of ranks on the board.
    pub fn size(&self) -> usize {
        self.messages.len()
    }

    /// Replace a rank's status text.
    pub fn set_message(&mut self, rank: Rank, message: String) -> bool {
        match self.messages.get_mut(rank) {
            Some(slot) => {
                *slot = message;
                self.dirty[rank] = true;
                true
            }
            None => false,
        }
    }

    /// Replace a rank's progress.
    pub fn set_progress(&mut self, rank: Rank, progress: Progress) -> bool {
        match self.progress.get_mut(rank) {
            Some(slot) => {
                *slot = progress;
                self.dirty[rank] = true;
                true
            }
            None => false,
        }
    }

    /// Apply a message received from `rank`. Unknown ranks are ignored.
    pub fn apply(&mut self, rank: Rank, message: TelemetryMessage) -> bool {
        match message {
            TelemetryMessage::Status(text) => self.set_message(rank, text),
            TelemetryMessage::Progress { completed, total } => {
                self.set_progress(rank, Progress::new(completed, total))
            }
        }
    }

    /// A rank's latest status text.
    pub fn message(&self, rank: Rank) -> Option<&str> {
        self.messages.get(rank).map(String::as_str)
    }

    /// A rank's latest progress.
    pub fn progress(&self, rank: Rank) -> Option<Progress> {
        self.progress.get(rank).copied()
    }

    /// True when the rank changed since the last repaint.
    pub fn is_dirty(&self, rank: Rank) -> bool {
        self.dirty.get(rank).copied().unwrap_or(false)
    }

    /// Ranks changed since the last call, in rank order; clears the marks.
    pub fn take_dirty(&mut self) -> Vec<Rank> {
        let ranks = self
            .dirty
            .iter()
            .enumerate()
            .filter_map(|(rank, &dirty)| dirty.then_some(rank))
            .collect();
        self.dirty.iter_mut().for_each(|d| *d = false);
        ranks
    }
}
