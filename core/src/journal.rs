//! Undo journal.
//!
//! A [`Journal`] records the previous value of every entry a command touches while a
//! transaction is open. Rolling back replays those records newest-first; committing
//! simply forgets them. State types compose a journal and implement [`Transactional`]
//! so the store can bracket every command in one all-or-nothing unit.
//!
//! # Example
//!
//! ```
//! use turnstile_core::journal::Journal;
//!
//! let mut counter = 1_u32;
//! let mut journal = Journal::new();
//!
//! let checkpoint = journal.begin();
//! journal.record(counter);
//! counter = 2;
//!
//! for previous in journal.unwind(checkpoint) {
//!     counter = previous;
//! }
//! assert_eq!(counter, 1);
//! ```

use std::iter::Rev;
use std::vec::Drain;

/// Position in the journal a transaction started at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Append-only log of undo records for the open transaction
#[derive(Clone, Debug)]
pub struct Journal<U> {
    entries: Vec<U>,
    open: bool,
}

impl<U> Journal<U> {
    /// Create an empty, closed journal
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            open: false,
        }
    }

    /// Open a transaction and return its checkpoint
    pub fn begin(&mut self) -> Checkpoint {
        self.open = true;
        Checkpoint(self.entries.len())
    }

    /// Whether a transaction is open
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Number of undo records held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no undo records are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record an undo entry. Ignored while no transaction is open.
    pub fn record(&mut self, undo: U) {
        if self.open {
            self.entries.push(undo);
        }
    }

    /// Close the transaction, keeping every change made since `checkpoint`
    pub fn seal(&mut self, checkpoint: Checkpoint) {
        self.entries.truncate(checkpoint.0);
        self.open = false;
    }

    /// Close the transaction and yield its undo records newest-first
    pub fn unwind(&mut self, checkpoint: Checkpoint) -> Rev<Drain<'_, U>> {
        self.open = false;
        let start = checkpoint.0.min(self.entries.len());
        self.entries.drain(start..).rev()
    }
}

impl<U> Default for Journal<U> {
    fn default() -> Self {
        Self::new()
    }
}

/// State that can be bracketed in a transaction
pub trait Transactional {
    /// Start staging changes
    fn begin(&mut self) -> Checkpoint;

    /// Keep every change staged since `checkpoint`
    fn commit(&mut self, checkpoint: Checkpoint);

    /// Restore the state as it was at `checkpoint`
    fn rollback(&mut self, checkpoint: Checkpoint);
}
