//! Ledger state and its transactional boundary.
//!
//! [`TicketingState`] holds the four tables (events, balances, pending transfers,
//! profiles) plus one undo journal shared by all of them. Every mutation a command
//! stages goes through the journal, so a rejected command or a refused payment rolls
//! back inventory, ledger, escrow, and attendance together.

use crate::aggregates::{
    EventRegistry, OwnershipLedger, TransferEscrow, UserProfile, UserProfileIndex,
};
use crate::error::TicketingError;
use crate::types::{ConservationReport, Event, EventId, PendingKey};
use serde::{Deserialize, Serialize};
use turnstile_core::{Checkpoint, Journal, Principal, Transactional};

/// Previous value of one entry touched by the open transaction
#[derive(Clone, Debug)]
pub(crate) enum Undo {
    /// An event was allocated
    EventCreated { event_id: EventId },
    /// An inventory counter changed
    Remaining { event_id: EventId, previous: u64 },
    /// A balance changed
    Balance {
        event_id: EventId,
        holder: Principal,
        previous: u64,
    },
    /// A pending transfer was offered or cleared
    Pending {
        key: PendingKey,
        previous: Option<u64>,
    },
    /// A profile changed
    Profile {
        principal: Principal,
        previous: Option<UserProfile>,
    },
}

/// Complete ledger state
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TicketingState {
    pub(crate) registry: EventRegistry,
    pub(crate) ledger: OwnershipLedger,
    pub(crate) escrow: TransferEscrow,
    pub(crate) profiles: UserProfileIndex,
    #[serde(skip)]
    pub(crate) journal: Journal<Undo>,
}

impl TicketingState {
    /// Creates an empty `TicketingState`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an event
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::NotFound`] if the id was never allocated.
    pub fn event(&self, event_id: EventId) -> Result<Event, TicketingError> {
        self.registry.event(event_id)
    }

    /// The event table
    #[must_use]
    pub const fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Tickets `holder` owns for `event_id`
    #[must_use]
    pub fn balance_of(&self, holder: &Principal, event_id: EventId) -> u64 {
        self.ledger.balance(holder, event_id)
    }

    /// Quantity of the live offer from `from` to `to`, if any
    #[must_use]
    pub fn pending(&self, from: Principal, event_id: EventId, to: Principal) -> Option<u64> {
        self.escrow.pending(&PendingKey::new(from, event_id, to))
    }

    /// Profile of `principal`, if it registered or currently holds tickets
    #[must_use]
    pub fn profile(&self, principal: &Principal) -> Option<&UserProfile> {
        self.profiles.profile(principal)
    }

    /// Events `principal` holds tickets for, ascending
    #[must_use]
    pub fn attending(&self, principal: &Principal) -> Vec<EventId> {
        self.profiles.attending(principal)
    }

    /// Check `remaining + Σ balances == capacity` for one event
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::NotFound`] for an unknown event and
    /// [`TicketingError::ConservationViolated`] if the law does not hold.
    pub fn audit(&self, event_id: EventId) -> Result<ConservationReport, TicketingError> {
        let event = self.registry.event(event_id)?;
        let held = self.ledger.held(event_id);
        let report = ConservationReport {
            event_id,
            capacity: event.capacity,
            remaining: event.remaining,
            held: held.unwrap_or(u64::MAX),
            holders: self.ledger.holders(event_id),
        };

        if held.is_none() || !report.balanced() {
            return Err(TicketingError::ConservationViolated {
                event_id,
                capacity: report.capacity,
                remaining: report.remaining,
                held: report.held,
            });
        }
        Ok(report)
    }

    /// Audit every event, in id order
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn audit_all(&self) -> Result<Vec<ConservationReport>, TicketingError> {
        self.registry.ids().map(|event_id| self.audit(event_id)).collect()
    }

    /// Encode the committed tables
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::Snapshot`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TicketingError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode tables produced by [`Self::to_bytes`] and audit them
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::Snapshot`] if decoding fails and
    /// [`TicketingError::ConservationViolated`] if the decoded tables do not balance.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TicketingError> {
        let state: Self = bincode::deserialize(bytes)?;
        state.audit_all()?;
        Ok(state)
    }

    fn revert(&mut self, record: Undo) {
        match record {
            Undo::EventCreated { event_id } => self.registry.restore_created(event_id),
            Undo::Remaining { event_id, previous } => {
                self.registry.restore_remaining(event_id, previous);
            }
            Undo::Balance {
                event_id,
                holder,
                previous,
            } => self.ledger.restore(event_id, holder, previous),
            Undo::Pending { key, previous } => self.escrow.restore(key, previous),
            Undo::Profile {
                principal,
                previous,
            } => self.profiles.restore(principal, previous),
        }
    }
}

impl Transactional for TicketingState {
    fn begin(&mut self) -> Checkpoint {
        self.journal.begin()
    }

    fn commit(&mut self, checkpoint: Checkpoint) {
        self.journal.seal(checkpoint);
    }

    fn rollback(&mut self, checkpoint: Checkpoint) {
        let undo: Vec<Undo> = self.journal.unwind(checkpoint).collect();
        for record in undo {
            self.revert(record);
        }
    }
}
