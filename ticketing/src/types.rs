//! Domain types for the ticket ledger.
//!
//! This module contains the identifiers and value objects shared by the registry,
//! inventory, ownership ledger, escrow, and profile index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use turnstile_core::{Amount, Principal};
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Sequential identifier of an event (the first event is 1)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    /// Create an `EventId` from its sequence number
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the sequence number
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the issuance agent paired with one event
///
/// Never handed out by any query and never written to a snapshot: it is the
/// capability that authorizes inventory decrements. Restored events get a fresh one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AgentId(Uuid);

impl AgentId {
    /// Creates a new random `AgentId`
    #[must_use]
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[cfg(test)]
    pub(crate) const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

// ============================================================================
// Events
// ============================================================================

/// A ticketed event as seen by callers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Who created the event and receives purchase payments
    pub organizer: Principal,
    /// Display name
    pub name: String,
    /// Cutoff: no inventory or ownership operation is accepted at or after this instant
    pub opens_until: DateTime<Utc>,
    /// Price of one ticket
    pub unit_price: Amount,
    /// Total tickets that will ever exist
    pub capacity: u64,
    /// Tickets not yet sold
    pub remaining: u64,
}

impl Event {
    /// Tickets sold so far
    #[must_use]
    pub const fn sold(&self) -> u64 {
        self.capacity - self.remaining
    }

    /// Whether the event still accepts operations at `now`
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        now < self.opens_until
    }
}

// ============================================================================
// Escrow
// ============================================================================

/// Key of a pending transfer: one live offer per ordered pair per event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingKey {
    /// Current holder offering the tickets
    pub from: Principal,
    /// Event the tickets belong to
    pub event_id: EventId,
    /// Intended recipient
    pub to: Principal,
}

impl PendingKey {
    /// Creates a new `PendingKey`
    #[must_use]
    pub const fn new(from: Principal, event_id: EventId, to: Principal) -> Self {
        Self { from, event_id, to }
    }

    /// The same pair in the opposite direction
    #[must_use]
    pub const fn reciprocal(&self) -> Self {
        Self {
            from: self.to,
            event_id: self.event_id,
            to: self.from,
        }
    }
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} (event {})", self.from, self.to, self.event_id)
    }
}

// ============================================================================
// Settlement
// ============================================================================

/// Who is paid when tickets move between holders
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferPayee {
    /// The principal giving up the tickets
    #[default]
    OriginalHolder,
    /// The event's organizer
    Organizer,
}

impl TransferPayee {
    /// Resolve the payee for a movement out of `holder`
    #[must_use]
    pub const fn resolve(self, holder: Principal, organizer: Principal) -> Principal {
        match self {
            Self::OriginalHolder => holder,
            Self::Organizer => organizer,
        }
    }
}

impl FromStr for TransferPayee {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "holder" | "original_holder" | "seller" => Ok(Self::OriginalHolder),
            "organizer" => Ok(Self::Organizer),
            other => Err(format!("unknown transfer payee '{other}'")),
        }
    }
}

// ============================================================================
// Audit
// ============================================================================

/// Result of checking `remaining + Σ balances == capacity` for one event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConservationReport {
    /// Audited event
    pub event_id: EventId,
    /// Event capacity
    pub capacity: u64,
    /// Unsold tickets
    pub remaining: u64,
    /// Tickets held across all principals
    pub held: u64,
    /// Principals holding at least one ticket
    pub holders: usize,
}

impl ConservationReport {
    /// Whether the conservation law holds
    #[must_use]
    pub const fn balanced(&self) -> bool {
        match self.remaining.checked_add(self.held) {
            Some(total) => total == self.capacity,
            None => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reciprocal_key() {
        let a = Principal::new();
        let b = Principal::new();
        let key = PendingKey::new(a, EventId::new(3), b);
        let back = key.reciprocal();
        assert_eq!(back.from, b);
        assert_eq!(back.to, a);
        assert_eq!(back.event_id, EventId::new(3));
        assert_eq!(back.reciprocal(), key);
    }

    #[test]
    fn test_transfer_payee_parse() {
        assert_eq!(
            "holder".parse::<TransferPayee>().unwrap(),
            TransferPayee::OriginalHolder
        );
        assert_eq!(
            " Organizer ".parse::<TransferPayee>().unwrap(),
            TransferPayee::Organizer
        );
        assert!("sink".parse::<TransferPayee>().is_err());
    }

    #[test]
    fn test_conservation_report_balanced() {
        let report = ConservationReport {
            event_id: EventId::new(1),
            capacity: 10,
            remaining: 7,
            held: 3,
            holders: 2,
        };
        assert!(report.balanced());
        assert!(!ConservationReport { held: 4, ..report }.balanced());
    }
}
