//! Error types for the ticket ledger.
//!
//! Every failed operation leaves state exactly as it was; the variant tells the caller
//! why, and [`TicketingError::kind`] groups variants into the classes a caller acts on.

use crate::types::EventId;
use chrono::{DateTime, Utc};
use thiserror::Error;
use turnstile_core::{Amount, Principal, environment::PaymentError};
use turnstile_runtime::StoreError;

/// Broad classes of failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request (bad schedule, zero capacity or quantity, bad recipient)
    Validation,
    /// Unknown event or pending transfer
    NotFound,
    /// Caller lacks the capability
    Authorization,
    /// Not enough tickets, balance, or payment
    InsufficientResource,
    /// Conflicts with existing state
    StateConflict,
    /// The event no longer accepts operations
    Temporal,
    /// Funds could not be forwarded
    Payment,
    /// The ledger itself is unhealthy
    Internal,
}

/// Errors returned by ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketingError {
    /// Event cutoff is not in the future
    #[error("Event must open until a future time (opens_until {opens_until}, now {now})")]
    InvalidSchedule {
        /// Requested cutoff
        opens_until: DateTime<Utc>,
        /// Time of the request
        now: DateTime<Utc>,
    },

    /// Capacity of zero
    #[error("Capacity must be greater than zero")]
    InvalidCapacity,

    /// Quantity of zero
    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    /// Recipient is the zero principal
    #[error("Recipient must not be the zero principal")]
    ZeroRecipient,

    /// Sender and recipient are the same
    #[error("Cannot transfer tickets to yourself")]
    SelfTransfer,

    /// Event id was never allocated
    #[error("Event {0} not found")]
    NotFound(EventId),

    /// No live pending transfer for the triple
    #[error("No pending transfer from {from} to {to} for event {event_id}")]
    NoPendingTransfer {
        /// Offering holder
        from: Principal,
        /// Event
        event_id: EventId,
        /// Intended recipient
        to: Principal,
    },

    /// Caller is not the issuance agent paired with the event
    #[error("Caller is not authorized to change inventory of event {event_id}")]
    Unauthorized {
        /// Event whose inventory was targeted
        event_id: EventId,
    },

    /// Not enough unsold tickets
    #[error("Event {event_id} sold out: requested {requested}, remaining {remaining}")]
    SoldOut {
        /// Event
        event_id: EventId,
        /// Tickets requested
        requested: u64,
        /// Tickets left
        remaining: u64,
    },

    /// Holder owns fewer tickets than requested
    #[error("Insufficient balance for {holder} on event {event_id}: requested {requested}, held {held}")]
    InsufficientBalance {
        /// Event
        event_id: EventId,
        /// Holder
        holder: Principal,
        /// Tickets requested
        requested: u64,
        /// Tickets held
        held: u64,
    },

    /// Payment below price × quantity
    #[error("Underpaid: required {required}, offered {offered}")]
    Underpaid {
        /// Price × quantity
        required: Amount,
        /// What the caller attached
        offered: Amount,
    },

    /// Price × quantity does not fit in an amount
    #[error("Price of the requested quantity overflows")]
    AmountOverflow,

    /// Principal registered twice
    #[error("Principal {0} is already registered")]
    AlreadyRegistered(Principal),

    /// Principal has no registered profile
    #[error("Principal {0} is not registered")]
    NotRegistered(Principal),

    /// An identical offer is already live
    #[error("A transfer from {from} to {to} for event {event_id} is already pending")]
    DuplicatePending {
        /// Offering holder
        from: Principal,
        /// Event
        event_id: EventId,
        /// Intended recipient
        to: Principal,
    },

    /// The recipient already has a live offer to the sender
    #[error("A transfer from {to} to {from} for event {event_id} is already pending")]
    ReciprocalPending {
        /// Offering holder
        from: Principal,
        /// Event
        event_id: EventId,
        /// Intended recipient
        to: Principal,
    },

    /// Sender's balance fell below the pending quantity since the offer was made
    #[error("Sender {from} holds {held} tickets for event {event_id}, offer was for {pending}")]
    StaleSender {
        /// Offering holder
        from: Principal,
        /// Event
        event_id: EventId,
        /// Quantity offered
        pending: u64,
        /// Quantity now held
        held: u64,
    },

    /// Event cutoff has passed
    #[error("Event {event_id} closed at {opens_until}")]
    EventExpired {
        /// Event
        event_id: EventId,
        /// Cutoff
        opens_until: DateTime<Utc>,
    },

    /// Forwarding funds failed and the operation was rolled back
    #[error("Payment failed: {0}")]
    PaymentFailed(PaymentError),

    /// Audit found `remaining + held != capacity`
    #[error(
        "Conservation violated for event {event_id}: capacity {capacity}, remaining {remaining}, held {held}"
    )]
    ConservationViolated {
        /// Event
        event_id: EventId,
        /// Capacity
        capacity: u64,
        /// Unsold
        remaining: u64,
        /// Held by principals
        held: u64,
    },

    /// The store can no longer serve state
    #[error("Ledger state unavailable")]
    StateUnavailable,

    /// Snapshot could not be encoded or decoded
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// A committed command did not produce its expected result
    #[error("Internal error: {0}")]
    Internal(&'static str),
}

impl TicketingError {
    /// Class of this failure
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSchedule { .. }
            | Self::InvalidCapacity
            | Self::InvalidQuantity
            | Self::ZeroRecipient
            | Self::SelfTransfer
            | Self::AmountOverflow => ErrorKind::Validation,
            Self::NotFound(_) | Self::NoPendingTransfer { .. } => ErrorKind::NotFound,
            Self::Unauthorized { .. } | Self::NotRegistered(_) => ErrorKind::Authorization,
            Self::SoldOut { .. } | Self::InsufficientBalance { .. } | Self::Underpaid { .. } => {
                ErrorKind::InsufficientResource
            }
            Self::AlreadyRegistered(_)
            | Self::DuplicatePending { .. }
            | Self::ReciprocalPending { .. }
            | Self::StaleSender { .. } => ErrorKind::StateConflict,
            Self::EventExpired { .. } => ErrorKind::Temporal,
            Self::PaymentFailed(_) => ErrorKind::Payment,
            Self::ConservationViolated { .. }
            | Self::StateUnavailable
            | Self::Snapshot(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for TicketingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::PaymentFailed(payment) => Self::PaymentFailed(payment),
            StoreError::Poisoned => Self::StateUnavailable,
        }
    }
}

impl From<bincode::Error> for TicketingError {
    fn from(error: bincode::Error) -> Self {
        Self::Snapshot(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_distinguish_retry_from_gone_from_forbidden() {
        let underpaid = TicketingError::Underpaid {
            required: Amount::from_units(10),
            offered: Amount::from_units(9),
        };
        assert_eq!(underpaid.kind(), ErrorKind::InsufficientResource);
        assert_eq!(
            TicketingError::NotFound(EventId::new(9)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            TicketingError::Unauthorized {
                event_id: EventId::new(1)
            }
            .kind(),
            ErrorKind::Authorization
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let refused = PaymentError::Refused {
            payee: Principal::new(),
            reason: "no".to_string(),
        };
        assert_eq!(
            TicketingError::from(StoreError::PaymentFailed(refused.clone())),
            TicketingError::PaymentFailed(refused)
        );
        assert_eq!(
            TicketingError::from(StoreError::Poisoned),
            TicketingError::StateUnavailable
        );
    }

    #[test]
    fn test_error_messages() {
        let err = TicketingError::SoldOut {
            event_id: EventId::new(4),
            requested: 3,
            remaining: 1,
        };
        assert_eq!(err.to_string(), "Event 4 sold out: requested 3, remaining 1");
    }
}
