//! Aggregates of the ticket ledger.
//!
//! One reducer serves every command, because a purchase or a transfer touches several
//! authorities at once and they must commit together:
//! - Registry: event creation and lookup
//! - Inventory: capacity, unsold counter, and the issuance agent allowed to sell
//! - Ledger: per-event balances and direct transfer
//! - Escrow: the initiate/accept handshake
//! - Profiles: registration and attendance sets

pub mod escrow;
pub mod inventory;
pub mod ledger;
pub mod profiles;
pub mod registry;

pub use escrow::TransferEscrow;
pub use ledger::OwnershipLedger;
pub use profiles::{UserProfile, UserProfileIndex};
pub use registry::EventRegistry;

use crate::config::LedgerConfig;
use crate::error::TicketingError;
use crate::state::TicketingState;
use crate::types::{EventId, PendingKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use turnstile_core::{
    Amount, Principal,
    action::Command,
    effect::Effect,
    environment::{Clock, PaymentSink},
    reducer::{Effects, Reducer},
};

// ============================================================================
// Actions
// ============================================================================

/// Commands accepted by the ticket ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketingAction {
    /// Create an event with its inventory and issuance agent
    CreateEvent {
        /// Who receives purchase payments
        organizer: Principal,
        /// Display name
        name: String,
        /// Cutoff for every inventory and ownership operation
        opens_until: DateTime<Utc>,
        /// Price of one ticket
        unit_price: Amount,
        /// Tickets that will ever exist
        capacity: u64,
    },

    /// Buy tickets from the event's issuance agent
    Purchase {
        /// Who receives the tickets
        buyer: Principal,
        /// Event
        event_id: EventId,
        /// Tickets to buy
        quantity: u64,
        /// Funds attached (forwarded in full)
        payment: Amount,
    },

    /// Decrease an inventory counter directly
    DecreaseRemaining {
        /// Event
        event_id: EventId,
        /// Who is asking
        caller: Principal,
        /// Tickets to remove
        quantity: u64,
    },

    /// Move tickets to another principal immediately
    Transfer {
        /// Current holder
        sender: Principal,
        /// New holder
        recipient: Principal,
        /// Event
        event_id: EventId,
        /// Tickets to move
        quantity: u64,
        /// Funds attached (forwarded in full)
        payment: Amount,
    },

    /// Offer tickets to another principal
    InitiateTransfer {
        /// Current holder
        from: Principal,
        /// Intended recipient
        to: Principal,
        /// Event
        event_id: EventId,
        /// Tickets offered
        quantity: u64,
    },

    /// Accept an offer addressed to the caller
    AcceptTransfer {
        /// Intended recipient of the offer
        caller: Principal,
        /// Offering holder
        from: Principal,
        /// Event
        event_id: EventId,
        /// Funds attached (forwarded in full)
        payment: Amount,
    },

    /// Withdraw the caller's own offer
    CancelTransfer {
        /// Offering holder
        caller: Principal,
        /// Event
        event_id: EventId,
        /// Intended recipient
        to: Principal,
    },

    /// Create a profile
    Register {
        /// Who registers
        principal: Principal,
        /// Name shown to others
        display_name: String,
        /// Contact details
        contact: String,
    },

    /// Replace profile display fields
    UpdateProfile {
        /// Registered principal
        principal: Principal,
        /// Name shown to others
        display_name: String,
        /// Contact details
        contact: String,
    },
}

impl Command for TicketingAction {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateEvent { .. } => "create_event",
            Self::Purchase { .. } => "purchase",
            Self::DecreaseRemaining { .. } => "decrease_remaining",
            Self::Transfer { .. } => "transfer",
            Self::InitiateTransfer { .. } => "initiate_transfer",
            Self::AcceptTransfer { .. } => "accept_transfer",
            Self::CancelTransfer { .. } => "cancel_transfer",
            Self::Register { .. } => "register",
            Self::UpdateProfile { .. } => "update_profile",
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Facts emitted by committed commands
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketingEvent {
    /// An event was created
    EventCreated {
        /// New id
        event_id: EventId,
        /// Organizer
        organizer: Principal,
        /// Display name
        name: String,
        /// Cutoff
        opens_until: DateTime<Utc>,
        /// Price of one ticket
        unit_price: Amount,
        /// Capacity
        capacity: u64,
    },

    /// Tickets were sold out of inventory
    TicketsPurchased {
        /// Event
        event_id: EventId,
        /// New holder
        buyer: Principal,
        /// Tickets sold
        quantity: u64,
        /// Funds forwarded to the organizer
        paid: Amount,
    },

    /// Tickets moved by direct transfer
    TicketsTransferred {
        /// Event
        event_id: EventId,
        /// Previous holder
        from: Principal,
        /// New holder
        to: Principal,
        /// Tickets moved
        quantity: u64,
        /// Funds forwarded
        paid: Amount,
    },

    /// An escrow offer was recorded
    TransferOffered {
        /// Event
        event_id: EventId,
        /// Offering holder
        from: Principal,
        /// Intended recipient
        to: Principal,
        /// Tickets offered
        quantity: u64,
    },

    /// An escrow offer was accepted and settled
    TransferAccepted {
        /// Event
        event_id: EventId,
        /// Previous holder
        from: Principal,
        /// New holder
        to: Principal,
        /// Tickets moved
        quantity: u64,
        /// Funds forwarded
        paid: Amount,
    },

    /// An escrow offer was withdrawn
    TransferCancelled {
        /// Event
        event_id: EventId,
        /// Offering holder
        from: Principal,
        /// Intended recipient
        to: Principal,
        /// Tickets that had been offered
        quantity: u64,
    },

    /// A principal registered
    UserRegistered {
        /// Who registered
        principal: Principal,
    },

    /// A profile's display fields changed
    ProfileUpdated {
        /// Whose profile
        principal: Principal,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies injected into the ticketing reducer
#[derive(Clone)]
pub struct TicketingEnvironment {
    /// Source of "now" for cutoff checks
    pub clock: Arc<dyn Clock>,
    /// Where collected payments are forwarded
    pub payments: Arc<dyn PaymentSink>,
    /// Ledger policy
    pub config: LedgerConfig,
}

impl TicketingEnvironment {
    /// Creates a new `TicketingEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, payments: Arc<dyn PaymentSink>, config: LedgerConfig) -> Self {
        Self {
            clock,
            payments,
            config,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for every ticket ledger command
///
/// Validates against current state, stages the changes through the state's journal,
/// and describes the payment forward the store must complete before committing.
#[derive(Clone, Copy, Debug, Default)]
pub struct TicketingReducer;

impl TicketingReducer {
    /// Creates a new `TicketingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for TicketingReducer {
    type State = TicketingState;
    type Action = TicketingAction;
    type Event = TicketingEvent;
    type Environment = TicketingEnvironment;
    type Error = TicketingError;

    fn reduce(
        &self,
        state: &mut TicketingState,
        action: TicketingAction,
        env: &TicketingEnvironment,
    ) -> Result<Effects<TicketingEvent>, TicketingError> {
        match action {
            TicketingAction::CreateEvent {
                organizer,
                name,
                opens_until,
                unit_price,
                capacity,
            } => registry::create_event(
                state,
                registry::EventDraft {
                    organizer,
                    name,
                    opens_until,
                    unit_price,
                    capacity,
                },
                env,
            ),

            TicketingAction::Purchase {
                buyer,
                event_id,
                quantity,
                payment,
            } => inventory::purchase(state, buyer, event_id, quantity, payment, env),

            TicketingAction::DecreaseRemaining {
                event_id,
                caller,
                quantity,
            } => inventory::decrease_remaining(state, event_id, caller, quantity),

            TicketingAction::Transfer {
                sender,
                recipient,
                event_id,
                quantity,
                payment,
            } => ledger::transfer(
                state,
                ledger::TransferRequest {
                    sender,
                    recipient,
                    event_id,
                    quantity,
                    payment,
                },
                env,
            ),

            TicketingAction::InitiateTransfer {
                from,
                to,
                event_id,
                quantity,
            } => escrow::initiate(state, PendingKey::new(from, event_id, to), quantity, env),

            TicketingAction::AcceptTransfer {
                caller,
                from,
                event_id,
                payment,
            } => escrow::accept(state, caller, from, event_id, payment, env),

            TicketingAction::CancelTransfer {
                caller,
                event_id,
                to,
            } => escrow::cancel(state, PendingKey::new(caller, event_id, to)),

            TicketingAction::Register {
                principal,
                display_name,
                contact,
            } => profiles::register(state, principal, display_name, contact),

            TicketingAction::UpdateProfile {
                principal,
                display_name,
                contact,
            } => profiles::update_profile(state, principal, display_name, contact),
        }
    }
}

// ============================================================================
// Shared checks
// ============================================================================

/// Reject `offered` below `required`
fn ensure_paid(required: Amount, offered: Amount) -> Result<(), TicketingError> {
    if offered < required {
        return Err(TicketingError::Underpaid { required, offered });
    }
    Ok(())
}

/// Registration gate, active only when the ledger is configured to require it
fn ensure_registered(
    profiles: &UserProfileIndex,
    principal: &Principal,
    env: &TicketingEnvironment,
) -> Result<(), TicketingError> {
    if env.config.require_registration {
        require_registered(profiles, principal)
    } else {
        Ok(())
    }
}

fn require_registered(
    profiles: &UserProfileIndex,
    principal: &Principal,
) -> Result<(), TicketingError> {
    if profiles.is_registered(principal) {
        Ok(())
    } else {
        Err(TicketingError::NotRegistered(*principal))
    }
}

/// Forward effect for a nonzero payment
fn forward(
    env: &TicketingEnvironment,
    payee: Principal,
    amount: Amount,
) -> Option<Effect<TicketingEvent>> {
    (!amount.is_zero()).then(|| Effect::forward(&env.payments, payee, amount))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_are_stable() {
        let action = TicketingAction::CancelTransfer {
            caller: Principal::new(),
            event_id: EventId::new(1),
            to: Principal::new(),
        };
        assert_eq!(action.name(), "cancel_transfer");
    }

    #[test]
    fn test_forward_skips_zero_amounts() {
        let env = test_support::create_test_env();
        assert!(forward(&env, Principal::new(), Amount::ZERO).is_none());
        assert!(forward(&env, Principal::new(), Amount::from_units(1)).is_some());
    }

    #[test]
    fn test_ensure_paid_boundary() {
        let price = Amount::from_units(10);
        assert!(ensure_paid(price, Amount::from_units(9)).is_err());
        assert!(ensure_paid(price, price).is_ok());
        assert!(ensure_paid(price, Amount::from_units(11)).is_ok());
    }
}
