//! Application coordinator - owns the store and exposes the ledger operations.

use super::EventDiscovery;
use crate::aggregates::{
    TicketingAction, TicketingEnvironment, TicketingEvent, TicketingReducer, UserProfile,
};
use crate::config::Config;
use crate::error::TicketingError;
use crate::state::TicketingState;
use crate::types::{ConservationReport, Event, EventId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use turnstile_core::{
    Amount, Principal,
    environment::{Clock, PaymentSink},
};
use turnstile_runtime::{Committed, Store};

/// Result of a committed ledger operation
pub type Receipt = Committed<TicketingEvent>;

/// Main ticketing application.
///
/// Safe to share across threads: every operation serializes on the store.
pub struct TicketingApp {
    store: Store<TicketingReducer>,
}

impl TicketingApp {
    /// Create an empty ledger
    #[must_use]
    pub fn new(config: &Config, clock: Arc<dyn Clock>, payments: Arc<dyn PaymentSink>) -> Self {
        Self::with_state(TicketingState::new(), config, clock, payments)
    }

    /// Rebuild a ledger from [`Self::snapshot`] output
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::Snapshot`] if the bytes do not decode and
    /// [`TicketingError::ConservationViolated`] if the decoded tables do not balance.
    pub fn restore(
        bytes: &[u8],
        config: &Config,
        clock: Arc<dyn Clock>,
        payments: Arc<dyn PaymentSink>,
    ) -> Result<Self, TicketingError> {
        let state = TicketingState::from_bytes(bytes)?;
        tracing::info!(events = state.registry().len(), "Ledger restored from snapshot");
        Ok(Self::with_state(state, config, clock, payments))
    }

    fn with_state(
        state: TicketingState,
        config: &Config,
        clock: Arc<dyn Clock>,
        payments: Arc<dyn PaymentSink>,
    ) -> Self {
        let env = TicketingEnvironment::new(clock, payments, config.ledger);
        Self {
            store: Store::new(state, TicketingReducer::new(), env),
        }
    }

    /// Number of operations committed since this app was created
    #[must_use]
    pub fn committed_count(&self) -> u64 {
        self.store.committed_count()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Create an event and its issuance agent
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::InvalidSchedule`] if `opens_until` is not in the future,
    /// [`TicketingError::InvalidCapacity`] for zero capacity, and
    /// [`TicketingError::ZeroRecipient`] for a zero organizer.
    pub fn create_event(
        &self,
        organizer: Principal,
        name: impl Into<String>,
        opens_until: DateTime<Utc>,
        unit_price: Amount,
        capacity: u64,
    ) -> Result<EventId, TicketingError> {
        let receipt = self.store.send(TicketingAction::CreateEvent {
            organizer,
            name: name.into(),
            opens_until,
            unit_price,
            capacity,
        })?;

        let event_id = receipt
            .events
            .iter()
            .find_map(|event| match event {
                TicketingEvent::EventCreated { event_id, .. } => Some(*event_id),
                _ => None,
            })
            .ok_or(TicketingError::Internal("event creation emitted no id"))?;

        tracing::info!(%event_id, %organizer, capacity, %unit_price, "Event created");
        Ok(event_id)
    }

    /// Buy tickets; the whole payment is forwarded to the organizer
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::EventExpired`], [`TicketingError::SoldOut`],
    /// [`TicketingError::Underpaid`], or [`TicketingError::PaymentFailed`] (rolled back).
    pub fn purchase(
        &self,
        buyer: Principal,
        event_id: EventId,
        quantity: u64,
        payment: Amount,
    ) -> Result<Receipt, TicketingError> {
        let receipt = self.store.send(TicketingAction::Purchase {
            buyer,
            event_id,
            quantity,
            payment,
        })?;
        tracing::info!(%event_id, %buyer, quantity, %payment, "Tickets purchased");
        Ok(receipt)
    }

    /// Decrease an event's unsold counter directly
    ///
    /// Only the event's issuance agent holds this capability, and it is never handed
    /// out, so every call through here fails.
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::Unauthorized`] for an existing event.
    pub fn decrease_remaining(
        &self,
        event_id: EventId,
        caller: Principal,
        quantity: u64,
    ) -> Result<Receipt, TicketingError> {
        self.store.send(TicketingAction::DecreaseRemaining {
            event_id,
            caller,
            quantity,
        })
    }

    /// Move tickets from `sender` to `recipient`; the payment goes to the configured payee
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::InsufficientBalance`], [`TicketingError::SelfTransfer`],
    /// [`TicketingError::ZeroRecipient`], [`TicketingError::EventExpired`],
    /// [`TicketingError::Underpaid`], or [`TicketingError::PaymentFailed`] (rolled back).
    pub fn transfer(
        &self,
        sender: Principal,
        recipient: Principal,
        event_id: EventId,
        quantity: u64,
        payment: Amount,
    ) -> Result<Receipt, TicketingError> {
        let receipt = self.store.send(TicketingAction::Transfer {
            sender,
            recipient,
            event_id,
            quantity,
            payment,
        })?;
        tracing::info!(%event_id, from = %sender, to = %recipient, quantity, "Tickets transferred");
        Ok(receipt)
    }

    /// Offer tickets to `to`; nothing moves until they accept
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::ZeroRecipient`], [`TicketingError::SelfTransfer`],
    /// [`TicketingError::InsufficientBalance`], [`TicketingError::DuplicatePending`],
    /// [`TicketingError::ReciprocalPending`], or [`TicketingError::EventExpired`].
    pub fn initiate_transfer(
        &self,
        from: Principal,
        to: Principal,
        event_id: EventId,
        quantity: u64,
    ) -> Result<Receipt, TicketingError> {
        self.store.send(TicketingAction::InitiateTransfer {
            from,
            to,
            event_id,
            quantity,
        })
    }

    /// Accept the offer `from` made to `caller`, paying for it
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::NoPendingTransfer`], [`TicketingError::EventExpired`],
    /// [`TicketingError::StaleSender`], [`TicketingError::Underpaid`], or
    /// [`TicketingError::PaymentFailed`] (rolled back, offer kept).
    pub fn accept_transfer(
        &self,
        caller: Principal,
        from: Principal,
        event_id: EventId,
        payment: Amount,
    ) -> Result<Receipt, TicketingError> {
        let receipt = self.store.send(TicketingAction::AcceptTransfer {
            caller,
            from,
            event_id,
            payment,
        })?;
        tracing::info!(%event_id, %from, to = %caller, "Escrowed transfer accepted");
        Ok(receipt)
    }

    /// Withdraw the offer `caller` made to `to`
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::NoPendingTransfer`] if there is no such offer.
    pub fn cancel_transfer(
        &self,
        caller: Principal,
        event_id: EventId,
        to: Principal,
    ) -> Result<Receipt, TicketingError> {
        self.store.send(TicketingAction::CancelTransfer {
            caller,
            event_id,
            to,
        })
    }

    /// Register a profile
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::AlreadyRegistered`] on a second call.
    pub fn register(
        &self,
        principal: Principal,
        display_name: impl Into<String>,
        contact: impl Into<String>,
    ) -> Result<Receipt, TicketingError> {
        self.store.send(TicketingAction::Register {
            principal,
            display_name: display_name.into(),
            contact: contact.into(),
        })
    }

    /// Replace a profile's display fields
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::NotRegistered`] if `principal` never registered.
    pub fn update_profile(
        &self,
        principal: Principal,
        display_name: impl Into<String>,
        contact: impl Into<String>,
    ) -> Result<Receipt, TicketingError> {
        self.store.send(TicketingAction::UpdateProfile {
            principal,
            display_name: display_name.into(),
            contact: contact.into(),
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn read<T>(&self, f: impl FnOnce(&TicketingState) -> T) -> Result<T, TicketingError> {
        Ok(self.store.state(f)?)
    }

    /// Look up an event
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::NotFound`] for an unknown id.
    pub fn event(&self, event_id: EventId) -> Result<Event, TicketingError> {
        self.read(|state| state.event(event_id))?
    }

    /// Tickets `holder` owns for `event_id`
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::StateUnavailable`] if the ledger is poisoned.
    pub fn balance_of(&self, holder: &Principal, event_id: EventId) -> Result<u64, TicketingError> {
        self.read(|state| state.balance_of(holder, event_id))
    }

    /// Quantity of the live offer from `from` to `to`
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::StateUnavailable`] if the ledger is poisoned.
    pub fn pending(
        &self,
        from: Principal,
        event_id: EventId,
        to: Principal,
    ) -> Result<Option<u64>, TicketingError> {
        self.read(|state| state.pending(from, event_id, to))
    }

    /// Profile of `principal`
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::StateUnavailable`] if the ledger is poisoned.
    pub fn profile(&self, principal: &Principal) -> Result<Option<UserProfile>, TicketingError> {
        self.read(|state| state.profile(principal).cloned())
    }

    /// Events `principal` holds tickets for, ascending
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::StateUnavailable`] if the ledger is poisoned.
    pub fn attending(&self, principal: &Principal) -> Result<Vec<EventId>, TicketingError> {
        self.read(|state| state.attending(principal))
    }

    /// Check the conservation law for one event
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::NotFound`] or [`TicketingError::ConservationViolated`].
    pub fn audit(&self, event_id: EventId) -> Result<ConservationReport, TicketingError> {
        self.read(|state| state.audit(event_id))?
    }

    /// Check the conservation law for every event
    ///
    /// # Errors
    ///
    /// Returns the first [`TicketingError::ConservationViolated`] found.
    pub fn audit_all(&self) -> Result<Vec<ConservationReport>, TicketingError> {
        self.read(TicketingState::audit_all)?
    }

    /// Encode the committed tables for [`Self::restore`]
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::Snapshot`] if encoding fails.
    pub fn snapshot(&self) -> Result<Vec<u8>, TicketingError> {
        self.read(TicketingState::to_bytes)?
    }
}

impl EventDiscovery for TicketingApp {
    fn event_exists(&self, event_id: EventId) -> bool {
        self.read(|state| state.registry().contains(event_id))
            .unwrap_or(false)
    }

    fn organizer_of(&self, event_id: EventId) -> Option<Principal> {
        self.read(|state| state.event(event_id).ok().map(|event| event.organizer))
            .ok()
            .flatten()
    }
}
