//! Two-phase transfer escrow.
//!
//! A holder offers tickets to a recipient with `initiate`; nothing moves until the
//! recipient calls `accept` with payment. Because the sender's balance can change in
//! between, `accept` checks it again and rejects a stale offer instead of creating
//! tickets out of nothing.
//!
//! ```text
//!   Empty ──initiate──► Pending ──accept──► Empty
//!                          │
//!                          └────cancel────► Empty
//! ```

use super::ledger::move_tickets;
use super::{TicketingEnvironment, TicketingEvent, ensure_paid, ensure_registered, forward};
use crate::error::TicketingError;
use crate::state::{TicketingState, Undo};
use crate::types::{EventId, PendingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use turnstile_core::{Amount, Journal, Principal, effect::Effect, reducer::Effects, smallvec};

/// Live offers keyed by `(from, event, to)`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransferEscrow {
    pending: HashMap<PendingKey, u64>,
}

impl TransferEscrow {
    /// Create an empty escrow
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Quantity of the live offer for `key`, if any
    #[must_use]
    pub fn pending(&self, key: &PendingKey) -> Option<u64> {
        self.pending.get(key).copied().filter(|quantity| *quantity > 0)
    }

    /// Number of live offers
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no offer is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn offer(&mut self, key: PendingKey, quantity: u64, journal: &mut Journal<Undo>) {
        let previous = self.pending.insert(key, quantity);
        journal.record(Undo::Pending { key, previous });
    }

    fn clear(&mut self, key: &PendingKey, journal: &mut Journal<Undo>) {
        let previous = self.pending.remove(key);
        journal.record(Undo::Pending {
            key: *key,
            previous,
        });
    }

    /// Undo an offer or a clear
    pub(crate) fn restore(&mut self, key: PendingKey, previous: Option<u64>) {
        match previous {
            Some(quantity) => {
                self.pending.insert(key, quantity);
            }
            None => {
                self.pending.remove(&key);
            }
        }
    }
}

/// Record an offer of `quantity` tickets from `from` to `to`
pub(crate) fn initiate(
    state: &mut TicketingState,
    key: PendingKey,
    quantity: u64,
    env: &TicketingEnvironment,
) -> Result<Effects<TicketingEvent>, TicketingError> {
    let PendingKey { from, event_id, to } = key;
    if quantity == 0 {
        return Err(TicketingError::InvalidQuantity);
    }

    state
        .registry
        .record(event_id)?
        .ensure_open(env.clock.now())?;
    if to.is_zero() {
        return Err(TicketingError::ZeroRecipient);
    }
    if to == from {
        return Err(TicketingError::SelfTransfer);
    }
    ensure_registered(&state.profiles, &to, env)?;

    let held = state.ledger.balance(&from, event_id);
    if held < quantity {
        return Err(TicketingError::InsufficientBalance {
            event_id,
            holder: from,
            requested: quantity,
            held,
        });
    }
    if state.escrow.pending(&key).is_some() {
        return Err(TicketingError::DuplicatePending { from, event_id, to });
    }
    if state.escrow.pending(&key.reciprocal()).is_some() {
        return Err(TicketingError::ReciprocalPending { from, event_id, to });
    }

    state.escrow.offer(key, quantity, &mut state.journal);

    Ok(smallvec![Effect::Emit(TicketingEvent::TransferOffered {
        event_id,
        from,
        to,
        quantity,
    })])
}

/// Complete the offer `(from, event, caller)` against payment
pub(crate) fn accept(
    state: &mut TicketingState,
    caller: Principal,
    from: Principal,
    event_id: EventId,
    payment: Amount,
    env: &TicketingEnvironment,
) -> Result<Effects<TicketingEvent>, TicketingError> {
    let key = PendingKey::new(from, event_id, caller);
    let Some(quantity) = state.escrow.pending(&key) else {
        return Err(TicketingError::NoPendingTransfer {
            from,
            event_id,
            to: caller,
        });
    };

    let record = state.registry.record(event_id)?;
    record.ensure_open(env.clock.now())?;

    let held = state.ledger.balance(&from, event_id);
    if held < quantity {
        return Err(TicketingError::StaleSender {
            from,
            event_id,
            pending: quantity,
            held,
        });
    }
    ensure_paid(record.price_of(quantity)?, payment)?;
    let payee = env.config.transfer_payee.resolve(from, record.organizer);

    state.escrow.clear(&key, &mut state.journal);
    move_tickets(state, event_id, from, caller, quantity)?;

    let mut effects: Effects<TicketingEvent> = smallvec![];
    effects.extend(forward(env, payee, payment));
    effects.push(Effect::Emit(TicketingEvent::TransferAccepted {
        event_id,
        from,
        to: caller,
        quantity,
        paid: payment,
    }));
    Ok(effects)
}

/// Withdraw the caller's own offer
///
/// Allowed after the cutoff: it moves no tickets and frees the direction for a new
/// offer.
pub(crate) fn cancel(
    state: &mut TicketingState,
    key: PendingKey,
) -> Result<Effects<TicketingEvent>, TicketingError> {
    let PendingKey { from, event_id, to } = key;
    let Some(quantity) = state.escrow.pending(&key) else {
        return Err(TicketingError::NoPendingTransfer { from, event_id, to });
    };

    state.escrow.clear(&key, &mut state.journal);

    Ok(smallvec![Effect::Emit(TicketingEvent::TransferCancelled {
        event_id,
        from,
        to,
        quantity,
    })])
}
