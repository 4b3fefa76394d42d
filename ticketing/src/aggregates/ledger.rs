//! Ownership ledger and direct transfer.
//!
//! The ledger is the single source of truth for who holds how many tickets of each
//! event. Balances are grouped by event so a conservation audit sums one inner map.
//! A zero balance is never stored: absent means zero.

use super::{TicketingEnvironment, TicketingEvent, ensure_paid, ensure_registered, forward};
use crate::error::TicketingError;
use crate::state::{TicketingState, Undo};
use crate::types::EventId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use turnstile_core::{Amount, Journal, Principal, effect::Effect, reducer::Effects, smallvec};

/// Per-event balance table
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OwnershipLedger {
    balances: HashMap<EventId, HashMap<Principal, u64>>,
}

impl OwnershipLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tickets `holder` owns for `event_id` (zero if none)
    #[must_use]
    pub fn balance(&self, holder: &Principal, event_id: EventId) -> u64 {
        self.balances
            .get(&event_id)
            .and_then(|holders| holders.get(holder))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of all balances for `event_id`
    ///
    /// Returns `None` if the sum does not fit in a `u64`, which the conservation law
    /// rules out.
    #[must_use]
    pub fn held(&self, event_id: EventId) -> Option<u64> {
        self.balances.get(&event_id).map_or(Some(0), |holders| {
            holders
                .values()
                .try_fold(0_u64, |total, balance| total.checked_add(*balance))
        })
    }

    /// Number of principals holding at least one ticket of `event_id`
    #[must_use]
    pub fn holders(&self, event_id: EventId) -> usize {
        self.balances.get(&event_id).map_or(0, HashMap::len)
    }

    /// Add tickets to a balance, returning `(before, after)`
    pub(crate) fn credit(
        &mut self,
        event_id: EventId,
        holder: Principal,
        quantity: u64,
        journal: &mut Journal<Undo>,
    ) -> Result<(u64, u64), TicketingError> {
        let before = self.balance(&holder, event_id);
        let after = before
            .checked_add(quantity)
            .ok_or(TicketingError::Internal("balance overflow"))?;
        self.write(event_id, holder, before, after, journal);
        Ok((before, after))
    }

    /// Remove tickets from a balance, returning `(before, after)`
    pub(crate) fn debit(
        &mut self,
        event_id: EventId,
        holder: Principal,
        quantity: u64,
        journal: &mut Journal<Undo>,
    ) -> Result<(u64, u64), TicketingError> {
        let before = self.balance(&holder, event_id);
        let after = before
            .checked_sub(quantity)
            .ok_or(TicketingError::InsufficientBalance {
                event_id,
                holder,
                requested: quantity,
                held: before,
            })?;
        self.write(event_id, holder, before, after, journal);
        Ok((before, after))
    }

    fn write(
        &mut self,
        event_id: EventId,
        holder: Principal,
        before: u64,
        after: u64,
        journal: &mut Journal<Undo>,
    ) {
        journal.record(Undo::Balance {
            event_id,
            holder,
            previous: before,
        });
        self.set(event_id, holder, after);
    }

    fn set(&mut self, event_id: EventId, holder: Principal, value: u64) {
        if value == 0 {
            if let Some(holders) = self.balances.get_mut(&event_id) {
                holders.remove(&holder);
                if holders.is_empty() {
                    self.balances.remove(&event_id);
                }
            }
        } else {
            self.balances
                .entry(event_id)
                .or_default()
                .insert(holder, value);
        }
    }

    /// Undo a balance write
    pub(crate) fn restore(&mut self, event_id: EventId, holder: Principal, previous: u64) {
        self.set(event_id, holder, previous);
    }
}

/// Move `quantity` tickets between holders and keep both attendance sets in step
///
/// Shared by direct transfer and escrow acceptance.
pub(crate) fn move_tickets(
    state: &mut TicketingState,
    event_id: EventId,
    from: Principal,
    to: Principal,
    quantity: u64,
) -> Result<(), TicketingError> {
    let TicketingState {
        ledger,
        profiles,
        journal,
        ..
    } = state;

    let (before, after) = ledger.debit(event_id, from, quantity, journal)?;
    profiles.note_balance(from, event_id, before, after, journal);

    let (before, after) = ledger.credit(event_id, to, quantity, journal)?;
    profiles.note_balance(to, event_id, before, after, journal);

    Ok(())
}

/// Fields of a `Transfer` command
pub(crate) struct TransferRequest {
    pub(crate) sender: Principal,
    pub(crate) recipient: Principal,
    pub(crate) event_id: EventId,
    pub(crate) quantity: u64,
    pub(crate) payment: Amount,
}

/// Move tickets directly from `sender` to `recipient`, paid by the recipient
pub(crate) fn transfer(
    state: &mut TicketingState,
    request: TransferRequest,
    env: &TicketingEnvironment,
) -> Result<Effects<TicketingEvent>, TicketingError> {
    let TransferRequest {
        sender,
        recipient,
        event_id,
        quantity,
        payment,
    } = request;

    if quantity == 0 {
        return Err(TicketingError::InvalidQuantity);
    }

    let record = state.registry.record(event_id)?;
    record.ensure_open(env.clock.now())?;
    if recipient.is_zero() {
        return Err(TicketingError::ZeroRecipient);
    }
    if recipient == sender {
        return Err(TicketingError::SelfTransfer);
    }
    ensure_registered(&state.profiles, &recipient, env)?;

    let held = state.ledger.balance(&sender, event_id);
    if held < quantity {
        return Err(TicketingError::InsufficientBalance {
            event_id,
            holder: sender,
            requested: quantity,
            held,
        });
    }
    ensure_paid(record.price_of(quantity)?, payment)?;
    let payee = env.config.transfer_payee.resolve(sender, record.organizer);

    move_tickets(state, event_id, sender, recipient, quantity)?;

    let mut effects: Effects<TicketingEvent> = smallvec![];
    effects.extend(forward(env, payee, payment));
    effects.push(Effect::Emit(TicketingEvent::TicketsTransferred {
        event_id,
        from: sender,
        to: recipient,
        quantity,
        paid: payment,
    }));
    Ok(effects)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregates::test_support::{
        create_test_env, create_test_env_with, purchased, state_with_event,
    };
    use crate::aggregates::{TicketingAction, TicketingReducer};
    use crate::config::LedgerConfig;
    use crate::types::TransferPayee;
    use turnstile_testing::{ReducerTest, assertions};

    #[test]
    fn test_ledger_drops_zero_balances() {
        let mut ledger = OwnershipLedger::new();
        let mut journal = Journal::new();
        let holder = Principal::new();
        let event_id = EventId::new(1);

        assert_eq!(ledger.credit(event_id, holder, 3, &mut journal).unwrap(), (0, 3));
        assert_eq!(ledger.holders(event_id), 1);
        assert_eq!(ledger.debit(event_id, holder, 3, &mut journal).unwrap(), (3, 0));
        assert_eq!(ledger.holders(event_id), 0);
        assert_eq!(ledger.held(event_id), Some(0));
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let mut ledger = OwnershipLedger::new();
        let mut journal = Journal::new();
        let holder = Principal::new();
        let event_id = EventId::new(1);
        ledger.credit(event_id, holder, 1, &mut journal).unwrap();

        let error = ledger.debit(event_id, holder, 2, &mut journal).unwrap_err();
        assert_eq!(
            error,
            TicketingError::InsufficientBalance {
                event_id,
                holder,
                requested: 2,
                held: 1,
            }
        );
        assert_eq!(ledger.balance(&holder, event_id), 1);
    }

    #[test]
    fn test_transfer_pays_original_holder() {
        let (state, event_id, _) = state_with_event(10, 7);
        let alice = Principal::new();
        let bob = Principal::new();
        let state = purchased(state, alice, event_id, 3);

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(TicketingAction::Transfer {
                sender: alice,
                recipient: bob,
                event_id,
                quantity: 3,
                payment: Amount::from_units(21),
            })
            .then_state(move |state| {
                assert_eq!(state.balance_of(&alice, event_id), 0);
                assert_eq!(state.balance_of(&bob, event_id), 3);
                assert!(state.attending(&alice).is_empty());
                assert_eq!(state.attending(&bob), vec![event_id]);
                assert_eq!(state.event(event_id).unwrap().remaining, 7);
            })
            .then_effects(move |effects| {
                let payment = assertions::single_forward(effects);
                assert_eq!(payment.payee, alice);
                assert_eq!(payment.amount, Amount::from_units(21));
            })
            .run();
    }

    #[test]
    fn test_transfer_can_pay_organizer() {
        let (state, event_id, organizer) = state_with_event(10, 7);
        let alice = Principal::new();
        let state = purchased(state, alice, event_id, 1);
        let env = create_test_env_with(LedgerConfig {
            transfer_payee: TransferPayee::Organizer,
            ..LedgerConfig::default()
        });

        ReducerTest::new(TicketingReducer::new())
            .with_env(env)
            .given_state(state)
            .when_action(TicketingAction::Transfer {
                sender: alice,
                recipient: Principal::new(),
                event_id,
                quantity: 1,
                payment: Amount::from_units(7),
            })
            .then_effects(move |effects| {
                assert_eq!(assertions::single_forward(effects).payee, organizer);
            })
            .run();
    }

    #[test]
    fn test_transfer_validation_order() {
        let (state, event_id, _) = state_with_event(10, 7);
        let alice = Principal::new();
        let state = purchased(state, alice, event_id, 1);

        let cases = [
            (Principal::ZERO, 1, TicketingError::ZeroRecipient),
            (alice, 1, TicketingError::SelfTransfer),
        ];
        for (recipient, quantity, expected) in cases {
            ReducerTest::new(TicketingReducer::new())
                .with_env(create_test_env())
                .given_state(state.clone())
                .when_action(TicketingAction::Transfer {
                    sender: alice,
                    recipient,
                    event_id,
                    quantity,
                    payment: Amount::from_units(7),
                })
                .then_error(move |error| assert_eq!(*error, expected))
                .run();
        }
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let (state, event_id, _) = state_with_event(10, 7);
        let alice = Principal::new();
        let state = purchased(state, alice, event_id, 1);

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(TicketingAction::Transfer {
                sender: alice,
                recipient: Principal::new(),
                event_id,
                quantity: 2,
                payment: Amount::from_units(14),
            })
            .then_error(|error| {
                assert!(matches!(
                    error,
                    TicketingError::InsufficientBalance {
                        requested: 2,
                        held: 1,
                        ..
                    }
                ));
            })
            .then_state(move |state| assert_eq!(state.balance_of(&alice, event_id), 1))
            .run();
    }

    #[test]
    fn test_transfer_underpaid() {
        let (state, event_id, _) = state_with_event(10, 7);
        let alice = Principal::new();
        let state = purchased(state, alice, event_id, 2);

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(TicketingAction::Transfer {
                sender: alice,
                recipient: Principal::new(),
                event_id,
                quantity: 2,
                payment: Amount::from_units(13),
            })
            .then_error(|error| assert!(matches!(error, TicketingError::Underpaid { .. })))
            .run();
    }
}
