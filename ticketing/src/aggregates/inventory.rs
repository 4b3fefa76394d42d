//! Event inventory and its issuance agent.
//!
//! Each event owns one [`EventInventory`] holding its capacity and unsold counter. The
//! counter only ever decreases, and only through the [`IssuanceAgent`] created with the
//! event: the inventory remembers its agent's identity and rejects every other caller.
//!
//! **Conservation**: a purchase decrements `remaining` and credits the buyer by the same
//! quantity inside one transaction, so `remaining + Σ balances == capacity` holds at
//! every commit.

use super::{TicketingEnvironment, TicketingEvent, ensure_paid, ensure_registered, forward};
use crate::error::TicketingError;
use crate::state::{TicketingState, Undo};
use crate::types::{AgentId, EventId};
use turnstile_core::{Amount, Journal, Principal, effect::Effect, reducer::Effects, smallvec};

// ============================================================================
// Capability
// ============================================================================

/// Who is asking to change an inventory counter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Caller {
    /// An external principal
    Principal(Principal),
    /// An issuance agent
    Agent(AgentId),
}

// ============================================================================
// Inventory
// ============================================================================

/// Capacity and unsold counter of one event
#[derive(Clone, Debug)]
pub(crate) struct EventInventory {
    event_id: EventId,
    capacity: u64,
    remaining: u64,
    agent: AgentId,
}

impl EventInventory {
    /// Full inventory paired with `agent`
    pub(crate) const fn new(event_id: EventId, capacity: u64, agent: AgentId) -> Self {
        Self {
            event_id,
            capacity,
            remaining: capacity,
            agent,
        }
    }

    /// Inventory paired with `agent` that has already sold `capacity - remaining`
    pub(crate) const fn resume(
        event_id: EventId,
        capacity: u64,
        remaining: u64,
        agent: AgentId,
    ) -> Self {
        Self {
            event_id,
            capacity,
            remaining,
            agent,
        }
    }

    pub(crate) const fn capacity(&self) -> u64 {
        self.capacity
    }

    pub(crate) const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Decrease the unsold counter
    ///
    /// Only the paired issuance agent may call this; identity is compared, never
    /// taken from the request.
    pub(crate) fn decrease_remaining(
        &mut self,
        caller: Caller,
        quantity: u64,
        journal: &mut Journal<Undo>,
    ) -> Result<(), TicketingError> {
        if caller != Caller::Agent(self.agent) {
            return Err(TicketingError::Unauthorized {
                event_id: self.event_id,
            });
        }

        let Some(remaining) = self.remaining.checked_sub(quantity) else {
            return Err(TicketingError::SoldOut {
                event_id: self.event_id,
                requested: quantity,
                remaining: self.remaining,
            });
        };

        journal.record(Undo::Remaining {
            event_id: self.event_id,
            previous: self.remaining,
        });
        self.remaining = remaining;
        Ok(())
    }

    /// Undo a decrement
    pub(crate) fn restore(&mut self, previous: u64) {
        self.remaining = previous;
    }
}

// ============================================================================
// Issuance agent
// ============================================================================

/// The only principal allowed to sell tickets out of one event's inventory
#[derive(Clone, Copy, Debug)]
pub(crate) struct IssuanceAgent {
    id: AgentId,
    event_id: EventId,
}

impl IssuanceAgent {
    pub(crate) const fn new(id: AgentId, event_id: EventId) -> Self {
        Self { id, event_id }
    }

    #[cfg(test)]
    pub(crate) const fn id(&self) -> AgentId {
        self.id
    }

    /// Take `quantity` tickets out of the paired inventory
    pub(crate) fn sell(
        self,
        inventory: &mut EventInventory,
        quantity: u64,
        journal: &mut Journal<Undo>,
    ) -> Result<(), TicketingError> {
        debug_assert_eq!(inventory.event_id, self.event_id);
        inventory.decrease_remaining(Caller::Agent(self.id), quantity, journal)
    }
}

// ============================================================================
// Command handlers
// ============================================================================

/// Sell `quantity` tickets to `buyer` and forward the whole payment to the organizer
pub(crate) fn purchase(
    state: &mut TicketingState,
    buyer: Principal,
    event_id: EventId,
    quantity: u64,
    payment: Amount,
    env: &TicketingEnvironment,
) -> Result<Effects<TicketingEvent>, TicketingError> {
    if quantity == 0 {
        return Err(TicketingError::InvalidQuantity);
    }

    let TicketingState {
        registry,
        ledger,
        profiles,
        journal,
        ..
    } = state;

    let record = registry.record_mut(event_id)?;
    record.ensure_open(env.clock.now())?;
    if buyer.is_zero() {
        return Err(TicketingError::ZeroRecipient);
    }
    ensure_registered(profiles, &buyer, env)?;

    let remaining = record.inventory.remaining();
    if quantity > remaining {
        return Err(TicketingError::SoldOut {
            event_id,
            requested: quantity,
            remaining,
        });
    }
    ensure_paid(record.price_of(quantity)?, payment)?;

    let agent = record.agent;
    agent.sell(&mut record.inventory, quantity, journal)?;
    let organizer = record.organizer;

    let (before, after) = ledger.credit(event_id, buyer, quantity, journal)?;
    profiles.note_balance(buyer, event_id, before, after, journal);

    let mut effects: Effects<TicketingEvent> = smallvec![];
    effects.extend(forward(env, organizer, payment));
    effects.push(Effect::Emit(TicketingEvent::TicketsPurchased {
        event_id,
        buyer,
        quantity,
        paid: payment,
    }));
    Ok(effects)
}

/// External entry point to the inventory decrement
///
/// Callers can only name themselves, so this always fails once the event is found.
pub(crate) fn decrease_remaining(
    state: &mut TicketingState,
    event_id: EventId,
    caller: Principal,
    quantity: u64,
) -> Result<Effects<TicketingEvent>, TicketingError> {
    if quantity == 0 {
        return Err(TicketingError::InvalidQuantity);
    }

    let record = state.registry.record_mut(event_id)?;
    record
        .inventory
        .decrease_remaining(Caller::Principal(caller), quantity, &mut state.journal)?;

    Err(TicketingError::Internal(
        "inventory accepted a caller that is not its issuance agent",
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregates::TicketingAction;
    use crate::aggregates::TicketingReducer;
    use crate::aggregates::test_support::{create_test_env, state_with_event};
    use turnstile_testing::{ReducerTest, assertions};

    #[test]
    fn test_purchase_moves_inventory_into_balance() {
        let buyer = Principal::new();
        let (state, event_id, organizer) = state_with_event(100, 10);

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(TicketingAction::Purchase {
                buyer,
                event_id,
                quantity: 2,
                payment: Amount::from_units(20),
            })
            .then_state(move |state| {
                assert_eq!(state.event(event_id).unwrap().remaining, 98);
                assert_eq!(state.balance_of(&buyer, event_id), 2);
                assert_eq!(state.attending(&buyer), vec![event_id]);
                assert!(state.audit(event_id).unwrap().balanced());
            })
            .then_effects(move |effects| {
                assertions::assert_effects_count(effects, 2);
                let payment = assertions::single_forward(effects);
                assert_eq!(payment.payee, organizer);
                assert_eq!(payment.amount, Amount::from_units(20));
            })
            .run();
    }

    #[test]
    fn test_purchase_forwards_overpayment() {
        let (state, event_id, _) = state_with_event(10, 10);

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(TicketingAction::Purchase {
                buyer: Principal::new(),
                event_id,
                quantity: 2,
                payment: Amount::from_units(21),
            })
            .then_effects(|effects| {
                assert_eq!(
                    assertions::single_forward(effects).amount,
                    Amount::from_units(21)
                );
            })
            .run();
    }

    #[test]
    fn test_purchase_rejects_underpayment() {
        let (state, event_id, _) = state_with_event(10, 10);

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(TicketingAction::Purchase {
                buyer: Principal::new(),
                event_id,
                quantity: 2,
                payment: Amount::from_units(19),
            })
            .then_error(|error| {
                assert_eq!(
                    *error,
                    TicketingError::Underpaid {
                        required: Amount::from_units(20),
                        offered: Amount::from_units(19),
                    }
                );
            })
            .then_state(move |state| assert_eq!(state.event(event_id).unwrap().remaining, 10))
            .run();
    }

    #[test]
    fn test_purchase_sold_out() {
        let (state, event_id, _) = state_with_event(1, 10);

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(TicketingAction::Purchase {
                buyer: Principal::new(),
                event_id,
                quantity: 2,
                payment: Amount::from_units(20),
            })
            .then_error(move |error| {
                assert_eq!(
                    *error,
                    TicketingError::SoldOut {
                        event_id,
                        requested: 2,
                        remaining: 1,
                    }
                );
            })
            .run();
    }

    #[test]
    fn test_purchase_zero_quantity() {
        let (state, event_id, _) = state_with_event(5, 10);

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(TicketingAction::Purchase {
                buyer: Principal::new(),
                event_id,
                quantity: 0,
                payment: Amount::ZERO,
            })
            .then_error(|error| assert_eq!(*error, TicketingError::InvalidQuantity))
            .run();
    }

    #[test]
    fn test_purchase_price_overflow() {
        let (state, event_id, _) = state_with_event(5, u64::MAX);

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(TicketingAction::Purchase {
                buyer: Principal::new(),
                event_id,
                quantity: 2,
                payment: Amount::from_units(u64::MAX),
            })
            .then_error(|error| assert_eq!(*error, TicketingError::AmountOverflow))
            .run();
    }

    #[test]
    fn test_free_event_forwards_nothing() {
        let buyer = Principal::new();
        let (state, event_id, _) = state_with_event(5, 0);

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(TicketingAction::Purchase {
                buyer,
                event_id,
                quantity: 1,
                payment: Amount::ZERO,
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_no_forward(effects);
            })
            .then_state(move |state| assert_eq!(state.balance_of(&buyer, event_id), 1))
            .run();
    }

    #[test]
    fn test_external_decrease_is_unauthorized() {
        let (state, event_id, organizer) = state_with_event(5, 10);

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(TicketingAction::DecreaseRemaining {
                event_id,
                caller: organizer,
                quantity: 1,
            })
            .then_error(move |error| {
                assert_eq!(*error, TicketingError::Unauthorized { event_id });
            })
            .then_state(move |state| assert_eq!(state.event(event_id).unwrap().remaining, 5))
            .run();
    }

    #[test]
    fn test_inventory_rejects_foreign_agent() {
        let mut journal = Journal::new();
        let owner = AgentId::new();
        let mut inventory = EventInventory::new(EventId::new(1), 3, owner);

        let foreign = IssuanceAgent::new(AgentId::new(), EventId::new(1));
        assert!(matches!(
            foreign.sell(&mut inventory, 1, &mut journal),
            Err(TicketingError::Unauthorized { .. })
        ));

        IssuanceAgent::new(owner, EventId::new(1))
            .sell(&mut inventory, 3, &mut journal)
            .unwrap();
        assert_eq!(inventory.remaining(), 0);
    }
}
