//! Event registry.
//!
//! Allocates sequential event ids and stores each event together with its inventory
//! and the issuance agent paired with it. Events are immutable once created except for
//! their inventory counter, and are never deleted.

use super::inventory::{EventInventory, IssuanceAgent};
use super::{TicketingEnvironment, TicketingEvent};
use crate::error::TicketingError;
use crate::state::{TicketingState, Undo};
use crate::types::{AgentId, Event, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use turnstile_core::{Amount, Journal, Principal, effect::Effect, reducer::Effects, smallvec};

// ============================================================================
// Records
// ============================================================================

/// One registered event with its inventory and issuance agent
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(into = "StoredEvent", from = "StoredEvent")]
pub(crate) struct EventRecord {
    pub(crate) id: EventId,
    pub(crate) organizer: Principal,
    pub(crate) name: String,
    pub(crate) opens_until: DateTime<Utc>,
    pub(crate) unit_price: Amount,
    pub(crate) inventory: EventInventory,
    pub(crate) agent: IssuanceAgent,
}

/// Snapshot form of an [`EventRecord`], without the agent identity
#[derive(Serialize, Deserialize)]
struct StoredEvent {
    id: EventId,
    organizer: Principal,
    name: String,
    opens_until: DateTime<Utc>,
    unit_price: Amount,
    capacity: u64,
    remaining: u64,
}

impl From<EventRecord> for StoredEvent {
    fn from(record: EventRecord) -> Self {
        Self {
            id: record.id,
            organizer: record.organizer,
            name: record.name,
            opens_until: record.opens_until,
            unit_price: record.unit_price,
            capacity: record.inventory.capacity(),
            remaining: record.inventory.remaining(),
        }
    }
}

impl From<StoredEvent> for EventRecord {
    fn from(stored: StoredEvent) -> Self {
        let agent_id = AgentId::new();
        Self {
            id: stored.id,
            organizer: stored.organizer,
            name: stored.name,
            opens_until: stored.opens_until,
            unit_price: stored.unit_price,
            inventory: EventInventory::resume(
                stored.id,
                stored.capacity,
                stored.remaining,
                agent_id,
            ),
            agent: IssuanceAgent::new(agent_id, stored.id),
        }
    }
}

impl EventRecord {
    /// Caller-facing view of the record
    pub(crate) fn view(&self) -> Event {
        Event {
            id: self.id,
            organizer: self.organizer,
            name: self.name.clone(),
            opens_until: self.opens_until,
            unit_price: self.unit_price,
            capacity: self.inventory.capacity(),
            remaining: self.inventory.remaining(),
        }
    }

    /// Reject the operation if the cutoff has passed
    pub(crate) fn ensure_open(&self, now: DateTime<Utc>) -> Result<(), TicketingError> {
        if now < self.opens_until {
            Ok(())
        } else {
            Err(TicketingError::EventExpired {
                event_id: self.id,
                opens_until: self.opens_until,
            })
        }
    }

    /// Price of `quantity` tickets
    pub(crate) fn price_of(&self, quantity: u64) -> Result<Amount, TicketingError> {
        self.unit_price
            .checked_times(quantity)
            .ok_or(TicketingError::AmountOverflow)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// All events, keyed by id
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventRegistry {
    next_id: u64,
    records: BTreeMap<EventId, EventRecord>,
}

impl EventRegistry {
    /// Create an empty registry; the first event gets id 1
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_id: 0,
            records: BTreeMap::new(),
        }
    }

    /// Look up an event
    ///
    /// # Errors
    ///
    /// Returns [`TicketingError::NotFound`] if the id was never allocated.
    pub fn event(&self, event_id: EventId) -> Result<Event, TicketingError> {
        self.record(event_id).map(EventRecord::view)
    }

    /// Whether the id was allocated
    #[must_use]
    pub fn contains(&self, event_id: EventId) -> bool {
        self.records.contains_key(&event_id)
    }

    /// Number of events created
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no event was created yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Event ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = EventId> + '_ {
        self.records.keys().copied()
    }

    pub(crate) fn record(&self, event_id: EventId) -> Result<&EventRecord, TicketingError> {
        self.records
            .get(&event_id)
            .ok_or(TicketingError::NotFound(event_id))
    }

    pub(crate) fn record_mut(
        &mut self,
        event_id: EventId,
    ) -> Result<&mut EventRecord, TicketingError> {
        self.records
            .get_mut(&event_id)
            .ok_or(TicketingError::NotFound(event_id))
    }

    /// Store a new record under the next id
    fn allocate(
        &mut self,
        draft: &EventDraft,
        journal: &mut Journal<Undo>,
    ) -> Result<EventId, TicketingError> {
        let next = self
            .next_id
            .checked_add(1)
            .ok_or(TicketingError::Internal("event id space exhausted"))?;
        let id = EventId::new(next);
        let agent_id = AgentId::new();

        journal.record(Undo::EventCreated { event_id: id });
        self.next_id = next;
        self.records.insert(
            id,
            EventRecord {
                id,
                organizer: draft.organizer,
                name: draft.name.clone(),
                opens_until: draft.opens_until,
                unit_price: draft.unit_price,
                inventory: EventInventory::new(id, draft.capacity, agent_id),
                agent: IssuanceAgent::new(agent_id, id),
            },
        );
        Ok(id)
    }

    /// Undo [`Self::allocate`]
    pub(crate) fn restore_created(&mut self, event_id: EventId) {
        self.records.remove(&event_id);
        self.next_id = event_id.value().saturating_sub(1);
    }

    /// Undo an inventory decrement
    pub(crate) fn restore_remaining(&mut self, event_id: EventId, previous: u64) {
        if let Some(record) = self.records.get_mut(&event_id) {
            record.inventory.restore(previous);
        }
    }
}

// ============================================================================
// Command handler
// ============================================================================

/// Fields of a `CreateEvent` command
pub(crate) struct EventDraft {
    pub(crate) organizer: Principal,
    pub(crate) name: String,
    pub(crate) opens_until: DateTime<Utc>,
    pub(crate) unit_price: Amount,
    pub(crate) capacity: u64,
}

/// Validate and stage a new event with its inventory and issuance agent
pub(crate) fn create_event(
    state: &mut TicketingState,
    draft: EventDraft,
    env: &TicketingEnvironment,
) -> Result<Effects<TicketingEvent>, TicketingError> {
    let now = env.clock.now();
    if draft.opens_until <= now {
        return Err(TicketingError::InvalidSchedule {
            opens_until: draft.opens_until,
            now,
        });
    }
    if draft.capacity == 0 {
        return Err(TicketingError::InvalidCapacity);
    }
    if draft.organizer.is_zero() {
        return Err(TicketingError::ZeroRecipient);
    }

    let event_id = state.registry.allocate(&draft, &mut state.journal)?;

    Ok(smallvec![Effect::Emit(TicketingEvent::EventCreated {
        event_id,
        organizer: draft.organizer,
        name: draft.name,
        opens_until: draft.opens_until,
        unit_price: draft.unit_price,
        capacity: draft.capacity,
    })])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregates::{TicketingAction, TicketingReducer};
    use crate::aggregates::test_support::{create_action, create_test_env, hours};
    use turnstile_core::reducer::Reducer;
    use turnstile_testing::{ReducerTest, assertions, mocks::test_epoch};

    #[test]
    fn test_create_event_assigns_sequential_ids() {
        let organizer = Principal::new();
        let mut state = TicketingState::new();
        let env = create_test_env();
        let reducer = TicketingReducer::new();

        reducer
            .reduce(&mut state, create_action(organizer, 100, 10), &env)
            .unwrap();

        ReducerTest::new(TicketingReducer::new())
            .with_env(env)
            .given_state(state)
            .when_action(create_action(organizer, 5, 20))
            .then_state(move |state| {
                assert_eq!(state.registry.len(), 2);
                let second = state.event(EventId::new(2)).unwrap();
                assert_eq!(second.capacity, 5);
                assert_eq!(second.remaining, 5);
                assert_eq!(second.organizer, organizer);
                assert_eq!(second.unit_price, Amount::from_units(20));
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_no_forward(effects);
                assert!(matches!(
                    effects[0].event(),
                    Some(TicketingEvent::EventCreated { event_id, .. }) if event_id.value() == 2
                ));
            })
            .run();
    }

    #[test]
    fn test_create_event_rejects_cutoff_at_now() {
        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(TicketingState::new())
            .when_action(TicketingAction::CreateEvent {
                organizer: Principal::new(),
                name: "Now".to_string(),
                opens_until: test_epoch(),
                unit_price: Amount::from_units(1),
                capacity: 1,
            })
            .then_error(|error| {
                assert!(matches!(error, TicketingError::InvalidSchedule { .. }));
            })
            .then_state(|state| assert!(state.registry.is_empty()))
            .run();
    }

    #[test]
    fn test_create_event_rejects_zero_capacity() {
        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(TicketingState::new())
            .when_action(TicketingAction::CreateEvent {
                organizer: Principal::new(),
                name: "Empty".to_string(),
                opens_until: test_epoch() + hours(1),
                unit_price: Amount::from_units(1),
                capacity: 0,
            })
            .then_error(|error| assert_eq!(*error, TicketingError::InvalidCapacity))
            .run();
    }

    #[test]
    fn test_create_event_rejects_zero_organizer() {
        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(TicketingState::new())
            .when_action(create_action(Principal::ZERO, 10, 1))
            .then_error(|error| assert_eq!(*error, TicketingError::ZeroRecipient))
            .run();
    }

    #[test]
    fn test_lookup_unknown_event() {
        let registry = EventRegistry::new();
        assert_eq!(
            registry.event(EventId::new(1)).unwrap_err(),
            TicketingError::NotFound(EventId::new(1))
        );
        assert!(!registry.contains(EventId::new(1)));
    }

    #[test]
    fn test_restore_created_releases_the_id() {
        let mut state = TicketingState::new();
        let env = create_test_env();
        let checkpoint = state.journal.begin();
        create_event(
            &mut state,
            EventDraft {
                organizer: Principal::new(),
                name: "Rolled back".to_string(),
                opens_until: test_epoch() + hours(1),
                unit_price: Amount::ZERO,
                capacity: 3,
            },
            &env,
        )
        .unwrap();
        let undo: Vec<Undo> = state.journal.unwind(checkpoint).collect();
        for record in undo {
            if let Undo::EventCreated { event_id } = record {
                state.registry.restore_created(event_id);
            }
        }

        assert!(state.registry.is_empty());
        assert_eq!(state.registry.next_id, 0);
    }
}
