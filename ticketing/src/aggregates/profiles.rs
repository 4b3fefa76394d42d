//! User profile index.
//!
//! Holds the registration gate and each principal's attendance set. Attendance is not
//! independently callable: the ledger reports every balance that crosses zero, so
//! `attending(p)` is always exactly the events `p` holds tickets for.

use super::{TicketingEvent, require_registered};
use crate::error::TicketingError;
use crate::state::{TicketingState, Undo};
use crate::types::EventId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use turnstile_core::{Journal, Principal, effect::Effect, reducer::Effects, smallvec};

/// One principal's profile
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Whether `register` was called
    pub registered: bool,
    /// Name shown to other users
    pub display_name: String,
    /// How to reach the user
    pub contact: String,
    /// Events with a nonzero balance, ascending
    pub attending: BTreeSet<EventId>,
}

/// Profiles keyed by principal
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserProfileIndex {
    profiles: HashMap<Principal, UserProfile>,
}

impl UserProfileIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Profile of `principal`, if it registered or currently holds tickets
    #[must_use]
    pub fn profile(&self, principal: &Principal) -> Option<&UserProfile> {
        self.profiles.get(principal)
    }

    /// Whether `principal` registered
    #[must_use]
    pub fn is_registered(&self, principal: &Principal) -> bool {
        self.profiles
            .get(principal)
            .is_some_and(|profile| profile.registered)
    }

    /// Events `principal` holds tickets for, ascending
    #[must_use]
    pub fn attending(&self, principal: &Principal) -> Vec<EventId> {
        self.profiles
            .get(principal)
            .map(|profile| profile.attending.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Journal the current profile and hand out a mutable one
    fn stage(&mut self, principal: Principal, journal: &mut Journal<Undo>) -> &mut UserProfile {
        journal.record(Undo::Profile {
            principal,
            previous: self.profiles.get(&principal).cloned(),
        });
        self.profiles.entry(principal).or_default()
    }

    /// Keep attendance in step with a balance change
    pub(crate) fn note_balance(
        &mut self,
        principal: Principal,
        event_id: EventId,
        before: u64,
        after: u64,
        journal: &mut Journal<Undo>,
    ) {
        match (before, after) {
            (0, 1..) => {
                self.stage(principal, journal).attending.insert(event_id);
            }
            (1.., 0) => {
                let profile = self.stage(principal, journal);
                profile.attending.remove(&event_id);
                // Holder-only entries go once the last ticket does
                if !profile.registered && profile.attending.is_empty() {
                    self.profiles.remove(&principal);
                }
            }
            _ => {}
        }
    }

    /// Undo a staged change
    pub(crate) fn restore(&mut self, principal: Principal, previous: Option<UserProfile>) {
        match previous {
            Some(profile) => {
                self.profiles.insert(principal, profile);
            }
            None => {
                self.profiles.remove(&principal);
            }
        }
    }
}

/// Register `principal`, keeping any attendance gathered before registration
pub(crate) fn register(
    state: &mut TicketingState,
    principal: Principal,
    display_name: String,
    contact: String,
) -> Result<Effects<TicketingEvent>, TicketingError> {
    if state.profiles.is_registered(&principal) {
        return Err(TicketingError::AlreadyRegistered(principal));
    }

    let profile = state.profiles.stage(principal, &mut state.journal);
    profile.registered = true;
    profile.display_name = display_name;
    profile.contact = contact;

    Ok(smallvec![Effect::Emit(TicketingEvent::UserRegistered {
        principal
    })])
}

/// Replace the display fields of a registered profile
pub(crate) fn update_profile(
    state: &mut TicketingState,
    principal: Principal,
    display_name: String,
    contact: String,
) -> Result<Effects<TicketingEvent>, TicketingError> {
    require_registered(&state.profiles, &principal)?;

    let profile = state.profiles.stage(principal, &mut state.journal);
    profile.display_name = display_name;
    profile.contact = contact;

    Ok(smallvec![Effect::Emit(TicketingEvent::ProfileUpdated {
        principal
    })])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregates::test_support::{create_test_env, purchased, state_with_event};
    use crate::aggregates::{TicketingAction, TicketingReducer};
    use turnstile_core::reducer::Reducer;
    use turnstile_testing::ReducerTest;

    fn register_action(principal: Principal) -> TicketingAction {
        TicketingAction::Register {
            principal,
            display_name: "Ada".to_string(),
            contact: "ada@example.com".to_string(),
        }
    }

    #[test]
    fn test_register_creates_profile() {
        let ada = Principal::new();

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(TicketingState::new())
            .when_action(register_action(ada))
            .then_state(move |state| {
                let profile = state.profile(&ada).unwrap();
                assert!(profile.registered);
                assert_eq!(profile.display_name, "Ada");
                assert!(profile.attending.is_empty());
            })
            .then_effects(move |effects| {
                assert_eq!(
                    effects[0].event(),
                    Some(&TicketingEvent::UserRegistered { principal: ada })
                );
            })
            .run();
    }

    #[test]
    fn test_register_twice_fails() {
        let ada = Principal::new();
        let mut state = TicketingState::new();
        TicketingReducer::new()
            .reduce(&mut state, register_action(ada), &create_test_env())
            .unwrap();

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(TicketingAction::Register {
                principal: ada,
                display_name: "Other".to_string(),
                contact: String::new(),
            })
            .then_error(move |error| assert_eq!(*error, TicketingError::AlreadyRegistered(ada)))
            .then_state(move |state| {
                assert_eq!(state.profile(&ada).unwrap().display_name, "Ada");
            })
            .run();
    }

    #[test]
    fn test_register_keeps_earlier_attendance() {
        let (state, event_id, _) = state_with_event(10, 1);
        let ada = Principal::new();
        let state = purchased(state, ada, event_id, 1);

        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(state)
            .when_action(register_action(ada))
            .then_state(move |state| {
                assert!(state.profile(&ada).unwrap().registered);
                assert_eq!(state.attending(&ada), vec![event_id]);
            })
            .run();
    }

    #[test]
    fn test_update_requires_registration() {
        ReducerTest::new(TicketingReducer::new())
            .with_env(create_test_env())
            .given_state(TicketingState::new())
            .when_action(TicketingAction::UpdateProfile {
                principal: Principal::new(),
                display_name: "Ghost".to_string(),
                contact: String::new(),
            })
            .then_error(|error| assert!(matches!(error, TicketingError::NotRegistered(_))))
            .run();
    }

    #[test]
    fn test_attendance_is_a_set() {
        let mut index = UserProfileIndex::new();
        let mut journal = Journal::new();
        let ada = Principal::new();
        let event_id = EventId::new(4);

        index.note_balance(ada, event_id, 0, 2, &mut journal);
        index.note_balance(ada, event_id, 2, 5, &mut journal);
        assert_eq!(index.attending(&ada), vec![event_id]);

        index.note_balance(ada, event_id, 5, 0, &mut journal);
        assert!(index.attending(&ada).is_empty());
        assert!(!index.is_registered(&ada));
    }

    #[test]
    fn test_drained_holder_profile_is_dropped() {
        let mut index = UserProfileIndex::new();
        let mut journal = Journal::new();
        let holder = Principal::new();
        let first = EventId::new(1);
        let second = EventId::new(2);

        index.note_balance(holder, first, 0, 1, &mut journal);
        index.note_balance(holder, second, 0, 1, &mut journal);
        index.note_balance(holder, first, 1, 0, &mut journal);
        assert_eq!(index.attending(&holder), vec![second]);

        index.note_balance(holder, second, 1, 0, &mut journal);
        assert!(index.profile(&holder).is_none());
    }

    #[test]
    fn test_drained_registered_profile_is_kept() {
        let (state, event_id, _) = state_with_event(10, 1);
        let ada = Principal::new();
        let mut state = purchased(state, ada, event_id, 1);
        let env = create_test_env();
        TicketingReducer::new()
            .reduce(&mut state, register_action(ada), &env)
            .unwrap();

        ReducerTest::new(TicketingReducer::new())
            .with_env(env)
            .given_state(state)
            .when_action(TicketingAction::Transfer {
                sender: ada,
                recipient: Principal::new(),
                event_id,
                quantity: 1,
                payment: turnstile_core::Amount::from_units(1),
            })
            .then_state(move |state| {
                let profile = state.profile(&ada).unwrap();
                assert!(profile.registered);
                assert!(profile.attending.is_empty());
            })
            .run();
    }

    #[test]
    fn test_rollback_restores_dropped_profile() {
        use turnstile_core::Transactional;

        let (state, event_id, _) = state_with_event(10, 1);
        let holder = Principal::new();
        let mut state = purchased(state, holder, event_id, 1);

        let checkpoint = state.begin();
        TicketingReducer::new()
            .reduce(
                &mut state,
                TicketingAction::Transfer {
                    sender: holder,
                    recipient: Principal::new(),
                    event_id,
                    quantity: 1,
                    payment: turnstile_core::Amount::from_units(1),
                },
                &create_test_env(),
            )
            .unwrap();
        assert!(state.profile(&holder).is_none());

        state.rollback(checkpoint);
        assert_eq!(state.attending(&holder), vec![event_id]);
        assert!(!state.profile(&holder).unwrap().registered);
    }
}
