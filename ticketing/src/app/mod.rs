//! Application facade - wires the store, reducer, and environment together.
//!
//! [`TicketingApp`] is the synchronous request/response surface of the ledger: every
//! mutating operation goes through the store's single serialization point and returns a
//! [`Receipt`] once committed, and queries read committed state only.

mod coordinator;

pub use coordinator::{Receipt, TicketingApp};

use crate::types::EventId;
use turnstile_core::Principal;

/// Read-only event lookups consumed by metadata layers built on the ledger
///
/// The ledger itself never calls into discovery.
pub trait EventDiscovery {
    /// Whether `event_id` was allocated
    fn event_exists(&self, event_id: EventId) -> bool;

    /// Organizer of `event_id`, if it exists
    fn organizer_of(&self, event_id: EventId) -> Option<Principal>;
}
