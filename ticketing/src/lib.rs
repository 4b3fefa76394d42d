//! Turnstile Ticketing - issuance, ownership, and resale of event tickets
//!
//! Organizers create events with a fixed capacity and unit price. Each event gets its
//! own issuance agent, the only party allowed to decrease the event's unsold counter.
//! Tickets then live in an ownership ledger, move between holders by direct transfer
//! or through a two-step escrow, and every principal's attendance is indexed.
//!
//! # Architecture
//!
//! ```text
//!                    TicketingApp
//!                         │
//!                   Store::send (one lock, one transaction)
//!                         │
//!                         ▼
//!                  TicketingReducer
//!   ┌──────────────┬──────────────┬──────────────┬──────────────┐
//!   │ EventRegistry│ OwnershipLedger TransferEscrow│ UserProfile  │
//!   │ + Inventory  │ + transfer   │ initiate/    │    Index     │
//!   │ + Agent      │              │ accept/cancel│              │
//!   └──────────────┴──────────────┴──────────────┴──────────────┘
//!                         │
//!                  Journal<Undo>  ◄── rollback on rejection or payment failure
//!                         │
//!                         ▼
//!                   PaymentSink::forward
//! ```
//!
//! # Conservation
//!
//! For every event, at every commit point:
//!
//! ```text
//! remaining + Σ balances == capacity
//! ```
//!
//! [`TicketingApp::audit`] checks it for one event, [`TicketingApp::audit_all`] for
//! all of them, and [`TicketingState::from_bytes`] refuses snapshots that break it.
//!
//! # Usage
//!
//! ```ignore
//! let app = TicketingApp::new(&Config::from_env(), Arc::new(SystemClock), InMemoryPaymentRail::shared());
//! let event_id = app.create_event(organizer, "Launch", opens_until, Amount::from_units(50), 100)?;
//! app.purchase(buyer, event_id, 2, Amount::from_units(100))?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregates;
pub mod app;
pub mod config;
pub mod error;
pub mod payment_gateway;
pub mod state;
pub mod telemetry;
pub mod types;

pub use aggregates::{
    TicketingAction, TicketingEnvironment, TicketingEvent, TicketingReducer, UserProfile,
};
pub use app::{EventDiscovery, Receipt, TicketingApp};
pub use config::{Config, LedgerConfig, ObservabilityConfig};
pub use error::{ErrorKind, TicketingError};
pub use payment_gateway::InMemoryPaymentRail;
pub use state::TicketingState;
pub use types::*;
