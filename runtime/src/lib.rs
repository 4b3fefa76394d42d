//! # Turnstile Runtime
//!
//! Runtime implementation for the Turnstile ticket ledger.
//!
//! The [`Store`] is the single global serialization point: every command runs under
//! one lock, inside one transaction, and either commits all of its staged state
//! changes and payment forwards or leaves no trace.
//!
//! ```text
//!  send(action)
//!     │
//!     ▼
//!  lock state ─► begin() ─► reduce ──Err──► rollback ─► Err(domain error)
//!                              │
//!                              ▼
//!                     forward payments ──Err──► rollback ─► Err(PaymentFailed)
//!                              │
//!                              ▼
//!                          commit() ─► Committed { sequence, events, receipts }
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use turnstile_core::{
    Transactional,
    action::Command,
    effect::Effect,
    environment::{PaymentError, PaymentReceipt},
    reducer::Reducer,
};

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;
    use turnstile_core::environment::PaymentError;

    /// Errors raised by the Store itself rather than by a reducer
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// A payment forward failed; the command was rolled back
        #[error("Payment forwarding failed: {0}")]
        PaymentFailed(#[from] PaymentError),

        /// A previous command panicked while holding the state lock
        ///
        /// The state may hold a half-applied command and is no longer served.
        #[error("Store state is unavailable: lock poisoned")]
        Poisoned,
    }
}

pub use error::StoreError;

/// Result of a committed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed<E> {
    /// Position of this command in the commit order (starts at 1)
    pub sequence: u64,
    /// Events emitted by the command
    pub events: Vec<E>,
    /// Payments forwarded by the command, in order
    pub receipts: Vec<PaymentReceipt>,
}

/// The Store - synchronous runtime coordinator for a reducer
///
/// The Store owns:
/// 1. State (behind a `Mutex`; one command at a time)
/// 2. Reducer (business logic)
/// 3. Environment (injected dependencies)
///
/// Payment forwards run while the lock is held so that no other command can observe
/// state that a failed payment is about to roll back. Reducers should emit at most one
/// `Forward` per command: a forward that already succeeded cannot be recalled when a
/// later one fails.
///
/// # Example
///
/// ```ignore
/// let store = Store::new(TicketingState::new(), TicketingReducer::new(), env);
/// let committed = store.send(TicketingAction::Purchase { .. })?;
/// ```
pub struct Store<R>
where
    R: Reducer,
{
    state: Mutex<R::State>,
    reducer: R,
    environment: R::Environment,
    sequence: AtomicU64,
}

impl<R> Store<R>
where
    R: Reducer,
    R::State: Transactional,
    R::Action: Command,
    R::Error: From<StoreError> + std::fmt::Display,
{
    /// Create a new store with initial state, reducer, and environment
    #[must_use]
    pub fn new(initial_state: R::State, reducer: R, environment: R::Environment) -> Self {
        Self {
            state: Mutex::new(initial_state),
            reducer,
            environment,
            sequence: AtomicU64::new(0),
        }
    }

    /// Injected dependencies
    #[must_use]
    pub const fn environment(&self) -> &R::Environment {
        &self.environment
    }

    /// Number of commands committed so far
    #[must_use]
    pub fn committed_count(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Run one command as an all-or-nothing unit
    ///
    /// # Errors
    ///
    /// Returns the reducer's error when the command is rejected, or a converted
    /// [`StoreError`] when a payment forward fails or the state lock is poisoned.
    /// In every error case the state is exactly as it was before the call.
    #[tracing::instrument(skip(self, action), fields(command = action.name()), name = "store_send")]
    pub fn send(&self, action: R::Action) -> Result<Committed<R::Event>, R::Error> {
        let command = action.name();
        ::metrics::counter!("store_commands_total", "command" => command).increment(1);

        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        let checkpoint = state.begin();
        tracing::trace!("Acquired state lock, transaction open");

        let start = Instant::now();
        let reduced = self.reducer.reduce(&mut state, action, &self.environment);
        ::metrics::histogram!("store_reducer_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        let effects = match reduced {
            Ok(effects) => effects,
            Err(error) => {
                state.rollback(checkpoint);
                ::metrics::counter!("store_rollbacks_total", "command" => command, "reason" => "rejected")
                    .increment(1);
                tracing::debug!(%error, "Command rejected");
                return Err(error);
            }
        };

        let mut events = Vec::new();
        let mut receipts: Vec<PaymentReceipt> = Vec::new();
        for effect in effects {
            match effect {
                Effect::None => {}
                Effect::Forward { sink, payment } => match sink.forward(&payment) {
                    Ok(receipt) => {
                        ::metrics::counter!("store_payments_forwarded_total").increment(1);
                        ::metrics::counter!("store_payments_amount_total")
                            .increment(payment.amount.units());
                        receipts.push(receipt);
                    }
                    Err(error) => {
                        state.rollback(checkpoint);
                        Self::report_payment_failure(command, &error, &receipts);
                        return Err(StoreError::PaymentFailed(error).into());
                    }
                },
                Effect::Emit(event) => events.push(event),
            }
        }

        state.commit(checkpoint);
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        drop(state);

        ::metrics::counter!("store_commits_total", "command" => command).increment(1);
        tracing::debug!(sequence, events = events.len(), "Command committed");

        Ok(Committed {
            sequence,
            events,
            receipts,
        })
    }

    /// Read current state via a closure
    ///
    /// Reads wait for any in-flight command, so they only ever observe committed state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a command panicked while holding the lock.
    pub fn state<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&R::State) -> T,
    {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&state))
    }

    fn report_payment_failure(command: &'static str, error: &PaymentError, settled: &[PaymentReceipt]) {
        ::metrics::counter!("store_rollbacks_total", "command" => command, "reason" => "payment")
            .increment(1);
        tracing::warn!(%error, "Payment forwarding failed, command rolled back");
        if !settled.is_empty() {
            tracing::error!(
                settled = settled.len(),
                "Earlier payments of this command were already forwarded and cannot be recalled"
            );
        }
    }
}
