//! # Turnstile Core
//!
//! Core traits and types for the Turnstile ticket ledger.
//!
//! This crate provides the fundamental abstractions shared by the runtime and the
//! ticketing domain: reducers that validate commands and stage state changes, effect
//! descriptions for the payment movements those commands require, and the undo
//! journal that lets a staged change be rolled back as a unit.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature, journaled so it can be rolled back
//! - **Action**: A command submitted to a reducer
//! - **Reducer**: `(State, Action, Environment) → Result<Effects, Error>`
//! - **Effect**: Side effect descriptions (payment forwarding, emitted events)
//! - **Environment**: Injected dependencies via traits (clock, payment sink)
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_core::*;
//!
//! impl Reducer for TicketingReducer {
//!     type State = TicketingState;
//!     type Action = TicketingAction;
//!     type Event = TicketingEvent;
//!     type Environment = TicketingEnvironment;
//!     type Error = TicketingError;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut TicketingState,
//!         action: TicketingAction,
//!         env: &TicketingEnvironment,
//!     ) -> Result<SmallVec<[Effect<TicketingEvent>; 4]>, TicketingError> {
//!         // Validate, stage, describe the payment
//!         Ok(smallvec![])
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Undo journal backing the transactional boundary of a store.
pub mod journal;

/// Principals and amounts.
pub mod money;

pub use journal::{Checkpoint, Journal, Transactional};
pub use money::{Amount, Principal};

/// Action module - Command metadata
pub mod action {
    /// A command accepted by a reducer.
    ///
    /// The name is used as a low-cardinality label for logs and metrics.
    pub trait Command {
        /// Stable, snake-case name of the command
        fn name(&self) -> &'static str;
    }
}

/// Reducer module - The core trait for business logic
///
/// Reducers validate a command against current state, stage the resulting state
/// changes, and describe the side effects that must succeed for those changes to be
/// committed.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Effects returned by a successful reduction.
    pub type Effects<E> = SmallVec<[Effect<E>; 4]>;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The command type this reducer processes
    /// - `Event`: The facts emitted when a command succeeds
    /// - `Environment`: The injected dependencies this reducer needs
    /// - `Error`: Why a command was rejected
    ///
    /// A reducer that returns `Err` may have staged partial changes; the runtime
    /// discards them by rolling the state back to the transaction checkpoint.
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The command type this reducer processes
        type Action;

        /// The event type emitted on success
        type Event;

        /// The environment type with injected dependencies
        type Environment;

        /// The rejection type
        type Error;

        /// Reduce a command into staged state changes and effects
        ///
        /// # Errors
        ///
        /// Returns the domain error when the command's preconditions do not hold.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<Effects<Self::Event>, Self::Error>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values returned by reducers and executed by the store. A payment
/// forward is the only effect that can fail; when it does, the store rolls back
/// every state change staged by the same command.
pub mod effect {
    use crate::environment::PaymentSink;
    use crate::money::{Amount, Principal};
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    /// A payment to be forwarded to a principal
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Payment {
        /// Who receives the funds
        pub payee: Principal,
        /// How much is forwarded
        pub amount: Amount,
    }

    /// Effect type - describes a side effect to be executed
    pub enum Effect<E> {
        /// No-op effect
        None,

        /// Forward funds through a payment sink
        Forward {
            /// Sink that moves the funds
            sink: Arc<dyn PaymentSink>,
            /// What to forward
            payment: Payment,
        },

        /// Emit a domain event once the command commits
        Emit(E),
    }

    // Manual Debug implementation since the sink is a trait object
    impl<E> std::fmt::Debug for Effect<E>
    where
        E: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Forward { payment, .. } => f
                    .debug_struct("Effect::Forward")
                    .field("payment", payment)
                    .finish_non_exhaustive(),
                Effect::Emit(event) => f.debug_tuple("Effect::Emit").field(event).finish(),
            }
        }
    }

    impl<E> Effect<E> {
        /// Describe a payment forward
        #[must_use]
        pub fn forward(sink: &Arc<dyn PaymentSink>, payee: Principal, amount: Amount) -> Self {
            Effect::Forward {
                sink: Arc::clone(sink),
                payment: Payment { payee, amount },
            }
        }

        /// The payment this effect forwards, if any
        #[must_use]
        pub const fn payment(&self) -> Option<&Payment> {
            match self {
                Effect::Forward { payment, .. } => Some(payment),
                _ => None,
            }
        }

        /// The event this effect emits, if any
        #[must_use]
        pub const fn event(&self) -> Option<&E> {
            match self {
                Effect::Emit(event) => Some(event),
                _ => None,
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external collaborators are abstracted behind traits and injected via the
/// Environment parameter.
pub mod environment {
    use crate::effect::Payment;
    use crate::money::{Amount, Principal};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use turnstile_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Errors raised when funds cannot be forwarded.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum PaymentError {
        /// The payee refused the funds
        #[error("Payment to {payee} refused: {reason}")]
        Refused {
            /// Intended recipient
            payee: Principal,
            /// Refusal reason reported by the sink
            reason: String,
        },

        /// The payment rail could not be reached
        #[error("Payment rail unavailable: {0}")]
        Unavailable(String),
    }

    /// Proof that a payment was forwarded
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PaymentReceipt {
        /// Who received the funds
        pub payee: Principal,
        /// Amount forwarded
        pub amount: Amount,
        /// Sink-specific transaction reference
        pub reference: String,
    }

    /// Payment sink trait
    ///
    /// Moves funds already collected from the caller to their destination. Called
    /// synchronously while the store holds its serialization lock; an `Err` aborts
    /// the command that requested the forward.
    pub trait PaymentSink: Send + Sync {
        /// Forward a payment
        ///
        /// # Errors
        ///
        /// Returns error if the payee refuses the funds or the rail is unavailable.
        fn forward(&self, payment: &Payment) -> Result<PaymentReceipt, PaymentError>;
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, SystemClock};
    use super::money::{Amount, Principal};

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn test_effect_accessors() {
        let none: Effect<u8> = Effect::None;
        assert!(none.payment().is_none());
        assert!(none.event().is_none());

        let emit: Effect<u8> = Effect::Emit(7);
        assert_eq!(emit.event(), Some(&7));
        assert_eq!(format!("{emit:?}"), "Effect::Emit(7)");
    }

    #[test]
    fn test_zero_sentinels() {
        assert!(Principal::ZERO.is_zero());
        assert!(!Principal::new().is_zero());
        assert!(Amount::ZERO.is_zero());
        assert_eq!(Amount::ZERO.checked_times(u64::MAX), Some(Amount::ZERO));
    }
}
