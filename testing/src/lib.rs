//! # Turnstile Testing
//!
//! Testing utilities and helpers for the Turnstile ticket ledger.
//!
//! This crate provides:
//! - Mock implementations of Environment traits (clocks, payment sinks)
//! - A Given/When/Then harness for reducers
//! - Tracing setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_testing::mocks::{ManualClock, RecordingPaymentSink};
//!
//! #[test]
//! fn test_purchase_forwards_payment() {
//!     let clock = Arc::new(ManualClock::at_test_epoch());
//!     let sink = Arc::new(RecordingPaymentSink::new());
//!     let app = TicketingApp::new(&Config::default(), clock.clone(), sink.clone());
//!     // ...
//!     assert_eq!(sink.total_forwarded(), Amount::from_units(200));
//! }
//! ```

use chrono::{DateTime, Utc};
use turnstile_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::collections::HashSet;
    use std::sync::{Mutex, RwLock};
    use turnstile_core::{
        Amount, Principal,
        effect::Payment,
        environment::{PaymentError, PaymentReceipt, PaymentSink},
    };

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use turnstile_testing::mocks::FixedClock;
    /// use turnstile_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// Used to walk an event past its cutoff in the middle of a test.
    #[derive(Debug)]
    pub struct ManualClock {
        time: RwLock<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock reading `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: RwLock::new(time),
            }
        }

        /// Create a clock reading [`test_epoch`]
        #[must_use]
        pub fn at_test_epoch() -> Self {
            Self::new(test_epoch())
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self
                .time
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }

        /// Set the clock to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            let mut time = self
                .time
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *time = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self
                .time
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// The instant every test clock starts at (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// Payment sink that records every forward
    ///
    /// Individual payees can be told to refuse funds, which makes the sink fail only
    /// the commands that pay them.
    #[derive(Debug, Default)]
    pub struct RecordingPaymentSink {
        forwarded: Mutex<Vec<Payment>>,
        refusing: Mutex<HashSet<Principal>>,
    }

    impl RecordingPaymentSink {
        /// Create an empty sink that accepts everything
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make `payee` refuse all further payments
        pub fn refuse_payee(&self, payee: Principal) {
            self.refusing
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(payee);
        }

        /// Let `payee` accept payments again
        pub fn accept_payee(&self, payee: &Principal) {
            self.refusing
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .remove(payee);
        }

        /// Every payment forwarded so far, in order
        #[must_use]
        pub fn payments(&self) -> Vec<Payment> {
            self.forwarded
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }

        /// Sum of everything forwarded
        #[must_use]
        pub fn total_forwarded(&self) -> Amount {
            Amount::from_units(self.payments().iter().map(|p| p.amount.units()).sum())
        }

        /// Sum of everything forwarded to `payee`
        #[must_use]
        pub fn received_by(&self, payee: &Principal) -> Amount {
            Amount::from_units(
                self.payments()
                    .iter()
                    .filter(|p| p.payee == *payee)
                    .map(|p| p.amount.units())
                    .sum(),
            )
        }
    }

    impl PaymentSink for RecordingPaymentSink {
        fn forward(&self, payment: &Payment) -> Result<PaymentReceipt, PaymentError> {
            let refused = self
                .refusing
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .contains(&payment.payee);
            if refused {
                return Err(PaymentError::Refused {
                    payee: payment.payee,
                    reason: "payee refuses funds".to_string(),
                });
            }

            let mut forwarded = self
                .forwarded
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            forwarded.push(*payment);

            Ok(PaymentReceipt {
                payee: payment.payee,
                amount: payment.amount,
                reference: format!("rec_{}", forwarded.len()),
            })
        }
    }

    /// Payment sink that refuses every forward
    #[derive(Debug, Clone)]
    pub struct RefusingPaymentSink {
        reason: String,
    }

    impl RefusingPaymentSink {
        /// Create a sink refusing with `reason`
        #[must_use]
        pub fn new(reason: impl Into<String>) -> Self {
            Self {
                reason: reason.into(),
            }
        }
    }

    impl PaymentSink for RefusingPaymentSink {
        fn forward(&self, payment: &Payment) -> Result<PaymentReceipt, PaymentError> {
            Err(PaymentError::Refused {
                payee: payment.payee,
                reason: self.reason.clone(),
            })
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a test-friendly tracing subscriber
    ///
    /// Honors `RUST_LOG`, writes through the test harness' captured output, and is
    /// safe to call from every test: only the first call installs anything.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, RecordingPaymentSink, RefusingPaymentSink, test_clock};
