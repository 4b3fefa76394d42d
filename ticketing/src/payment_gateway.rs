//! In-memory payment rail for development and embedding.
//!
//! Credits forwarded funds to per-principal accounts. Payees can be marked as refusing,
//! which makes every command that pays them roll back. Hosts with a real settlement
//! system implement [`PaymentSink`] themselves.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use turnstile_core::{
    Amount, Principal,
    effect::Payment,
    environment::{PaymentError, PaymentReceipt, PaymentSink},
};

/// Payment rail that settles into in-memory accounts
#[derive(Debug, Default)]
pub struct InMemoryPaymentRail {
    accounts: RwLock<HashMap<Principal, Amount>>,
    refusing: RwLock<HashSet<Principal>>,
    transfers: AtomicU64,
}

impl InMemoryPaymentRail {
    /// Creates a new rail with no accounts
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Funds received by `principal`
    #[must_use]
    pub fn balance(&self, principal: &Principal) -> Amount {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(principal)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Number of payments settled
    #[must_use]
    pub fn settled(&self) -> u64 {
        self.transfers.load(Ordering::Acquire)
    }

    /// Make `principal` refuse incoming funds
    pub fn refuse(&self, principal: Principal) {
        self.refusing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(principal);
    }

    /// Let `principal` receive funds again
    pub fn accept(&self, principal: &Principal) {
        self.refusing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(principal);
    }
}

impl PaymentSink for InMemoryPaymentRail {
    fn forward(&self, payment: &Payment) -> Result<PaymentReceipt, PaymentError> {
        let refused = self
            .refusing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&payment.payee);
        if refused {
            tracing::warn!(payee = %payment.payee, amount = %payment.amount, "Payee refused funds");
            return Err(PaymentError::Refused {
                payee: payment.payee,
                reason: "account does not accept funds".to_string(),
            });
        }

        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let account = accounts.entry(payment.payee).or_insert(Amount::ZERO);
        *account = account
            .checked_add(payment.amount)
            .ok_or_else(|| PaymentError::Unavailable("account balance overflow".to_string()))?;
        drop(accounts);

        let number = self.transfers.fetch_add(1, Ordering::AcqRel) + 1;
        let reference = format!("rail_txn_{number}");

        tracing::debug!(
            payee = %payment.payee,
            amount = %payment.amount,
            reference = %reference,
            "Payment settled"
        );

        Ok(PaymentReceipt {
            payee: payment.payee,
            amount: payment.amount,
            reference,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_credits_payee() {
        let rail = InMemoryPaymentRail::new();
        let payee = Principal::new();
        let payment = Payment {
            payee,
            amount: Amount::from_units(100),
        };

        let receipt = rail.forward(&payment).unwrap();
        assert_eq!(receipt.amount, Amount::from_units(100));
        assert!(receipt.reference.starts_with("rail_txn_"));

        rail.forward(&payment).unwrap();
        assert_eq!(rail.balance(&payee), Amount::from_units(200));
        assert_eq!(rail.settled(), 2);
    }

    #[test]
    fn test_refusing_payee() {
        let rail = InMemoryPaymentRail::new();
        let payee = Principal::new();
        rail.refuse(payee);

        let payment = Payment {
            payee,
            amount: Amount::from_units(5),
        };
        assert!(matches!(
            rail.forward(&payment),
            Err(PaymentError::Refused { .. })
        ));
        assert_eq!(rail.balance(&payee), Amount::ZERO);

        rail.accept(&payee);
        assert!(rail.forward(&payment).is_ok());
    }
}
