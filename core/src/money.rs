//! Principals and amounts.
//!
//! A [`Principal`] is anyone who can hold tickets or receive funds. An [`Amount`] is
//! a quantity of the single settlement unit; there is no currency conversion.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a user, organizer, or any other holder of tickets or funds
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Principal(Uuid);

impl Principal {
    /// The zero principal. Never a valid recipient.
    pub const ZERO: Self = Self(Uuid::nil());

    /// Creates a new random `Principal`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `Principal` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Whether this is the zero principal
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for Principal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Amount in the smallest settlement unit
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(u64);

impl Amount {
    /// Nothing
    pub const ZERO: Self = Self(0);

    /// Creates an `Amount` from raw units
    #[must_use]
    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    /// Returns the raw units
    #[must_use]
    pub const fn units(&self) -> u64 {
        self.0
    }

    /// Checks if this amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Price of `quantity` items at `self` each, or `None` on overflow
    #[must_use]
    pub const fn checked_times(self, quantity: u64) -> Option<Self> {
        match self.0.checked_mul(quantity) {
            Some(units) => Some(Self(units)),
            None => None,
        }
    }

    /// Sum of two amounts, or `None` on overflow
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(units) => Some(Self(units)),
            None => None,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_principal() {
        assert!(Principal::ZERO.is_zero());
        assert!(!Principal::new().is_zero());
        assert_ne!(Principal::new(), Principal::new());
    }

    #[test]
    fn test_checked_times() {
        let price = Amount::from_units(250);
        assert_eq!(price.checked_times(4), Some(Amount::from_units(1000)));
        assert_eq!(price.checked_times(0), Some(Amount::ZERO));
        assert_eq!(Amount::from_units(u64::MAX).checked_times(2), None);
    }

    #[test]
    fn test_checked_add() {
        assert_eq!(
            Amount::from_units(1).checked_add(Amount::from_units(2)),
            Some(Amount::from_units(3))
        );
        assert_eq!(Amount::from_units(u64::MAX).checked_add(Amount::from_units(1)), None);
    }
}
