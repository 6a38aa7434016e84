//! Value Objects for pricing and stock

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amount in major currency units, kept at cent precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Largest difference tolerated between a client-submitted and a computed total.
    pub fn tolerance() -> Decimal { Decimal::new(1, 2) }

    pub fn new(amount: Decimal) -> Self { Self(round_cents(amount)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_positive(&self) -> bool { self.0 > Decimal::ZERO }

    pub fn add(&self, other: Money) -> Money { Money::new(self.0.saturating_add(other.0)) }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.0.saturating_mul(Decimal::from(qty))) }

    /// Applies a percentage discount (0 to 100). Out-of-range values are clamped.
    pub fn discounted(&self, percent: Decimal) -> Money {
        let pct = percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        Money::new(self.0.saturating_mul(Decimal::ONE_HUNDRED - pct) / Decimal::ONE_HUNDRED)
    }

    pub fn approx_eq(&self, other: Decimal) -> bool {
        self.0.checked_sub(other).is_some_and(|diff| diff.abs() <= Self::tolerance())
    }

    /// Converts to the gateway's integer minor units. Fractions of a cent are refused
    /// rather than rounded away.
    pub fn to_minor_units(amount: Decimal) -> Result<i64, MoneyError> {
        if amount <= Decimal::ZERO { return Err(MoneyError::NotPositive); }
        let minor = amount.checked_mul(Decimal::ONE_HUNDRED).ok_or(MoneyError::Overflow)?;
        if !minor.fract().is_zero() { return Err(MoneyError::SubCent); }
        minor.to_i64().ok_or(MoneyError::Overflow)
    }

    pub fn from_minor_units(minor: i64) -> Money { Money(Decimal::new(minor, 2)) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { NotPositive, SubCent, Overflow }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPositive => write!(f, "amount must be greater than zero"),
            Self::SubCent => write!(f, "amount has more than two decimal places"),
            Self::Overflow => write!(f, "amount is too large"),
        }
    }
}

/// Unit count of stock on hand. Never negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}
