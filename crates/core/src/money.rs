//! Monetary values in the smallest currency unit (paise).
//!
//! All amounts in the system are integer paise; only display code converts to
//! rupees. Signed, because balance deltas and DEBIT-convention balances go
//! negative.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// Tax rate in basis points (300 = 3.00%, the GST slab for gold jewellery).
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaxRate(u32);

impl TaxRate {
    pub const fn from_bps(bps: u32) -> Self {
        Self(bps)
    }

    /// Whole-percent constructor (`from_percent(3)` == 300 bps).
    pub const fn from_percent(percent: u32) -> Self {
        Self(percent * 100)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn bps(&self) -> u32 {
        self.0
    }
}

/// Signed amount in paise.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const fn from_paise(paise: i64) -> Self {
        Self(paise)
    }

    pub const fn paise(&self) -> i64 {
        self.0
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Line-total helper: unit amount times quantity, overflow-checked.
    pub const fn checked_mul_quantity(self, quantity: i64) -> Option<Self> {
        match self.0.checked_mul(quantity) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Tax on this amount, rounded to the nearest paisa.
    ///
    /// Integer math with an i128 intermediate: `(amount * bps + 5000) / 10000`.
    pub fn tax(self, rate: TaxRate) -> Money {
        let tax = (self.0 as i128 * rate.0 as i128 + 5000) / 10000;
        Money(tax as i64)
    }
}

impl ValueObject for Money {}
impl ValueObject for TaxRate {}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}₹{}.{:02}", abs / 100, abs % 100)
    }
}
