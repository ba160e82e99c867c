use crate::error::{Result, RscTypeError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// Number of fractional digits carried by RSC amounts.
pub const RSC_DECIMALS: u32 = 10;

/// Signed decimal amount of RSC.
///
/// Ledger entries are signed (credits positive, debits negative); lot
/// quantities and escrow holdings are kept non-negative by their owners.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RscAmount(Decimal);

impl RscAmount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn from_rsc(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Multiply by a dimensionless factor (fee rate, tier multiplier, share).
    pub fn scale(&self, factor: Decimal) -> Self {
        Self((self.0 * factor).round_dp(RSC_DECIMALS))
    }

    /// Rejects negative values, for inputs that must be quantities.
    pub fn ensure_non_negative(self) -> Result<Self> {
        if self.is_negative() {
            return Err(RscTypeError::InvalidAmount(format!(
                "amount must not be negative, got {}",
                self
            )));
        }
        Ok(self)
    }
}

impl From<Decimal> for RscAmount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl FromStr for RscAmount {
    type Err = RscTypeError;

    fn from_str(s: &str) -> Result<Self> {
        Decimal::from_str(s.trim())
            .map(Self)
            .map_err(|e| RscTypeError::InvalidAmount(format!("{}: {}", s, e)))
    }
}

impl Add for RscAmount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for RscAmount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for RscAmount {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl AddAssign for RscAmount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for RscAmount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for RscAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a RscAmount> for RscAmount {
    fn sum<I: Iterator<Item = &'a RscAmount>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc + *x)
    }
}

impl fmt::Display for RscAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} RSC", self.0.normalize())
    }
}
