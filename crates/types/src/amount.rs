//! Ledger amounts.
//!
//! Ledger balances routinely exceed the native 64-bit range (a single unit of
//! the chain token is commonly 10^18 base units), so amounts are carried as
//! 256-bit unsigned integers. All arithmetic is explicit: halving rounds
//! down, and multiplication/addition/subtraction are checked.

// The construct_uint macro expands to code that trips a few clippy lints.
#![allow(clippy::manual_div_ceil)]
#![allow(clippy::assign_op_pattern)]

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uint::construct_uint;

construct_uint! {
    /// Raw 256-bit unsigned integer backing [`Amount`].
    pub struct U256(4);
}

/// A non-negative ledger amount in base units.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(U256);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(U256([0, 0, 0, 0]));

    /// Create an amount from a u64 value.
    pub const fn from_u64(value: u64) -> Self {
        Self(U256([value, 0, 0, 0]))
    }

    /// Create an amount from a u128 value.
    pub fn from_u128(value: u128) -> Self {
        Self(U256::from(value))
    }

    /// Whether this amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Half of this amount, rounded down.
    ///
    /// `Amount::from_u64(7).half() == Amount::from_u64(3)`.
    pub fn half(&self) -> Self {
        Self(self.0 >> 1)
    }

    /// Multiply by an integer count, returning `None` on overflow.
    pub fn checked_mul_count(&self, count: u64) -> Option<Self> {
        self.0.checked_mul(U256::from(count)).map(Self)
    }

    /// Divide by an integer count, rounded down. Returns `None` for a zero divisor.
    pub fn checked_div_count(&self, count: u64) -> Option<Self> {
        if count == 0 {
            return None;
        }
        Some(Self(self.0 / U256::from(count)))
    }

    /// Checked addition.
    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction, `None` if `other > self`.
    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Saturating subtraction.
    pub fn saturating_sub(&self, other: Self) -> Self {
        self.checked_sub(other).unwrap_or(Self::ZERO)
    }

    /// Convert to u128 if the value fits.
    pub fn to_u128(&self) -> Option<u128> {
        let words = (self.0).0;
        if words[2] == 0 && words[3] == 0 {
            Some((words[1] as u128) << 64 | words[0] as u128)
        } else {
            None
        }
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self::from_u128(value)
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

/// Errors from parsing an [`Amount`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("invalid decimal amount: {0:?}")]
    InvalidDigits(String),
    #[error("amount does not fit in 256 bits: {0}")]
    Overflow(String),
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parse a decimal integer. `_` separators are accepted (`1_000_000`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.trim().chars().filter(|c| *c != '_').collect();
        if cleaned.is_empty() {
            return Err(AmountError::Empty);
        }
        if !cleaned.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountError::InvalidDigits(s.to_string()));
        }
        U256::from_dec_str(&cleaned)
            .map(Self)
            .map_err(|_| AmountError::Overflow(s.to_string()))
    }
}

// Amounts travel as decimal strings: JSON numbers lose precision past 2^53
// and TOML integers stop at i64.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl serde::de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a non-negative integer or decimal string")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Amount, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount::from_u64(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Amount, E> {
                u64::try_from(v)
                    .map(Amount::from_u64)
                    .map_err(|_| E::custom("amount must be non-negative"))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}
