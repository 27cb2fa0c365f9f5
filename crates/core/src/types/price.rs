//! Type-safe price representation backed by integer minor units.
//!
//! Catalog and order rows store money as integer minor-currency units
//! (centavos), which survive arithmetic without rounding drift. Display and
//! API payloads use [`rust_decimal::Decimal`] with two fraction digits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A monetary amount in minor currency units (e.g. centavos for BRL).
///
/// Stored as a signed 64-bit integer so loyalty ledger rows can carry
/// negative amounts (redemptions) with the same type as prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Create a price from minor units (cents/centavos).
    #[must_use]
    pub const fn from_minor_units(units: i64) -> Self {
        Self(units)
    }

    /// Get the amount in minor units.
    #[must_use]
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    /// Convert to a decimal with two fraction digits (e.g. `1550` → `15.50`).
    #[must_use]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Build a price from a decimal amount, truncating below minor-unit
    /// precision (e.g. `15.509` → `1550`).
    ///
    /// Returns `None` if the amount does not fit in an `i64` of minor units.
    #[must_use]
    pub fn from_decimal(amount: Decimal) -> Option<Self> {
        let scaled = amount.checked_mul(Decimal::ONE_HUNDRED)?.trunc();
        i64::try_from(scaled.mantissa() / 10i128.pow(scaled.scale()))
            .ok()
            .map(Self)
    }

    /// Multiply by a quantity.
    #[must_use]
    pub const fn times(&self, quantity: u32) -> Self {
        Self(self.0 * quantity as i64)
    }

    /// Saturating addition.
    #[must_use]
    pub const fn plus(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction.
    #[must_use]
    pub const fn minus(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.to_decimal())
    }
}

impl std::iter::Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, p| acc.plus(p))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Price {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Price {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let units = <i64 as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(units))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Price {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i64 as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
