//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types.

use serde::{Deserialize, Serialize};

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around [`uuid::Uuid`] with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
/// - Conversion methods: `new()`, `generate()`, `as_uuid()`
/// - `From<Uuid>` and `Into<Uuid>` implementations
/// - `sqlx` `Type`, `Encode`, and `Decode` implementations (with `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use quiosque_core::define_id;
/// define_id!(CustomerId);
/// define_id!(OrderId);
///
/// let customer_id = CustomerId::generate();
/// let order_id = OrderId::generate();
///
/// // These are different types, so this won't compile:
/// // let _: CustomerId = order_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Create an ID from an existing UUID.
            #[must_use]
            pub const fn new(id: ::uuid::Uuid) -> Self {
                Self(id)
            }

            /// Generate a fresh random ID.
            #[must_use]
            pub fn generate() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Get the underlying UUID value.
            #[must_use]
            pub const fn as_uuid(&self) -> ::uuid::Uuid {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Ok(Self(s.parse::<::uuid::Uuid>()?))
            }
        }

        impl From<::uuid::Uuid> for $name {
            fn from(id: ::uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for ::uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <::uuid::Uuid as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <::uuid::Uuid as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let id = <::uuid::Uuid as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(id))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <::uuid::Uuid as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

// Define standard entity IDs
define_id!(ProductId);
define_id!(CategoryId);
define_id!(OrderId);
define_id!(CartId);
define_id!(CustomerId);
define_id!(LoyaltyTransactionId);
define_id!(LineKey);

impl LineKey {
    /// Derive the key for a `(product, notes)` pair.
    ///
    /// Uses a v5 (name-based) UUID with the product id as namespace and the
    /// normalized notes as name, so the derivation is stable across
    /// processes and restarts. Notes are trimmed before hashing; leading or
    /// trailing whitespace never creates a distinct line.
    #[must_use]
    pub fn derive(product_id: ProductId, notes: &str) -> Self {
        Self::new(uuid::Uuid::new_v5(
            &product_id.as_uuid(),
            notes.trim().as_bytes(),
        ))
    }
}

/// Errors that can occur when parsing an [`OrgId`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum OrgIdError {
    /// The input string is empty.
    #[error("org id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("org id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains a character outside `[a-z0-9-]`.
    #[error("org id may only contain lowercase letters, digits and hyphens")]
    InvalidCharacter,
}

/// Identifier of one tenant storefront (a restaurant/brand).
///
/// Org IDs are URL slugs: lowercase alphanumerics and hyphens, e.g.
/// `foodtruck` or `pizzaria-bella`. They appear in every route and every
/// scoped query, so they are validated once at the boundary and treated as
/// opaque afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(String);

impl OrgId {
    /// Maximum length of an org slug.
    pub const MAX_LENGTH: usize = 64;

    /// Parse an `OrgId` from a string.
    ///
    /// # Errors
    ///
    /// Returns [`OrgIdError`] if the slug is empty, too long, or contains a
    /// character outside `[a-z0-9-]`.
    pub fn parse(s: &str) -> Result<Self, OrgIdError> {
        if s.is_empty() {
            return Err(OrgIdError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(OrgIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(OrgIdError::InvalidCharacter);
        }
        Ok(Self(s.to_owned()))
    }

    /// Get the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OrgId {
    type Err = OrgIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for OrgId {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrgId {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for OrgId {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_org_id_valid_slugs() {
        assert!(OrgId::parse("foodtruck").is_ok());
        assert!(OrgId::parse("pizzaria-bella").is_ok());
        assert!(OrgId::parse("org-42").is_ok());
    }

    #[test]
    fn test_org_id_rejects_invalid() {
        assert!(matches!(OrgId::parse(""), Err(OrgIdError::Empty)));
        assert!(matches!(
            OrgId::parse("Foodtruck"),
            Err(OrgIdError::InvalidCharacter)
        ));
        assert!(matches!(
            OrgId::parse("food truck"),
            Err(OrgIdError::InvalidCharacter)
        ));
        assert!(matches!(
            OrgId::parse(&"x".repeat(65)),
            Err(OrgIdError::TooLong { .. })
        ));
    }

    #[test]
    fn test_ids_are_distinct_types() {
        let order = OrderId::generate();
        let round_trip: OrderId = order.to_string().parse().expect("valid uuid");
        assert_eq!(order, round_trip);
    }
}
