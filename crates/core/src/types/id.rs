//! Validated string identifiers for accounts and shops.
//!
//! Use the `define_name!` macro to create type-safe wrappers that prevent
//! accidentally passing an account identifier where a shop name is expected.

use thiserror::Error;

/// Errors that can occur when parsing an identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The input string is empty or only whitespace.
    #[error("identifier cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("identifier must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains a character that is not allowed.
    #[error("identifier contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Macro to define a validated string identifier.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `parse()` that runs the supplied validator, plus `as_str()`
/// - `Display`, `FromStr` and `AsRef<str>` implementations
/// - `sqlx` `Type`, `Encode`, and `Decode` implementations (with `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use storelink_core::{define_name, NameError};
/// fn any(_: &str) -> Result<(), NameError> { Ok(()) }
/// define_name!(WarehouseName, 64, any);
///
/// let name = WarehouseName::parse("east").unwrap();
/// assert_eq!(name.as_str(), "east");
/// assert!(WarehouseName::parse("").is_err());
/// ```
#[macro_export]
macro_rules! define_name {
    ($name:ident, $max:expr, $validate:path) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Maximum accepted length in bytes.
            pub const MAX_LENGTH: usize = $max;

            /// Parse and validate an identifier.
            ///
            /// # Errors
            ///
            /// Returns an error if the input is empty, too long, or rejected
            /// by the type's character rules.
            pub fn parse(s: &str) -> ::core::result::Result<Self, $crate::NameError> {
                if s.trim().is_empty() {
                    return Err($crate::NameError::Empty);
                }
                if s.len() > Self::MAX_LENGTH {
                    return Err($crate::NameError::TooLong {
                        max: Self::MAX_LENGTH,
                    });
                }
                $validate(s)?;
                Ok(Self(s.to_owned()))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier and returns its inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::NameError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let raw = <String as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self::parse(&raw)?)
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <String as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

/// Account identifiers are opaque; only control characters are rejected.
fn validate_account_id(s: &str) -> Result<(), NameError> {
    match s.chars().find(|c| c.is_control()) {
        Some(c) => Err(NameError::InvalidCharacter(c)),
        None => Ok(()),
    }
}

/// Shop names are hostnames (e.g. `acme.myshopify.com`) or bare handles.
fn validate_shop_name(s: &str) -> Result<(), NameError> {
    match s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '.'))
    {
        Some(c) => Err(NameError::InvalidCharacter(c)),
        None => Ok(()),
    }
}

define_name!(AccountId, 128, validate_account_id);
define_name!(ShopName, 255, validate_shop_name);

impl ShopName {
    /// Returns the API host for this shop.
    ///
    /// Bare handles (`acme`) are expanded to `acme.myshopify.com`; names that
    /// already contain a dot are used as-is.
    #[must_use]
    pub fn api_host(&self) -> String {
        if self.0.contains('.') {
            self.0.clone()
        } else {
            format!("{}.myshopify.com", self.0)
        }
    }
}
