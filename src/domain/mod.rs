//! Domain models for the publication lifecycle
//!
//! Status, role, provider and similar fields are closed enums. They are parsed
//! once at the boundary (HTTP payloads, JWT claims, database rows) and carried
//! as typed values everywhere else.

/// Implements sqlx text-column support for an enum exposing `as_str` and `FromStr`.
///
/// Unknown values stored in the database surface as decode errors instead of
/// silently mapping to a default variant.
macro_rules! text_column {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok(s.parse::<$ty>()?)
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }
    };
}

pub(crate) use text_column;

pub mod actor;
pub mod audit;
pub mod content;
pub mod social;
pub mod transitions;

pub use actor::{Actor, Role};
pub use audit::AuditEvent;
pub use content::{ContentItem, ContentOutput, ContentStatus, NewContentOutput, OutputType};
#[cfg(test)]
pub use content::NewContentItem;

/// Error returned when a stored or submitted value is not a known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
