//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `Serialize` entity struct (the typed view the engine works with)
//! - A crate-private `FromRow` row struct holding the raw column values
//! - A `Create*` DTO for inserts

pub mod audit;
pub mod delivery;
pub mod note;
pub mod notification;

pub use audit::{AuditEntry, CreateAuditEntry};
pub use delivery::{CreateDelivery, DeliveryRecord};
pub use note::{CreateNote, Note, UpdateNote};
pub use notification::{CreateNotification, Notification};

use crate::store::StoreError;

/// Parse a text column into one of the core text enums.
pub(crate) fn parse_column<T>(column: &'static str, value: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr,
{
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("unexpected {column} value '{value}'")))
}
