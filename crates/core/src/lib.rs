//! Domain core for the notices platform.
//!
//! Pure domain logic with no I/O: identifiers, the error taxonomy, note
//! lifecycle rules, authorization, the validation hierarchy resolver, and
//! delivery/notification vocabulary. Shared by the storage, event, engine
//! and worker crates.

pub mod authz;
pub mod delivery;
pub mod error;
pub mod hierarchy;
pub mod lifecycle;
pub mod notes;
pub mod notification;
pub mod roles;
pub mod types;
