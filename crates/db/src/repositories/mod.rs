//! Zero-sized repository structs, one per table.
//!
//! Every method takes a `&PgPool` (or a `&mut PgConnection` when it must run
//! inside a caller-owned transaction).

pub mod audit_repo;
pub mod delivery_repo;
pub mod note_repo;
pub mod notification_repo;

pub use audit_repo::AuditRepo;
pub use delivery_repo::DeliveryRepo;
pub use note_repo::NoteRepo;
pub use notification_repo::NotificationRepo;
