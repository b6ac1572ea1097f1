//! Periodic maintenance tasks.
//!
//! Each task exposes a one-shot function (used directly by tests) and a
//! `run` loop driven by `tokio::time::interval` that stops when its
//! [`CancellationToken`](tokio_util::sync::CancellationToken) is cancelled.

pub mod reminders;
pub mod retention;
