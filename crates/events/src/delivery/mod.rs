//! External delivery channels for user notifications.
//!
//! Used by the [`ChannelRelay`](crate::relay::ChannelRelay) to push
//! notifications outside the process.

pub mod email;
pub mod webhook;
