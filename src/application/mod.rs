//! Application layer driving the two pollers.
//!
//! Both pollers run as tokio tasks that talk to the backend only through the
//! ports in [`crate::domain::ports`]. State leaves a poller through `watch`
//! channels, never through shared mutable references.

pub mod checkout;
pub mod notification_poller;
pub mod payment_poller;
