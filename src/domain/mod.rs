//! Domain types and the ports the pollers talk through.

pub mod notification;
pub mod payment;
pub mod ports;
