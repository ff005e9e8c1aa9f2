//! Entities, value types and the ports the application layer talks through.
//!
//! Nothing in here performs I/O; stores and collaborators are reached through
//! the traits in [`ports`].

pub mod clock;
pub mod coins;
pub mod interval;
pub mod payment;
pub mod ports;
pub mod session;
pub mod settlement;
pub mod swap;
pub mod transaction;
pub mod user;
pub mod wallet;
