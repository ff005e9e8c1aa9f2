//! Orchestration services. Each one owns a slice of the workflow and talks to
//! storage and collaborators only through the ports in [`crate::domain::ports`].

pub mod ledger;
pub mod payments;
pub mod sessions;
pub mod swaps;
