pub mod health;
pub mod payments;
pub mod sessions;
pub mod swaps;
pub mod wallet;
