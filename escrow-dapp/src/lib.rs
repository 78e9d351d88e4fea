//! Escrow dApp client core
//!
//! Deploys escrow contracts, keeps the session's list of them and drives the
//! approve / setTimelock flows, publishing every change as a snapshot a UI
//! surface can render.

pub mod actions;
pub mod app;
pub mod config;
pub mod console;
pub mod contract;
pub mod domain_types;
pub mod error;
pub mod events;
pub mod store;
pub mod wallet;

#[cfg(test)]
mod test_support;

pub use app::{ApprovalOutcome, EscrowApp};
pub use config::{Config, Timings};
pub use error::{EscrowError, Result};
pub use store::{EscrowListSnapshot, EscrowListStore, EscrowRecord};
