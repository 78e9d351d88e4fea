//! Escrow List Store
//!
//! Process-local state for the escrows the user has deployed in this session.
//!
//! ## Flow
//! 1. A deployment returns a handle and its record is appended (optimistic)
//! 2. Approve / setTimelock confirmations update the record in place
//! 3. Delete forgets the record after the user confirms the prompt
//!
//! Renderers subscribe to whole snapshots; nothing else mutates the list.

mod manager;
mod prompt;
mod types;

pub use manager::EscrowListStore;
pub use prompt::{PendingPrompt, PromptKind, PROMPT_TIMEOUT};
pub use types::{ApprovalStatus, EscrowListSnapshot, EscrowRecord, TimelockState};
