//! Pending user prompts
//!
//! Deleting an escrow and setting its timelock both go through a modal prompt
//! before anything happens. A prompt names one escrow and goes stale after
//! [`PROMPT_TIMEOUT`]; a stale prompt can no longer be confirmed.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::domain_types::DomainEthAddress;

/// Timeout for an unanswered prompt (5 minutes)
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PromptKind {
    /// "Are you sure you want to delete this contract?"
    Delete,
    /// Unix timestamp entry for setTimelock
    Timelock,
}

/// A prompt waiting for the user's answer
#[derive(Debug, Clone, Serialize)]
pub struct PendingPrompt {
    pub id: String,
    pub kind: PromptKind,
    pub address: DomainEthAddress,
    /// Human-readable question shown in the modal
    pub description: String,
    #[serde(skip)]
    pub requested_at: Option<Instant>,
}

impl PendingPrompt {
    pub fn new(kind: PromptKind, address: DomainEthAddress) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            address,
            description: Self::build_description(kind, &address),
            requested_at: Some(Instant::now()),
        }
    }

    fn build_description(kind: PromptKind, address: &DomainEthAddress) -> String {
        match kind {
            PromptKind::Delete => format!(
                "Are you sure you want to delete contract {}? The escrow stays on-chain.",
                address.short()
            ),
            PromptKind::Timelock => format!(
                "Enter unlock time (unix timestamp) for contract {}",
                address.short()
            ),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.requested_at
            .map(|t| t.elapsed() > PROMPT_TIMEOUT)
            .unwrap_or(true)
    }
}
