//! Error type shared by the store, the transaction actions and the collaborators.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EscrowError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    /// Rejected by the signer, reverted on-chain, network failure or receipt timeout
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// Local validation failure; nothing was submitted
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("escrow {0} is already in the list")]
    DuplicateAddress(String),

    #[error("unknown escrow {0}")]
    UnknownEscrow(String),

    #[error("approve is disabled for another {remaining_ms} ms")]
    ApproveCooldown { remaining_ms: u64 },

    #[error("approval for {0} is already in flight")]
    ApprovalInProgress(String),

    #[error("wallet session is not connected")]
    NotConnected,

    #[error("no pending prompt")]
    NoPendingPrompt,

    #[error("prompt for {0} expired")]
    PromptExpired(String),

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("contract artifact error: {0}")]
    Artifact(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EscrowError {
    pub fn tx_failed(msg: impl Into<String>) -> Self {
        Self::TransactionFailed(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the UI may simply offer the same action again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EscrowError::TransactionFailed(_) | EscrowError::ApproveCooldown { .. }
        )
    }
}
