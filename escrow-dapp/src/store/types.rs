//! Escrow list data types

use chrono::{DateTime, Utc};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::domain_types::{DomainEthAddress, DomainUint256};

/// Approval progress of one escrow, as shown next to its Approve button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalStatus {
    /// Nothing in flight; approve may be requested (again, after a failure)
    Idle,
    /// Approve submitted, waiting for the mined receipt and the Approved event
    Approving,
    /// Approved event observed; terminal
    Approved,
}

/// Timelock progress of one escrow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimelockState {
    NotSet,
    /// setTimelock submitted, not yet confirmed
    Pending,
    /// Confirmed on-chain; terminal
    Set,
}

/// A deployed escrow as the list knows it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowRecord {
    /// Contract address, unique within the list
    pub address: DomainEthAddress,
    /// Broker allowed to approve the release
    pub arbiter: String,
    /// Recipient of the released funds
    pub beneficiary: String,
    /// Locked amount in wei, serialized as a decimal string
    pub value: DomainUint256,
    pub timelock: TimelockState,
    pub approval: ApprovalStatus,
    /// Deployment transaction hash, when the deployer reported one
    pub deploy_tx: Option<String>,
    /// When the record entered the list
    pub created_at: DateTime<Utc>,
}

impl EscrowRecord {
    pub fn new(
        address: DomainEthAddress,
        arbiter: impl Into<String>,
        beneficiary: impl Into<String>,
        value: DomainUint256,
    ) -> Self {
        Self {
            address,
            arbiter: arbiter.into(),
            beneficiary: beneficiary.into(),
            value,
            timelock: TimelockState::NotSet,
            approval: ApprovalStatus::Idle,
            deploy_tx: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_deploy_tx(mut self, tx_hash: impl Into<String>) -> Self {
        self.deploy_tx = Some(tx_hash.into());
        self
    }

    pub fn is_timelock_set(&self) -> bool {
        self.timelock == TimelockState::Set
    }

    pub fn is_approved(&self) -> bool {
        self.approval == ApprovalStatus::Approved
    }

    /// Value as human-readable ETH, falling back to raw wei for dust
    pub fn format_value_eth(&self) -> String {
        if self.value.0 >= U256::exp10(14) {
            format!("{} ETH", ethers::utils::format_ether(self.value.0))
        } else {
            format!("{} wei", self.value)
        }
    }
}

/// Everything a renderer needs, captured under a single store lock
#[derive(Debug, Clone, Default, Serialize)]
pub struct EscrowListSnapshot {
    /// Bumped on every published change
    pub version: u64,
    /// Records in insertion order
    pub records: Vec<EscrowRecord>,
    /// Global approve cooldown; applies to every record
    pub approve_disabled: bool,
    pub approve_cooldown_remaining_ms: u64,
    /// Address awaiting delete confirmation
    pub pending_delete: Option<DomainEthAddress>,
    /// Address whose timelock prompt is open
    pub pending_timelock: Option<DomainEthAddress>,
    pub show_time_set_prompt: bool,
}

impl EscrowListSnapshot {
    pub fn get(&self, address: &DomainEthAddress) -> Option<&EscrowRecord> {
        self.records.iter().find(|r| &r.address == address)
    }

    pub fn addresses(&self) -> Vec<DomainEthAddress> {
        self.records.iter().map(|r| r.address).collect()
    }

    /// True while any approval is in flight
    pub fn loading(&self) -> bool {
        self.records
            .iter()
            .any(|r| r.approval == ApprovalStatus::Approving)
    }
}
