//! Escrow contract collaborators
//!
//! The app never talks to the chain directly. It deploys through a
//! [`ContractDeployer`] and drives each deployed escrow through its
//! [`EscrowHandle`]:
//!
//! - `submit_*` returns as soon as the transaction is accepted (tx hash)
//! - `wait_for_receipt` resolves once it is mined
//! - `subscribe_approved` delivers the contract's Approved event
//!
//! `EthersEscrowDeployer` / `EthersEscrowHandle` are the JSON-RPC backed
//! implementations.

pub mod abi;
mod artifact;
mod ethers_escrow;
mod rpc;

pub use artifact::EscrowArtifact;
pub use ethers_escrow::{EthersEscrowDeployer, EthersEscrowHandle};
pub use rpc::EvmRpc;

use async_trait::async_trait;
use ethers::signers::LocalWallet;
use ethers::types::{TransactionReceipt, H256, U256};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::domain_types::DomainEthAddress;
use crate::error::Result;

/// Capacity of each handle's Approved channel
pub const APPROVED_CHANNEL_CAPACITY: usize = 16;

/// The escrow's Approved event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovedEvent {
    pub escrow: DomainEthAddress,
    /// Balance released to the beneficiary
    pub balance: U256,
    pub tx_hash: Option<H256>,
}

/// A deployed escrow contract
#[async_trait]
pub trait EscrowHandle: Send + Sync {
    fn address(&self) -> DomainEthAddress;

    /// Hash of the creation transaction, if this handle came from a deployment
    fn deploy_tx(&self) -> Option<H256> {
        None
    }

    /// Submit approve() signed by `signer`
    async fn submit_approve(&self, signer: &LocalWallet) -> Result<H256>;

    /// Submit setTimelock(unlock_time) signed by `signer`
    async fn submit_set_timelock(&self, signer: &LocalWallet, unlock_time: U256) -> Result<H256>;

    /// Wait until `tx_hash` is mined. Approved events found in the receipt are
    /// delivered to subscribers before this returns.
    async fn wait_for_receipt(&self, tx_hash: H256, timeout: Duration) -> Result<TransactionReceipt>;

    /// Subscribe to Approved events. Subscribe before submitting to not miss one.
    fn subscribe_approved(&self) -> broadcast::Receiver<ApprovedEvent>;
}

/// Deploys new escrow contracts
#[async_trait]
pub trait ContractDeployer: Send + Sync {
    /// Submit the creation transaction. Returns without waiting for it to be
    /// mined; the handle's address is known up front.
    async fn deploy(
        &self,
        signer: &LocalWallet,
        arbiter: &str,
        beneficiary: &str,
        amount: U256,
    ) -> Result<Arc<dyn EscrowHandle>>;
}
