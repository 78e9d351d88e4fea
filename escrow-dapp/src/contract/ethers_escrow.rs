//! JSON-RPC backed escrow deployer and handle

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{TransactionReceipt, TransactionRequest, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::abi;
use super::artifact::EscrowArtifact;
use super::rpc::EvmRpc;
use super::{ApprovedEvent, ContractDeployer, EscrowHandle, APPROVED_CHANNEL_CAPACITY};
use crate::domain_types::DomainEthAddress;
use crate::error::Result;

/// Deploys the compiled Escrow artifact through an [`EvmRpc`]
pub struct EthersEscrowDeployer {
    rpc: Arc<EvmRpc>,
    artifact: EscrowArtifact,
}

impl EthersEscrowDeployer {
    pub fn new(rpc: Arc<EvmRpc>, artifact: EscrowArtifact) -> Self {
        Self { rpc, artifact }
    }
}

#[async_trait]
impl ContractDeployer for EthersEscrowDeployer {
    async fn deploy(
        &self,
        signer: &LocalWallet,
        arbiter: &str,
        beneficiary: &str,
        amount: U256,
    ) -> Result<Arc<dyn EscrowHandle>> {
        let arbiter: DomainEthAddress = arbiter.parse()?;
        let beneficiary: DomainEthAddress = beneficiary.parse()?;

        // The contract address follows from (sender, nonce), so the handle is
        // returned without waiting for the deployment to mine.
        let tx = TransactionRequest::new()
            .data(self.artifact.deploy_data(arbiter.0, beneficiary.0))
            .value(amount);

        let (tx_hash, nonce) = self.rpc.send_with_nonce(signer, tx).await?;
        let address: DomainEthAddress =
            ethers::utils::get_contract_address(signer.address(), nonce).into();

        log::info!(
            "[Deployer] Deploying {} at {} (tx {:?}, nonce {})",
            self.artifact.contract_name,
            address,
            tx_hash,
            nonce
        );

        Ok(Arc::new(EthersEscrowHandle::new(
            address,
            self.rpc.clone(),
            Some(tx_hash),
        )))
    }
}

/// Handle to one deployed escrow
pub struct EthersEscrowHandle {
    address: DomainEthAddress,
    rpc: Arc<EvmRpc>,
    deploy_tx: Option<H256>,
    approved: broadcast::Sender<ApprovedEvent>,
}

impl EthersEscrowHandle {
    pub fn new(address: DomainEthAddress, rpc: Arc<EvmRpc>, deploy_tx: Option<H256>) -> Self {
        let (approved, _) = broadcast::channel(APPROVED_CHANNEL_CAPACITY);
        Self {
            address,
            rpc,
            deploy_tx,
            approved,
        }
    }

    fn call(&self, data: ethers::types::Bytes) -> TransactionRequest {
        TransactionRequest::new().to(self.address.0).data(data)
    }
}

#[async_trait]
impl EscrowHandle for EthersEscrowHandle {
    fn address(&self) -> DomainEthAddress {
        self.address
    }

    fn deploy_tx(&self) -> Option<H256> {
        self.deploy_tx
    }

    async fn submit_approve(&self, signer: &LocalWallet) -> Result<H256> {
        self.rpc.send_transaction(signer, self.call(abi::encode_approve())).await
    }

    async fn submit_set_timelock(&self, signer: &LocalWallet, unlock_time: U256) -> Result<H256> {
        self.rpc
            .send_transaction(signer, self.call(abi::encode_set_timelock(unlock_time)))
            .await
    }

    async fn wait_for_receipt(&self, tx_hash: H256, timeout: Duration) -> Result<TransactionReceipt> {
        let receipt = self.rpc.wait_for_receipt(tx_hash, timeout).await?;

        for event in abi::approved_events(&receipt, self.address) {
            log::info!(
                "[EscrowHandle] Approved event from {} (balance {})",
                self.address,
                event.balance
            );
            // No subscribers is fine; nobody is waiting on this escrow
            let _ = self.approved.send(event);
        }

        Ok(receipt)
    }

    fn subscribe_approved(&self) -> broadcast::Receiver<ApprovedEvent> {
        self.approved.subscribe()
    }
}
