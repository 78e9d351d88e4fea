//! In-memory collaborators for tests

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{TransactionReceipt, H256, U256, U64};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

use crate::contract::{ApprovedEvent, ContractDeployer, EscrowHandle, APPROVED_CHANNEL_CAPACITY};
use crate::domain_types::DomainEthAddress;
use crate::error::{EscrowError, Result};
use crate::wallet::WalletSession;

/// Hardhat account #0 (DO NOT USE IN PRODUCTION)
pub const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_ACCOUNT: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

pub fn test_signer() -> LocalWallet {
    TEST_KEY
        .parse::<LocalWallet>()
        .expect("valid test key")
        .with_chain_id(31337u64)
}

pub fn test_address(n: u64) -> DomainEthAddress {
    ethers::types::Address::from_low_u64_be(n).into()
}

static TX_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_tx_hash() -> H256 {
    H256::from_low_u64_be(TX_COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// Scriptable escrow handle
pub struct MockEscrowHandle {
    address: DomainEthAddress,
    deploy_tx: Option<H256>,
    reject: bool,
    revert: bool,
    unconfirmed: bool,
    approved_emits: usize,
    gate: Option<Arc<Notify>>,
    approved: broadcast::Sender<ApprovedEvent>,
    submissions: AtomicUsize,
    receipt_waits: AtomicUsize,
    approve_txs: Mutex<Vec<H256>>,
    timelocks: Mutex<Vec<U256>>,
}

impl MockEscrowHandle {
    pub fn new(n: u64) -> Self {
        let (approved, _) = broadcast::channel(APPROVED_CHANNEL_CAPACITY);
        Self {
            address: test_address(n),
            deploy_tx: Some(next_tx_hash()),
            reject: false,
            revert: false,
            unconfirmed: false,
            approved_emits: 0,
            gate: None,
            approved,
            submissions: AtomicUsize::new(0),
            receipt_waits: AtomicUsize::new(0),
            approve_txs: Mutex::new(Vec::new()),
            timelocks: Mutex::new(Vec::new()),
        }
    }

    /// Signer refuses every submission
    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    /// Transactions mine with status 0
    pub fn reverting(mut self) -> Self {
        self.revert = true;
        self
    }

    /// Receipt never arrives
    pub fn unconfirmed(mut self) -> Self {
        self.unconfirmed = true;
        self
    }

    /// Emit Approved `times` times when an approve() mines
    pub fn emitting_approved(mut self, times: usize) -> Self {
        self.approved_emits = times;
        self
    }

    /// Hold every receipt until `gate` is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn receipt_waits(&self) -> usize {
        self.receipt_waits.load(Ordering::SeqCst)
    }

    pub fn timelocks_submitted(&self) -> Vec<U256> {
        self.timelocks.lock().clone()
    }

    fn submit(&self) -> Result<H256> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(EscrowError::tx_failed("user rejected transaction"));
        }
        Ok(next_tx_hash())
    }
}

#[async_trait]
impl EscrowHandle for MockEscrowHandle {
    fn address(&self) -> DomainEthAddress {
        self.address
    }

    fn deploy_tx(&self) -> Option<H256> {
        self.deploy_tx
    }

    async fn submit_approve(&self, _signer: &LocalWallet) -> Result<H256> {
        let tx_hash = self.submit()?;
        self.approve_txs.lock().push(tx_hash);
        Ok(tx_hash)
    }

    async fn submit_set_timelock(&self, _signer: &LocalWallet, unlock_time: U256) -> Result<H256> {
        let tx_hash = self.submit()?;
        self.timelocks.lock().push(unlock_time);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: H256, timeout: Duration) -> Result<TransactionReceipt> {
        self.receipt_waits.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.unconfirmed {
            return Err(EscrowError::tx_failed(format!(
                "Timed out after {:?} waiting for receipt",
                timeout
            )));
        }

        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            status: Some(U64::from(if self.revert { 0 } else { 1 })),
            block_number: Some(U64::from(1)),
            ..Default::default()
        };

        let is_approve = self.approve_txs.lock().contains(&tx_hash);
        if is_approve && !self.revert {
            for _ in 0..self.approved_emits {
                let _ = self.approved.send(ApprovedEvent {
                    escrow: self.address,
                    balance: U256::from(1000u64),
                    tx_hash: Some(tx_hash),
                });
            }
        }
        Ok(receipt)
    }

    fn subscribe_approved(&self) -> broadcast::Receiver<ApprovedEvent> {
        self.approved.subscribe()
    }
}

/// Deployer handing out queued mock handles, or fresh default ones
#[derive(Default)]
pub struct MockDeployer {
    queued: Mutex<VecDeque<Arc<MockEscrowHandle>>>,
    next_address: AtomicU64,
    fail: bool,
    calls: Mutex<Vec<(String, String, U256)>>,
}

impl MockDeployer {
    pub fn new() -> Self {
        Self {
            next_address: AtomicU64::new(1),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// The next deploy returns `handle`
    pub fn queue(&self, handle: MockEscrowHandle) -> Arc<MockEscrowHandle> {
        let handle = Arc::new(handle);
        self.queued.lock().push_back(handle.clone());
        handle
    }

    pub fn calls(&self) -> Vec<(String, String, U256)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ContractDeployer for MockDeployer {
    async fn deploy(
        &self,
        _signer: &LocalWallet,
        arbiter: &str,
        beneficiary: &str,
        amount: U256,
    ) -> Result<Arc<dyn EscrowHandle>> {
        self.calls
            .lock()
            .push((arbiter.to_string(), beneficiary.to_string(), amount));
        if self.fail {
            return Err(EscrowError::tx_failed("insufficient funds for gas * price + value"));
        }
        let queued = self.queued.lock().pop_front();
        let handle = queued.unwrap_or_else(|| {
            Arc::new(MockEscrowHandle::new(
                self.next_address.fetch_add(1, Ordering::SeqCst),
            ))
        });
        Ok(handle)
    }
}

/// Wallet session returning the test signer
#[derive(Default)]
pub struct MockWalletSession {
    pub no_accounts: bool,
}

#[async_trait]
impl WalletSession for MockWalletSession {
    async fn request_accounts(&self) -> Result<Vec<String>> {
        if self.no_accounts {
            return Ok(Vec::new());
        }
        Ok(vec![TEST_ACCOUNT.to_string()])
    }

    async fn signer(&self) -> Result<LocalWallet> {
        Ok(test_signer())
    }

    fn mode_name(&self) -> &'static str {
        "mock"
    }
}
