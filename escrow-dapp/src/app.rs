//! Escrow application controller
//!
//! The one object a UI surface talks to. It owns the wallet session, the
//! deployer, the live contract handles and the escrow list, and turns user
//! intents (deploy, approve, delete, set timelock) into collaborator calls
//! followed by store mutations.

use dashmap::DashMap;
use ethers::signers::LocalWallet;
use ethers::types::H256;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::actions::{parse_unlock_time, ApprovedWait, TimelockConfirmed, TransactionActions};
use crate::config::Timings;
use crate::contract::{ContractDeployer, EscrowHandle};
use crate::domain_types::{DomainEthAddress, DomainUint256};
use crate::error::{EscrowError, Result};
use crate::events::{EscrowEvent, EventBroadcaster};
use crate::store::{EscrowListSnapshot, EscrowListStore, EscrowRecord, PendingPrompt};
use crate::wallet::WalletSession;

/// How a successful approve() ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Approved event observed
    Approved { tx_hash: H256 },
    /// Receipt succeeded but no Approved event arrived in time; marked approved anyway
    ConfirmedWithoutEvent { tx_hash: H256 },
    /// App shut down while waiting for the event; the record was left as is
    Abandoned { tx_hash: H256 },
}

pub struct EscrowApp {
    session: Arc<dyn WalletSession>,
    deployer: Arc<dyn ContractDeployer>,
    handles: DashMap<DomainEthAddress, Arc<dyn EscrowHandle>>,
    store: EscrowListStore,
    actions: TransactionActions,
    broadcaster: Arc<EventBroadcaster>,
    timings: Timings,
    account: RwLock<Option<String>>,
    signer: RwLock<Option<LocalWallet>>,
    shutdown: CancellationToken,
}

impl EscrowApp {
    /// Must be called inside a tokio runtime (the event broadcaster spawns its loop)
    pub fn new(
        session: Arc<dyn WalletSession>,
        deployer: Arc<dyn ContractDeployer>,
        timings: Timings,
    ) -> Self {
        Self {
            session,
            deployer,
            handles: DashMap::new(),
            store: EscrowListStore::new(),
            actions: TransactionActions::new(&timings),
            broadcaster: Arc::new(EventBroadcaster::new()),
            timings,
            account: RwLock::new(None),
            signer: RwLock::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Ask the wallet for accounts and cache the signer for later actions
    pub async fn connect(&self) -> Result<String> {
        let accounts = self.session.request_accounts().await?;
        let account = accounts
            .into_iter()
            .next()
            .ok_or_else(|| EscrowError::Wallet("wallet returned no accounts".to_string()))?;
        let signer = self.session.signer().await?;

        *self.signer.write() = Some(signer);
        *self.account.write() = Some(account.clone());
        log::info!(
            "[EscrowApp] Connected {} via {} session",
            account,
            self.session.mode_name()
        );
        Ok(account)
    }

    pub fn account(&self) -> Option<String> {
        self.account.read().clone()
    }

    fn signer(&self) -> Result<LocalWallet> {
        self.signer.read().clone().ok_or(EscrowError::NotConnected)
    }

    fn handle(&self, address: &DomainEthAddress) -> Result<Arc<dyn EscrowHandle>> {
        self.handles
            .get(address)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EscrowError::UnknownEscrow(address.to_string()))
    }

    // ── deploy ───────────────────────────────────────────────────────

    /// Deploy a new escrow locking `amount` wei and list it
    pub async fn new_contract(
        &self,
        arbiter: &str,
        beneficiary: &str,
        amount: &str,
    ) -> Result<EscrowRecord> {
        let arbiter = arbiter.trim();
        let beneficiary = beneficiary.trim();
        if arbiter.is_empty() || beneficiary.is_empty() {
            return Err(EscrowError::invalid_input("arbiter and beneficiary are required"));
        }
        let value: DomainUint256 = amount.trim().parse()?;
        let signer = self.signer()?;

        log::info!(
            "[EscrowApp] Deploying escrow: arbiter {}, beneficiary {}, value {}",
            arbiter,
            beneficiary,
            value
        );
        let handle = self.deployer.deploy(&signer, arbiter, beneficiary, value.0).await?;
        let address = handle.address();

        let mut record = EscrowRecord::new(address, arbiter, beneficiary, value);
        let deploy_tx = handle.deploy_tx().map(|tx| format!("{:?}", tx));
        if let Some(tx) = &deploy_tx {
            record = record.with_deploy_tx(tx.clone());
        }

        self.store.add(record.clone())?;
        self.handles.insert(address, handle);
        self.broadcaster.broadcast(EscrowEvent::deployed(&address, deploy_tx));
        Ok(record)
    }

    // ── approve ──────────────────────────────────────────────────────

    /// Approve release of `address`'s funds. Resolves once the approval is
    /// mined and its Approved event observed (or the event wait gave up).
    pub async fn approve(&self, address: &DomainEthAddress) -> Result<ApprovalOutcome> {
        let handle = self.handle(address)?;
        let signer = self.signer()?;

        // Fails with ApproveCooldown while the global cooldown runs
        self.store.mark_approving(address)?;
        self.broadcaster.broadcast(EscrowEvent::approving(address));

        let confirmed = match self.actions.approve(handle.as_ref(), &signer).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                self.store.mark_approval_failed(address);
                self.broadcaster
                    .broadcast(EscrowEvent::approval_failed(address, &e.to_string()));
                return Err(e);
            }
        };

        let tx_hash = confirmed.tx_hash;
        let outcome = match confirmed
            .approved
            .wait(self.timings.approved_event_timeout, &self.shutdown)
            .await
        {
            ApprovedWait::Event(event) => {
                log::info!(
                    "[EscrowApp] Approved event for {} (balance {})",
                    event.escrow,
                    event.balance
                );
                ApprovalOutcome::Approved { tx_hash }
            }
            ApprovedWait::TimedOut => {
                log::warn!(
                    "[EscrowApp] No Approved event for {} within {:?}; receipt succeeded, marking approved",
                    address,
                    self.timings.approved_event_timeout
                );
                ApprovalOutcome::ConfirmedWithoutEvent { tx_hash }
            }
            ApprovedWait::Cancelled => {
                log::info!("[EscrowApp] Shutdown while awaiting Approved for {}", address);
                return Ok(ApprovalOutcome::Abandoned { tx_hash });
            }
        };

        if self.store.mark_approved(address) {
            self.broadcaster
                .broadcast(EscrowEvent::approved(address, &format!("{:?}", tx_hash)));
        }
        Ok(outcome)
    }

    // ── delete ───────────────────────────────────────────────────────

    pub fn request_delete(&self, address: &DomainEthAddress) -> Result<PendingPrompt> {
        self.store.request_delete(address)
    }

    /// Forget the escrow named by the open delete prompt. The contract itself
    /// is untouched.
    pub fn confirm_delete(&self) -> Result<Option<EscrowRecord>> {
        let removed = self.store.confirm_delete()?;
        if let Some(record) = &removed {
            self.handles.remove(&record.address);
            self.broadcaster.broadcast(EscrowEvent::deleted(&record.address));
        }
        Ok(removed)
    }

    pub fn cancel_delete(&self) -> bool {
        self.store.cancel_delete().is_some()
    }

    // ── timelock ─────────────────────────────────────────────────────

    pub fn open_timelock(&self, address: &DomainEthAddress) -> Result<PendingPrompt> {
        self.store.open_timelock_prompt(address)
    }

    pub fn close_timelock(&self) -> bool {
        self.store.close_timelock_prompt().is_some()
    }

    /// Answer the open timelock prompt. The prompt stays open on failure so
    /// the user can correct the value or cancel.
    pub async fn submit_timelock(&self, input: &str) -> Result<TimelockConfirmed> {
        let prompt = self
            .store
            .pending_timelock()
            .ok_or(EscrowError::NoPendingPrompt)?;
        let confirmed = self.set_timelock(&prompt.address, input).await?;
        self.store.close_timelock_prompt();
        Ok(confirmed)
    }

    /// Set the unlock time of `address`. Input is validated before any state
    /// changes; a confirmed timelock starts the global approve cooldown.
    pub async fn set_timelock(
        &self,
        address: &DomainEthAddress,
        input: &str,
    ) -> Result<TimelockConfirmed> {
        let unlock_time = parse_unlock_time(input)?;
        let handle = self.handle(address)?;
        let signer = self.signer()?;

        self.store.mark_timelock_pending(address)?;
        let result = self
            .actions
            .set_timelock(handle.as_ref(), &signer, &unlock_time.to_decimal_string())
            .await;

        match result {
            Ok(confirmed) => {
                self.store.mark_timelock_set(address);
                self.store
                    .set_global_approve_cooldown(self.timings.approve_cooldown);
                self.store.show_time_set_prompt(self.timings.time_set_prompt);
                self.broadcaster.broadcast(EscrowEvent::timelock_set(
                    address,
                    &confirmed.unlock_time.to_decimal_string(),
                    self.timings.approve_cooldown.as_millis() as u64,
                ));
                Ok(confirmed)
            }
            Err(e) => {
                self.store.clear_timelock_pending(address);
                self.broadcaster
                    .broadcast(EscrowEvent::timelock_failed(address, &e.to_string()));
                Err(e)
            }
        }
    }

    // ── observation ──────────────────────────────────────────────────

    pub fn store(&self) -> &EscrowListStore {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<EscrowListSnapshot> {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<EscrowListSnapshot>> {
        self.store.subscribe()
    }

    pub fn events(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    /// Abandon every in-flight wait. Submitted transactions are not affected.
    pub fn shutdown(&self) {
        log::info!("[EscrowApp] Shutting down");
        self.shutdown.cancel();
    }
}
