//! Transaction actions
//!
//! Wraps a handle's state-changing calls so callers wait for settlement
//! rather than mere submission. Neither action touches the escrow list; the
//! caller applies the outcome.

use ethers::signers::LocalWallet;
use ethers::types::{TransactionReceipt, H256, U64};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::Timings;
use crate::contract::{ApprovedEvent, EscrowHandle};
use crate::domain_types::{DomainEthAddress, DomainUint256};
use crate::error::{EscrowError, Result};

/// One-shot wait for a handle's Approved event.
///
/// Holds the subscription taken before the approval was submitted. The
/// subscription is released however the wait ends.
pub struct ApprovedWatch {
    escrow: DomainEthAddress,
    rx: broadcast::Receiver<ApprovedEvent>,
}

/// How an [`ApprovedWatch`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovedWait {
    Event(ApprovedEvent),
    TimedOut,
    Cancelled,
}

impl ApprovedWatch {
    pub fn new(escrow: DomainEthAddress, rx: broadcast::Receiver<ApprovedEvent>) -> Self {
        Self { escrow, rx }
    }

    /// Wait for the first Approved event, up to `timeout` or until `cancel` fires
    pub async fn wait(mut self, timeout: Duration, cancel: &CancellationToken) -> ApprovedWait {
        let escrow = self.escrow;
        let first_event = async {
            loop {
                match self.rx.recv().await {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!(
                            "[TxActions] Approved watch for {} lagged by {} event(s)",
                            escrow,
                            skipped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => ApprovedWait::Cancelled,
            outcome = tokio::time::timeout(timeout, first_event) => match outcome {
                Ok(Some(event)) => ApprovedWait::Event(event),
                Ok(None) | Err(_) => ApprovedWait::TimedOut,
            },
        }
    }
}

/// A mined, successful approve()
pub struct ApprovalConfirmed {
    pub tx_hash: H256,
    pub receipt: TransactionReceipt,
    pub approved: ApprovedWatch,
}

/// A mined, successful setTimelock()
#[derive(Debug, Clone)]
pub struct TimelockConfirmed {
    pub tx_hash: H256,
    pub unlock_time: DomainUint256,
    pub receipt: TransactionReceipt,
}

#[derive(Debug, Clone, Copy)]
pub struct TransactionActions {
    receipt_timeout: Duration,
}

impl TransactionActions {
    pub fn new(timings: &Timings) -> Self {
        Self {
            receipt_timeout: timings.receipt_timeout,
        }
    }

    /// Submit approve() and wait for it to be mined. The Approved subscription
    /// is registered before submission and returned with the confirmation.
    pub async fn approve(
        &self,
        handle: &dyn EscrowHandle,
        signer: &LocalWallet,
    ) -> Result<ApprovalConfirmed> {
        let escrow = handle.address();
        let approved = ApprovedWatch::new(escrow, handle.subscribe_approved());

        log::info!("[TxActions] Submitting approve for {}", escrow);
        let tx_hash = handle.submit_approve(signer).await.inspect_err(|e| {
            log::warn!("[TxActions] approve for {} not submitted: {}", escrow, e);
        })?;

        let receipt = self.settle(handle, tx_hash, "approve").await?;
        Ok(ApprovalConfirmed {
            tx_hash,
            receipt,
            approved,
        })
    }

    /// Validate `unlock_time`, then submit setTimelock() and wait for it to be
    /// mined. Invalid input never reaches the handle.
    pub async fn set_timelock(
        &self,
        handle: &dyn EscrowHandle,
        signer: &LocalWallet,
        unlock_time: &str,
    ) -> Result<TimelockConfirmed> {
        let unlock_time = parse_unlock_time(unlock_time)?;
        let escrow = handle.address();

        log::info!("[TxActions] Submitting setTimelock({}) for {}", unlock_time, escrow);
        let tx_hash = handle
            .submit_set_timelock(signer, unlock_time.0)
            .await
            .inspect_err(|e| {
                log::warn!("[TxActions] setTimelock for {} not submitted: {}", escrow, e);
            })?;

        let receipt = self.settle(handle, tx_hash, "setTimelock").await?;
        Ok(TimelockConfirmed {
            tx_hash,
            unlock_time,
            receipt,
        })
    }

    async fn settle(
        &self,
        handle: &dyn EscrowHandle,
        tx_hash: H256,
        label: &str,
    ) -> Result<TransactionReceipt> {
        let escrow = handle.address();
        let receipt = handle
            .wait_for_receipt(tx_hash, self.receipt_timeout)
            .await
            .inspect_err(|e| {
                log::warn!("[TxActions] {} for {} unconfirmed: {}", label, escrow, e);
            })?;

        if receipt.status != Some(U64::from(1)) {
            log::warn!("[TxActions] {} for {} reverted ({:?})", label, escrow, tx_hash);
            return Err(EscrowError::tx_failed(format!(
                "{} reverted on-chain ({:?})",
                label, tx_hash
            )));
        }

        log::info!(
            "[TxActions] {} for {} confirmed in block {:?}",
            label,
            escrow,
            receipt.block_number
        );
        Ok(receipt)
    }
}

/// Unlock time as typed by the user: a plain non-negative integer
pub fn parse_unlock_time(input: &str) -> Result<DomainUint256> {
    DomainUint256::parse_decimal(input)
        .map_err(|_| EscrowError::invalid_input(format!("unlock time '{}' is not a valid integer", input)))
}
