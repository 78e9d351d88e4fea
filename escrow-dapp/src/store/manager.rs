//! Escrow list store
//!
//! Single owner of the escrow records and the UI flags derived from them.
//! Every mutation runs under one write lock and publishes a fresh snapshot
//! before the lock is released, so subscribers only ever see whole updates
//! and see them in mutation order.

use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::prompt::{PendingPrompt, PromptKind};
use super::types::{ApprovalStatus, EscrowListSnapshot, EscrowRecord, TimelockState};
use crate::domain_types::DomainEthAddress;
use crate::error::{EscrowError, Result};

#[derive(Default)]
struct StoreState {
    records: Vec<EscrowRecord>,
    approve_disabled_until: Option<Instant>,
    time_set_prompt_until: Option<Instant>,
    pending_delete: Option<PendingPrompt>,
    pending_timelock: Option<PendingPrompt>,
    version: u64,
}

impl StoreState {
    fn position(&self, address: &DomainEthAddress) -> Option<usize> {
        self.records.iter().position(|r| &r.address == address)
    }

    fn record_mut(&mut self, address: &DomainEthAddress) -> Option<&mut EscrowRecord> {
        self.records.iter_mut().find(|r| &r.address == address)
    }

    /// Drop the record and any prompt naming it
    fn remove_record(&mut self, address: &DomainEthAddress) -> Option<EscrowRecord> {
        let index = self.position(address)?;
        let removed = self.records.remove(index);
        if self.pending_delete.as_ref().is_some_and(|p| &p.address == address) {
            self.pending_delete = None;
        }
        if self.pending_timelock.as_ref().is_some_and(|p| &p.address == address) {
            self.pending_timelock = None;
        }
        log::info!("[EscrowStore] Removed escrow {}", address);
        Some(removed)
    }

    fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.approve_disabled_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    fn snapshot(&self) -> EscrowListSnapshot {
        let now = Instant::now();
        let remaining = self.cooldown_remaining(now);
        EscrowListSnapshot {
            version: self.version,
            records: self.records.clone(),
            approve_disabled: remaining.is_some(),
            approve_cooldown_remaining_ms: remaining.map(|d| d.as_millis() as u64).unwrap_or(0),
            pending_delete: self.pending_delete.as_ref().map(|p| p.address),
            pending_timelock: self.pending_timelock.as_ref().map(|p| p.address),
            show_time_set_prompt: self.time_set_prompt_until.is_some_and(|until| now < until),
        }
    }
}

struct StoreInner {
    state: RwLock<StoreState>,
    snapshots: watch::Sender<Arc<EscrowListSnapshot>>,
}

impl StoreInner {
    /// Apply `f` and publish if it reports a change
    fn mutate<R>(&self, f: impl FnOnce(&mut StoreState) -> (R, bool)) -> R {
        let mut state = self.state.write();
        let (result, changed) = f(&mut state);
        if changed {
            state.version += 1;
            let snapshot = Arc::new(state.snapshot());
            self.snapshots.send_replace(snapshot);
        }
        result
    }
}

/// Observable, cheaply cloneable escrow list
#[derive(Clone)]
pub struct EscrowListStore {
    inner: Arc<StoreInner>,
}

impl EscrowListStore {
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(Arc::new(EscrowListSnapshot::default()));
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(StoreState::default()),
                snapshots,
            }),
        }
    }

    // ── records ──────────────────────────────────────────────────────

    /// Append a record. Addresses are unique; a duplicate leaves the list untouched.
    pub fn add(&self, record: EscrowRecord) -> Result<()> {
        self.inner.mutate(|state| {
            if state.position(&record.address).is_some() {
                log::warn!("[EscrowStore] Rejecting duplicate escrow {}", record.address);
                return (Err(EscrowError::DuplicateAddress(record.address.to_string())), false);
            }
            log::info!(
                "[EscrowStore] Adding escrow {} (arbiter {}, beneficiary {}, value {})",
                record.address,
                record.arbiter,
                record.beneficiary,
                record.value
            );
            state.records.push(record);
            (Ok(()), true)
        })
    }

    /// Forget a record. Never touches the contract. No-op when absent.
    pub fn remove(&self, address: &DomainEthAddress) -> Option<EscrowRecord> {
        self.inner.mutate(|state| {
            let removed = state.remove_record(address);
            let changed = removed.is_some();
            (removed, changed)
        })
    }

    pub fn get(&self, address: &DomainEthAddress) -> Option<EscrowRecord> {
        let state = self.inner.state.read();
        state.records.iter().find(|r| &r.address == address).cloned()
    }

    pub fn contains(&self, address: &DomainEthAddress) -> bool {
        self.inner.state.read().position(address).is_some()
    }

    /// Records in insertion order
    pub fn records(&self) -> Vec<EscrowRecord> {
        self.inner.state.read().records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── timelock ─────────────────────────────────────────────────────

    /// NotSet -> Pending, before a setTimelock submission
    pub fn mark_timelock_pending(&self, address: &DomainEthAddress) -> Result<()> {
        self.inner.mutate(|state| {
            let Some(record) = state.record_mut(address) else {
                return (Err(EscrowError::UnknownEscrow(address.to_string())), false);
            };
            match record.timelock {
                TimelockState::NotSet => {
                    record.timelock = TimelockState::Pending;
                    (Ok(()), true)
                }
                TimelockState::Pending => (
                    Err(EscrowError::invalid_input(format!(
                        "timelock for {} is already being set",
                        address
                    ))),
                    false,
                ),
                TimelockState::Set => (
                    Err(EscrowError::invalid_input(format!(
                        "timelock for {} is already set",
                        address
                    ))),
                    false,
                ),
            }
        })
    }

    /// Pending -> NotSet after a failed submission
    pub fn clear_timelock_pending(&self, address: &DomainEthAddress) -> bool {
        self.inner.mutate(|state| match state.record_mut(address) {
            Some(record) if record.timelock == TimelockState::Pending => {
                record.timelock = TimelockState::NotSet;
                (true, true)
            }
            _ => (false, false),
        })
    }

    /// The record becomes Set with every other field unchanged. No-op when the
    /// address is absent or the timelock is already set.
    pub fn mark_timelock_set(&self, address: &DomainEthAddress) -> bool {
        self.inner.mutate(|state| match state.record_mut(address) {
            Some(record) if record.timelock != TimelockState::Set => {
                record.timelock = TimelockState::Set;
                log::info!("[EscrowStore] Timelock set for {}", address);
                (true, true)
            }
            _ => (false, false),
        })
    }

    // ── approval ─────────────────────────────────────────────────────

    /// Idle -> Approving. Refused while the global approve cooldown runs; the
    /// check and the transition happen under the same lock.
    pub fn mark_approving(&self, address: &DomainEthAddress) -> Result<()> {
        self.inner.mutate(|state| {
            if let Some(remaining) = state.cooldown_remaining(Instant::now()) {
                return (
                    Err(EscrowError::ApproveCooldown {
                        remaining_ms: remaining.as_millis() as u64,
                    }),
                    false,
                );
            }
            let Some(record) = state.record_mut(address) else {
                return (Err(EscrowError::UnknownEscrow(address.to_string())), false);
            };
            match record.approval {
                ApprovalStatus::Idle => {
                    record.approval = ApprovalStatus::Approving;
                    (Ok(()), true)
                }
                ApprovalStatus::Approving => {
                    (Err(EscrowError::ApprovalInProgress(address.to_string())), false)
                }
                ApprovalStatus::Approved => (
                    Err(EscrowError::invalid_input(format!("{} is already approved", address))),
                    false,
                ),
            }
        })
    }

    /// Terminal transition. Returns true only for the call that made it, so
    /// repeated Approved notifications collapse into one.
    pub fn mark_approved(&self, address: &DomainEthAddress) -> bool {
        self.inner.mutate(|state| match state.record_mut(address) {
            Some(record) if record.approval != ApprovalStatus::Approved => {
                record.approval = ApprovalStatus::Approved;
                log::info!("[EscrowStore] Escrow {} approved", address);
                (true, true)
            }
            _ => (false, false),
        })
    }

    /// Approving -> Idle so the user may retry
    pub fn mark_approval_failed(&self, address: &DomainEthAddress) -> bool {
        self.inner.mutate(|state| match state.record_mut(address) {
            Some(record) if record.approval == ApprovalStatus::Approving => {
                record.approval = ApprovalStatus::Idle;
                (true, true)
            }
            _ => (false, false),
        })
    }

    // ── global flags ─────────────────────────────────────────────────

    /// Disable approve for every record for `duration` from now. The flag
    /// clears by itself; a one-shot timer republishes once it has.
    pub fn set_global_approve_cooldown(&self, duration: Duration) {
        let until = Instant::now() + duration;
        self.inner.mutate(|state| {
            state.approve_disabled_until = Some(until);
            ((), true)
        });
        log::info!("[EscrowStore] Approve disabled for all escrows for {:?}", duration);
        self.republish_at(until);
    }

    pub fn is_approve_disabled(&self) -> bool {
        self.approve_cooldown_remaining().is_some()
    }

    pub fn approve_cooldown_remaining(&self) -> Option<Duration> {
        self.inner.state.read().cooldown_remaining(Instant::now())
    }

    /// Show the "time set successfully" banner for `duration`
    pub fn show_time_set_prompt(&self, duration: Duration) {
        let until = Instant::now() + duration;
        self.inner.mutate(|state| {
            state.time_set_prompt_until = Some(until);
            ((), true)
        });
        self.republish_at(until);
    }

    pub fn is_time_set_prompt_visible(&self) -> bool {
        self.inner
            .state
            .read()
            .time_set_prompt_until
            .is_some_and(|until| Instant::now() < until)
    }

    fn republish_at(&self, deadline: Instant) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!("[EscrowStore] No runtime; expiry at {:?} will show on next change", deadline);
            return;
        };
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.mutate(|_| ((), true));
            }
        });
    }

    // ── prompts ──────────────────────────────────────────────────────

    /// Open the delete confirmation for an escrow, replacing any earlier one
    pub fn request_delete(&self, address: &DomainEthAddress) -> Result<PendingPrompt> {
        self.open_prompt(PromptKind::Delete, address)
    }

    /// Accept the open delete prompt and forget its escrow. Closing the
    /// prompt and removing the record publish as one snapshot.
    pub fn confirm_delete(&self) -> Result<Option<EscrowRecord>> {
        self.inner.mutate(|state| {
            let Some(prompt) = state.pending_delete.take() else {
                return (Err(EscrowError::NoPendingPrompt), false);
            };
            if prompt.is_expired() {
                log::warn!("[EscrowStore] Delete prompt for {} expired", prompt.address);
                return (Err(EscrowError::PromptExpired(prompt.address.to_string())), true);
            }
            (Ok(state.remove_record(&prompt.address)), true)
        })
    }

    pub fn cancel_delete(&self) -> Option<PendingPrompt> {
        self.inner.mutate(|state| match state.pending_delete.take() {
            Some(p) => (Some(p), true),
            None => (None, false),
        })
    }

    /// Open the timelock prompt for an escrow
    pub fn open_timelock_prompt(&self, address: &DomainEthAddress) -> Result<PendingPrompt> {
        self.open_prompt(PromptKind::Timelock, address)
    }

    pub fn close_timelock_prompt(&self) -> Option<PendingPrompt> {
        self.inner.mutate(|state| match state.pending_timelock.take() {
            Some(p) => (Some(p), true),
            None => (None, false),
        })
    }

    /// The open timelock prompt, if it has not gone stale
    pub fn pending_timelock(&self) -> Option<PendingPrompt> {
        self.inner.mutate(|state| {
            if state.pending_timelock.as_ref().is_some_and(|p| p.is_expired()) {
                state.pending_timelock = None;
                return (None, true);
            }
            (state.pending_timelock.clone(), false)
        })
    }

    fn open_prompt(&self, kind: PromptKind, address: &DomainEthAddress) -> Result<PendingPrompt> {
        self.inner.mutate(|state| {
            if state.position(address).is_none() {
                return (Err(EscrowError::UnknownEscrow(address.to_string())), false);
            }
            let prompt = PendingPrompt::new(kind, *address);
            let slot = match kind {
                PromptKind::Delete => &mut state.pending_delete,
                PromptKind::Timelock => &mut state.pending_timelock,
            };
            *slot = Some(prompt.clone());
            (Ok(prompt), true)
        })
    }

    // ── observation ──────────────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<EscrowListSnapshot> {
        Arc::new(self.inner.state.read().snapshot())
    }

    /// Receiver that yields every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<EscrowListSnapshot>> {
        self.inner.snapshots.subscribe()
    }
}

impl Default for EscrowListStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::DomainUint256;
    use ethers::types::Address;

    fn addr(n: u64) -> DomainEthAddress {
        Address::from_low_u64_be(n).into()
    }

    fn record(n: u64) -> EscrowRecord {
        EscrowRecord::new(
            addr(n),
            format!("arbiter-{}", n),
            format!("beneficiary-{}", n),
            DomainUint256::from(n * 1000),
        )
    }

    fn store_with(n: u64) -> EscrowListStore {
        let store = EscrowListStore::new();
        for i in 1..=n {
            store.add(record(i)).unwrap();
        }
        store
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let store = store_with(3);
        let order: Vec<_> = store.records().iter().map(|r| r.address).collect();
        assert_eq!(order, vec![addr(1), addr(2), addr(3)]);
    }

    #[test]
    fn test_add_rejects_duplicate() {
        let store = store_with(2);
        let before = store.records();
        let err = store.add(record(1)).unwrap_err();
        assert!(matches!(err, EscrowError::DuplicateAddress(_)));
        assert_eq!(store.records(), before);
    }

    #[test]
    fn test_remove_keeps_others_in_order() {
        let store = store_with(5);
        let before = store.records();

        let removed = store.remove(&addr(3)).unwrap();
        assert_eq!(removed.address, addr(3));

        let after = store.records();
        assert_eq!(after.len(), 4);
        let expected: Vec<_> = before.into_iter().filter(|r| r.address != addr(3)).collect();
        assert_eq!(after, expected);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = store_with(2);
        assert!(store.remove(&addr(1)).is_some());
        let version = store.snapshot().version;
        assert!(store.remove(&addr(1)).is_none());
        assert!(store.remove(&addr(1)).is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot().version, version);
    }

    #[test]
    fn test_mark_timelock_set_on_missing_address_changes_nothing() {
        let store = store_with(2);
        let before = store.snapshot();
        assert!(!store.mark_timelock_set(&addr(9)));
        let after = store.snapshot();
        assert_eq!(after.records, before.records);
        assert_eq!(after.version, before.version);
    }

    #[test]
    fn test_mark_timelock_set_only_changes_timelock() {
        let store = store_with(2);
        let before = store.get(&addr(2)).unwrap();
        assert!(store.mark_timelock_set(&addr(2)));

        let after = store.get(&addr(2)).unwrap();
        assert!(after.is_timelock_set());
        assert_eq!(
            EscrowRecord { timelock: before.timelock, ..after.clone() },
            before
        );
        // untouched neighbour
        assert!(!store.get(&addr(1)).unwrap().is_timelock_set());
    }

    #[test]
    fn test_timelock_transitions_once() {
        let store = store_with(1);
        store.mark_timelock_pending(&addr(1)).unwrap();
        assert!(store.mark_timelock_set(&addr(1)));
        assert!(!store.mark_timelock_set(&addr(1)));
        assert!(!store.clear_timelock_pending(&addr(1)));
        assert!(store.mark_timelock_pending(&addr(1)).is_err());
        assert!(store.get(&addr(1)).unwrap().is_timelock_set());
    }

    #[test]
    fn test_timelock_pending_rolls_back() {
        let store = store_with(1);
        store.mark_timelock_pending(&addr(1)).unwrap();
        assert_eq!(store.get(&addr(1)).unwrap().timelock, TimelockState::Pending);
        assert!(store.mark_timelock_pending(&addr(1)).is_err());
        assert!(store.clear_timelock_pending(&addr(1)));
        assert_eq!(store.get(&addr(1)).unwrap().timelock, TimelockState::NotSet);
    }

    #[test]
    fn test_approval_state_machine() {
        let store = store_with(2);
        store.mark_approving(&addr(1)).unwrap();
        assert!(matches!(
            store.mark_approving(&addr(1)),
            Err(EscrowError::ApprovalInProgress(_))
        ));

        // failure returns to idle, retry allowed
        assert!(store.mark_approval_failed(&addr(1)));
        assert_eq!(store.get(&addr(1)).unwrap().approval, ApprovalStatus::Idle);
        store.mark_approving(&addr(1)).unwrap();

        assert!(store.mark_approved(&addr(1)));
        assert!(!store.mark_approved(&addr(1)));
        assert!(!store.mark_approval_failed(&addr(1)));
        assert!(store.get(&addr(1)).unwrap().is_approved());

        // independent per record
        assert_eq!(store.get(&addr(2)).unwrap().approval, ApprovalStatus::Idle);
    }

    #[test]
    fn test_unknown_escrow_errors() {
        let store = store_with(1);
        assert!(matches!(
            store.mark_approving(&addr(7)),
            Err(EscrowError::UnknownEscrow(_))
        ));
        assert!(matches!(
            store.request_delete(&addr(7)),
            Err(EscrowError::UnknownEscrow(_))
        ));
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let store = store_with(2);
        store.request_delete(&addr(1)).unwrap();
        assert_eq!(store.snapshot().pending_delete, Some(addr(1)));
        assert_eq!(store.len(), 2);

        let removed = store.confirm_delete().unwrap();
        assert_eq!(removed.map(|r| r.address), Some(addr(1)));
        assert_eq!(store.snapshot().pending_delete, None);
        assert_eq!(store.len(), 1);

        assert!(matches!(store.confirm_delete(), Err(EscrowError::NoPendingPrompt)));
    }

    #[test]
    fn test_confirm_delete_publishes_once() {
        let store = store_with(2);
        store.request_delete(&addr(2)).unwrap();
        let mut rx = store.subscribe();
        let before = rx.borrow_and_update().version;

        store.confirm_delete().unwrap();

        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.version, before + 1);
        assert_eq!(snap.pending_delete, None);
        assert_eq!(snap.addresses(), vec![addr(1)]);
    }

    #[test]
    fn test_cancel_delete_keeps_record() {
        let store = store_with(1);
        store.request_delete(&addr(1)).unwrap();
        assert!(store.cancel_delete().is_some());
        assert!(store.contains(&addr(1)));
        assert!(matches!(store.confirm_delete(), Err(EscrowError::NoPendingPrompt)));
    }

    #[test]
    fn test_remove_clears_prompts_for_address() {
        let store = store_with(1);
        store.open_timelock_prompt(&addr(1)).unwrap();
        store.remove(&addr(1));
        assert!(store.pending_timelock().is_none());
        assert_eq!(store.snapshot().pending_timelock, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_delete_prompt_cannot_be_confirmed() {
        let store = store_with(1);
        store.request_delete(&addr(1)).unwrap();
        tokio::time::advance(crate::store::PROMPT_TIMEOUT + Duration::from_secs(1)).await;
        assert!(matches!(store.confirm_delete(), Err(EscrowError::PromptExpired(_))));
        assert!(store.contains(&addr(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_cooldown_expires() {
        let store = store_with(2);
        store.set_global_approve_cooldown(Duration::from_millis(60_000));
        assert!(store.is_approve_disabled());

        tokio::time::advance(Duration::from_millis(59_999)).await;
        assert!(store.is_approve_disabled());
        assert_eq!(store.approve_cooldown_remaining(), Some(Duration::from_millis(1)));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!store.is_approve_disabled());
        assert!(!store.snapshot().approve_disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_approving_refused_during_cooldown() {
        let store = store_with(2);
        store.set_global_approve_cooldown(Duration::from_secs(60));

        let err = store.mark_approving(&addr(1)).unwrap_err();
        assert_eq!(err, EscrowError::ApproveCooldown { remaining_ms: 60_000 });
        assert_eq!(store.get(&addr(1)).unwrap().approval, ApprovalStatus::Idle);

        tokio::time::advance(Duration::from_secs(60)).await;
        store.mark_approving(&addr(1)).unwrap();
        assert_eq!(store.get(&addr(1)).unwrap().approval, ApprovalStatus::Approving);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_expiry_republishes() {
        let store = store_with(1);
        let mut rx = store.subscribe();
        let start = Instant::now();

        store.set_global_approve_cooldown(Duration::from_secs(60));
        assert!(rx.borrow_and_update().approve_disabled);

        rx.changed().await.unwrap();
        let snap = rx.borrow_and_update().clone();
        assert!(!snap.approve_disabled);
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_set_prompt_visibility() {
        let store = store_with(1);
        store.show_time_set_prompt(Duration::from_secs(3));
        assert!(store.is_time_set_prompt_visible());
        assert!(store.snapshot().show_time_set_prompt);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!store.is_time_set_prompt_visible());
    }

    #[test]
    fn test_cooldown_without_runtime() {
        let store = store_with(1);
        store.set_global_approve_cooldown(Duration::from_secs(60));
        assert!(store.is_approve_disabled());
    }

    #[test]
    fn test_each_mutation_publishes_one_snapshot() {
        let store = EscrowListStore::new();
        let mut rx = store.subscribe();
        store.add(record(1)).unwrap();
        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.records.len(), 1);

        store.add(record(2)).unwrap();
        store.mark_timelock_set(&addr(2));
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.version, 3);
        assert!(snap.get(&addr(2)).unwrap().is_timelock_set());
    }
}
