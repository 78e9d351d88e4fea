//! UI-facing escrow events
//!
//! Snapshots tell a renderer *what* the list looks like; these events tell it
//! *what just happened* (for toasts, logs, sounds). Delivery is fan-out to
//! every subscriber through a background task, so emitting never blocks the
//! action that caused it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain_types::DomainEthAddress;

/// Max number of recent events kept for `get_recent_events`; new
/// subscribers only receive events broadcast after they subscribed
const EVENT_BUFFER_SIZE: usize = 100;

/// Per-subscriber queue depth
const SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct EscrowEvent {
    pub event: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl EscrowEvent {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn deployed(address: &DomainEthAddress, tx_hash: Option<String>) -> Self {
        Self::new(
            "escrow.deployed",
            json!({ "address": address, "tx_hash": tx_hash }),
        )
    }

    pub fn approving(address: &DomainEthAddress) -> Self {
        Self::new("escrow.approving", json!({ "address": address }))
    }

    pub fn approved(address: &DomainEthAddress, tx_hash: &str) -> Self {
        Self::new(
            "escrow.approved",
            json!({ "address": address, "tx_hash": tx_hash }),
        )
    }

    pub fn approval_failed(address: &DomainEthAddress, error: &str) -> Self {
        Self::new(
            "escrow.approval_failed",
            json!({ "address": address, "error": error }),
        )
    }

    pub fn timelock_set(address: &DomainEthAddress, unlock_time: &str, cooldown_ms: u64) -> Self {
        Self::new(
            "escrow.timelock_set",
            json!({
                "address": address,
                "unlock_time": unlock_time,
                "approve_cooldown_ms": cooldown_ms
            }),
        )
    }

    pub fn timelock_failed(address: &DomainEthAddress, error: &str) -> Self {
        Self::new(
            "escrow.timelock_failed",
            json!({ "address": address, "error": error }),
        )
    }

    pub fn deleted(address: &DomainEthAddress) -> Self {
        Self::new("escrow.deleted", json!({ "address": address }))
    }
}

enum BroadcastCmd {
    Send(EscrowEvent),
    Unsubscribe(String),
}

/// Broadcasts escrow events to every subscriber.
///
/// Must be created inside a tokio runtime; it spawns its delivery task.
pub struct EventBroadcaster {
    cmd_tx: mpsc::UnboundedSender<BroadcastCmd>,
    subscribers: Arc<DashMap<String, mpsc::Sender<EscrowEvent>>>,
    recent_events: Arc<parking_lot::Mutex<VecDeque<EscrowEvent>>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let subscribers: Arc<DashMap<String, mpsc::Sender<EscrowEvent>>> = Arc::new(DashMap::new());
        let recent_events = Arc::new(parking_lot::Mutex::new(VecDeque::with_capacity(
            EVENT_BUFFER_SIZE,
        )));

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::run_loop(
            cmd_rx,
            subscribers.clone(),
            recent_events.clone(),
        ));

        Self {
            cmd_tx,
            subscribers,
            recent_events,
        }
    }

    /// Subscribe and return (subscriber_id, receiver)
    pub fn subscribe(&self) -> (String, mpsc::Receiver<EscrowEvent>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.insert(id.clone(), tx);
        log::debug!("[EscrowEvents] Subscriber {} added", id);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: &str) {
        self.subscribers.remove(id);
        let _ = self.cmd_tx.send(BroadcastCmd::Unsubscribe(id.to_string()));
    }

    /// Queue an event for delivery; returns immediately
    pub fn broadcast(&self, event: EscrowEvent) {
        let _ = self.cmd_tx.send(BroadcastCmd::Send(event));
    }

    pub fn get_recent_events(&self) -> Vec<EscrowEvent> {
        self.recent_events.lock().iter().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    async fn run_loop(
        mut cmd_rx: mpsc::UnboundedReceiver<BroadcastCmd>,
        subscribers: Arc<DashMap<String, mpsc::Sender<EscrowEvent>>>,
        recent_events: Arc<parking_lot::Mutex<VecDeque<EscrowEvent>>>,
    ) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                BroadcastCmd::Send(event) => {
                    {
                        let mut buffer = recent_events.lock();
                        if buffer.len() >= EVENT_BUFFER_SIZE {
                            buffer.pop_front();
                        }
                        buffer.push_back(event.clone());
                    }

                    if log::log_enabled!(log::Level::Debug) {
                        if let Ok(json) = serde_json::to_string(&event) {
                            log::debug!(
                                "[EscrowEvents] '{}' to {} subscriber(s): {}",
                                event.event,
                                subscribers.len(),
                                json
                            );
                        }
                    }

                    let mut closed = Vec::new();
                    for entry in subscribers.iter() {
                        match entry.value().try_send(event.clone()) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                log::warn!(
                                    "[EscrowEvents] Queue full for subscriber {}, dropping '{}'",
                                    entry.key(),
                                    event.event
                                );
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                closed.push(entry.key().clone());
                            }
                        }
                    }

                    for id in closed {
                        subscribers.remove(&id);
                        log::debug!("[EscrowEvents] Removed closed subscriber {}", id);
                    }
                }
                BroadcastCmd::Unsubscribe(id) => {
                    subscribers.remove(&id);
                }
            }
        }

        log::info!("[EscrowEvents] Broadcast loop shutting down");
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    fn addr() -> DomainEthAddress {
        Address::from_low_u64_be(1).into()
    }

    #[test]
    fn test_event_payloads() {
        let e = EscrowEvent::timelock_set(&addr(), "1700000000", 60_000);
        assert_eq!(e.event, "escrow.timelock_set");
        assert_eq!(e.data["unlock_time"], "1700000000");
        assert_eq!(e.data["approve_cooldown_ms"], 60_000);
        assert_eq!(
            e.data["address"],
            "0x0000000000000000000000000000000000000001"
        );
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let (_, mut a) = broadcaster.subscribe();
        let (_, mut b) = broadcaster.subscribe();

        broadcaster.broadcast(EscrowEvent::deleted(&addr()));

        assert_eq!(a.recv().await.unwrap().event, "escrow.deleted");
        assert_eq!(b.recv().await.unwrap().event, "escrow.deleted");
        assert_eq!(broadcaster.get_recent_events().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_dropped() {
        let broadcaster = EventBroadcaster::new();
        let (_, rx) = broadcaster.subscribe();
        let (_, mut live) = broadcaster.subscribe();
        drop(rx);

        broadcaster.broadcast(EscrowEvent::approving(&addr()));
        live.recv().await.unwrap();
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_history_is_read_not_replayed() {
        let broadcaster = EventBroadcaster::new();
        let (_, mut early) = broadcaster.subscribe();
        broadcaster.broadcast(EscrowEvent::deleted(&addr()));
        early.recv().await.unwrap();

        let (_, mut late) = broadcaster.subscribe();
        assert!(late.try_recv().is_err());
        let recent = broadcaster.get_recent_events();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event, "escrow.deleted");
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let broadcaster = EventBroadcaster::new();
        let (id, _rx) = broadcaster.subscribe();
        broadcaster.unsubscribe(&id);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}
