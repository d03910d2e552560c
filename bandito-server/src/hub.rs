//! Live client connections and fan-out.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Outgoing queue depth per connection.
pub const OUTBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Each member is the sending half of a connection's outbox; the socket task
/// owns the receiving half and writes frames to the wire.
#[derive(Clone, Default)]
pub struct ConnectionHub {
    members: Arc<DashMap<ConnectionId, mpsc::Sender<String>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, outbox: mpsc::Sender<String>) -> ConnectionId {
        let id = ConnectionId(Uuid::new_v4());
        self.members.insert(id, outbox);
        id
    }

    pub fn unregister(&self, id: ConnectionId) {
        self.members.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Sends to one connection. Returns false if it is gone.
    pub async fn unicast<T: Serialize>(&self, id: ConnectionId, message: &T) -> bool {
        let Some(payload) = encode(message) else {
            return false;
        };
        let Some(outbox) = self.members.get(&id).map(|m| m.value().clone()) else {
            return false;
        };
        outbox.send(payload).await.is_ok()
    }

    /// Sends to every registered connection and returns how many accepted it.
    pub async fn broadcast<T: Serialize>(&self, message: &T) -> usize {
        match encode(message) {
            Some(payload) => self.broadcast_raw(payload).await,
            None => 0,
        }
    }

    /// Sends over a snapshot of the member set without waiting on any
    /// member. A closed connection is skipped and removed when its own task
    /// ends; a connection whose outbox is full misses this message.
    pub async fn broadcast_raw(&self, payload: String) -> usize {
        let snapshot: Vec<(ConnectionId, mpsc::Sender<String>)> = self
            .members
            .iter()
            .map(|m| (*m.key(), m.value().clone()))
            .collect();

        let mut delivered = 0;
        for (id, outbox) in snapshot {
            match outbox.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Broadcast dropped for {}, outbox full", id)
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Broadcast skipped closed connection {}", id)
                }
            }
        }
        delivered
    }
}

fn encode<T: Serialize>(message: &T) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!("Failed to serialize outgoing message: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_broadcast_skips_dead_connection() {
        let hub = ConnectionHub::new();
        let mut live = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
            hub.register(tx);
            live.push(rx);
        }
        let (dead_tx, dead_rx) = mpsc::channel(OUTBOX_CAPACITY);
        hub.register(dead_tx);
        drop(dead_rx);

        let delivered = hub.broadcast(&json!({"command": "PING"})).await;
        assert_eq!(delivered, 3);
        assert_eq!(hub.len(), 4);
        for rx in live.iter_mut() {
            assert_eq!(rx.recv().await.unwrap(), r#"{"command":"PING"}"#);
        }
    }

    #[tokio::test]
    async fn test_stalled_connection_does_not_hold_up_broadcast() {
        let hub = ConnectionHub::new();
        let (stalled_tx, _stalled_rx) = mpsc::channel(OUTBOX_CAPACITY);
        hub.register(stalled_tx);
        let (live_tx, mut live_rx) = mpsc::channel(OUTBOX_CAPACITY);
        hub.register(live_tx);

        for i in 0..OUTBOX_CAPACITY {
            assert_eq!(hub.broadcast(&json!({"n": i})).await, 2);
            live_rx.recv().await.unwrap();
        }

        let delivered = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            hub.broadcast(&json!({"command": "SET_ACTIVE_SLOT"})),
        )
        .await
        .expect("broadcast waited on a full outbox");
        assert_eq!(delivered, 1);
        assert_eq!(live_rx.recv().await.unwrap(), r#"{"command":"SET_ACTIVE_SLOT"}"#);
        assert_eq!(hub.len(), 2);
    }

    #[tokio::test]
    async fn test_unicast_targets_one_connection() {
        let hub = ConnectionHub::new();
        let (tx_a, mut rx_a) = mpsc::channel(OUTBOX_CAPACITY);
        let (tx_b, mut rx_b) = mpsc::channel(OUTBOX_CAPACITY);
        let a = hub.register(tx_a);
        hub.register(tx_b);

        assert!(hub.unicast(a, &json!({"type": "x"})).await);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());

        hub.unregister(a);
        hub.unregister(a);
        assert!(!hub.unicast(a, &json!({"type": "x"})).await);
        assert_eq!(hub.len(), 1);
    }
}
