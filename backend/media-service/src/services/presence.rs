/// Online presence registry
///
/// Process-scoped and injected into the presence socket handler. A user is
/// online while at least one of their connections is registered.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

use crate::metrics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_id: Uuid,
}

/// Presence change broadcast to other connections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum PresenceEvent {
    #[serde(rename = "user-online")]
    Online(PresencePayload),
    #[serde(rename = "user-offline")]
    Offline(PresencePayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

struct Connection {
    id: ConnectionId,
    sender: UnboundedSender<PresenceEvent>,
}

#[derive(Default, Clone)]
pub struct PresenceRegistry {
    // user_id -> live connections of that user
    inner: Arc<RwLock<HashMap<Uuid, Vec<Connection>>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. The first connection of a user announces them online.
    pub async fn connect(&self, user_id: Uuid) -> (ConnectionId, UnboundedReceiver<PresenceEvent>) {
        let (tx, rx) = unbounded_channel();
        let connection_id = ConnectionId::new();

        let mut guard = self.inner.write().await;
        let first = !guard.contains_key(&user_id);
        guard.entry(user_id).or_default().push(Connection {
            id: connection_id,
            sender: tx,
        });

        if first {
            let event = PresenceEvent::Online(PresencePayload { user_id });
            broadcast_except(&mut guard, user_id, &event);
            tracing::info!(%user_id, "user online");
        }
        metrics::set_online_users(guard.len());

        (connection_id, rx)
    }

    /// Drop a connection. Removing the last one announces the user offline.
    pub async fn disconnect(&self, user_id: Uuid, connection_id: ConnectionId) {
        let mut guard = self.inner.write().await;

        let Some(connections) = guard.get_mut(&user_id) else {
            return;
        };
        connections.retain(|c| c.id != connection_id);
        if !connections.is_empty() {
            return;
        }

        guard.remove(&user_id);
        let event = PresenceEvent::Offline(PresencePayload { user_id });
        broadcast_except(&mut guard, user_id, &event);
        metrics::set_online_users(guard.len());
        tracing::info!(%user_id, "user offline");
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        let mut users: Vec<Uuid> = self.inner.read().await.keys().copied().collect();
        users.sort();
        users
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .get(&user_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

// Dead connections are left for their own disconnect to remove.
fn broadcast_except(
    connections: &mut HashMap<Uuid, Vec<Connection>>,
    skip_user: Uuid,
    event: &PresenceEvent,
) {
    for (user_id, conns) in connections.iter() {
        if *user_id == skip_user {
            continue;
        }
        for conn in conns {
            let _ = conn.sender.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_connection_announces_online_to_others() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (_, mut alice_rx) = registry.connect(alice).await;
        let (_, mut bob_rx) = registry.connect(bob).await;

        assert_eq!(
            alice_rx.recv().await.unwrap(),
            PresenceEvent::Online(PresencePayload { user_id: bob })
        );
        // Nobody else was online when alice connected, and bob does not hear himself.
        assert!(bob_rx.try_recv().is_err());
        assert!(registry.is_online(alice).await);
        assert_eq!(registry.online_users().await.len(), 2);
    }

    #[tokio::test]
    async fn offline_only_after_last_connection_closes() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (_, mut bob_rx) = registry.connect(bob).await;
        let (c1, _rx1) = registry.connect(alice).await;
        let (c2, _rx2) = registry.connect(alice).await;
        assert_eq!(registry.connection_count(alice).await, 2);

        // one online event for two connections
        assert!(matches!(bob_rx.recv().await, Some(PresenceEvent::Online(_))));
        assert!(bob_rx.try_recv().is_err());

        registry.disconnect(alice, c1).await;
        assert!(registry.is_online(alice).await);
        assert!(bob_rx.try_recv().is_err());

        registry.disconnect(alice, c2).await;
        assert!(!registry.is_online(alice).await);
        assert_eq!(
            bob_rx.recv().await.unwrap(),
            PresenceEvent::Offline(PresencePayload { user_id: alice })
        );
    }

    #[tokio::test]
    async fn disconnect_of_unknown_connection_is_a_noop() {
        let registry = PresenceRegistry::new();
        registry.disconnect(Uuid::new_v4(), ConnectionId::new()).await;
        assert!(registry.online_users().await.is_empty());
    }

    #[test]
    fn events_use_wire_names() {
        let json = serde_json::to_value(PresenceEvent::Offline(PresencePayload {
            user_id: Uuid::nil(),
        }))
        .unwrap();
        assert_eq!(json["event"], "user-offline");
        assert_eq!(json["data"]["userId"], Uuid::nil().to_string());
    }
}
