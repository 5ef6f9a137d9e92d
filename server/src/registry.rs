//! Registry of logged-in AI clients.
//!
//! The registry is the only owner of the set of active connections. Callers
//! get atomic operations (register with duplicate check, unregister, lookup,
//! wait for a login) and never see the underlying map or its lock.

use crate::connection::{Connection, ConnectionKey};
use log::info;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Notify, RwLock};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} is already connected")]
    AlreadyConnected(ConnectionKey),
}

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionKey, Arc<Connection>>>,
    /// Woken on every successful registration.
    logged_in: Notify,
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            logged_in: Notify::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Hands out a process-unique connection id.
    pub fn next_connection_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds a logged-in connection. A live connection with the same player
    /// and AI name wins; a stale one whose transport already closed is
    /// replaced.
    pub async fn register(&self, connection: Arc<Connection>) -> Result<(), RegistryError> {
        {
            let mut connections = self.connections.write().await;
            if let Some(existing) = connections.get(connection.key()) {
                if existing.is_open() {
                    return Err(RegistryError::AlreadyConnected(connection.key().clone()));
                }
            }
            info!("{} logged in (connection {})", connection.key(), connection.id());
            connections.insert(connection.key().clone(), connection);
        }
        self.logged_in.notify_waiters();
        Ok(())
    }

    /// Removes the connection registered under `key`, but only if it is the
    /// one with the given id; a newer login under the same key stays.
    pub async fn unregister(&self, key: &ConnectionKey, id: u64) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(key) {
            Some(existing) if existing.id() == id => {
                connections.remove(key);
                info!("{} unregistered", key);
                true
            }
            _ => false,
        }
    }

    pub async fn find(&self, player_name: &str, ai_name: &str) -> Option<Arc<Connection>> {
        let key = ConnectionKey::new(player_name, ai_name);
        let connections = self.connections.read().await;
        connections.get(&key).filter(|c| c.is_open()).cloned()
    }

    /// Waits until a client running `ai_name` is logged in and returns it.
    ///
    /// Dropping the future cancels the wait; wrap it in
    /// `tokio::time::timeout` to bound it.
    pub async fn wait_for_connection(&self, ai_name: &str) -> Arc<Connection> {
        loop {
            let notified = self.logged_in.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let connections = self.connections.read().await;
                let found = connections
                    .values()
                    .find(|c| c.key().ai_name == ai_name && c.is_open());
                if let Some(connection) = found {
                    return Arc::clone(connection);
                }
            }

            notified.await;
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{split, DuplexStream};

    fn connection(
        registry: &ConnectionRegistry,
        player: &str,
        ai: &str,
    ) -> (Arc<Connection>, DuplexStream) {
        let (server_side, client_side) = tokio::io::duplex(1024);
        let (reader, writer) = split(server_side);
        let connection = Connection::attach(
            registry.next_connection_id(),
            ConnectionKey::new(player, ai),
            reader,
            writer,
        );
        (connection, client_side)
    }

    #[tokio::test]
    async fn test_register_and_find() {
        let registry = ConnectionRegistry::new();
        let (alice, _a) = connection(&registry, "alice", "bot");
        registry.register(alice.clone()).await.unwrap();

        assert_eq!(registry.len().await, 1);
        let found = registry.find("alice", "bot").await.unwrap();
        assert_eq!(found.id(), alice.id());
        assert!(registry.find("alice", "other").await.is_none());
        assert!(registry.find("bob", "bot").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let registry = ConnectionRegistry::new();
        let (first, _a) = connection(&registry, "alice", "bot");
        let (second, _b) = connection(&registry, "alice", "bot");
        registry.register(first.clone()).await.unwrap();

        assert_eq!(
            registry.register(second).await,
            Err(RegistryError::AlreadyConnected(ConnectionKey::new("alice", "bot")))
        );
        assert_eq!(registry.find("alice", "bot").await.unwrap().id(), first.id());
    }

    #[tokio::test]
    async fn test_same_player_different_ai_allowed() {
        let registry = ConnectionRegistry::new();
        let (first, _a) = connection(&registry, "alice", "bot");
        let (second, _b) = connection(&registry, "alice", "bot2");
        registry.register(first).await.unwrap();
        registry.register(second).await.unwrap();
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_closed_connection_can_be_replaced() {
        let registry = ConnectionRegistry::new();
        let (first, client) = connection(&registry, "alice", "bot");
        registry.register(first.clone()).await.unwrap();
        drop(client);
        first.closed().await;

        let (second, _b) = connection(&registry, "alice", "bot");
        registry.register(second.clone()).await.unwrap();

        // the stale connection's cleanup must not remove the new login
        assert!(!registry.unregister(first.key(), first.id()).await);
        assert_eq!(registry.find("alice", "bot").await.unwrap().id(), second.id());
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = ConnectionRegistry::new();
        let (alice, _a) = connection(&registry, "alice", "bot");
        registry.register(alice.clone()).await.unwrap();

        assert!(registry.unregister(alice.key(), alice.id()).await);
        assert!(registry.is_empty().await);
        assert!(!registry.unregister(alice.key(), alice.id()).await);
    }

    #[tokio::test]
    async fn test_wait_for_connection() {
        let registry = Arc::new(ConnectionRegistry::new());

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.wait_for_connection("keeper").await.id() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let (other, _o) = connection(&registry, "bob", "striker");
        registry.register(other).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let (keeper, _k) = connection(&registry, "alice", "keeper");
        registry.register(keeper.clone()).await.unwrap();

        let id = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id, keeper.id());
    }

    #[tokio::test]
    async fn test_wait_for_connection_can_be_cancelled() {
        let registry = ConnectionRegistry::new();
        let result =
            tokio::time::timeout(Duration::from_millis(30), registry.wait_for_connection("nobody"))
                .await;
        assert!(result.is_err());
    }
}
