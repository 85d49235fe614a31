//! Live connection registry: authenticated user id to outbound handle.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::protocol::ServerFrame;
use crate::store::UserId;

/// Item queued for a connection's writer task.
#[derive(Debug)]
pub enum Delivery {
    Frame(ServerFrame),
    /// Tells the writer task to close the socket and stop.
    Close,
}

/// Outbound side of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<Delivery>) -> Self {
        Self { tx }
    }

    /// Open a handle together with the receiver its writer task will drain.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn deliver(&self, delivery: Delivery) -> bool {
        self.tx.send(delivery).is_ok()
    }
}

/// Outcome of a best-effort send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    NotConnected,
}

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Close the old socket when a user reconnects and replaces it.
    /// Off by default: a superseded connection is left open but unreachable.
    pub close_replaced: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            close_replaced: false,
        }
    }
}

impl RegistryConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let close_replaced = std::env::var("WS_CLOSE_REPLACED")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        Self { close_replaced }
    }
}

/// Exclusive owner of the user id to handle mapping.
#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<UserId, ConnectionHandle>>>,
    config: RegistryConfig,
}

impl ConnectionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Register a user's connection. Last writer wins: any prior handle for
    /// the same user is replaced, and closed if the config says so.
    pub async fn register(&self, user_id: &str, handle: ConnectionHandle) {
        let replaced = self
            .connections
            .write()
            .await
            .insert(user_id.to_string(), handle);

        if let Some(old) = replaced {
            tracing::debug!(user_id, "replacing existing connection");
            if self.config.close_replaced {
                old.deliver(Delivery::Close);
            }
        }
    }

    /// Remove a user's mapping unconditionally.
    pub async fn unregister(&self, user_id: &str) {
        self.connections.write().await.remove(user_id);
    }

    pub async fn is_connected(&self, user_id: &str) -> bool {
        self.connections.read().await.contains_key(user_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Best-effort send to one user. Never faults: an unknown user or a
    /// writer task that already hung up both report `NotConnected`.
    pub async fn send(&self, user_id: &str, frame: ServerFrame) -> SendOutcome {
        let handle = match self.connections.read().await.get(user_id) {
            Some(handle) => handle.clone(),
            None => return SendOutcome::NotConnected,
        };

        if handle.deliver(Delivery::Frame(frame)) {
            SendOutcome::Delivered
        } else {
            SendOutcome::NotConnected
        }
    }
}
