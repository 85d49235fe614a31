//! User lookup and chat persistence boundaries.
//!
//! The real-time core treats both as external collaborators; `MemoryStore`
//! is the single-process implementation used by the server and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::protocol::ChatMode;

pub type UserId = String;
pub type ExchangeId = String;

/// Errors raised by the persistence sink.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A user record as resolved by the directory.
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_active: bool,
}

/// A finished prompt/response exchange, created only for completed streams.
#[derive(Debug, Clone)]
pub struct ChatExchange {
    pub id: ExchangeId,
    pub user_id: UserId,
    pub prompt: String,
    pub response: String,
    pub mode: ChatMode,
    pub code_context: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload handed to the sink when a stream completes.
#[derive(Debug, Clone)]
pub struct NewExchange {
    pub user_id: UserId,
    pub prompt: String,
    pub response: String,
    pub mode: ChatMode,
    pub code_context: Option<String>,
}

/// Resolves an authenticated subject to a user record.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn by_id(&self, id: &str) -> Option<StoredUser>;
}

/// Durable store for finished exchanges.
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    async fn store(&self, exchange: NewExchange) -> StoreResult<ExchangeId>;
}

/// In-memory users and exchanges, gone on restart.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<UserId, StoredUser>>,
    exchanges: RwLock<HashMap<ExchangeId, ChatExchange>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: StoredUser) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    pub async fn get_exchange(&self, id: &str) -> Option<ChatExchange> {
        self.exchanges.read().await.get(id).cloned()
    }

    pub async fn exchange_count(&self) -> usize {
        self.exchanges.read().await.len()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn by_id(&self, id: &str) -> Option<StoredUser> {
        self.users.read().await.get(id).cloned()
    }
}

#[async_trait]
impl ExchangeStore for MemoryStore {
    async fn store(&self, exchange: NewExchange) -> StoreResult<ExchangeId> {
        let id = ulid::Ulid::new().to_string();
        let record = ChatExchange {
            id: id.clone(),
            user_id: exchange.user_id,
            prompt: exchange.prompt,
            response: exchange.response,
            mode: exchange.mode,
            code_context: exchange.code_context,
            created_at: Utc::now(),
        };
        self.exchanges.write().await.insert(id.clone(), record);
        Ok(id)
    }
}
