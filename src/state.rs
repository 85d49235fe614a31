use std::sync::Arc;

use crate::auth::AuthConfig;
use crate::engine::{CompletionEngine, EngineConfig};
use crate::limiter::{RateLimitConfig, RateLimiter};
use crate::registry::{ConnectionRegistry, RegistryConfig};
use crate::rooms::RoomDirectory;
use crate::store::{ExchangeStore, UserDirectory};

/// Process-wide configuration, one section per component.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub registry: RegistryConfig,
    pub rate_limit: RateLimitConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Load all sections from environment variables
    pub fn from_env() -> Self {
        Self {
            auth: AuthConfig::from_env(),
            registry: RegistryConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            engine: EngineConfig::from_env(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: ConnectionRegistry,
    pub rooms: RoomDirectory,
    pub limiter: RateLimiter,
    pub engine: Option<Arc<dyn CompletionEngine>>,
    pub store: Arc<dyn ExchangeStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        engine: Option<Arc<dyn CompletionEngine>>,
        store: Arc<dyn ExchangeStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let registry = ConnectionRegistry::new(config.registry.clone());
        let rooms = RoomDirectory::new(registry.clone());
        let limiter = RateLimiter::from_config(&config.rate_limit);

        Self {
            config,
            registry,
            rooms,
            limiter,
            engine,
            store,
            users,
        }
    }
}
