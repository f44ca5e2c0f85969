//! Shared application state: the lobby registry, connection registry, and
//! storage slot with its degraded-mode flag.

pub mod feed;
pub mod lobby;
pub mod machine;
pub mod registry;
pub mod scoring;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, watch};
use uuid::Uuid;

use crate::{config::AppConfig, dao::store::LobbyStore, error::ServiceError};

pub use self::feed::FeedHub;
pub use self::registry::LobbyRegistry;

/// Cheaply clonable handle to the process-wide state.
pub type SharedState = Arc<AppState>;

/// Handle used to push messages to a connected player socket.
#[derive(Clone)]
pub struct PlayerConnection {
    /// Player this socket authenticated as.
    pub id: Uuid,
    /// Writer side of the socket's outbound queue.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state storing live lobbies, player connections, and
/// the storage backend handle.
pub struct AppState {
    config: AppConfig,
    registry: LobbyRegistry,
    connections: DashMap<Uuid, PlayerConnection>,
    lobby_store: RwLock<Option<Arc<dyn LobbyStore>>>,
    degraded: watch::Sender<bool>,
    feed: FeedHub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`].
    ///
    /// The application starts in degraded mode until a storage backend is
    /// installed by the supervisor.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            registry: LobbyRegistry::new(),
            connections: DashMap::new(),
            lobby_store: RwLock::new(None),
            degraded: degraded_tx,
            feed: FeedHub::new(16),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registry of active lobbies.
    pub fn registry(&self) -> &LobbyRegistry {
        &self.registry
    }

    /// Registry of connected player sockets keyed by player id.
    pub fn connections(&self) -> &DashMap<Uuid, PlayerConnection> {
        &self.connections
    }

    /// Broadcast hub for the public lobby feed.
    pub fn feed(&self) -> &FeedHub {
        &self.feed
    }

    /// Obtain a handle to the current lobby store, if one is installed.
    pub async fn lobby_store(&self) -> Option<Arc<dyn LobbyStore>> {
        let guard = self.lobby_store.read().await;
        guard.as_ref().cloned()
    }

    /// Lobby store handle, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_lobby_store(&self) -> Result<Arc<dyn LobbyStore>, ServiceError> {
        self.lobby_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a storage backend and leave degraded mode.
    pub async fn set_lobby_store(&self, store: Arc<dyn LobbyStore>) {
        {
            let mut guard = self.lobby_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the storage backend and enter degraded mode.
    pub async fn clear_lobby_store(&self) {
        {
            let mut guard = self.lobby_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }
        let _ = self.degraded.send(value);
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }
}
