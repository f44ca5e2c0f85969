//! Payloads carried on the public lobby-feed SSE stream.

use serde::Serialize;
use utoipa::ToSchema;

use crate::state::lobby::{Lobby, LobbyStatus};

/// Dispatched payload carried across the SSE channel.
#[derive(Clone, Debug)]
pub struct FeedEvent {
    pub event: Option<String>,
    pub data: String,
}

impl FeedEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

/// Initial metadata sent to an SSE client when it connects.
#[derive(Debug, Serialize, ToSchema)]
pub struct Handshake {
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

/// Broadcast when the backend enters or leaves degraded mode.
#[derive(Debug, Serialize, ToSchema)]
pub struct SystemStatus {
    pub degraded: bool,
}

/// One lobby as shown on the public feed: membership counts only, no names.
#[derive(Debug, Serialize, ToSchema)]
pub struct LobbyFeedEntry {
    /// Join code.
    pub id: String,
    pub status: LobbyStatus,
    pub player_count: usize,
    pub max_players: u32,
}

impl From<&Lobby> for LobbyFeedEntry {
    fn from(lobby: &Lobby) -> Self {
        Self {
            id: lobby.id.clone(),
            status: lobby.status,
            player_count: lobby.players.len(),
            max_players: lobby.settings.max_players,
        }
    }
}

/// Broadcast when a lobby is opened or changes shape.
#[derive(Debug, Serialize, ToSchema)]
pub struct LobbyChangedEvent {
    pub lobby: LobbyFeedEntry,
}

/// Broadcast when a lobby empties out and is dropped.
#[derive(Debug, Serialize, ToSchema)]
pub struct LobbyClosedEvent {
    pub lobby_id: String,
}
