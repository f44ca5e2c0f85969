//! Fan-out of lobby state to member sockets and the public feed.
//!
//! Delivery is best-effort per recipient: a dead or missing socket never
//! aborts delivery to the rest of the roster, and feed serialization
//! failures are logged, not propagated.

use std::time::SystemTime;

use axum::extract::ws::Message;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        format_system_time,
        lobby::{GameStateSnapshot, LobbySnapshot, RankingEntryDto},
        sse::{FeedEvent, LobbyChangedEvent, LobbyClosedEvent, LobbyFeedEntry, SystemStatus},
        ws::ServerMessage,
    },
    state::{SharedState, lobby::Lobby},
};

const EVENT_LOBBY_CHANGED: &str = "lobby.changed";
const EVENT_LOBBY_CLOSED: &str = "lobby.closed";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Deliver one message to a single connected player.
///
/// Returns `false` when the player has no live socket or the writer side has
/// already closed; a closed writer also evicts the stale connection entry.
pub fn send_to_player(state: &SharedState, player_id: Uuid, message: &ServerMessage) -> bool {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize server message");
            return false;
        }
    };

    let Some(tx) = state
        .connections()
        .get(&player_id)
        .map(|conn| conn.tx.clone())
    else {
        return false;
    };

    if tx.send(Message::Text(payload.into())).is_err() {
        state.connections().remove(&player_id);
        return false;
    }
    true
}

/// Push a message to every roster member with a live socket, optionally
/// skipping one player (used so departure notices are never echoed back to
/// the leaver).
pub fn broadcast_to_lobby(
    state: &SharedState,
    lobby: &Lobby,
    message: &ServerMessage,
    skip: Option<Uuid>,
) {
    for player_id in lobby.players.keys() {
        if Some(*player_id) == skip {
            continue;
        }
        send_to_player(state, *player_id, message);
    }
}

/// Push the full lobby snapshot to every member and mirror the change onto
/// the public feed.
pub fn broadcast_lobby_snapshot(state: &SharedState, lobby: &Lobby) {
    let message = ServerMessage::LobbySnapshot {
        lobby: LobbySnapshot::from(lobby),
    };
    broadcast_to_lobby(state, lobby, &message, None);
    publish_lobby_changed(state, lobby);
}

/// Announce the round start to every member.
pub fn broadcast_game_started(state: &SharedState, lobby: &Lobby) {
    let message = ServerMessage::GameStarted {
        game: GameStateSnapshot::from(lobby),
    };
    broadcast_to_lobby(state, lobby, &message, None);
    publish_lobby_changed(state, lobby);
}

/// Announce one member's score or progress movement.
pub fn broadcast_player_progress(
    state: &SharedState,
    lobby: &Lobby,
    player_id: Uuid,
    score: i32,
    progress: f32,
    finished: bool,
) {
    let message = ServerMessage::PlayerProgress {
        player_id,
        score,
        progress,
        finished,
    };
    broadcast_to_lobby(state, lobby, &message, None);
}

/// Announce the final standings to every member.
pub fn broadcast_game_ended(state: &SharedState, lobby: &Lobby, rankings: Vec<RankingEntryDto>) {
    let message = ServerMessage::GameEnded { rankings };
    broadcast_to_lobby(state, lobby, &message, None);
    publish_lobby_changed(state, lobby);
}

/// Notify remaining members that someone left for good. The departing player
/// is never echoed the notice.
pub fn broadcast_player_departed(state: &SharedState, lobby: &Lobby, departed: Uuid) {
    let message = ServerMessage::PlayerDeparted {
        player_id: departed,
        timestamp: format_system_time(SystemTime::now()),
    };
    broadcast_to_lobby(state, lobby, &message, Some(departed));
}

/// Publish a lobby's current feed entry on the public stream.
pub fn publish_lobby_changed(state: &SharedState, lobby: &Lobby) {
    let payload = LobbyChangedEvent {
        lobby: LobbyFeedEntry::from(lobby),
    };
    send_feed_event(state, EVENT_LOBBY_CHANGED, &payload);
}

/// Publish that a lobby emptied out and was dropped.
pub fn publish_lobby_closed(state: &SharedState, lobby_id: &str) {
    let payload = LobbyClosedEvent {
        lobby_id: lobby_id.to_string(),
    };
    send_feed_event(state, EVENT_LOBBY_CLOSED, &payload);
}

/// Publish a degraded-mode flip on the public stream.
pub fn publish_system_status(state: &SharedState, degraded: bool) {
    send_feed_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_feed_event<T: Serialize>(state: &SharedState, event: &str, payload: &T) {
    match FeedEvent::json(Some(event.to_string()), payload) {
        Ok(feed_event) => state.feed().broadcast(feed_event),
        Err(err) => warn!(event, error = %err, "failed to serialize feed event"),
    }
}
