//! Reconciliation between live in-memory state and the persisted mirror.
//!
//! One merge rule, applied uniformly: connection-derived fields (`status`,
//! presence) always come from memory, gameplay accumulation fields (`score`,
//! `progress`, answer sets) come from the persisted row when both sides have
//! one, and `name` comes from the persisted identity. A player present on
//! only one side is taken from that side as-is.

use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::{LobbyEntity, PlayerEntity},
    dto::lobby::LobbySnapshot,
    services::broadcast,
    state::{
        SharedState,
        lobby::{Lobby, LobbyStatus, PlayerRecord, PlayerStatus},
    },
};

/// Merge one player's live record with its persisted row.
pub fn merge_player(live: &PlayerRecord, persisted: &PlayerEntity) -> PlayerRecord {
    PlayerRecord {
        id: live.id,
        name: persisted.name.clone(),
        status: live.status,
        score: persisted.score,
        progress: persisted.progress,
        validated_countries: persisted.validated_countries.iter().cloned().collect(),
        incorrect_countries: persisted.incorrect_countries.iter().cloned().collect(),
        last_answer_ms: live.last_answer_ms,
        consecutive_correct: live.consecutive_correct,
        status_before_disconnect: live.status_before_disconnect,
    }
}

/// Render a merged view of a lobby from its live state and persisted row.
///
/// Membership, host, status, and round come from memory; per-player gameplay
/// fields follow [`merge_player`]. Players found only in the persisted row
/// (written durably but not yet reconnected into memory) are appended from
/// that row.
pub fn merged_lobby(live: &Lobby, persisted: Option<&LobbyEntity>) -> Lobby {
    let Some(persisted) = persisted else {
        return live.clone();
    };

    let mut merged = live.clone();
    for row in &persisted.players {
        match merged.players.get_mut(&row.id) {
            Some(player) => *player = merge_player(player, row),
            None => {
                merged.players.insert(row.id, row.clone().into());
            }
        }
    }
    merged
}

/// Restoration path for a returning player.
///
/// Looks the player up in the live registry first; on a miss (process restart
/// or fully evicted lobby) the lobby is fetched from storage and restored. A
/// player marked disconnected flips back to their pre-disconnect status so an
/// in-progress round is not lost. Returns the lobby snapshot to hand the
/// returning client, or `None` when the player has no lobby anywhere.
pub async fn resume(state: &SharedState, player_id: Uuid) -> Option<LobbySnapshot> {
    let handle = match state.registry().find_by_player(player_id).await {
        Some(handle) => handle,
        None => {
            let store = state.lobby_store().await?;
            let entity = match store.find_lobby_by_player(player_id).await {
                Ok(found) => found?,
                Err(err) => {
                    warn!(player_id = %player_id, error = %err, "lobby lookup failed during resume");
                    return None;
                }
            };
            state.registry().restore(entity)
        }
    };

    let snapshot = {
        let mut lobby = handle.lock().await;
        let fallback = if lobby.status == LobbyStatus::Playing {
            PlayerStatus::Playing
        } else {
            PlayerStatus::Joined
        };
        let player = lobby.players.get_mut(&player_id)?;
        if player.status == PlayerStatus::Disconnected {
            player.status = player.status_before_disconnect.take().unwrap_or(fallback);
        }
        lobby.clone()
    };

    if let Some(store) = state.lobby_store().await {
        let status = snapshot
            .players
            .get(&player_id)
            .map(|player| player.status)
            .unwrap_or(PlayerStatus::Joined);
        super::session_service::mirror(
            store.update_player_status(snapshot.id.clone(), player_id, status),
            "update_player_status",
        );
    }

    broadcast::broadcast_lobby_snapshot(state, &snapshot);
    Some(LobbySnapshot::from(&snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::lobby::LobbySettings;

    fn settings() -> LobbySettings {
        LobbySettings {
            regions: vec!["world".into()],
            question_count: 4,
            max_players: 8,
        }
    }

    #[test]
    fn merge_keeps_live_status_and_persisted_accumulation() {
        let id = Uuid::new_v4();
        let mut live = PlayerRecord::new(id, "stale-name");
        live.status = PlayerStatus::Playing;
        live.score = 10;
        live.progress = 25.0;

        let mut persisted: PlayerEntity = live.clone().into();
        persisted.name = "fresh-name".into();
        persisted.score = 35;
        persisted.progress = 50.0;
        persisted.status = PlayerStatus::Disconnected;

        let merged = merge_player(&live, &persisted);
        assert_eq!(merged.status, PlayerStatus::Playing);
        assert_eq!(merged.score, 35);
        assert_eq!(merged.progress, 50.0);
        assert_eq!(merged.name, "fresh-name");
    }

    #[test]
    fn merged_lobby_appends_persisted_only_players() {
        let host = Uuid::new_v4();
        let offline = Uuid::new_v4();
        let live = Lobby::new("ABCDEF".into(), host, "host", settings());

        let mut persisted: LobbyEntity = live.clone().into();
        let mut offline_row: PlayerEntity = PlayerRecord::new(offline, "offline").into();
        offline_row.score = 12;
        persisted.players.push(offline_row);

        let merged = merged_lobby(&live, Some(&persisted));
        assert_eq!(merged.players.len(), 2);
        assert_eq!(merged.players[&offline].score, 12);
    }

    #[test]
    fn merged_lobby_without_persisted_row_is_the_live_state() {
        let live = Lobby::new("ABCDEF".into(), Uuid::new_v4(), "host", settings());
        let merged = merged_lobby(&live, None);
        assert_eq!(merged, live);
    }
}
