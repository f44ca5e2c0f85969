//! Command facade for lobby sessions.
//!
//! Every inbound command lands here: structural validation, actor authority,
//! the registry mutation under the lobby's lock, a best-effort mirror write,
//! then the broadcast. Mirror writes never block or roll back gameplay; the
//! initial create and join are the only commands that wait on storage, since
//! they require the persisted row to exist.

use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use rand::Rng;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{models::GameResultEntity, storage::StorageResult, store::LobbyStore},
    dto::{
        lobby::{GameStateSnapshot, LobbySettingsInput, LobbySnapshot},
        validation::{JOIN_CODE_ALPHABET, JOIN_CODE_LEN, validate_join_code, validate_player_name},
    },
    error::ServiceError,
    services::{broadcast, reconcile},
    state::{
        SharedState, machine,
        lobby::{Lobby, LobbyStatus, PlayerStatus, RemovalOutcome},
        scoring::{AnswerBatch, ProgressOutcome, apply_answer_batch},
    },
};

const JOIN_CODE_ATTEMPTS: usize = 16;

/// One progress submission as it arrives from the wire.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub validated: Vec<String>,
    pub incorrect: Vec<String>,
    pub score_delta: i32,
    /// Falls back to the frozen round settings when omitted.
    pub total_questions: Option<u32>,
    pub answer_time_ms: Option<u64>,
}

/// Spawn a mirror write, logging instead of propagating its failure.
pub(crate) fn mirror(write: BoxFuture<'static, StorageResult<()>>, op: &'static str) {
    tokio::spawn(async move {
        if let Err(err) = write.await {
            warn!(op, error = %err, "storage mirror write failed");
        }
    });
}

fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}

fn invalid_input(err: impl std::fmt::Display) -> ServiceError {
    ServiceError::InvalidInput(err.to_string())
}

fn lobby_not_found(lobby_id: &str) -> ServiceError {
    ServiceError::NotFound(format!("lobby `{lobby_id}`"))
}

fn player_not_found(lobby_id: &str, player_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("player `{player_id}` is not in lobby `{lobby_id}`"))
}

fn require_host(lobby: &Lobby, requester: Uuid) -> Result<(), ServiceError> {
    if !lobby.players.contains_key(&requester) {
        return Err(player_not_found(&lobby.id, requester));
    }
    if lobby.host_id != requester {
        return Err(ServiceError::Unauthorized(
            "only the host may perform this action".into(),
        ));
    }
    Ok(())
}

/// Mirror the full round shape after a start or restart: lobby status, round
/// data, and every member's status and accumulators.
fn mirror_round_shape(store: &Arc<dyn LobbyStore>, lobby: &Lobby) {
    mirror(
        store.update_status(lobby.id.clone(), lobby.status),
        "update_status",
    );
    mirror(
        store.save_game_state(lobby.id.clone(), lobby.round.clone().map(Into::into)),
        "save_game_state",
    );
    for player in lobby.players.values() {
        mirror(
            store.update_player_status(lobby.id.clone(), player.id, player.status),
            "update_player_status",
        );
        mirror(
            store.update_player_game_data(lobby.id.clone(), player.id, player.game_data()),
            "update_player_game_data",
        );
    }
}

/// Open a new lobby with `host_id` as its only member.
///
/// The persisted row is written before the command succeeds; if storage
/// refuses it the live entry is rolled back, since a lobby that disconnected
/// players could never rejoin would be broken from birth.
pub async fn create_lobby(
    state: &SharedState,
    host_id: Uuid,
    host_name: &str,
    settings: Option<LobbySettingsInput>,
) -> Result<LobbySnapshot, ServiceError> {
    validate_player_name(host_name).map_err(invalid_input)?;
    let input = settings.unwrap_or_default();
    input.validate().map_err(invalid_input)?;
    let store = state.require_lobby_store().await?;
    let resolved = input.resolve(&state.config().limits);

    let mut created = None;
    for _ in 0..JOIN_CODE_ATTEMPTS {
        let code = generate_join_code();
        if let Ok(handle) =
            state
                .registry()
                .create(code, host_id, host_name.trim(), resolved.clone())
        {
            created = Some(handle);
            break;
        }
    }
    let handle = created.ok_or_else(|| {
        ServiceError::InvalidState("could not allocate an unused join code".into())
    })?;
    let snapshot = handle.lock().await.clone();

    if let Err(err) = store.create_lobby(snapshot.clone().into()).await {
        state.registry().remove(&snapshot.id);
        return Err(err.into());
    }

    broadcast::publish_lobby_changed(state, &snapshot);
    Ok(LobbySnapshot::from(&snapshot))
}

/// Join an existing lobby by join code. Idempotent for current members.
pub async fn join_lobby(
    state: &SharedState,
    lobby_id: &str,
    player_id: Uuid,
    name: &str,
) -> Result<LobbySnapshot, ServiceError> {
    validate_join_code(lobby_id).map_err(invalid_input)?;
    validate_player_name(name).map_err(invalid_input)?;
    let store = state.require_lobby_store().await?;

    let handle = match state.registry().get(lobby_id) {
        Some(handle) => handle,
        None => {
            let entity = store
                .find_lobby(lobby_id.to_string())
                .await?
                .ok_or_else(|| lobby_not_found(lobby_id))?;
            state.registry().restore(entity)
        }
    };

    let snapshot = {
        let mut lobby = handle.lock().await;
        if !lobby.players.contains_key(&player_id) {
            if lobby.status != LobbyStatus::Waiting {
                return Err(ServiceError::InvalidState(format!(
                    "lobby `{lobby_id}` has already started"
                )));
            }
            if lobby.is_full() {
                return Err(ServiceError::InvalidState(format!(
                    "lobby `{lobby_id}` is full"
                )));
            }
            lobby.add_player(player_id, name.trim());
        }
        lobby.clone()
    };

    // Joining depends on the persisted membership row; wait for it.
    if let Some(player) = snapshot.players.get(&player_id) {
        store
            .add_player(lobby_id.to_string(), player.clone().into())
            .await?;
    }

    broadcast::broadcast_lobby_snapshot(state, &snapshot);
    Ok(LobbySnapshot::from(&snapshot))
}

/// Drop a member from the lobby. A departure can also be the terminal event
/// of a round: when the last unfinished player leaves mid-round, everyone
/// remaining is finished, so the completion check runs in the same critical
/// section as the removal.
async fn remove_member(
    state: &SharedState,
    lobby_id: &str,
    player_id: Uuid,
) -> Result<(), ServiceError> {
    let handle = state
        .registry()
        .get(lobby_id)
        .ok_or_else(|| lobby_not_found(lobby_id))?;

    let (outcome, snapshot, rankings) = {
        let mut lobby = handle.lock().await;
        let outcome = lobby.remove_player(player_id);
        let rankings = match outcome {
            RemovalOutcome::Removed | RemovalOutcome::HostReassigned(_) => {
                machine::check_completion(&mut lobby)
            }
            _ => None,
        };
        (outcome, lobby.clone(), rankings)
    };

    match outcome {
        RemovalOutcome::NotMember => Err(player_not_found(lobby_id, player_id)),
        RemovalOutcome::LobbyEmpty => {
            state.registry().remove(lobby_id);
            if let Some(store) = state.lobby_store().await {
                let id = lobby_id.to_string();
                mirror(
                    Box::pin(async move { store.delete_lobby(id).await.map(|_| ()) }),
                    "delete_lobby",
                );
            }
            broadcast::publish_lobby_closed(state, lobby_id);
            Ok(())
        }
        outcome => {
            if let Some(store) = state.lobby_store().await {
                mirror(
                    store.remove_player(lobby_id.to_string(), player_id),
                    "remove_player",
                );
                if let RemovalOutcome::HostReassigned(new_host) = outcome {
                    mirror(
                        store.update_host(lobby_id.to_string(), new_host),
                        "update_host",
                    );
                }
                if let Some(ref rankings) = rankings {
                    mirror(
                        store.update_status(lobby_id.to_string(), snapshot.status),
                        "update_status",
                    );
                    let result = GameResultEntity {
                        lobby_id: lobby_id.to_string(),
                        finished_at: SystemTime::now(),
                        rankings: rankings.iter().cloned().map(Into::into).collect(),
                    };
                    mirror(store.save_game_result(result), "save_game_result");
                }
            }
            broadcast::broadcast_player_departed(state, &snapshot, player_id);
            broadcast::broadcast_lobby_snapshot(state, &snapshot);
            if let Some(rankings) = rankings {
                broadcast::broadcast_game_ended(
                    state,
                    &snapshot,
                    rankings.into_iter().map(Into::into).collect(),
                );
            }
            Ok(())
        }
    }
}

/// Leave a lobby. Host authority transfers to the first remaining member by
/// insertion order; the last member out closes the lobby.
pub async fn leave_lobby(
    state: &SharedState,
    lobby_id: &str,
    player_id: Uuid,
) -> Result<(), ServiceError> {
    remove_member(state, lobby_id, player_id).await
}

/// Leave the round and the lobby in one step. Permitted mid-round, unlike a
/// disconnect, which keeps membership.
pub async fn leave_game(
    state: &SharedState,
    lobby_id: &str,
    player_id: Uuid,
) -> Result<(), ServiceError> {
    remove_member(state, lobby_id, player_id).await
}

/// Flip one member's readiness while the lobby is waiting.
///
/// The all-ready auto-start check runs inside the same critical section as
/// the readiness flip, so two racing last-ready updates produce exactly one
/// start.
pub async fn set_player_ready(
    state: &SharedState,
    lobby_id: &str,
    player_id: Uuid,
    ready: bool,
) -> Result<(), ServiceError> {
    let handle = state
        .registry()
        .get(lobby_id)
        .ok_or_else(|| lobby_not_found(lobby_id))?;

    let (snapshot, started) = {
        let mut lobby = handle.lock().await;
        if lobby.status != LobbyStatus::Waiting {
            return Err(ServiceError::InvalidState(
                "readiness can only change while the lobby is waiting".into(),
            ));
        }
        let player = lobby
            .players
            .get_mut(&player_id)
            .ok_or_else(|| player_not_found(lobby_id, player_id))?;
        player.status = if ready {
            PlayerStatus::Ready
        } else {
            PlayerStatus::Joined
        };

        let mut started = false;
        if ready && lobby.all_ready() {
            machine::start_round(&mut lobby, SystemTime::now())?;
            started = true;
        }
        (lobby.clone(), started)
    };

    if let Some(store) = state.lobby_store().await {
        if started {
            mirror_round_shape(&store, &snapshot);
        } else if let Some(player) = snapshot.players.get(&player_id) {
            mirror(
                store.update_player_status(lobby_id.to_string(), player_id, player.status),
                "update_player_status",
            );
        }
    }

    if started {
        broadcast::broadcast_game_started(state, &snapshot);
    } else {
        broadcast::broadcast_lobby_snapshot(state, &snapshot);
    }
    Ok(())
}

/// Host-only merge of new settings into a waiting lobby.
///
/// Present fields replace the current values, absent fields are kept.
/// `max_players` is clamped to the configured ceiling and may not drop below
/// the current roster size.
pub async fn update_settings(
    state: &SharedState,
    lobby_id: &str,
    requester: Uuid,
    input: LobbySettingsInput,
) -> Result<LobbySnapshot, ServiceError> {
    input.validate().map_err(invalid_input)?;
    let handle = state
        .registry()
        .get(lobby_id)
        .ok_or_else(|| lobby_not_found(lobby_id))?;

    let snapshot = {
        let mut lobby = handle.lock().await;
        require_host(&lobby, requester)?;
        if lobby.status != LobbyStatus::Waiting {
            return Err(ServiceError::InvalidState(
                "settings can only change while the lobby is waiting".into(),
            ));
        }
        if let Some(max) = input.max_players {
            let max = max.min(state.config().limits.max_players_ceiling);
            if (max as usize) < lobby.players.len() {
                return Err(ServiceError::InvalidState(format!(
                    "max_players {max} is below the current roster size"
                )));
            }
            lobby.settings.max_players = max;
        }
        if let Some(regions) = input.regions {
            lobby.settings.regions = regions;
        }
        if let Some(count) = input.question_count {
            lobby.settings.question_count = count;
        }
        lobby.clone()
    };

    if let Some(store) = state.lobby_store().await {
        mirror(
            store.update_settings(lobby_id.to_string(), snapshot.settings.clone().into()),
            "update_settings",
        );
    }
    broadcast::broadcast_lobby_snapshot(state, &snapshot);
    Ok(LobbySnapshot::from(&snapshot))
}

/// Host-only manual round start.
pub async fn start_game(
    state: &SharedState,
    lobby_id: &str,
    requester: Uuid,
) -> Result<GameStateSnapshot, ServiceError> {
    let handle = state
        .registry()
        .get(lobby_id)
        .ok_or_else(|| lobby_not_found(lobby_id))?;

    let snapshot = {
        let mut lobby = handle.lock().await;
        require_host(&lobby, requester)?;
        machine::start_round(&mut lobby, SystemTime::now())?;
        lobby.clone()
    };

    if let Some(store) = state.lobby_store().await {
        mirror_round_shape(&store, &snapshot);
    }
    broadcast::broadcast_game_started(state, &snapshot);
    Ok(GameStateSnapshot::from(&snapshot))
}

/// Fold an answer batch into the submitting member's record.
///
/// The terminal all-finished check runs in the same critical section as the
/// update; when it fires, the final standings are broadcast and archived.
pub async fn update_player_progress(
    state: &SharedState,
    lobby_id: &str,
    player_id: Uuid,
    update: ProgressUpdate,
) -> Result<ProgressOutcome, ServiceError> {
    let handle = state
        .registry()
        .get(lobby_id)
        .ok_or_else(|| lobby_not_found(lobby_id))?;
    let scoring = state.config().scoring.clone();

    let (snapshot, outcome, rankings) = {
        let mut lobby = handle.lock().await;
        if lobby.status != LobbyStatus::Playing {
            return Err(ServiceError::InvalidState(
                "progress updates require a running round".into(),
            ));
        }
        let total_questions = update.total_questions.unwrap_or_else(|| {
            lobby
                .round
                .as_ref()
                .map(|round| round.settings.question_count)
                .unwrap_or_default()
        });
        let player = lobby
            .players
            .get_mut(&player_id)
            .ok_or_else(|| player_not_found(lobby_id, player_id))?;

        let batch = AnswerBatch {
            validated: update.validated,
            incorrect: update.incorrect,
            score_delta: update.score_delta,
            total_questions,
            answer_time_ms: update.answer_time_ms,
        };
        let outcome = apply_answer_batch(player, &batch, &scoring);
        let rankings = machine::check_completion(&mut lobby);
        (lobby.clone(), outcome, rankings)
    };

    if let Some(store) = state.lobby_store().await {
        if let Some(player) = snapshot.players.get(&player_id) {
            mirror(
                store.update_player_game_data(lobby_id.to_string(), player_id, player.game_data()),
                "update_player_game_data",
            );
            mirror(
                store.update_player_status(lobby_id.to_string(), player_id, player.status),
                "update_player_status",
            );
        }
        if let Some(ref rankings) = rankings {
            mirror(
                store.update_status(lobby_id.to_string(), snapshot.status),
                "update_status",
            );
            let result = GameResultEntity {
                lobby_id: lobby_id.to_string(),
                finished_at: SystemTime::now(),
                rankings: rankings.iter().cloned().map(Into::into).collect(),
            };
            mirror(store.save_game_result(result), "save_game_result");
        }
    }

    broadcast::broadcast_player_progress(
        state,
        &snapshot,
        player_id,
        outcome.score,
        outcome.progress,
        outcome.finished,
    );
    if let Some(rankings) = rankings {
        broadcast::broadcast_game_ended(
            state,
            &snapshot,
            rankings.into_iter().map(Into::into).collect(),
        );
    }
    Ok(outcome)
}

async fn merged_view(state: &SharedState, lobby_id: &str) -> Result<Lobby, ServiceError> {
    let live = state.registry().snapshot(lobby_id).await;
    let persisted = match state.lobby_store().await {
        Some(store) => match store.find_lobby(lobby_id.to_string()).await {
            Ok(found) => found,
            Err(err) => {
                warn!(lobby_id, error = %err, "persisted lobby lookup failed; serving live state");
                None
            }
        },
        None => None,
    };

    match (live, persisted) {
        (Some(live), persisted) => Ok(reconcile::merged_lobby(&live, persisted.as_ref())),
        (None, Some(entity)) => Ok(entity.into()),
        (None, None) => Err(lobby_not_found(lobby_id)),
    }
}

/// Merged lobby snapshot: membership, settings, status.
pub async fn get_lobby_state(
    state: &SharedState,
    lobby_id: &str,
) -> Result<LobbySnapshot, ServiceError> {
    let merged = merged_view(state, lobby_id).await?;
    Ok(LobbySnapshot::from(&merged))
}

/// Merged game-state snapshot: round data plus per-player accumulators.
pub async fn get_game_state(
    state: &SharedState,
    lobby_id: &str,
) -> Result<GameStateSnapshot, ServiceError> {
    let merged = merged_view(state, lobby_id).await?;
    Ok(GameStateSnapshot::from(&merged))
}

/// Host-only reset of a finished lobby back to waiting.
pub async fn restart_game(
    state: &SharedState,
    lobby_id: &str,
    requester: Uuid,
) -> Result<(), ServiceError> {
    let handle = state
        .registry()
        .get(lobby_id)
        .ok_or_else(|| lobby_not_found(lobby_id))?;

    let snapshot = {
        let mut lobby = handle.lock().await;
        require_host(&lobby, requester)?;
        machine::restart_round(&mut lobby)?;
        lobby.clone()
    };

    if let Some(store) = state.lobby_store().await {
        mirror_round_shape(&store, &snapshot);
    }
    broadcast::broadcast_lobby_snapshot(state, &snapshot);
    Ok(())
}

/// Mark a player disconnected after their socket dropped for good.
///
/// Membership and accumulators are kept so the round survives the outage; the
/// prior status is remembered for the reconnect flip. Idempotent, so flapping
/// sockets collapse into a single effective transition.
pub async fn mark_player_disconnected(state: &SharedState, player_id: Uuid) {
    let Some(handle) = state.registry().find_by_player(player_id).await else {
        return;
    };

    let snapshot = {
        let mut lobby = handle.lock().await;
        let Some(player) = lobby.players.get_mut(&player_id) else {
            return;
        };
        if player.status == PlayerStatus::Disconnected {
            return;
        }
        player.status_before_disconnect = Some(player.status);
        player.status = PlayerStatus::Disconnected;
        lobby.clone()
    };

    if let Some(store) = state.lobby_store().await {
        mirror(
            store.update_player_status(
                snapshot.id.clone(),
                player_id,
                PlayerStatus::Disconnected,
            ),
            "update_player_status",
        );
    }
    broadcast::broadcast_lobby_snapshot(state, &snapshot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, dao::memory::MemoryLobbyStore, state::AppState};
    use std::time::Duration;

    async fn test_state() -> (SharedState, MemoryLobbyStore) {
        let state = AppState::new(AppConfig::default());
        let store = MemoryLobbyStore::new();
        state.set_lobby_store(Arc::new(store.clone())).await;
        (state, store)
    }

    async fn two_player_lobby(state: &SharedState) -> (String, Uuid, Uuid) {
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let lobby = create_lobby(state, host, "host", None).await.unwrap();
        join_lobby(state, &lobby.id, guest, "guest").await.unwrap();
        (lobby.id, host, guest)
    }

    #[tokio::test]
    async fn create_is_refused_in_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let err = create_lobby(&state, Uuid::new_v4(), "host", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }

    #[tokio::test]
    async fn solo_host_ready_auto_starts_the_round() {
        let (state, _store) = test_state().await;
        let host = Uuid::new_v4();
        let lobby = create_lobby(&state, host, "host", None).await.unwrap();

        set_player_ready(&state, &lobby.id, host, true).await.unwrap();

        let live = state.registry().snapshot(&lobby.id).await.unwrap();
        assert_eq!(live.status, LobbyStatus::Playing);
        assert!(live.round.is_some());
    }

    #[tokio::test]
    async fn racing_ready_updates_start_exactly_once() {
        let (state, _store) = test_state().await;
        let (id, host, guest) = two_player_lobby(&state).await;
        set_player_ready(&state, &id, host, true).await.unwrap();

        let first = {
            let state = state.clone();
            let id = id.clone();
            tokio::spawn(async move { set_player_ready(&state, &id, guest, true).await })
        };
        let second = {
            let state = state.clone();
            let id = id.clone();
            tokio::spawn(async move { set_player_ready(&state, &id, guest, true).await })
        };
        let (first, second) = (first.await.unwrap(), second.await.unwrap());

        // One flip wins and starts the round; the other lands on a playing
        // lobby and is a state conflict, never a double start.
        assert!(first.is_ok() ^ second.is_ok());
        let live = state.registry().snapshot(&id).await.unwrap();
        assert_eq!(live.status, LobbyStatus::Playing);
        assert!(live.round.is_some());
    }

    #[tokio::test]
    async fn join_is_refused_when_full_or_unknown() {
        let (state, _store) = test_state().await;
        let host = Uuid::new_v4();
        let settings = LobbySettingsInput {
            max_players: Some(1),
            ..Default::default()
        };
        let lobby = create_lobby(&state, host, "host", Some(settings))
            .await
            .unwrap();

        let err = join_lobby(&state, &lobby.id, Uuid::new_v4(), "late")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let err = join_lobby(&state, "ZZZZZZ", Uuid::new_v4(), "lost")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn non_host_cannot_start_or_restart() {
        let (state, _store) = test_state().await;
        let (id, _host, guest) = two_player_lobby(&state).await;

        let err = start_game(&state, &id, guest).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
        let err = restart_game(&state, &id, guest).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn both_players_finishing_ends_the_round_with_rankings() {
        let (state, store) = test_state().await;
        let (id, host, guest) = two_player_lobby(&state).await;
        set_player_ready(&state, &id, host, true).await.unwrap();
        set_player_ready(&state, &id, guest, true).await.unwrap();

        let update = |validated: Vec<&str>, delta| ProgressUpdate {
            validated: validated.into_iter().map(String::from).collect(),
            incorrect: Vec::new(),
            score_delta: delta,
            total_questions: Some(2),
            answer_time_ms: None,
        };

        let outcome = update_player_progress(&state, &id, host, update(vec!["fr", "de"], 20))
            .await
            .unwrap();
        assert!(outcome.finished);
        assert_eq!(
            state.registry().snapshot(&id).await.unwrap().status,
            LobbyStatus::Playing
        );

        update_player_progress(&state, &id, guest, update(vec!["fr", "de"], 5))
            .await
            .unwrap();
        let live = state.registry().snapshot(&id).await.unwrap();
        assert_eq!(live.status, LobbyStatus::Finished);

        let rankings = live.rankings();
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[0].player_id, host);
        assert_eq!(rankings[0].rank, 1);

        // The archived result is a mirror write; give it a moment to land.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let results = store.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lobby_id, id);
    }

    #[tokio::test]
    async fn last_unfinished_player_leaving_ends_the_round() {
        let (state, store) = test_state().await;
        let (id, host, guest) = two_player_lobby(&state).await;
        set_player_ready(&state, &id, host, true).await.unwrap();
        set_player_ready(&state, &id, guest, true).await.unwrap();

        let outcome = update_player_progress(
            &state,
            &id,
            host,
            ProgressUpdate {
                validated: vec!["fr".into(), "de".into()],
                incorrect: Vec::new(),
                score_delta: 20,
                total_questions: Some(2),
                answer_time_ms: None,
            },
        )
        .await
        .unwrap();
        assert!(outcome.finished);

        // The only unfinished member walks out; the round is over for
        // everyone who stayed.
        leave_game(&state, &id, guest).await.unwrap();

        let live = state.registry().snapshot(&id).await.unwrap();
        assert_eq!(live.status, LobbyStatus::Finished);
        let rankings = live.rankings();
        assert_eq!(rankings.len(), 1);
        assert_eq!(rankings[0].player_id, host);
        assert_eq!(rankings[0].rank, 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let results = store.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lobby_id, id);
    }

    #[tokio::test]
    async fn settings_update_is_host_only_and_waiting_only() {
        let (state, _store) = test_state().await;
        let (id, host, guest) = two_player_lobby(&state).await;

        let input = LobbySettingsInput {
            regions: Some(vec!["africa".into()]),
            question_count: Some(12),
            ..Default::default()
        };
        let err = update_settings(&state, &id, guest, input.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let snapshot = update_settings(&state, &id, host, input.clone())
            .await
            .unwrap();
        assert_eq!(snapshot.settings.regions, vec!["africa".to_string()]);
        assert_eq!(snapshot.settings.question_count, 12);

        set_player_ready(&state, &id, host, true).await.unwrap();
        set_player_ready(&state, &id, guest, true).await.unwrap();
        let err = update_settings(&state, &id, host, input).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn settings_update_cannot_shrink_below_the_roster() {
        let (state, _store) = test_state().await;
        let (id, host, _guest) = two_player_lobby(&state).await;

        let input = LobbySettingsInput {
            max_players: Some(1),
            ..Default::default()
        };
        let err = update_settings(&state, &id, host, input).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let live = state.registry().snapshot(&id).await.unwrap();
        assert_eq!(live.settings.max_players, 8);
    }

    #[tokio::test]
    async fn progress_outside_a_round_is_a_state_conflict() {
        let (state, _store) = test_state().await;
        let (id, host, _guest) = two_player_lobby(&state).await;

        let err = update_player_progress(
            &state,
            &id,
            host,
            ProgressUpdate {
                validated: vec!["fr".into()],
                incorrect: Vec::new(),
                score_delta: 5,
                total_questions: Some(2),
                answer_time_ms: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn disconnect_then_resume_preserves_score_and_status() {
        let (state, _store) = test_state().await;
        let host = Uuid::new_v4();
        let lobby = create_lobby(&state, host, "host", None).await.unwrap();
        set_player_ready(&state, &lobby.id, host, true).await.unwrap();
        update_player_progress(
            &state,
            &lobby.id,
            host,
            ProgressUpdate {
                validated: vec!["fr".into()],
                incorrect: Vec::new(),
                score_delta: 10,
                total_questions: Some(5),
                answer_time_ms: None,
            },
        )
        .await
        .unwrap();

        mark_player_disconnected(&state, host).await;
        {
            let live = state.registry().snapshot(&lobby.id).await.unwrap();
            assert_eq!(live.players[&host].status, PlayerStatus::Disconnected);
        }
        // Flapping sockets report the drop more than once.
        mark_player_disconnected(&state, host).await;

        let resumed = reconcile::resume(&state, host).await.unwrap();
        assert_eq!(resumed.id, lobby.id);
        let live = state.registry().snapshot(&lobby.id).await.unwrap();
        assert_eq!(live.players[&host].status, PlayerStatus::Playing);
        assert!(live.players[&host].score >= 10);
        assert_eq!(live.players[&host].progress, 20.0);
    }

    #[tokio::test]
    async fn restart_resets_players_and_status() {
        let (state, _store) = test_state().await;
        let host = Uuid::new_v4();
        let lobby = create_lobby(&state, host, "host", None).await.unwrap();
        set_player_ready(&state, &lobby.id, host, true).await.unwrap();
        update_player_progress(
            &state,
            &lobby.id,
            host,
            ProgressUpdate {
                validated: vec!["fr".into()],
                incorrect: Vec::new(),
                score_delta: 10,
                total_questions: Some(1),
                answer_time_ms: None,
            },
        )
        .await
        .unwrap();

        restart_game(&state, &lobby.id, host).await.unwrap();
        let live = state.registry().snapshot(&lobby.id).await.unwrap();
        assert_eq!(live.status, LobbyStatus::Waiting);
        assert!(live.round.is_none());
        assert_eq!(live.players[&host].status, PlayerStatus::Joined);
        assert_eq!(live.players[&host].score, 0);
        assert_eq!(live.players[&host].progress, 0.0);
    }

    #[tokio::test]
    async fn host_departure_transfers_authority_and_last_leave_closes() {
        let (state, store) = test_state().await;
        let (id, host, guest) = two_player_lobby(&state).await;

        leave_lobby(&state, &id, host).await.unwrap();
        let live = state.registry().snapshot(&id).await.unwrap();
        assert_eq!(live.host_id, guest);
        assert_eq!(live.players.len(), 1);

        leave_lobby(&state, &id, guest).await.unwrap();
        assert!(state.registry().get(&id).is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let persisted = store.find_lobby(id).await.unwrap();
        assert!(persisted.is_none());
    }
}
