//! Player WebSocket lifecycle: identify handshake, command dispatch, and
//! debounced disconnect handling.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        validation::validate_player_name,
        ws::{ClientCommand, ServerMessage},
    },
    error::ServiceError,
    services::{reconcile, session_service},
    state::{PlayerConnection, SharedState},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle for an individual player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let (player_id, name) = match parse_identify(&initial_message) {
        Ok(identity) => identity,
        Err(err) => {
            warn!(error = %err, "websocket identification rejected");
            send_message(&outbound_tx, &ServerMessage::error(&err));
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    // A reconnect replaces any previous connection entry; the stale socket's
    // writer fails on its next send and cleans itself up.
    state.connections().insert(
        player_id,
        PlayerConnection {
            id: player_id,
            tx: outbound_tx.clone(),
        },
    );
    info!(player_id = %player_id, name = %name, "player connected");

    let resumed = reconcile::resume(&state, player_id).await;
    send_message(
        &outbound_tx,
        &ServerMessage::Identified {
            player_id,
            resumed: resumed.is_some(),
        },
    );
    if let Some(lobby) = resumed {
        send_message(&outbound_tx, &ServerMessage::LobbySnapshot { lobby });
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(command) => {
                    handle_command(&state, player_id, &name, &outbound_tx, command).await;
                }
                Err(err) => {
                    warn!(player_id = %player_id, error = %err, "unparseable command");
                    let err = ServiceError::InvalidInput(err.to_string());
                    send_message(&outbound_tx, &ServerMessage::error(&err));
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(player_id = %player_id, "player closed the socket");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(player_id = %player_id, error = %err, "websocket error");
                break;
            }
        }
    }

    // Only evict the entry when it is still ours; a reconnect may already
    // have replaced it.
    let is_current = state
        .connections()
        .get(&player_id)
        .is_some_and(|conn| conn.tx.same_channel(&outbound_tx));
    if is_current {
        state.connections().remove(&player_id);
    }
    info!(player_id = %player_id, "player disconnected");

    // Debounce: only mark the player disconnected once the grace period
    // passes without a reconnect.
    let grace = state.config().disconnect_grace();
    let state_for_grace = state.clone();
    tokio::spawn(async move {
        sleep(grace).await;
        if state_for_grace.connections().contains_key(&player_id) {
            return;
        }
        session_service::mark_player_disconnected(&state_for_grace, player_id).await;
    });

    finalize(writer_task, outbound_tx).await;
}

fn parse_identify(text: &str) -> Result<(Uuid, String), ServiceError> {
    let command: ClientCommand =
        serde_json::from_str(text).map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    let ClientCommand::Identify { player_id, name } = command else {
        return Err(ServiceError::InvalidInput(
            "first message must be `identify`".into(),
        ));
    };
    validate_player_name(&name).map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    Ok((player_id.unwrap_or_else(Uuid::new_v4), name.trim().to_string()))
}

async fn handle_command(
    state: &SharedState,
    player_id: Uuid,
    name: &str,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    command: ClientCommand,
) {
    let result: Result<ServerMessage, ServiceError> = match command {
        ClientCommand::Identify { .. } => {
            warn!(player_id = %player_id, "ignoring duplicate identify");
            return;
        }
        ClientCommand::CreateLobby { settings } => {
            session_service::create_lobby(state, player_id, name, settings)
                .await
                .map(|lobby| ServerMessage::LobbySnapshot { lobby })
        }
        ClientCommand::JoinLobby { lobby_id } => {
            session_service::join_lobby(state, &lobby_id, player_id, name)
                .await
                .map(|lobby| ServerMessage::LobbySnapshot { lobby })
        }
        ClientCommand::LeaveLobby { lobby_id } => {
            session_service::leave_lobby(state, &lobby_id, player_id)
                .await
                .map(|()| ack("leave_lobby"))
        }
        ClientCommand::SetPlayerReady { lobby_id, ready } => {
            session_service::set_player_ready(state, &lobby_id, player_id, ready)
                .await
                .map(|()| ack("set_player_ready"))
        }
        ClientCommand::UpdateSettings { lobby_id, settings } => {
            session_service::update_settings(state, &lobby_id, player_id, settings)
                .await
                .map(|lobby| ServerMessage::LobbySnapshot { lobby })
        }
        ClientCommand::StartGame { lobby_id } => {
            session_service::start_game(state, &lobby_id, player_id)
                .await
                .map(|game| ServerMessage::GameStarted { game })
        }
        ClientCommand::UpdatePlayerProgress {
            lobby_id,
            validated,
            incorrect,
            score_delta,
            total_questions,
            answer_time_ms,
        } => {
            let update = session_service::ProgressUpdate {
                validated,
                incorrect,
                score_delta,
                total_questions,
                answer_time_ms,
            };
            session_service::update_player_progress(state, &lobby_id, player_id, update)
                .await
                .map(|outcome| ServerMessage::PlayerProgress {
                    player_id,
                    score: outcome.score,
                    progress: outcome.progress,
                    finished: outcome.finished,
                })
        }
        ClientCommand::GetLobbyState { lobby_id } => {
            session_service::get_lobby_state(state, &lobby_id)
                .await
                .map(|lobby| ServerMessage::LobbySnapshot { lobby })
        }
        ClientCommand::GetGameState { lobby_id } => {
            session_service::get_game_state(state, &lobby_id)
                .await
                .map(|game| ServerMessage::GameState { game })
        }
        ClientCommand::RestartGame { lobby_id } => {
            session_service::restart_game(state, &lobby_id, player_id)
                .await
                .map(|()| ack("restart_game"))
        }
        ClientCommand::LeaveGame { lobby_id } => {
            session_service::leave_game(state, &lobby_id, player_id)
                .await
                .map(|()| ack("leave_game"))
        }
        ClientCommand::Unknown => Err(ServiceError::InvalidInput(
            "unknown command type".into(),
        )),
    };

    match result {
        Ok(message) => send_message(outbound_tx, &message),
        Err(err) => {
            warn!(player_id = %player_id, error = %err, "command rejected");
            send_message(outbound_tx, &ServerMessage::error(&err));
        }
    }
}

fn ack(command: &str) -> ServerMessage {
    ServerMessage::Ack {
        command: command.to_string(),
    }
}

/// Serialize a payload and push it onto the socket's outbound queue. A closed
/// writer is left to the main loop to notice.
fn send_message(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize server message"),
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::memory::MemoryLobbyStore,
        state::{AppState, lobby::PlayerStatus},
    };
    use serde_json::Value;
    use std::sync::Arc;

    async fn test_state() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .set_lobby_store(Arc::new(MemoryLobbyStore::new()))
            .await;
        state
    }

    fn parse(message: Message) -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_game_replies_with_the_game_snapshot() {
        let state = test_state().await;
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let lobby = session_service::create_lobby(&state, host, "host", None)
            .await
            .unwrap();
        session_service::join_lobby(&state, &lobby.id, guest, "guest")
            .await
            .unwrap();
        {
            let handle = state.registry().get(&lobby.id).unwrap();
            let mut live = handle.lock().await;
            for player in live.players.values_mut() {
                player.status = PlayerStatus::Ready;
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_command(
            &state,
            host,
            "host",
            &tx,
            ClientCommand::StartGame {
                lobby_id: lobby.id.clone(),
            },
        )
        .await;

        let reply = parse(rx.recv().await.unwrap());
        assert_eq!(reply["type"], "game_started");
        assert_eq!(reply["game"]["lobby_id"], lobby.id);
        assert_eq!(reply["game"]["status"], "playing");
        assert!(reply["game"]["started_at"].is_string());
    }

    #[tokio::test]
    async fn progress_update_replies_with_the_player_progress() {
        let state = test_state().await;
        let host = Uuid::new_v4();
        let lobby = session_service::create_lobby(&state, host, "host", None)
            .await
            .unwrap();
        session_service::set_player_ready(&state, &lobby.id, host, true)
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_command(
            &state,
            host,
            "host",
            &tx,
            ClientCommand::UpdatePlayerProgress {
                lobby_id: lobby.id.clone(),
                validated: vec!["fr".into()],
                incorrect: Vec::new(),
                score_delta: 10,
                total_questions: Some(4),
                answer_time_ms: None,
            },
        )
        .await;

        let reply = parse(rx.recv().await.unwrap());
        assert_eq!(reply["type"], "player_progress");
        assert_eq!(reply["player_id"], host.to_string());
        assert_eq!(reply["progress"], 25.0);
        assert_eq!(reply["finished"], false);
    }
}
