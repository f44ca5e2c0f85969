//! WebSocket wire protocol: client commands and server push messages.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::lobby::{GameStateSnapshot, LobbySettingsInput, LobbySnapshot, RankingEntryDto},
    error::ServiceError,
};

/// Commands accepted from player WebSocket clients.
///
/// The first frame on every socket must be `identify`; every other command is
/// rejected until the handshake completes.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Handshake. A known `player_id` resumes the previous session; omitting
    /// it mints a fresh identity.
    Identify {
        #[serde(default)]
        player_id: Option<Uuid>,
        name: String,
    },
    /// Open a new lobby with the sender as host.
    CreateLobby {
        #[serde(default)]
        settings: Option<LobbySettingsInput>,
    },
    /// Join an existing lobby by join code.
    JoinLobby { lobby_id: String },
    /// Leave the lobby.
    LeaveLobby { lobby_id: String },
    /// Toggle readiness while the lobby is waiting.
    SetPlayerReady { lobby_id: String, ready: bool },
    /// Host only: merge new settings into a waiting lobby.
    UpdateSettings {
        lobby_id: String,
        settings: LobbySettingsInput,
    },
    /// Host only: start the round.
    StartGame { lobby_id: String },
    /// Submit an answer batch for the round in progress.
    UpdatePlayerProgress {
        lobby_id: String,
        #[serde(default)]
        validated: Vec<String>,
        #[serde(default)]
        incorrect: Vec<String>,
        #[serde(default)]
        score_delta: i32,
        /// Round size the client computed against; defaults to the frozen
        /// round settings when omitted.
        #[serde(default)]
        total_questions: Option<u32>,
        #[serde(default)]
        answer_time_ms: Option<u64>,
    },
    /// Request the current lobby snapshot.
    GetLobbyState { lobby_id: String },
    /// Request the current game-state snapshot.
    GetGameState { lobby_id: String },
    /// Host only: reset a finished lobby back to waiting.
    RestartGame { lobby_id: String },
    /// Leave the round and the lobby in one step.
    LeaveGame { lobby_id: String },
    #[serde(other)]
    Unknown,
}

/// Messages pushed to player WebSocket clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake acknowledgement. `resumed` is set when a previous session
    /// was reconciled instead of a fresh identity minted.
    Identified { player_id: Uuid, resumed: bool },
    /// Full lobby state, pushed after every membership or status change.
    LobbySnapshot { lobby: LobbySnapshot },
    /// The round started.
    GameStarted { game: GameStateSnapshot },
    /// Reply to an explicit game-state request.
    GameState { game: GameStateSnapshot },
    /// One member's score or progress moved.
    PlayerProgress {
        player_id: Uuid,
        score: i32,
        progress: f32,
        finished: bool,
    },
    /// The round completed; final standings attached.
    GameEnded { rankings: Vec<RankingEntryDto> },
    /// A member left for good (explicit leave or expired grace period).
    PlayerDeparted { player_id: Uuid, timestamp: String },
    /// Positive acknowledgement for commands with no richer reply.
    Ack { command: String },
    /// A command failed.
    Error { code: String, message: String },
}

impl ServerMessage {
    /// Error frame for a failed command.
    pub fn error(err: &ServiceError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_deserialize_from_snake_case_tags() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type": "set_player_ready", "lobby_id": "ABCDEF", "ready": true}"#,
        )
        .unwrap();
        assert!(matches!(
            cmd,
            ClientCommand::SetPlayerReady { ready: true, .. }
        ));

        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type": "update_player_progress", "lobby_id": "ABCDEF", "validated": ["fr"], "score_delta": 10}"#,
        )
        .unwrap();
        match cmd {
            ClientCommand::UpdatePlayerProgress {
                lobby_id,
                validated,
                incorrect,
                score_delta,
                total_questions,
                answer_time_ms,
            } => {
                assert_eq!(lobby_id, "ABCDEF");
                assert_eq!(validated, vec!["fr".to_string()]);
                assert!(incorrect.is_empty());
                assert_eq!(score_delta, 10);
                assert_eq!(total_questions, None);
                assert_eq!(answer_time_ms, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_command_tags_fall_through() {
        let cmd: ClientCommand = serde_json::from_str(r#"{"type": "dance"}"#).unwrap();
        assert!(matches!(cmd, ClientCommand::Unknown));
    }

    #[test]
    fn error_frames_carry_the_stable_code() {
        let message = ServerMessage::error(&ServiceError::NotFound("lobby `ABCDEF`".into()));
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""code":"not_found""#));
    }
}
