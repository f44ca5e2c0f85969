//! Entities shared between the storage backends and the runtime state.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::lobby::{LobbyStatus, PlayerStatus};

/// Typed lobby configuration persisted alongside the lobby row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LobbySettingsEntity {
    /// Region identifiers the round draws questions from.
    pub regions: Vec<String>,
    /// Number of questions asked per round.
    pub question_count: u32,
    /// Maximum number of players allowed in the lobby.
    pub max_players: u32,
}

/// Frozen round data stored while a game is in progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundEntity {
    /// Wall-clock instant the round started.
    pub started_at: SystemTime,
    /// Snapshot of the lobby settings taken at start.
    pub settings: LobbySettingsEntity,
}

/// Persisted representation of a player inside a lobby.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerEntity {
    /// Stable player identifier.
    pub id: Uuid,
    /// Display name from the user identity record.
    pub name: String,
    /// Last durably written player status.
    pub status: PlayerStatus,
    /// Accumulated score for the current round.
    pub score: i32,
    /// Round completion percentage in `[0, 100]`.
    pub progress: f32,
    /// Identifiers of correctly answered countries.
    pub validated_countries: Vec<String>,
    /// Identifiers of incorrectly answered countries.
    pub incorrect_countries: Vec<String>,
    /// Last time this row was written.
    pub updated_at: SystemTime,
}

/// Per-player gameplay accumulation fields written after a progress update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerGameDataEntity {
    /// Accumulated score for the current round.
    pub score: i32,
    /// Round completion percentage in `[0, 100]`.
    pub progress: f32,
    /// Identifiers of correctly answered countries.
    pub validated_countries: Vec<String>,
    /// Identifiers of incorrectly answered countries.
    pub incorrect_countries: Vec<String>,
}

/// Aggregate lobby row persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LobbyEntity {
    /// Join code identifying the lobby.
    pub id: String,
    /// Player holding host authority.
    pub host_id: Uuid,
    /// Last durably written lobby status.
    pub status: LobbyStatus,
    /// Lobby configuration.
    pub settings: LobbySettingsEntity,
    /// Member rows in roster order.
    pub players: Vec<PlayerEntity>,
    /// Round data, present while the lobby is not waiting.
    pub round: Option<RoundEntity>,
    /// Creation timestamp for auditing.
    pub created_at: SystemTime,
    /// Last time the lobby row was written.
    pub updated_at: SystemTime,
}

/// One line of a final ranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingEntryEntity {
    /// 1-based position in the final ordering.
    pub rank: u32,
    /// Ranked player.
    pub player_id: Uuid,
    /// Display name at the time the round ended.
    pub name: String,
    /// Final score.
    pub score: i32,
    /// Final progress percentage.
    pub progress: f32,
}

/// Final outcome of a finished round, kept for later inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameResultEntity {
    /// Lobby the round was played in.
    pub lobby_id: String,
    /// Instant the last player finished.
    pub finished_at: SystemTime,
    /// Final ordering, best first.
    pub rankings: Vec<RankingEntryEntity>,
}
