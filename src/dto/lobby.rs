//! Request payloads and projections for lobbies and in-flight games.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    config::LobbyLimits,
    dto::{format_system_time, validation::validate_regions},
    state::lobby::{Lobby, LobbySettings, LobbyStatus, PlayerStatus, RankingEntry},
};

/// Lobby settings supplied by the host; omitted fields fall back to the
/// configured defaults.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LobbySettingsInput {
    /// Region identifiers the round draws questions from.
    #[serde(default)]
    pub regions: Option<Vec<String>>,
    /// Number of questions asked per round.
    #[serde(default)]
    pub question_count: Option<u32>,
    /// Maximum number of players allowed in the lobby.
    #[serde(default)]
    pub max_players: Option<u32>,
}

impl Validate for LobbySettingsInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(ref regions) = self.regions {
            if let Err(e) = validate_regions(regions) {
                errors.add("regions", e);
            }
        }
        if let Some(count) = self.question_count {
            if count == 0 {
                errors.add(
                    "question_count",
                    validator::ValidationError::new("question_count_zero"),
                );
            }
        }
        if let Some(max) = self.max_players {
            if max == 0 {
                errors.add(
                    "max_players",
                    validator::ValidationError::new("max_players_zero"),
                );
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl LobbySettingsInput {
    /// Resolve the input against the configured defaults and bounds.
    pub fn resolve(self, limits: &LobbyLimits) -> LobbySettings {
        LobbySettings {
            regions: self.regions.unwrap_or_else(|| vec!["world".into()]),
            question_count: self
                .question_count
                .unwrap_or(limits.default_question_count),
            max_players: self
                .max_players
                .unwrap_or(limits.default_max_players)
                .min(limits.max_players_ceiling),
        }
    }
}

/// Lobby settings as exposed to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LobbySettingsDto {
    pub regions: Vec<String>,
    pub question_count: u32,
    pub max_players: u32,
}

impl From<LobbySettings> for LobbySettingsDto {
    fn from(settings: LobbySettings) -> Self {
        Self {
            regions: settings.regions,
            question_count: settings.question_count,
            max_players: settings.max_players,
        }
    }
}

/// Public projection of one roster member.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerSummary {
    pub id: Uuid,
    pub name: String,
    pub status: PlayerStatus,
    pub score: i32,
    pub progress: f32,
    pub is_host: bool,
}

/// Full lobby state pushed to members and returned by the REST read.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LobbySnapshot {
    /// Join code.
    pub id: String,
    pub host_id: Uuid,
    pub status: LobbyStatus,
    pub settings: LobbySettingsDto,
    pub players: Vec<PlayerSummary>,
    pub created_at: String,
}

impl From<&Lobby> for LobbySnapshot {
    fn from(lobby: &Lobby) -> Self {
        Self {
            id: lobby.id.clone(),
            host_id: lobby.host_id,
            status: lobby.status,
            settings: lobby.settings.clone().into(),
            players: lobby
                .players
                .values()
                .map(|player| PlayerSummary {
                    id: player.id,
                    name: player.name.clone(),
                    status: player.status,
                    score: player.score,
                    progress: player.progress,
                    is_host: player.id == lobby.host_id,
                })
                .collect(),
            created_at: format_system_time(lobby.created_at),
        }
    }
}

/// Per-player game detail included in the game-state read.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerGameSummary {
    pub id: Uuid,
    pub name: String,
    pub status: PlayerStatus,
    pub score: i32,
    pub progress: f32,
    pub validated_countries: Vec<String>,
    pub incorrect_countries: Vec<String>,
}

/// Round-scoped state: frozen settings plus per-player accumulators.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameStateSnapshot {
    /// Join code of the owning lobby.
    pub lobby_id: String,
    pub status: LobbyStatus,
    /// RFC 3339 instant the round started, absent while waiting.
    pub started_at: Option<String>,
    /// Settings frozen at round start, absent while waiting.
    pub round_settings: Option<LobbySettingsDto>,
    pub players: Vec<PlayerGameSummary>,
}

impl From<&Lobby> for GameStateSnapshot {
    fn from(lobby: &Lobby) -> Self {
        Self {
            lobby_id: lobby.id.clone(),
            status: lobby.status,
            started_at: lobby
                .round
                .as_ref()
                .map(|round| format_system_time(round.started_at)),
            round_settings: lobby
                .round
                .as_ref()
                .map(|round| round.settings.clone().into()),
            players: lobby
                .players
                .values()
                .map(|player| PlayerGameSummary {
                    id: player.id,
                    name: player.name.clone(),
                    status: player.status,
                    score: player.score,
                    progress: player.progress,
                    validated_countries: player.validated_countries.iter().cloned().collect(),
                    incorrect_countries: player.incorrect_countries.iter().cloned().collect(),
                })
                .collect(),
        }
    }
}

/// One row of the final standings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankingEntryDto {
    pub rank: u32,
    pub player_id: Uuid,
    pub name: String,
    pub score: i32,
    pub progress: f32,
}

impl From<RankingEntry> for RankingEntryDto {
    fn from(entry: RankingEntry) -> Self {
        Self {
            rank: entry.rank,
            player_id: entry.player_id,
            name: entry.name,
            score: entry.score,
            progress: entry.progress,
        }
    }
}
