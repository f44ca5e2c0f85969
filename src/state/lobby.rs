//! Runtime lobby model: membership, per-player bookkeeping, and rankings.

use std::collections::BTreeSet;
use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{
    LobbyEntity, LobbySettingsEntity, PlayerEntity, PlayerGameDataEntity, RankingEntryEntity,
    RoundEntity,
};

/// Lifecycle phase of a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    /// Players are gathering and marking themselves ready.
    Waiting,
    /// A round is in progress.
    Playing,
    /// The round ended; final rankings are available until a restart.
    Finished,
}

/// Presence and readiness of a single player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    /// Member of the lobby, not yet ready.
    Joined,
    /// Ready for the round to start.
    Ready,
    /// Actively answering questions.
    Playing,
    /// Answered every question of the round.
    Finished,
    /// Connection lost; still a round participant until an explicit leave.
    Disconnected,
}

/// Typed lobby configuration. The engine validates bounds at the edge and
/// merges updates, but never interprets the region identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySettings {
    /// Region identifiers the round draws questions from.
    pub regions: Vec<String>,
    /// Number of questions asked per round.
    pub question_count: u32,
    /// Maximum number of players allowed in the lobby.
    pub max_players: u32,
}

/// Frozen data describing the round currently in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundState {
    /// Wall-clock instant the round started.
    pub started_at: SystemTime,
    /// Settings snapshot taken when the round started.
    pub settings: LobbySettings,
}

/// Live bookkeeping for one player, owned exclusively by its lobby.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    /// Stable player identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Presence and readiness.
    pub status: PlayerStatus,
    /// Accumulated score, monotonically non-decreasing within a round.
    pub score: i32,
    /// Completion percentage in `[0, 100]`, non-decreasing within a round.
    pub progress: f32,
    /// Correctly answered country identifiers, append-only within a round.
    pub validated_countries: BTreeSet<String>,
    /// Incorrectly answered country identifiers, append-only within a round.
    pub incorrect_countries: BTreeSet<String>,
    /// Elapsed milliseconds of the most recent answer, bonus input only.
    pub last_answer_ms: Option<u64>,
    /// Running correct-answer streak, bonus input only.
    pub consecutive_correct: u32,
    /// Status the player held before a disconnect, restored on reconnect.
    pub status_before_disconnect: Option<PlayerStatus>,
}

impl PlayerRecord {
    /// Fresh record for a player entering the lobby.
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: PlayerStatus::Joined,
            score: 0,
            progress: 0.0,
            validated_countries: BTreeSet::new(),
            incorrect_countries: BTreeSet::new(),
            last_answer_ms: None,
            consecutive_correct: 0,
            status_before_disconnect: None,
        }
    }

    /// Zero every round accumulator and set the given status.
    pub fn reset_round(&mut self, status: PlayerStatus) {
        self.status = status;
        self.score = 0;
        self.progress = 0.0;
        self.validated_countries.clear();
        self.incorrect_countries.clear();
        self.last_answer_ms = None;
        self.consecutive_correct = 0;
        self.status_before_disconnect = None;
    }

    /// Number of answered questions so far.
    pub fn total_answered(&self) -> usize {
        self.validated_countries.len() + self.incorrect_countries.len()
    }

    /// Gameplay accumulation fields as persisted by a mirror write.
    pub fn game_data(&self) -> PlayerGameDataEntity {
        PlayerGameDataEntity {
            score: self.score,
            progress: self.progress,
            validated_countries: self.validated_countries.iter().cloned().collect(),
            incorrect_countries: self.incorrect_countries.iter().cloned().collect(),
        }
    }
}

/// One line of the final ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingEntry {
    /// 1-based position, no rank sharing.
    pub rank: u32,
    /// Ranked player.
    pub player_id: Uuid,
    /// Display name.
    pub name: String,
    /// Final score.
    pub score: i32,
    /// Final progress percentage.
    pub progress: f32,
}

/// Outcome of removing a player from a lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The player was not a member; nothing changed.
    NotMember,
    /// The player left; membership and host are unchanged otherwise.
    Removed,
    /// The departing player was host; authority moved to the given member.
    HostReassigned(Uuid),
    /// The last member left; the lobby must be dropped from the registry.
    LobbyEmpty,
}

/// In-memory lobby: the single source of truth during live play.
#[derive(Debug, Clone, PartialEq)]
pub struct Lobby {
    /// Join code identifying the lobby.
    pub id: String,
    /// Player holding host authority. Always a roster key.
    pub host_id: Uuid,
    /// Lifecycle phase.
    pub status: LobbyStatus,
    /// Current configuration.
    pub settings: LobbySettings,
    /// Roster in insertion order; the order is the host-reassignment order.
    pub players: IndexMap<Uuid, PlayerRecord>,
    /// Round data, present exactly while `status != Waiting`.
    pub round: Option<RoundState>,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

impl Lobby {
    /// Create a lobby with its host as the only member.
    pub fn new(id: String, host_id: Uuid, host_name: impl Into<String>, settings: LobbySettings) -> Self {
        let mut players = IndexMap::new();
        players.insert(host_id, PlayerRecord::new(host_id, host_name));
        Self {
            id,
            host_id,
            status: LobbyStatus::Waiting,
            settings,
            players,
            round: None,
            created_at: SystemTime::now(),
        }
    }

    /// Add a member. Idempotent: re-adding an existing player succeeds
    /// without touching their record.
    pub fn add_player(&mut self, player_id: Uuid, name: impl Into<String>) -> bool {
        if self.players.contains_key(&player_id) {
            return true;
        }
        self.players
            .insert(player_id, PlayerRecord::new(player_id, name));
        true
    }

    /// Remove a member, reassigning the host to the first remaining roster
    /// entry when the host departs.
    pub fn remove_player(&mut self, player_id: Uuid) -> RemovalOutcome {
        if self.players.shift_remove(&player_id).is_none() {
            return RemovalOutcome::NotMember;
        }

        if self.players.is_empty() {
            return RemovalOutcome::LobbyEmpty;
        }

        if self.host_id == player_id {
            // Insertion order keeps the choice deterministic.
            let next_host = *self
                .players
                .keys()
                .next()
                .expect("roster checked non-empty above");
            self.host_id = next_host;
            return RemovalOutcome::HostReassigned(next_host);
        }

        RemovalOutcome::Removed
    }

    /// Whether the lobby is at its configured capacity.
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.settings.max_players as usize
    }

    /// Whether every member is ready. False for an empty roster.
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty()
            && self
                .players
                .values()
                .all(|player| player.status == PlayerStatus::Ready)
    }

    /// Whether every member finished the round. Disconnected players count
    /// once their progress reached 100 before the drop.
    pub fn all_finished(&self) -> bool {
        !self.players.is_empty()
            && self.players.values().all(|player| {
                player.status == PlayerStatus::Finished || player.progress >= 100.0
            })
    }

    /// Total order over the roster: score descending, progress descending,
    /// roster order as the final stable key. Ranks are distinct and 1-based.
    pub fn rankings(&self) -> Vec<RankingEntry> {
        let mut ordered: Vec<&PlayerRecord> = self.players.values().collect();
        ordered.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.progress.total_cmp(&a.progress))
        });

        ordered
            .into_iter()
            .enumerate()
            .map(|(index, player)| RankingEntry {
                rank: index as u32 + 1,
                player_id: player.id,
                name: player.name.clone(),
                score: player.score,
                progress: player.progress,
            })
            .collect()
    }
}

impl From<LobbySettingsEntity> for LobbySettings {
    fn from(value: LobbySettingsEntity) -> Self {
        Self {
            regions: value.regions,
            question_count: value.question_count,
            max_players: value.max_players,
        }
    }
}

impl From<LobbySettings> for LobbySettingsEntity {
    fn from(value: LobbySettings) -> Self {
        Self {
            regions: value.regions,
            question_count: value.question_count,
            max_players: value.max_players,
        }
    }
}

impl From<RoundEntity> for RoundState {
    fn from(value: RoundEntity) -> Self {
        Self {
            started_at: value.started_at,
            settings: value.settings.into(),
        }
    }
}

impl From<RoundState> for RoundEntity {
    fn from(value: RoundState) -> Self {
        Self {
            started_at: value.started_at,
            settings: value.settings.into(),
        }
    }
}

impl From<PlayerEntity> for PlayerRecord {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            status: value.status,
            score: value.score,
            progress: value.progress,
            validated_countries: value.validated_countries.into_iter().collect(),
            incorrect_countries: value.incorrect_countries.into_iter().collect(),
            last_answer_ms: None,
            consecutive_correct: 0,
            status_before_disconnect: None,
        }
    }
}

impl From<PlayerRecord> for PlayerEntity {
    fn from(value: PlayerRecord) -> Self {
        Self {
            id: value.id,
            name: value.name,
            status: value.status,
            score: value.score,
            progress: value.progress,
            validated_countries: value.validated_countries.into_iter().collect(),
            incorrect_countries: value.incorrect_countries.into_iter().collect(),
            updated_at: SystemTime::now(),
        }
    }
}

impl From<LobbyEntity> for Lobby {
    fn from(value: LobbyEntity) -> Self {
        Self {
            id: value.id,
            host_id: value.host_id,
            status: value.status,
            settings: value.settings.into(),
            players: value
                .players
                .into_iter()
                .map(|row| (row.id, row.into()))
                .collect(),
            round: value.round.map(Into::into),
            created_at: value.created_at,
        }
    }
}

impl From<Lobby> for LobbyEntity {
    fn from(value: Lobby) -> Self {
        Self {
            id: value.id,
            host_id: value.host_id,
            status: value.status,
            settings: value.settings.into(),
            players: value.players.into_values().map(Into::into).collect(),
            round: value.round.map(Into::into),
            created_at: value.created_at,
            updated_at: SystemTime::now(),
        }
    }
}

impl From<RankingEntry> for RankingEntryEntity {
    fn from(value: RankingEntry) -> Self {
        Self {
            rank: value.rank,
            player_id: value.player_id,
            name: value.name,
            score: value.score,
            progress: value.progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LobbySettings {
        LobbySettings {
            regions: vec!["europe".into()],
            question_count: 10,
            max_players: 8,
        }
    }

    fn lobby_with(host: Uuid, others: &[Uuid]) -> Lobby {
        let mut lobby = Lobby::new("QWERTY".into(), host, "host", settings());
        for (index, id) in others.iter().enumerate() {
            lobby.add_player(*id, format!("player-{index}"));
        }
        lobby
    }

    #[test]
    fn add_player_is_idempotent() {
        let host = Uuid::new_v4();
        let mut lobby = lobby_with(host, &[]);
        lobby.players.get_mut(&host).unwrap().score = 42;

        assert!(lobby.add_player(host, "renamed"));
        assert_eq!(lobby.players.len(), 1);
        assert_eq!(lobby.players[&host].score, 42);
        assert_eq!(lobby.players[&host].name, "host");
    }

    #[test]
    fn removing_host_reassigns_to_first_remaining_member() {
        let host = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();
        let mut lobby = lobby_with(host, &[second, third]);

        assert_eq!(
            lobby.remove_player(host),
            RemovalOutcome::HostReassigned(second)
        );
        assert_eq!(lobby.host_id, second);
        assert_eq!(lobby.players.len(), 2);
    }

    #[test]
    fn removing_last_player_empties_the_lobby() {
        let host = Uuid::new_v4();
        let mut lobby = lobby_with(host, &[]);
        assert_eq!(lobby.remove_player(host), RemovalOutcome::LobbyEmpty);
    }

    #[test]
    fn removing_unknown_player_is_reported() {
        let host = Uuid::new_v4();
        let mut lobby = lobby_with(host, &[]);
        assert_eq!(lobby.remove_player(Uuid::new_v4()), RemovalOutcome::NotMember);
        assert_eq!(lobby.players.len(), 1);
    }

    #[test]
    fn rankings_order_by_score_then_progress_with_distinct_ranks() {
        let host = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();
        let mut lobby = lobby_with(host, &[second, third]);

        lobby.players[&host].score = 50;
        lobby.players[&host].progress = 40.0;
        lobby.players[&second].score = 50;
        lobby.players[&second].progress = 80.0;
        lobby.players[&third].score = 90;
        lobby.players[&third].progress = 10.0;

        let rankings = lobby.rankings();
        assert_eq!(rankings[0].player_id, third);
        assert_eq!(rankings[1].player_id, second);
        assert_eq!(rankings[2].player_id, host);
        assert_eq!(
            rankings.iter().map(|entry| entry.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn exact_ties_keep_roster_order_and_distinct_ranks() {
        let host = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut lobby = lobby_with(host, &[second]);
        lobby.players[&host].score = 10;
        lobby.players[&second].score = 10;

        let rankings = lobby.rankings();
        assert_eq!(rankings[0].player_id, host);
        assert_eq!(rankings[0].rank, 1);
        assert_eq!(rankings[1].player_id, second);
        assert_eq!(rankings[1].rank, 2);
    }

    #[test]
    fn all_ready_requires_every_member() {
        let host = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut lobby = lobby_with(host, &[second]);

        assert!(!lobby.all_ready());
        lobby.players[&host].status = PlayerStatus::Ready;
        assert!(!lobby.all_ready());
        lobby.players[&second].status = PlayerStatus::Ready;
        assert!(lobby.all_ready());
    }

    #[test]
    fn entity_round_trip_preserves_roster_order() {
        let host = Uuid::new_v4();
        let second = Uuid::new_v4();
        let lobby = lobby_with(host, &[second]);

        let entity: LobbyEntity = lobby.clone().into();
        let restored: Lobby = entity.into();

        assert_eq!(
            restored.players.keys().collect::<Vec<_>>(),
            lobby.players.keys().collect::<Vec<_>>()
        );
        assert_eq!(restored.host_id, host);
        assert_eq!(restored.status, LobbyStatus::Waiting);
    }
}
