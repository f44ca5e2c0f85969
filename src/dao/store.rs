//! Abstraction over the persistence layer for lobbies and game results.

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    GameResultEntity, LobbyEntity, LobbySettingsEntity, PlayerEntity, PlayerGameDataEntity,
    RoundEntity,
};
use crate::dao::storage::StorageResult;
use crate::state::lobby::{LobbyStatus, PlayerStatus};

/// Repository operations the engine mirrors its in-memory mutations to.
///
/// Every method is best-effort from the caller's perspective: gameplay never
/// blocks on these futures and failures are logged, not propagated.
/// `create_lobby` and the find methods are the exception, since create and
/// join require the initial row to exist.
pub trait LobbyStore: Send + Sync {
    /// Insert the initial lobby row.
    fn create_lobby(&self, lobby: LobbyEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a lobby row by join code.
    fn find_lobby(&self, id: String) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>>;
    /// Fetch the lobby row holding the given player, if any. Used to resume a
    /// session when the lobby is no longer live in memory.
    fn find_lobby_by_player(
        &self,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>>;
    /// Append a player row to a lobby.
    fn add_player(
        &self,
        lobby_id: String,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove a player row from a lobby.
    fn remove_player(
        &self,
        lobby_id: String,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Write the lobby status.
    fn update_status(
        &self,
        lobby_id: String,
        status: LobbyStatus,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Write the host reference after a host transfer.
    fn update_host(&self, lobby_id: String, host_id: Uuid)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Write the lobby settings after a host edit.
    fn update_settings(
        &self,
        lobby_id: String,
        settings: LobbySettingsEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Write one player's status.
    fn update_player_status(
        &self,
        lobby_id: String,
        player_id: Uuid,
        status: PlayerStatus,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Write one player's gameplay accumulation fields.
    fn update_player_game_data(
        &self,
        lobby_id: String,
        player_id: Uuid,
        data: PlayerGameDataEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Write (or clear, on restart) the frozen round data.
    fn save_game_state(
        &self,
        lobby_id: String,
        round: Option<RoundEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Append a finished round's final rankings.
    fn save_game_result(&self, result: GameResultEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a lobby row entirely. Returns whether a row existed.
    fn delete_lobby(&self, id: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Cheap liveness probe used by the supervisor and healthcheck.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to re-establish the backend connection after a failed probe.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
