//! In-memory [`LobbyStore`] used by tests and storage-less development runs.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    GameResultEntity, LobbyEntity, LobbySettingsEntity, PlayerEntity, PlayerGameDataEntity,
    RoundEntity,
};
use crate::dao::storage::StorageResult;
use crate::dao::store::LobbyStore;
use crate::state::lobby::{LobbyStatus, PlayerStatus};

/// Process-local store keeping every row in maps. Mutations follow upsert
/// semantics: updates against a missing lobby are silently dropped, matching
/// the mirror-write contract where rows may lag behind live state.
#[derive(Clone, Default)]
pub struct MemoryLobbyStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    lobbies: DashMap<String, LobbyEntity>,
    results: Mutex<Vec<GameResultEntity>>,
}

impl MemoryLobbyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the results recorded so far, newest last.
    pub fn results(&self) -> Vec<GameResultEntity> {
        self.inner
            .results
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn with_lobby(&self, id: &str, mutate: impl FnOnce(&mut LobbyEntity)) {
        if let Some(mut entry) = self.inner.lobbies.get_mut(id) {
            mutate(entry.value_mut());
            entry.updated_at = SystemTime::now();
        }
    }
}

impl LobbyStore for MemoryLobbyStore {
    fn create_lobby(&self, lobby: LobbyEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.lobbies.insert(lobby.id.clone(), lobby);
        Box::pin(std::future::ready(Ok(())))
    }

    fn find_lobby(&self, id: String) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>> {
        let found = self.inner.lobbies.get(&id).map(|entry| entry.clone());
        Box::pin(std::future::ready(Ok(found)))
    }

    fn find_lobby_by_player(
        &self,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>> {
        let found = self
            .inner
            .lobbies
            .iter()
            .find(|entry| entry.players.iter().any(|row| row.id == player_id))
            .map(|entry| entry.clone());
        Box::pin(std::future::ready(Ok(found)))
    }

    fn add_player(
        &self,
        lobby_id: String,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_lobby(&lobby_id, |lobby| {
            if let Some(existing) = lobby.players.iter_mut().find(|row| row.id == player.id) {
                *existing = player;
            } else {
                lobby.players.push(player);
            }
        });
        Box::pin(std::future::ready(Ok(())))
    }

    fn remove_player(
        &self,
        lobby_id: String,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_lobby(&lobby_id, |lobby| {
            lobby.players.retain(|row| row.id != player_id);
        });
        Box::pin(std::future::ready(Ok(())))
    }

    fn update_status(
        &self,
        lobby_id: String,
        status: LobbyStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_lobby(&lobby_id, |lobby| lobby.status = status);
        Box::pin(std::future::ready(Ok(())))
    }

    fn update_host(
        &self,
        lobby_id: String,
        host_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_lobby(&lobby_id, |lobby| lobby.host_id = host_id);
        Box::pin(std::future::ready(Ok(())))
    }

    fn update_settings(
        &self,
        lobby_id: String,
        settings: LobbySettingsEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_lobby(&lobby_id, |lobby| lobby.settings = settings);
        Box::pin(std::future::ready(Ok(())))
    }

    fn update_player_status(
        &self,
        lobby_id: String,
        player_id: Uuid,
        status: PlayerStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_lobby(&lobby_id, |lobby| {
            if let Some(row) = lobby.players.iter_mut().find(|row| row.id == player_id) {
                row.status = status;
                row.updated_at = SystemTime::now();
            }
        });
        Box::pin(std::future::ready(Ok(())))
    }

    fn update_player_game_data(
        &self,
        lobby_id: String,
        player_id: Uuid,
        data: PlayerGameDataEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_lobby(&lobby_id, |lobby| {
            if let Some(row) = lobby.players.iter_mut().find(|row| row.id == player_id) {
                row.score = data.score;
                row.progress = data.progress;
                row.validated_countries = data.validated_countries;
                row.incorrect_countries = data.incorrect_countries;
                row.updated_at = SystemTime::now();
            }
        });
        Box::pin(std::future::ready(Ok(())))
    }

    fn save_game_state(
        &self,
        lobby_id: String,
        round: Option<RoundEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_lobby(&lobby_id, |lobby| lobby.round = round);
        Box::pin(std::future::ready(Ok(())))
    }

    fn save_game_result(
        &self,
        result: GameResultEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        if let Ok(mut guard) = self.inner.results.lock() {
            guard.push(result);
        }
        Box::pin(std::future::ready(Ok(())))
    }

    fn delete_lobby(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self.inner.lobbies.remove(&id).is_some();
        Box::pin(std::future::ready(Ok(removed)))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(std::future::ready(Ok(())))
    }
}
