//! Registry of active lobbies: the single source of truth during live play.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::dao::models::LobbyEntity;
use crate::state::lobby::{Lobby, LobbySettings, PlayerStatus, RemovalOutcome};

/// Error raised when creating a lobby under a join code that is already live.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("lobby `{0}` is already active")]
pub struct AlreadyActive(pub String);

/// Concurrency-safe map of active lobbies keyed by join code.
///
/// Each lobby sits behind its own async mutex: every mutation to one lobby is
/// serialized, while distinct lobbies proceed fully in parallel. Callers that
/// need multi-step atomicity (ready-then-auto-start, progress-then-completion)
/// take the lock once around the whole sequence.
#[derive(Default)]
pub struct LobbyRegistry {
    lobbies: DashMap<String, Arc<Mutex<Lobby>>>,
}

impl LobbyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a lobby with its host as sole member. Fails when the join code
    /// is already active.
    pub fn create(
        &self,
        id: String,
        host_id: Uuid,
        host_name: impl Into<String>,
        settings: LobbySettings,
    ) -> Result<Arc<Mutex<Lobby>>, AlreadyActive> {
        match self.lobbies.entry(id.clone()) {
            Entry::Occupied(_) => Err(AlreadyActive(id)),
            Entry::Vacant(slot) => {
                let lobby = Arc::new(Mutex::new(Lobby::new(id, host_id, host_name, settings)));
                slot.insert(lobby.clone());
                Ok(lobby)
            }
        }
    }

    /// Handle to an active lobby, if any.
    pub fn get(&self, id: &str) -> Option<Arc<Mutex<Lobby>>> {
        self.lobbies.get(id).map(|entry| entry.value().clone())
    }

    /// Handle to the live lobby holding the given player, if any.
    ///
    /// Handles are collected before any lock is taken so no shard lock is
    /// held across an await point.
    pub async fn find_by_player(&self, player_id: Uuid) -> Option<Arc<Mutex<Lobby>>> {
        let handles: Vec<Arc<Mutex<Lobby>>> = self
            .lobbies
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for handle in handles {
            if handle.lock().await.players.contains_key(&player_id) {
                return Some(handle);
            }
        }
        None
    }

    /// Whether a lobby is currently live.
    pub fn contains(&self, id: &str) -> bool {
        self.lobbies.contains_key(id)
    }

    /// Number of active lobbies.
    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    /// Whether no lobby is active.
    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// Drop a lobby from memory. The persisted row is untouched.
    pub fn remove(&self, id: &str) -> bool {
        self.lobbies.remove(id).is_some()
    }

    /// Materialize a lobby from its persisted row.
    ///
    /// A live lobby is never overwritten: the snapshot may be stale relative
    /// to in-memory state, so the existing entry wins and is returned as-is.
    pub fn restore(&self, snapshot: LobbyEntity) -> Arc<Mutex<Lobby>> {
        match self.lobbies.entry(snapshot.id.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(slot) => {
                let lobby = Arc::new(Mutex::new(snapshot.into()));
                slot.insert(lobby.clone());
                lobby
            }
        }
    }

    /// Add a member to a live lobby. Idempotent for existing members; `false`
    /// when the lobby is not active.
    pub async fn add_player(&self, id: &str, player_id: Uuid, name: &str) -> bool {
        let Some(handle) = self.get(id) else {
            return false;
        };
        let mut lobby = handle.lock().await;
        lobby.add_player(player_id, name)
    }

    /// Remove a member, deleting the lobby when it empties. `None` when the
    /// lobby is not active.
    pub async fn remove_player(&self, id: &str, player_id: Uuid) -> Option<RemovalOutcome> {
        let handle = self.get(id)?;
        let outcome = {
            let mut lobby = handle.lock().await;
            lobby.remove_player(player_id)
        };
        if outcome == RemovalOutcome::LobbyEmpty {
            self.remove(id);
        }
        Some(outcome)
    }

    /// Set one member's status. `false` when the lobby or player is absent.
    pub async fn update_player_status(
        &self,
        id: &str,
        player_id: Uuid,
        status: PlayerStatus,
    ) -> bool {
        let Some(handle) = self.get(id) else {
            return false;
        };
        let mut lobby = handle.lock().await;
        match lobby.players.get_mut(&player_id) {
            Some(player) => {
                player.status = status;
                true
            }
            None => false,
        }
    }

    /// Clone of a live lobby's current state.
    pub async fn snapshot(&self, id: &str) -> Option<Lobby> {
        let handle = self.get(id)?;
        let lobby = handle.lock().await;
        Some(lobby.clone())
    }

    /// Clones of every live lobby. Handles are collected before locking so no
    /// shard lock is held across an await point.
    pub async fn snapshot_all(&self) -> Vec<Lobby> {
        let handles: Vec<Arc<Mutex<Lobby>>> = self
            .lobbies
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            snapshots.push(handle.lock().await.clone());
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::lobby::LobbyStatus;

    fn settings() -> LobbySettings {
        LobbySettings {
            regions: vec!["africa".into()],
            question_count: 5,
            max_players: 4,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_join_codes() {
        let registry = LobbyRegistry::new();
        registry
            .create("AAAAAA".into(), Uuid::new_v4(), "host", settings())
            .unwrap();

        let err = registry
            .create("AAAAAA".into(), Uuid::new_v4(), "other", settings())
            .unwrap_err();
        assert_eq!(err, AlreadyActive("AAAAAA".into()));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn removing_last_player_drops_the_lobby() {
        let registry = LobbyRegistry::new();
        let host = Uuid::new_v4();
        registry
            .create("BBBBBB".into(), host, "host", settings())
            .unwrap();

        let outcome = registry.remove_player("BBBBBB", host).await;
        assert_eq!(outcome, Some(RemovalOutcome::LobbyEmpty));
        assert!(!registry.contains("BBBBBB"));
    }

    #[tokio::test]
    async fn restore_never_overwrites_a_live_lobby() {
        let registry = LobbyRegistry::new();
        let host = Uuid::new_v4();
        let handle = registry
            .create("CCCCCC".into(), host, "host", settings())
            .unwrap();
        handle.lock().await.players[&host].score = 99;

        let mut stale: LobbyEntity = handle.lock().await.clone().into();
        stale.players[0].score = 0;
        let restored = registry.restore(stale);

        assert_eq!(restored.lock().await.players[&host].score, 99);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn restore_materializes_a_missing_lobby() {
        let registry = LobbyRegistry::new();
        let host = Uuid::new_v4();
        let source = registry
            .create("DDDDDD".into(), host, "host", settings())
            .unwrap();
        let entity: LobbyEntity = source.lock().await.clone().into();
        registry.remove("DDDDDD");

        let restored = registry.restore(entity);
        let lobby = restored.lock().await;
        assert_eq!(lobby.host_id, host);
        assert_eq!(lobby.status, LobbyStatus::Waiting);
        assert!(registry.contains("DDDDDD"));
    }

    #[tokio::test]
    async fn player_mutations_report_missing_targets() {
        let registry = LobbyRegistry::new();
        assert!(!registry.add_player("ZZZZZZ", Uuid::new_v4(), "ghost").await);
        assert!(
            !registry
                .update_player_status("ZZZZZZ", Uuid::new_v4(), PlayerStatus::Ready)
                .await
        );
        assert!(registry.remove_player("ZZZZZZ", Uuid::new_v4()).await.is_none());
    }
}
