//! Store implementation persisting lobbies and results in MongoDB.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    options::{ClientOptions, IndexOptions},
};
use tokio::{sync::RwLock, time::sleep};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};
use crate::dao::{
    models::{
        GameResultEntity, LobbyEntity, LobbySettingsEntity, PlayerEntity, PlayerGameDataEntity,
        RoundEntity,
    },
    storage::StorageResult,
    store::LobbyStore,
};
use crate::state::lobby::{LobbyStatus, PlayerStatus};

const LOBBY_COLLECTION_NAME: &str = "lobbies";
const RESULT_COLLECTION_NAME: &str = "game_results";
const MAX_CONNECT_ATTEMPTS: u32 = 10;
const BASE_RETRY_DELAY_MS: u64 = 250;

/// MongoDB-backed lobby store. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct MongoLobbyStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

// The `Database` handle keeps the client topology alive on its own, so the
// `Client` is not retained.
struct MongoState {
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.database = database;
        Ok(())
    }
}

impl MongoLobbyStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let lobbies = database.collection::<mongodb::bson::Document>(LOBBY_COLLECTION_NAME);
        let lobby_index = mongodb::IndexModel::builder()
            .keys(doc! {"id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("lobby_code_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        lobbies
            .create_index(lobby_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: LOBBY_COLLECTION_NAME,
                index: "id",
                source,
            })?;

        let results = database.collection::<mongodb::bson::Document>(RESULT_COLLECTION_NAME);
        let result_index = mongodb::IndexModel::builder()
            .keys(doc! {"lobby_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("result_lobby_idx".to_owned()))
                    .build(),
            )
            .build();
        results
            .create_index(result_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RESULT_COLLECTION_NAME,
                index: "lobby_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn collection(&self) -> Collection<LobbyEntity> {
        self.database()
            .await
            .collection::<LobbyEntity>(LOBBY_COLLECTION_NAME)
    }

    async fn result_collection(&self) -> Collection<GameResultEntity> {
        self.database()
            .await
            .collection::<GameResultEntity>(RESULT_COLLECTION_NAME)
    }

    async fn save_lobby(&self, lobby: LobbyEntity) -> MongoResult<()> {
        let id = lobby.id.clone();
        let collection = self.collection().await;
        collection
            .replace_one(doc! {"id": &id}, &lobby)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveLobby { id, source })?;
        Ok(())
    }

    async fn find_lobby(&self, id: &str) -> MongoResult<Option<LobbyEntity>> {
        let collection = self.collection().await;
        collection
            .find_one(doc! {"id": id})
            .await
            .map_err(|source| MongoDaoError::LoadLobby {
                id: id.to_owned(),
                source,
            })
    }

    async fn find_lobby_by_player(&self, player_id: Uuid) -> MongoResult<Option<LobbyEntity>> {
        let collection = self.collection().await;
        collection
            .find_one(doc! {"players.id": player_id.to_string()})
            .await
            .map_err(|source| MongoDaoError::LoadLobby {
                id: format!("player:{player_id}"),
                source,
            })
    }

    /// Read-modify-write cycle against one lobby document.
    ///
    /// Filters only ever reference the string join code, so entity
    /// (de)serialization stays entirely in serde's hands; a missing document
    /// makes the mutation a silent no-op, matching the mirror-write contract.
    async fn mutate_lobby(
        &self,
        id: &str,
        mutate: impl FnOnce(&mut LobbyEntity),
    ) -> MongoResult<()> {
        let Some(mut lobby) = self.find_lobby(id).await? else {
            return Ok(());
        };
        mutate(&mut lobby);
        lobby.updated_at = SystemTime::now();
        self.save_lobby(lobby).await
    }

    async fn delete_lobby(&self, id: &str) -> MongoResult<bool> {
        let collection = self.collection().await;
        let result = collection
            .delete_one(doc! {"id": id})
            .await
            .map_err(|source| MongoDaoError::DeleteLobby {
                id: id.to_owned(),
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    async fn save_result(&self, result: GameResultEntity) -> MongoResult<()> {
        let lobby_id = result.lobby_id.clone();
        let collection = self.result_collection().await;
        collection
            .insert_one(&result)
            .await
            .map_err(|source| MongoDaoError::SaveResult { lobby_id, source })?;
        Ok(())
    }
}

impl LobbyStore for MongoLobbyStore {
    fn create_lobby(&self, lobby: LobbyEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_lobby(lobby).await.map_err(Into::into) })
    }

    fn find_lobby(&self, id: String) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_lobby(&id).await.map_err(Into::into) })
    }

    fn find_lobby_by_player(
        &self,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_lobby_by_player(player_id).await.map_err(Into::into) })
    }

    fn add_player(
        &self,
        lobby_id: String,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .mutate_lobby(&lobby_id, |lobby| {
                    if let Some(row) = lobby.players.iter_mut().find(|row| row.id == player.id) {
                        *row = player;
                    } else {
                        lobby.players.push(player);
                    }
                })
                .await
                .map_err(Into::into)
        })
    }

    fn remove_player(
        &self,
        lobby_id: String,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .mutate_lobby(&lobby_id, |lobby| {
                    lobby.players.retain(|row| row.id != player_id);
                })
                .await
                .map_err(Into::into)
        })
    }

    fn update_status(
        &self,
        lobby_id: String,
        status: LobbyStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .mutate_lobby(&lobby_id, |lobby| lobby.status = status)
                .await
                .map_err(Into::into)
        })
    }

    fn update_host(
        &self,
        lobby_id: String,
        host_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .mutate_lobby(&lobby_id, |lobby| lobby.host_id = host_id)
                .await
                .map_err(Into::into)
        })
    }

    fn update_settings(
        &self,
        lobby_id: String,
        settings: LobbySettingsEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .mutate_lobby(&lobby_id, |lobby| lobby.settings = settings)
                .await
                .map_err(Into::into)
        })
    }

    fn update_player_status(
        &self,
        lobby_id: String,
        player_id: Uuid,
        status: PlayerStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .mutate_lobby(&lobby_id, |lobby| {
                    if let Some(row) = lobby.players.iter_mut().find(|row| row.id == player_id) {
                        row.status = status;
                        row.updated_at = SystemTime::now();
                    }
                })
                .await
                .map_err(Into::into)
        })
    }

    fn update_player_game_data(
        &self,
        lobby_id: String,
        player_id: Uuid,
        data: PlayerGameDataEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .mutate_lobby(&lobby_id, |lobby| {
                    if let Some(row) = lobby.players.iter_mut().find(|row| row.id == player_id) {
                        row.score = data.score;
                        row.progress = data.progress;
                        row.validated_countries = data.validated_countries;
                        row.incorrect_countries = data.incorrect_countries;
                        row.updated_at = SystemTime::now();
                    }
                })
                .await
                .map_err(Into::into)
        })
    }

    fn save_game_state(
        &self,
        lobby_id: String,
        round: Option<RoundEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .mutate_lobby(&lobby_id, |lobby| lobby.round = round)
                .await
                .map_err(Into::into)
        })
    }

    fn save_game_result(
        &self,
        result: GameResultEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_result(result).await.map_err(Into::into) })
    }

    fn delete_lobby(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_lobby(&id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<Database> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut attempts = 0;
    let mut delay = Duration::from_millis(BASE_RETRY_DELAY_MS);

    loop {
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => break,
            Err(err) => {
                attempts += 1;
                if attempts >= MAX_CONNECT_ATTEMPTS {
                    return Err(MongoDaoError::InitialPing {
                        attempts,
                        source: err,
                    });
                }
                sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(5));
            }
        }
    }

    Ok(database)
}
