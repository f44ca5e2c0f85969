//! Error surface of the MongoDB backend.

use thiserror::Error;

use crate::dao::storage::StorageError;

/// Result alias for MongoDB DAO operations.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Failures raised while talking to MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string could not be parsed.
    #[error("invalid MongoDB URI `{uri}`")]
    InvalidUri {
        /// Offending connection string.
        uri: String,
        /// Driver-level parse failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A required environment variable was absent.
    #[error("missing environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the missing variable.
        var: &'static str,
    },
    /// The client handle could not be constructed.
    #[error("failed to build MongoDB client")]
    ClientConstruction {
        /// Driver-level construction failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// The initial connectivity probe never succeeded.
    #[error("MongoDB did not answer the initial ping after {attempts} attempts")]
    InitialPing {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Last ping failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A health ping against an established connection failed.
    #[error("MongoDB health ping failed")]
    HealthPing {
        /// Driver-level ping failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// Index creation failed during startup.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection the index belongs to.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver-level failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// Writing a lobby document failed.
    #[error("failed to save lobby `{id}`")]
    SaveLobby {
        /// Join code of the lobby.
        id: String,
        /// Driver-level failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// Reading a lobby document failed.
    #[error("failed to load lobby `{id}`")]
    LoadLobby {
        /// Join code of the lobby.
        id: String,
        /// Driver-level failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// Deleting a lobby document failed.
    #[error("failed to delete lobby `{id}`")]
    DeleteLobby {
        /// Join code of the lobby.
        id: String,
        /// Driver-level failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// Appending a game result failed.
    #[error("failed to save game result for lobby `{lobby_id}`")]
    SaveResult {
        /// Lobby the round was played in.
        lobby_id: String,
        /// Driver-level failure.
        #[source]
        source: mongodb::error::Error,
    },
}

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
