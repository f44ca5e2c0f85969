//! MongoDB-backed [`LobbyStore`](crate::dao::store::LobbyStore) implementation.

mod config;
mod error;
mod store;

pub use config::MongoConfig;
pub use error::{MongoDaoError, MongoResult};
pub use store::MongoLobbyStore;
