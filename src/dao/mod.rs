//! Persistence layer: entities, the `LobbyStore` abstraction, and its backends.

pub mod memory;
pub mod models;
#[cfg(feature = "mongo-store")]
pub mod mongo;
pub mod storage;
pub mod store;
