use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Country Dash Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::lobby::get_lobby,
        crate::routes::lobby::get_game,
        crate::routes::sse::lobby_feed,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::lobby::LobbySettingsInput,
            crate::dto::lobby::LobbySettingsDto,
            crate::dto::lobby::LobbySnapshot,
            crate::dto::lobby::PlayerSummary,
            crate::dto::lobby::PlayerGameSummary,
            crate::dto::lobby::GameStateSnapshot,
            crate::dto::lobby::RankingEntryDto,
            crate::dto::ws::ClientCommand,
            crate::dto::ws::ServerMessage,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::LobbyFeedEntry,
            crate::dto::sse::LobbyChangedEvent,
            crate::dto::sse::LobbyClosedEvent,
            crate::state::lobby::LobbyStatus,
            crate::state::lobby::PlayerStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "lobbies", description = "Read-only lobby and game state"),
        (name = "sse", description = "Public lobby feed stream"),
        (name = "players", description = "WebSocket operations for player clients"),
    )
)]
pub struct ApiDoc;
