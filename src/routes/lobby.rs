use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::{
        lobby::{GameStateSnapshot, LobbySnapshot},
        validation::validate_join_code,
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/lobbies/{code}",
    tag = "lobbies",
    params(("code" = String, Path, description = "Lobby join code")),
    responses(
        (status = 200, description = "Merged lobby snapshot", body = LobbySnapshot),
        (status = 404, description = "No such lobby"),
    )
)]
/// Read the merged lobby snapshot: membership, settings, status.
pub async fn get_lobby(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<LobbySnapshot>, AppError> {
    validate_join_code(&code).map_err(|err| AppError::BadRequest(err.to_string()))?;
    let snapshot = session_service::get_lobby_state(&state, &code).await?;
    Ok(Json(snapshot))
}

#[utoipa::path(
    get,
    path = "/lobbies/{code}/game",
    tag = "lobbies",
    params(("code" = String, Path, description = "Lobby join code")),
    responses(
        (status = 200, description = "Merged game-state snapshot", body = GameStateSnapshot),
        (status = 404, description = "No such lobby"),
    )
)]
/// Read the merged game-state snapshot: round data plus per-player accumulators.
pub async fn get_game(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<GameStateSnapshot>, AppError> {
    validate_join_code(&code).map_err(|err| AppError::BadRequest(err.to_string()))?;
    let snapshot = session_service::get_game_state(&state, &code).await?;
    Ok(Json(snapshot))
}

/// Configure the read-only lobby routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/lobbies/{code}", get(get_lobby))
        .route("/lobbies/{code}/game", get(get_game))
}
