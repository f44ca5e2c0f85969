use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/lobbies",
    tag = "sse",
    responses((status = 200, description = "Public lobby feed", content_type = "text/event-stream", body = String))
)]
/// Stream lobby lifecycle events to connected frontends.
pub async fn lobby_feed(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe(&state);
    info!("new lobby feed connection");
    let initial = sse_service::initial_events(&state).await;
    sse_service::to_sse_stream(receiver, initial)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/lobbies", get(lobby_feed))
}
