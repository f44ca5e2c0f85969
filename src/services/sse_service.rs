//! Public lobby-feed SSE plumbing.

use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::{
    dto::sse::{FeedEvent, Handshake, LobbyChangedEvent, LobbyFeedEntry},
    state::SharedState,
};

/// Subscribe to the shared lobby feed.
pub fn subscribe(state: &SharedState) -> broadcast::Receiver<FeedEvent> {
    state.feed().subscribe()
}

/// Events replayed to a fresh subscriber before live traffic: the handshake
/// plus one entry per currently active lobby.
pub async fn initial_events(state: &SharedState) -> Vec<FeedEvent> {
    let mut events = Vec::new();

    let handshake = Handshake {
        message: "subscribed to the lobby feed".into(),
        degraded: state.is_degraded().await,
    };
    match FeedEvent::json(Some("handshake".to_string()), &handshake) {
        Ok(event) => events.push(event),
        Err(err) => warn!(error = %err, "failed to serialize feed handshake"),
    }

    for lobby in state.registry().snapshot_all().await {
        let payload = LobbyChangedEvent {
            lobby: LobbyFeedEntry::from(&lobby),
        };
        match FeedEvent::json(Some("lobby.changed".to_string()), &payload) {
            Ok(event) => events.push(event),
            Err(err) => warn!(error = %err, "failed to serialize feed entry"),
        }
    }

    events
}

/// Convert a broadcast receiver into an SSE response, replaying the initial
/// events first and cleaning up once the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<FeedEvent>,
    initial: Vec<FeedEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Small bounded channel between the forwarder and the response.
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        for payload in initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        tracing::info!("lobby feed stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: FeedEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}
