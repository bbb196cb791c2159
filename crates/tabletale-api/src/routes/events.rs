//! WebSocket stream of turn events for one session.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tabletale_engine::TurnEvent;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /{id}/events
async fn stream_events(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.get_state(session_id).await?;
    let events = state.engine.subscribe();
    Ok(ws.on_upgrade(move |socket| stream_socket(socket, session_id, events)))
}

async fn stream_socket(
    mut socket: WebSocket,
    session_id: Uuid,
    mut events: broadcast::Receiver<TurnEvent>,
) {
    debug!(%session_id, "event stream opened");
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
            outgoing = events.recv() => {
                match outgoing {
                    Ok(event) => {
                        if event.metadata.session_id != session_id {
                            continue;
                        }
                        if send_event(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%session_id, skipped, "event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    debug!(%session_id, "event stream closed");
}

async fn send_event(socket: &mut WebSocket, event: &TurnEvent) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(payload.into())).await
}

/// Returns the router for event streams.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/events", get(stream_events))
}
