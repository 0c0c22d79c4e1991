use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::live::{LiveEvent, SessionRegistry};
use crate::state::AppState;

/// Live readings over a WebSocket.
///
/// The first frame is `{"event":"connect","session_id":N}`; every committed
/// reading follows as `{"event":"new-data","data":{...}}`.
#[utoipa::path(
    get,
    path = "/ws",
    tag = "live",
    responses((status = 101, description = "Switching to the live reading feed"))
)]
pub(crate) async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let sessions = state.sessions.clone();
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| viewer_socket(socket, sessions, shutdown))
}

async fn viewer_socket(
    mut socket: WebSocket,
    sessions: Arc<SessionRegistry>,
    shutdown: CancellationToken,
) {
    let mut session = sessions.connect();
    let hello = LiveEvent::Connect {
        session_id: session.id(),
    };
    if !send_frame(&mut socket, &hello).await {
        return;
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            next = session.recv() => {
                let Some(reading) = next else { break };
                let frame = LiveEvent::NewData { data: reading.as_ref() };
                if !send_frame(&mut socket, &frame).await {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Viewers have nothing to say; pings are answered by axum.
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!(session_id = session.id(), "websocket closed");
}

async fn send_frame(socket: &mut WebSocket, event: &LiveEvent<'_>) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(error = %err, "failed to encode live frame");
            return false;
        }
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}

fn sse_event(name: &'static str, data: &impl Serialize) -> Option<Event> {
    match Event::default().event(name).json_data(data) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode live event");
            None
        }
    }
}

/// Read-only live feed as Server-Sent Events (`connect`, then `new-data`).
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "live",
    responses((status = 200, description = "text/event-stream of new readings"))
)]
pub(crate) async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = state.sessions.connect();
    let hello = sse_event(
        LiveEvent::CONNECT,
        &serde_json::json!({ "session_id": session.id() }),
    );
    let updates = session
        .into_stream()
        .map(|reading| sse_event(LiveEvent::NEW_DATA, reading.as_ref()));

    let stream = futures::stream::iter([hello])
        .chain(updates)
        .filter_map(futures::future::ready)
        .map(Ok::<_, Infallible>)
        .take_until(state.shutdown.clone().cancelled_owned());
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

pub fn api_router() -> Router<AppState> {
    Router::new().route("/events", get(events_handler))
}
