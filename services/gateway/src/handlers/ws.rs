//! WebSocket endpoints.
//!
//! Dispatcher sockets are read-only consumers of the event feed.
//! Technician sockets additionally accept `location_update` and `ping`
//! frames; location updates run through the same core operation as the
//! HTTP path and fan back out to dispatchers.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use dispatch_engine::EntityStore;
use live_feed::{FeedConnection, ServerFrame, TechFrame};
use types::prelude::*;

use crate::error::AppError;
use crate::state::AppState;

pub async fn dispatcher_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_dispatcher(socket, state))
}

pub async fn technician_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(tech_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let tech_id = TechnicianId::from_uuid(tech_id);
    // Reject unknown technicians before upgrading
    {
        let core = state.core.read().await;
        core.store().technician(tech_id)?;
    }
    Ok(ws.on_upgrade(move |socket| handle_technician(socket, state, tech_id)))
}

/// Forward queued payloads to the socket until the connection closes.
async fn run_writer(
    conn: Arc<FeedConnection>,
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
) {
    while let Some(batch) = conn.next_batch().await {
        for payload in batch {
            if sender.send(Message::Text(payload.into())).await.is_err() {
                conn.close();
                return;
            }
        }
    }
    let _ = sender.close().await;
}

async fn handle_dispatcher(socket: WebSocket, state: AppState) {
    let conn = state.hub.register_dispatcher().await;
    let (sender, mut receiver) = socket.split();

    conn.push(ServerFrame::connected("dispatcher").to_json()).await;
    let writer = tokio::spawn(run_writer(Arc::clone(&conn), sender));

    // Dispatchers only consume; drain until close so pings keep working
    while let Some(Ok(msg)) = receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    state.hub.unregister(&conn).await;
    let _ = writer.await;
    debug!(connection_id = conn.id(), "dispatcher socket closed");
}

async fn handle_technician(socket: WebSocket, state: AppState, tech_id: TechnicianId) {
    let conn = state.hub.register_technician(tech_id).await;
    let (sender, mut receiver) = socket.split();

    conn.push(ServerFrame::connected("technician").to_json()).await;
    let writer = tokio::spawn(run_writer(Arc::clone(&conn), sender));

    while let Some(Ok(msg)) = receiver.next().await {
        if conn.is_closed() {
            break;
        }
        match msg {
            Message::Text(text) => {
                handle_tech_frame(&state, &conn, tech_id, text.as_str()).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.hub.unregister(&conn).await;
    let _ = writer.await;
    debug!(%tech_id, "technician socket closed");
}

async fn handle_tech_frame(
    state: &AppState,
    conn: &FeedConnection,
    tech_id: TechnicianId,
    text: &str,
) {
    let frame = match TechFrame::parse(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(%tech_id, %err, "ignoring malformed frame");
            conn.push(
                ServerFrame::Error {
                    message: err.to_string(),
                }
                .to_json(),
            )
            .await;
            return;
        }
    };

    match frame {
        TechFrame::Ping => {
            conn.push(ServerFrame::Pong.to_json()).await;
        }
        TechFrame::LocationUpdate { lat, lon } => {
            let location = match Location::new(lat, lon) {
                Ok(location) => location,
                Err(err) => {
                    conn.push(
                        ServerFrame::Error {
                            message: err.to_string(),
                        }
                        .to_json(),
                    )
                    .await;
                    return;
                }
            };

            // Published under the write lock so feed order matches commit order
            let core = state.core.write().await;
            let result = core.update_location(tech_id, location, Utc::now());
            match result {
                Ok(event) => {
                    state.hub.publish(&event).await;
                    drop(core);
                }
                Err(err) => {
                    drop(core);
                    warn!(%tech_id, %err, "location update rejected");
                    conn.push(
                        ServerFrame::Error {
                            message: err.to_string(),
                        }
                        .to_json(),
                    )
                    .await;
                }
            }
        }
    }
}
