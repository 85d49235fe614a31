pub mod direct;
pub mod team;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::authenticate;
use crate::protocol::ServerFrame;
use crate::registry::{ConnectionHandle, Delivery};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

enum SessionKind {
    Direct,
    Team { room_id: String },
}

/// Upgrade handler for direct AI chat (`GET /ws/chat?token=...`)
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state, SessionKind::Direct))
}

/// Upgrade handler for team rooms (`GET /ws/team/{room_id}?token=...`)
pub async fn team_ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    Query(params): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state, SessionKind::Team { room_id }))
}

/// Handle one WebSocket connection for its whole lifetime.
async fn handle_socket(
    mut socket: WebSocket,
    params: WsQuery,
    state: AppState,
    kind: SessionKind,
) {
    // Gate the session before anything else touches shared state. A failed
    // credential closes the handshake with a policy violation and leaves no
    // trace in the registry or any room.
    let token = params.token.unwrap_or_default();
    let identity = match authenticate(&state.config.auth, state.users.as_ref(), &token).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting websocket connection");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "policy violation".into(),
                })))
                .await;
            return;
        }
    };

    tracing::info!(user_id = %identity.user_id, "websocket connected");

    let (sender, receiver) = socket.split();
    let (handle, outbound_rx) = ConnectionHandle::channel();
    tokio::spawn(write_outbound(sender, outbound_rx));

    state.registry.register(&identity.user_id, handle).await;

    match kind {
        SessionKind::Direct => direct::run(&state, &identity, receiver).await,
        SessionKind::Team { room_id } => team::run(&state, &identity, &room_id, receiver).await,
    }

    // Disconnect cleanup. Each step stands on its own: a failure to notify
    // one room must not keep the user registered or in other rooms.
    state.registry.unregister(&identity.user_id).await;
    let vacated = state.rooms.leave_all(&identity.user_id).await;
    for room_id in vacated {
        state
            .rooms
            .broadcast(
                &room_id,
                ServerFrame::UserLeft {
                    user_id: identity.user_id.clone(),
                    username: identity.username.clone(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                },
                None,
            )
            .await;
    }

    tracing::info!(user_id = %identity.user_id, "websocket closed");
}

/// Drain one connection's outbound queue into its socket sink.
///
/// Ends when the queue closes (session teardown dropped the last sender),
/// a write fails, or a close delivery arrives.
async fn write_outbound(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
) {
    while let Some(delivery) = rx.recv().await {
        match delivery {
            Delivery::Frame(frame) => {
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize outbound frame");
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Delivery::Close => {
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::NORMAL,
                        reason: "connection replaced".into(),
                    })))
                    .await;
                break;
            }
        }
    }
}
