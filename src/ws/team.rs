//! Team room session loop.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitStream, StreamExt};

use crate::auth::Identity;
use crate::protocol::{ServerFrame, TeamFrame};
use crate::relay::{self, StreamOutcome};
use crate::state::AppState;

/// Join the room and announce the arrival to everyone already there.
pub async fn enter_room(state: &AppState, identity: &Identity, room_id: &str) {
    state.rooms.join(room_id, &identity.user_id).await;

    state
        .rooms
        .broadcast(
            room_id,
            ServerFrame::UserJoined {
                user_id: identity.user_id.clone(),
                username: identity.username.clone(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
            Some(&identity.user_id),
        )
        .await;
}

/// Handle one inbound team frame.
pub async fn handle_frame(
    state: &AppState,
    identity: &Identity,
    room_id: &str,
    frame: TeamFrame,
) -> Option<StreamOutcome> {
    match frame {
        TeamFrame::AiPrompt {
            prompt,
            mode,
            code_context,
        } => Some(relay::run_team(state, identity, room_id, prompt, mode, code_context).await),
        TeamFrame::Message { content } => {
            state
                .rooms
                .broadcast(
                    room_id,
                    ServerFrame::Message {
                        user_id: identity.user_id.clone(),
                        username: identity.username.clone(),
                        content,
                        timestamp: chrono::Utc::now().to_rfc3339(),
                    },
                    Some(&identity.user_id),
                )
                .await;
            None
        }
    }
}

/// Serve inbound frames until the client goes away. Room exit and the
/// departure notice happen in the shared teardown path.
pub async fn run(
    state: &AppState,
    identity: &Identity,
    room_id: &str,
    mut receiver: SplitStream<WebSocket>,
) {
    enter_room(state, identity, room_id).await;

    while let Some(inbound) = receiver.next().await {
        match inbound {
            Ok(Message::Text(text)) => match TeamFrame::parse(&text) {
                Ok(frame) => {
                    if let Some(outcome) = handle_frame(state, identity, room_id, frame).await {
                        tracing::debug!(user_id = %identity.user_id, room_id, ?outcome, "relay finished");
                    }
                }
                Err(e) => {
                    tracing::warn!(user_id = %identity.user_id, error = %e, "malformed team frame");
                    let _ = state
                        .registry
                        .send(
                            &identity.user_id,
                            ServerFrame::Error {
                                message: format!("Invalid message format: {}", e),
                            },
                        )
                        .await;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(user_id = %identity.user_id, error = %e, "websocket read error");
                break;
            }
        }
    }
}
