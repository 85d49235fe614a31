//! Direct AI chat session loop.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitStream, StreamExt};

use crate::auth::Identity;
use crate::protocol::{ChatRequest, ServerFrame};
use crate::relay;
use crate::state::AppState;

/// Read inbound frames until the client goes away. Each prompt runs a full
/// relay pass inline, so a disconnect mid-stream surfaces as a failed
/// forward and aborts the generation.
pub async fn run(state: &AppState, identity: &Identity, mut receiver: SplitStream<WebSocket>) {
    while let Some(inbound) = receiver.next().await {
        match inbound {
            Ok(Message::Text(text)) => match serde_json::from_str::<ChatRequest>(&text) {
                Ok(request) => {
                    let outcome = relay::run_direct(state, identity, request).await;
                    tracing::debug!(user_id = %identity.user_id, ?outcome, "relay finished");
                }
                Err(e) => {
                    tracing::warn!(user_id = %identity.user_id, error = %e, "malformed chat frame");
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
