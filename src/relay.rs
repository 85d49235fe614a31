//! Token-streaming relay.
//!
//! One relay run per admitted prompt: it pulls fragments from the
//! generation engine one at a time, forwards each before pulling the next,
//! and persists the finished exchange. A run is owned by the session task
//! that started it; when the recipient disappears the run aborts and stops
//! pulling, which cancels the remaining upstream work.

use futures::StreamExt;

use crate::auth::Identity;
use crate::protocol::{ChatMode, ChatRequest, ServerFrame};
use crate::registry::SendOutcome;
use crate::state::AppState;
use crate::store::{ExchangeId, NewExchange};

/// Terminal state of one relay run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The stream finished; `exchange_id` is absent when persistence failed.
    Completed { exchange_id: Option<ExchangeId> },
    /// Short-circuited before admission: validation or rate limit.
    Rejected,
    /// Recipient(s) gone mid-stream; no persistence.
    Aborted,
    /// Engine error mid-stream; no persistence.
    Failed,
}

async fn send_error(state: &AppState, user_id: &str, message: String) {
    let _ = state
        .registry
        .send(user_id, ServerFrame::Error { message })
        .await;
}

fn validate(
    prompt: Option<String>,
    mode: ChatMode,
    code_context: &Option<String>,
) -> Result<String, String> {
    let prompt = prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| "Prompt is required".to_string())?;

    if mode.requires_code_context()
        && code_context
            .as_deref()
            .map_or(true, |c| c.trim().is_empty())
    {
        return Err(format!(
            "code_context is required for {} mode",
            mode.as_str()
        ));
    }

    Ok(prompt)
}

/// Run a direct-chat generation for `identity`, forwarding frames to its
/// own connection.
pub async fn run_direct(
    state: &AppState,
    identity: &Identity,
    request: ChatRequest,
) -> StreamOutcome {
    let user_id = identity.user_id.as_str();

    let prompt = match validate(request.prompt, request.mode, &request.code_context) {
        Ok(prompt) => prompt,
        Err(message) => {
            send_error(state, user_id, message).await;
            return StreamOutcome::Rejected;
        }
    };

    if !state.limiter.admit(user_id).await {
        let remaining = state.limiter.remaining(user_id).await;
        send_error(
            state,
            user_id,
            format!("Rate limit exceeded. Remaining: {}", remaining),
        )
        .await;
        return StreamOutcome::Rejected;
    }

    let Some(engine) = state.engine.clone() else {
        send_error(state, user_id, "AI assistant is not configured".to_string()).await;
        return StreamOutcome::Rejected;
    };

    // Admitted
    if state
        .registry
        .send(
            user_id,
            ServerFrame::Start {
                message: "Generating response...".to_string(),
            },
        )
        .await
        == SendOutcome::NotConnected
    {
        return StreamOutcome::Aborted;
    }

    let completion =
        state
            .config
            .engine
            .request(prompt.clone(), request.mode, request.code_context.clone());

    let mut stream = match engine.stream(completion).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(user_id, error = %e, "failed to open generation stream");
            send_error(state, user_id, format!("Error generating response: {}", e)).await;
            return StreamOutcome::Failed;
        }
    };

    // Streaming
    let mut full_response = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                full_response.push_str(&fragment);
                let outcome = state
                    .registry
                    .send(user_id, ServerFrame::Chunk { content: fragment })
                    .await;
                if outcome == SendOutcome::NotConnected {
                    tracing::debug!(user_id, "recipient gone mid-stream, aborting generation");
                    return StreamOutcome::Aborted;
                }
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "generation failed mid-stream");
                send_error(state, user_id, format!("Error generating response: {}", e)).await;
                return StreamOutcome::Failed;
            }
        }
    }

    // Completed
    if state
        .registry
        .send(
            user_id,
            ServerFrame::Complete {
                message: "Response complete".to_string(),
            },
        )
        .await
        == SendOutcome::NotConnected
    {
        return StreamOutcome::Aborted;
    }

    let exchange_id = persist(state, identity, prompt, full_response, request.mode, request.code_context).await;

    if let Some(ref chat_id) = exchange_id {
        let _ = state
            .registry
            .send(
                user_id,
                ServerFrame::ChatSaved {
                    chat_id: chat_id.clone(),
                },
            )
            .await;
    }

    StreamOutcome::Completed { exchange_id }
}

/// Run a team-mode generation for `identity`, broadcasting frames to the
/// whole room including the requester.
pub async fn run_team(
    state: &AppState,
    identity: &Identity,
    room_id: &str,
    prompt: Option<String>,
    mode: ChatMode,
    code_context: Option<String>,
) -> StreamOutcome {
    let user_id = identity.user_id.as_str();

    let prompt = match validate(prompt, mode, &code_context) {
        Ok(prompt) => prompt,
        Err(message) => {
            send_error(state, user_id, message).await;
            return StreamOutcome::Rejected;
        }
    };

    if !state.limiter.admit(user_id).await {
        send_error(state, user_id, "Rate limit exceeded".to_string()).await;
        return StreamOutcome::Rejected;
    }

    let Some(engine) = state.engine.clone() else {
        send_error(state, user_id, "AI assistant is not configured".to_string()).await;
        return StreamOutcome::Rejected;
    };

    // Admitted; the requester is notified along with everyone else.
    state
        .rooms
        .broadcast(
            room_id,
            ServerFrame::AiStart {
                user_id: identity.user_id.clone(),
                username: identity.username.clone(),
                prompt: prompt.clone(),
            },
            None,
        )
        .await;

    let completion = state
        .config
        .engine
        .request(prompt.clone(), mode, code_context.clone());

    let mut stream = match engine.stream(completion).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(user_id, room_id, error = %e, "failed to open generation stream");
            send_error(state, user_id, format!("Error generating response: {}", e)).await;
            return StreamOutcome::Failed;
        }
    };

    // Streaming
    let mut full_response = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                full_response.push_str(&fragment);
                state
                    .rooms
                    .broadcast(
                        room_id,
                        ServerFrame::AiChunk {
                            content: fragment,
                            user_id: identity.user_id.clone(),
                        },
                        None,
                    )
                    .await;

                // Stop early when the owner hung up or the room dissolved.
                if !state.registry.is_connected(user_id).await {
                    tracing::debug!(user_id, room_id, "owner gone mid-stream, aborting");
                    return StreamOutcome::Aborted;
                }
                if state.rooms.members(room_id).await.is_none() {
                    tracing::debug!(user_id, room_id, "room emptied mid-stream, aborting");
                    return StreamOutcome::Aborted;
                }
            }
            Err(e) => {
                tracing::error!(user_id, room_id, error = %e, "generation failed mid-stream");
                send_error(state, user_id, format!("Error generating response: {}", e)).await;
                return StreamOutcome::Failed;
            }
        }
    }

    // Completed; team mode carries the full text in the completion frame.
    state
        .rooms
        .broadcast(
            room_id,
            ServerFrame::AiComplete {
                user_id: identity.user_id.clone(),
                full_response: full_response.clone(),
            },
            None,
        )
        .await;

    let exchange_id = persist(state, identity, prompt, full_response, mode, code_context).await;

    StreamOutcome::Completed { exchange_id }
}

/// Hand a finished exchange to the sink. A sink failure is logged and
/// swallowed; the stream already completed from the client's point of view.
async fn persist(
    state: &AppState,
    identity: &Identity,
    prompt: String,
    response: String,
    mode: ChatMode,
    code_context: Option<String>,
) -> Option<ExchangeId> {
    let exchange = NewExchange {
        user_id: identity.user_id.clone(),
        prompt,
        response,
        mode,
        code_context,
    };

    match state.store.store(exchange).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!(user_id = %identity.user_id, error = %e, "failed to persist exchange");
            None
        }
    }
}
