use serde::{Deserialize, Serialize};

use crate::store::UserId;

/// Assistant mode requested by the client.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Generate,
    Debug,
    Explain,
}

impl ChatMode {
    /// Debug and explain operate on a piece of code the client must supply.
    pub fn requires_code_context(&self) -> bool {
        matches!(self, ChatMode::Debug | ChatMode::Explain)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Generate => "generate",
            ChatMode::Debug => "debug",
            ChatMode::Explain => "explain",
        }
    }
}

/// Inbound frame on the direct chat socket.
///
/// The direct protocol carries a bare object, no `type` tag.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub mode: ChatMode,
    #[serde(default)]
    pub code_context: Option<String>,
}

/// Inbound frame on a team socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TeamFrame {
    AiPrompt {
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        mode: ChatMode,
        #[serde(default)]
        code_context: Option<String>,
    },
    Message {
        #[serde(default)]
        content: String,
    },
}

/// Untagged fallback shape for team frames without a `type` field.
#[derive(Debug, Deserialize)]
struct BareMessage {
    #[serde(default)]
    content: String,
}

impl TeamFrame {
    /// Parse a team frame. A missing `type` tag means a plain chat message.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<TeamFrame>(text) {
            Ok(frame) => Ok(frame),
            Err(tagged_err) => match serde_json::from_str::<BareMessage>(text) {
                Ok(bare) => Ok(TeamFrame::Message {
                    content: bare.content,
                }),
                Err(_) => Err(tagged_err),
            },
        }
    }
}

/// Outbound frame, one variant per wire `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Start {
        message: String,
    },
    Chunk {
        content: String,
    },
    Complete {
        message: String,
    },
    ChatSaved {
        chat_id: String,
    },
    AiStart {
        user_id: UserId,
        username: String,
        prompt: String,
    },
    AiChunk {
        content: String,
        user_id: UserId,
    },
    AiComplete {
        user_id: UserId,
        full_response: String,
    },
    UserJoined {
        user_id: UserId,
        username: String,
        timestamp: String,
    },
    UserLeft {
        user_id: UserId,
        username: String,
        timestamp: String,
    },
    Message {
        user_id: UserId,
        username: String,
        content: String,
        timestamp: String,
    },
    Error {
        message: String,
    },
}
