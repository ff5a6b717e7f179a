use std::fmt;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("You"),
            Role::Assistant => f.write_str("Bot"),
        }
    }
}

/// One message in a conversation. Immutable once built.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ChatRequest {
    pub conversation_slug: Uuid,
    pub question: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ConversationResponse {
    pub slug: Uuid,
    pub turns: Vec<Turn>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct StatusResponse {
    pub model_ready: bool,
    pub model_error: Option<String>,
}

#[derive(Error, Diagnostic, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ApiError {
    #[error("conversation {slug} does not exist")]
    ConversationNotFound { slug: Uuid },
}
