use async_trait::async_trait;
use careline_core::{progression::StructuredReply, Role};
use thiserror::Error;

/// One role-tagged message on the completion wire, in conversation order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion transport failure: {0}")]
    Transport(String),
    #[error("completion endpoint returned status {0}")]
    Status(u16),
    #[error("malformed completion payload: {0}")]
    Malformed(String),
}

/// A single structured-completion attempt. Implementations parse the
/// provider's payload into the issue schema; the gateway decides whether a
/// parsed reply is acceptable and whether to retry.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage])
        -> Result<StructuredReply, CompletionError>;
}
