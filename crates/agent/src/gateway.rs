use std::sync::Arc;

use careline_core::progression::StructuredReply;
use careline_core::{ApplicationError, Turn};
use tracing::warn;

use crate::llm::{ChatMessage, CompletionClient};

/// Retry-until-valid wrapper around a completion client.
///
/// A usable reply must parse into the structured schema and carry a non-empty
/// `assistant_reply`; anything else is discarded and retried. Unlike the
/// naive loop this is bounded: after `1 + max_retries` attempts the turn
/// fails upstream instead of spinning forever.
pub struct CompletionGateway {
    client: Arc<dyn CompletionClient>,
    max_retries: u32,
}

impl CompletionGateway {
    pub fn new(client: Arc<dyn CompletionClient>, max_retries: u32) -> Self {
        Self { client, max_retries }
    }

    /// Maps stored turns plus the incoming user message to wire messages and
    /// obtains a usable structured reply.
    pub async fn structured_reply(
        &self,
        history: &[Turn],
        pending_user_text: &str,
    ) -> Result<StructuredReply, ApplicationError> {
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .map(|turn| ChatMessage { role: turn.role, content: turn.text.clone() })
            .collect();
        messages.push(ChatMessage::user(pending_user_text));

        let attempts = 1 + self.max_retries;
        for attempt in 1..=attempts {
            match self.client.complete(&messages).await {
                Ok(reply) if !reply.assistant_reply.trim().is_empty() => return Ok(reply),
                Ok(_) => {
                    warn!(
                        event_name = "agent.completion.empty_reply",
                        attempt,
                        attempts,
                        "discarding completion with empty assistant reply"
                    );
                }
                Err(error) => {
                    warn!(
                        event_name = "agent.completion.attempt_failed",
                        attempt,
                        attempts,
                        error = %error,
                        "discarding failed completion attempt"
                    );
                }
            }
        }

        Err(ApplicationError::Upstream(format!(
            "no usable structured reply after {attempts} attempts"
        )))
    }
}
