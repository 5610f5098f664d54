//! OpenAI-compatible structured-completion client. Works against the OpenAI
//! API and local servers exposing the same surface (e.g. Ollama's /v1).

use std::time::Duration;

use async_trait::async_trait;
use careline_core::config::{LlmConfig, LlmProvider};
use careline_core::progression::StructuredReply;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::{ChatMessage, CompletionClient, CompletionError};

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

pub struct OpenAiCompletionClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompletionClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let default_base_url = match config.provider {
            LlmProvider::OpenAi => OPENAI_DEFAULT_BASE_URL,
            LlmProvider::Ollama => OLLAMA_DEFAULT_BASE_URL,
        };
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| CompletionError::Transport(error.to_string()))?;

        Ok(Self { client, base_url, model: config.model.clone(), api_key: config.api_key.clone() })
    }

    /// JSON schema the endpoint is constrained to. Issue fields are nullable;
    /// `assistant_reply` and `create_issue` are always present.
    fn reply_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": { "type": ["string", "null"], "maxLength": 1000 },
                "issue_type": {
                    "type": ["string", "null"],
                    "enum": ["delivery", "product", "billing", "other", null]
                },
                "urgency": {
                    "type": ["string", "null"],
                    "enum": ["low", "medium", "high", null]
                },
                "status": {
                    "type": ["string", "null"],
                    "enum": ["in_progress", "resolved", "closed", "requires_manual_review", null]
                },
                "order_number": { "type": ["string", "null"] },
                "create_issue": { "type": "boolean" },
                "assistant_reply": { "type": "string" }
            },
            "required": [
                "description", "issue_type", "urgency", "status",
                "order_number", "create_issue", "assistant_reply"
            ],
            "additionalProperties": false
        })
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    response_format: Value,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
    ) -> Result<StructuredReply, CompletionError> {
        let body = WireRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|message| WireMessage {
                    role: message.role.as_str(),
                    content: &message.content,
                })
                .collect(),
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "support_issue_reply",
                    "strict": true,
                    "schema": Self::reply_schema(),
                }
            }),
        };

        let mut request = self.client.post(format!("{}/chat/completions", self.base_url));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|error| CompletionError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompletionError::Status(status.as_u16()));
        }

        let payload: WireResponse = response
            .json()
            .await
            .map_err(|error| CompletionError::Malformed(error.to_string()))?;

        let content = payload
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or_else(|| CompletionError::Malformed("response carries no content".to_string()))?;

        serde_json::from_str::<StructuredReply>(content)
            .map_err(|error| CompletionError::Malformed(error.to_string()))
    }
}
