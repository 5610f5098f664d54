//! Customer-facing agent endpoints.
//!
//! - `POST /agent/log_in`                        — log a customer in, creating them on first sight
//! - `POST /agent/start_conversation`            — open a conversation, returns the greeting
//! - `POST /agent/chat/{conversation_id}`        — one chat turn against the agent
//! - `GET  /agent/{conversation_id}/summary`     — plain-text conversation summary

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use careline_agent::AgentService;
use careline_core::{ApplicationError, ConversationId, CustomerId, IssueStatus};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

#[derive(Clone)]
pub struct AgentState {
    service: Arc<AgentService>,
}

#[derive(Debug, Deserialize)]
pub struct LogInRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct LogInResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub new_user: bool,
}

#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    pub customer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StartConversationResponse {
    pub conversation_id: Uuid,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub status: IssueStatus,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub fn router(service: Arc<AgentService>) -> Router {
    Router::new()
        .route("/agent/log_in", post(log_in))
        .route("/agent/start_conversation", post(start_conversation))
        .route("/agent/chat/{conversation_id}", post(chat))
        .route("/agent/{conversation_id}/summary", get(summary))
        .with_state(AgentState { service })
}

async fn log_in(
    State(state): State<AgentState>,
    Json(payload): Json<LogInRequest>,
) -> Result<Json<LogInResponse>, (StatusCode, Json<ApiError>)> {
    let name = payload.name.trim();
    let email = payload.email.trim();
    if name.is_empty() || email.is_empty() {
        return Err(bad_request("name and email must be non-empty"));
    }

    let outcome = state.service.log_in(name, email).await.map_err(error_response)?;
    Ok(Json(LogInResponse {
        id: outcome.customer.id.0,
        name: outcome.customer.name,
        email: outcome.customer.email,
        new_user: outcome.new_user,
    }))
}

async fn start_conversation(
    State(state): State<AgentState>,
    Json(payload): Json<StartConversationRequest>,
) -> Result<Json<StartConversationResponse>, (StatusCode, Json<ApiError>)> {
    match state.service.start_conversation(CustomerId(payload.customer_id)).await {
        Ok(opened) => Ok(Json(StartConversationResponse {
            conversation_id: opened.conversation_id.0,
            message: opened.message,
        })),
        // An unknown customer id on this route is an authentication failure,
        // not a missing resource.
        Err(not_found @ ApplicationError::NotFound { .. }) => {
            Err((StatusCode::UNAUTHORIZED, Json(ApiError { error: not_found.to_string() })))
        }
        Err(other) => Err(error_response(other)),
    }
}

async fn chat(
    Path(conversation_id): Path<Uuid>,
    State(state): State<AgentState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ApiError>)> {
    if payload.message.trim().is_empty() {
        return Err(bad_request("message must be non-empty"));
    }

    let outcome = state
        .service
        .chat(ConversationId(conversation_id), &payload.message)
        .await
        .map_err(error_response)?;

    Ok(Json(ChatResponse { reply: outcome.reply, status: outcome.status }))
}

async fn summary(
    Path(conversation_id): Path<Uuid>,
    State(state): State<AgentState>,
) -> Result<String, (StatusCode, Json<ApiError>)> {
    state.service.summary(ConversationId(conversation_id)).await.map_err(error_response)
}

fn bad_request(message: &str) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message.to_string() }))
}

fn error_response(error: ApplicationError) -> (StatusCode, Json<ApiError>) {
    match &error {
        ApplicationError::Domain(_) => {
            (StatusCode::BAD_REQUEST, Json(ApiError { error: error.to_string() }))
        }
        ApplicationError::NotFound { .. } => {
            (StatusCode::NOT_FOUND, Json(ApiError { error: error.to_string() }))
        }
        ApplicationError::Upstream(_) => {
            error!(error = %error, "completion upstream failure");
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiError { error: "the assistant is temporarily unavailable".to_string() }),
            )
        }
        ApplicationError::Persistence(_) => {
            error!(error = %error, "agent persistence failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError { error: "an internal error occurred".to_string() }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;
    use careline_agent::{
        AgentService, ChatMessage, CompletionClient, CompletionError, CompletionGateway, Retriever,
    };
    use careline_core::config::RetrievalConfig;
    use careline_core::progression::StructuredReply;
    use careline_core::{IssueStatus, IssueType};
    use careline_db::{connect_with_settings, migrations};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::{
        chat, log_in, start_conversation, summary, AgentState, ChatRequest, LogInRequest,
        StartConversationRequest,
    };

    struct ScriptedClient {
        script: Mutex<Vec<Result<StructuredReply, CompletionError>>>,
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
        ) -> Result<StructuredReply, CompletionError> {
            let mut script = self.script.lock().await;
            if script.is_empty() {
                panic!("scripted client called more often than scripted");
            }
            script.remove(0)
        }
    }

    async fn state(script: Vec<Result<StructuredReply, CompletionError>>) -> State<AgentState> {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let client = Arc::new(ScriptedClient { script: Mutex::new(script) });
        let retriever = Retriever::from_config(&RetrievalConfig {
            enabled: false,
            index_path: "unused".into(),
            kb_path: "unused".into(),
        });
        let service =
            Arc::new(AgentService::new(pool, CompletionGateway::new(client, 1), retriever));
        State(AgentState { service })
    }

    async fn logged_in_customer(state: &State<AgentState>) -> Uuid {
        let Json(response) = log_in(
            state.clone(),
            Json(LogInRequest { name: "John Doe".into(), email: "john@example.com".into() }),
        )
        .await
        .expect("login should succeed");
        response.id
    }

    #[tokio::test]
    async fn log_in_reports_new_user_then_reuses_the_record() {
        let state = state(Vec::new()).await;

        let Json(first) = log_in(
            state.clone(),
            Json(LogInRequest { name: "John Doe".into(), email: "john@example.com".into() }),
        )
        .await
        .expect("first login");
        assert!(first.new_user);

        let Json(second) = log_in(
            state.clone(),
            Json(LogInRequest { name: "Different Name".into(), email: "john@example.com".into() }),
        )
        .await
        .expect("second login");
        assert!(!second.new_user);
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "John Doe");
    }

    #[tokio::test]
    async fn log_in_rejects_blank_fields() {
        let state = state(Vec::new()).await;

        let result = log_in(
            state,
            Json(LogInRequest { name: "  ".into(), email: "john@example.com".into() }),
        )
        .await;

        let (status, _) = result.expect_err("blank name must fail");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn start_conversation_with_unknown_customer_is_unauthorized() {
        let state = state(Vec::new()).await;

        let result = start_conversation(
            state,
            Json(StartConversationRequest { customer_id: Uuid::new_v4() }),
        )
        .await;

        let (status, _) = result.expect_err("unknown customer must fail");
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn chat_round_trip_returns_reply_and_status() {
        let state = state(vec![Ok(StructuredReply {
            create_issue: true,
            description: Some("Charged twice for order 12345".into()),
            issue_type: Some(IssueType::Billing),
            assistant_reply: "I have opened a billing issue for you.".into(),
            ..StructuredReply::default()
        })])
        .await;

        let customer_id = logged_in_customer(&state).await;
        let Json(opened) =
            start_conversation(state.clone(), Json(StartConversationRequest { customer_id }))
                .await
                .expect("start conversation");

        let Json(response) = chat(
            Path(opened.conversation_id),
            state,
            Json(ChatRequest { message: "I was billed twice".into() }),
        )
        .await
        .expect("chat");

        assert_eq!(response.reply, "I have opened a billing issue for you.");
        assert_eq!(response.status, IssueStatus::InProgress);
    }

    #[tokio::test]
    async fn chat_with_unknown_conversation_is_not_found() {
        let state = state(Vec::new()).await;

        let result = chat(
            Path(Uuid::new_v4()),
            state,
            Json(ChatRequest { message: "anyone there?".into() }),
        )
        .await;

        let (status, _) = result.expect_err("unknown conversation must fail");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_rejects_blank_messages() {
        let state = state(Vec::new()).await;

        let result =
            chat(Path(Uuid::new_v4()), state, Json(ChatRequest { message: "   ".into() })).await;

        let (status, _) = result.expect_err("blank message must fail");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn exhausted_completions_surface_as_bad_gateway() {
        let state = state(vec![
            Err(CompletionError::Status(500)),
            Err(CompletionError::Status(500)),
        ])
        .await;

        let customer_id = logged_in_customer(&state).await;
        let Json(opened) =
            start_conversation(state.clone(), Json(StartConversationRequest { customer_id }))
                .await
                .expect("start conversation");

        let result = chat(
            Path(opened.conversation_id),
            state,
            Json(ChatRequest { message: "hello".into() }),
        )
        .await;

        let (status, _) = result.expect_err("exhausted completions must fail");
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn summary_returns_text_for_known_conversation() {
        let state = state(Vec::new()).await;

        let customer_id = logged_in_customer(&state).await;
        let Json(opened) =
            start_conversation(state.clone(), Json(StartConversationRequest { customer_id }))
                .await
                .expect("start conversation");

        let text = summary(Path(opened.conversation_id), state).await.expect("summary");
        assert!(text.contains("No issue has been filed"));
    }

    #[tokio::test]
    async fn summary_of_unknown_conversation_is_not_found() {
        let state = state(Vec::new()).await;

        let result = summary(Path(Uuid::new_v4()), state).await;
        let (status, _) = result.expect_err("unknown conversation must fail");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
