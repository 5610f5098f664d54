//! Conversational support agent - completion plumbing and orchestration.
//!
//! This crate is the seam between HTTP handlers and everything stateful:
//!
//! 1. **Completion gateway** (`gateway`, `llm`, `openai`) - maps stored turns
//!    to role-tagged wire messages, calls an OpenAI-compatible completion
//!    endpoint constrained to the structured issue schema, and retries
//!    malformed or empty replies up to a configured bound.
//! 2. **Retrieval** (`retrieval`) - best-effort knowledge-base search used to
//!    ground the system prompt when enabled. Never a correctness dependency:
//!    failures degrade to an empty context.
//! 3. **Orchestration** (`service`) - `AgentService` owns login, conversation
//!    lifecycle, the chat progression step, and summaries, committing each
//!    chat exchange as one transaction.
//!
//! # Safety principle
//!
//! The model is a translator, not an authority. It proposes issue fields; the
//! deterministic progression rules in `careline-core` decide what is actually
//! persisted, and invalid proposals are rejected rather than coerced.

pub mod gateway;
pub mod llm;
pub mod openai;
pub mod retrieval;
pub mod service;

pub use gateway::CompletionGateway;
pub use llm::{ChatMessage, CompletionClient, CompletionError};
pub use openai::OpenAiCompletionClient;
pub use retrieval::{Document, Retriever};
pub use service::{AgentService, ChatOutcome, ConversationOpened, LoginOutcome};
