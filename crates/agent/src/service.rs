use careline_core::progression::{decide, StatusDisposition};
use careline_core::{
    prompts, ApplicationError, Conversation, ConversationId, Customer, CustomerId, Issue,
    IssueStatus, Role, Turn,
};
use careline_db::{
    ConversationLocks, DbPool, SqlConversationRepository, SqlCustomerRepository,
    SqlIssueRepository,
};
use tracing::{info, warn};

use crate::gateway::CompletionGateway;
use crate::retrieval::Retriever;

/// Query used to prime the retrieval-augmented system prompt with broad
/// coverage of the support domains before the customer has said anything.
const CONTEXT_PRIMING_QUERY: &str =
    "shipping delivery returns refunds billing charges orders account product support policy";
const CONTEXT_DOCUMENTS: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginOutcome {
    pub customer: Customer,
    pub new_user: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationOpened {
    pub conversation_id: ConversationId,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatOutcome {
    pub reply: String,
    pub status: IssueStatus,
}

/// Orchestrates the support-agent operations over explicitly injected
/// collaborators: the entity store, the completion gateway, and the
/// best-effort retriever. One instance is shared by all requests.
pub struct AgentService {
    customers: SqlCustomerRepository,
    conversations: SqlConversationRepository,
    issues: SqlIssueRepository,
    gateway: CompletionGateway,
    retriever: Retriever,
    locks: ConversationLocks,
}

impl AgentService {
    pub fn new(pool: DbPool, gateway: CompletionGateway, retriever: Retriever) -> Self {
        Self {
            customers: SqlCustomerRepository::new(pool.clone()),
            conversations: SqlConversationRepository::new(pool.clone()),
            issues: SqlIssueRepository::new(pool),
            gateway,
            retriever,
            locks: ConversationLocks::new(),
        }
    }

    /// Looks the customer up by exact email, creating them on first login.
    /// The stored name wins over whatever name a later login supplies.
    pub async fn log_in(&self, name: &str, email: &str) -> Result<LoginOutcome, ApplicationError> {
        if let Some(existing) = self.customers.find_by_email(email).await? {
            return Ok(LoginOutcome { customer: existing, new_user: false });
        }

        let customer = Customer::new(name, email);
        match self.customers.insert(&customer).await {
            Ok(()) => {
                info!(
                    event_name = "agent.customer.created",
                    customer_id = %customer.id,
                    "created customer on first login"
                );
                Ok(LoginOutcome { customer, new_user: true })
            }
            Err(error) if error.is_unique_violation() => {
                // Lost a concurrent first-login race; the winner's row is
                // authoritative.
                let winner = self.customers.find_by_email(email).await?.ok_or_else(|| {
                    ApplicationError::Persistence(
                        "customer vanished after unique-constraint race".to_string(),
                    )
                })?;
                Ok(LoginOutcome { customer: winner, new_user: false })
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Opens a conversation for an existing customer, seeding the grounding
    /// system turn (retrieval-augmented when enabled) and the greeting.
    pub async fn start_conversation(
        &self,
        customer_id: CustomerId,
    ) -> Result<ConversationOpened, ApplicationError> {
        self.customers
            .find_by_id(&customer_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("customer", customer_id))?;

        let system_text = if self.retriever.enabled() {
            let documents = self.retriever.search(CONTEXT_PRIMING_QUERY, CONTEXT_DOCUMENTS).await;
            prompts::system_prompt_with_context(&Retriever::context_block(&documents))
        } else {
            prompts::system_prompt().to_string()
        };

        let greeting = prompts::greeting();
        let conversation = self
            .conversations
            .create_with_opening(customer_id, &system_text, &greeting)
            .await?;

        info!(
            event_name = "agent.conversation.started",
            conversation_id = %conversation.id,
            customer_id = %customer_id,
            retrieval = self.retriever.enabled(),
            "conversation opened"
        );

        Ok(ConversationOpened { conversation_id: conversation.id, message: greeting })
    }

    /// One chat turn: obtain a structured reply, run the progression decision,
    /// and commit the whole exchange atomically. Serialized per conversation.
    pub async fn chat(
        &self,
        conversation_id: ConversationId,
        message: &str,
    ) -> Result<ChatOutcome, ApplicationError> {
        let _guard = self.locks.acquire(conversation_id).await;

        let conversation = self
            .conversations
            .find_by_id(&conversation_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("conversation", conversation_id))?;
        let history = self.conversations.turns(&conversation_id).await?;

        let reply = self.gateway.structured_reply(&history, message).await?;
        let action = decide(conversation.issue_id.is_some(), &reply).map_err(ApplicationError::from)?;

        let touched_issue = self
            .conversations
            .commit_exchange(&conversation, message, &action, &reply.assistant_reply)
            .await?;

        let status = reply.settled_status();
        self.log_disposition(&conversation, touched_issue.as_ref(), status);

        Ok(ChatOutcome { reply: reply.assistant_reply, status })
    }

    /// Plain-text summary of a conversation: headline, linked issue state,
    /// and the visible transcript (system turns omitted).
    pub async fn summary(
        &self,
        conversation_id: ConversationId,
    ) -> Result<String, ApplicationError> {
        let conversation = self
            .conversations
            .find_by_id(&conversation_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("conversation", conversation_id))?;
        let turns = self.conversations.turns(&conversation_id).await?;

        let issue = match conversation.issue_id {
            Some(issue_id) => self.issues.find_by_id(&issue_id).await?,
            None => None,
        };

        Ok(render_summary(&conversation, &turns, issue.as_ref()))
    }

    fn log_disposition(
        &self,
        conversation: &Conversation,
        issue: Option<&Issue>,
        status: IssueStatus,
    ) {
        let issue_id = issue.map(|issue| issue.id.to_string()).unwrap_or_else(|| "none".into());
        match StatusDisposition::of(status) {
            StatusDisposition::ManualReview => warn!(
                event_name = "agent.chat.manual_review",
                conversation_id = %conversation.id,
                issue_id = %issue_id,
                "conversation requires manual review per model"
            ),
            StatusDisposition::Completed => info!(
                event_name = "agent.chat.completed",
                conversation_id = %conversation.id,
                issue_id = %issue_id,
                status = %status,
                "conversation marked complete by model"
            ),
            StatusDisposition::Ongoing => info!(
                event_name = "agent.chat.ongoing",
                conversation_id = %conversation.id,
                issue_id = %issue_id,
                "conversation continues"
            ),
        }
    }
}

fn render_summary(conversation: &Conversation, turns: &[Turn], issue: Option<&Issue>) -> String {
    let mut lines = vec![format!(
        "Conversation {} started {} with {} turns.",
        conversation.id,
        conversation.created_at.format("%Y-%m-%d %H:%M UTC"),
        turns.len(),
    )];

    match issue {
        Some(issue) => {
            let order = issue
                .order_number
                .as_deref()
                .map(|order_number| format!(", order {order_number}"))
                .unwrap_or_default();
            lines.push(format!(
                "Issue {}: {} ({} urgency, {}{order})",
                issue.id,
                issue.issue_type.as_str(),
                issue.urgency.as_str(),
                issue.status.as_str(),
            ));
            lines.push(format!("  {}", issue.description));
        }
        None => lines.push("No issue has been filed for this conversation.".to_string()),
    }

    lines.push(String::new());
    for turn in turns.iter().filter(|turn| turn.role != Role::System) {
        lines.push(format!("{}: {}", turn.role, turn.text));
    }

    lines.join("\n")
}
