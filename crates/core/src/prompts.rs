//! Fixed prompt text seeded into every conversation.

/// Name the agent introduces itself with; the greeting and tests key on it.
pub const AGENT_NAME: &str = "Careline";

const GROUNDING: &str = "\
You are Careline, a helpful conversational agent for customer support.

Conduct a short, natural conversation with the customer. Keep going until you
have collected or confidently ascertained:

- issue_type (one of: delivery, product, billing, other)
- urgency (one of: low, medium, high)
- description (freeform text, max 1000 characters, faithful to the customer's own words)

Optionally, also collect or determine:
- order_number (an identifier like 12345 or AB-9876)
- status (one of: in_progress, resolved, closed, requires_manual_review)
    - If the customer says the issue is already resolved, set status to resolved.
    - If the customer no longer needs help, set status to closed.
    - If the issue is urgent and needs human intervention, set status to requires_manual_review.
    - Otherwise leave status unset; it defaults to in_progress.

Rules:
- Always be polite and conversational.
- Steer toward the missing fields; do not repeat questions already answered unless clarifying.
- Confirm ambiguous values with the customer (e.g. \"super urgent\" -> low/medium/high).
- Maintain context from earlier turns.
- Once every field is collected, summarize back what you understood.
- Answer off-topic questions briefly, then return to gathering the required information.

Set create_issue to true whenever the collected fields should be persisted or
refreshed, and always provide a natural assistant_reply for the customer.";

/// Grounding prompt for conversations without retrieval.
pub fn system_prompt() -> &'static str {
    GROUNDING
}

/// Grounding prompt with knowledge-base excerpts appended. The `CONTEXT`
/// block is what distinguishes the retrieval variant.
pub fn system_prompt_with_context(context: &str) -> String {
    format!(
        "{GROUNDING}\n\n\
         CONTEXT: excerpts from the support knowledge base. Prefer these when\n\
         answering questions about policies, shipping, billing, or products:\n\
         {context}"
    )
}

/// Visible greeting seeded as the first assistant turn of every conversation.
pub fn greeting() -> String {
    format!(
        "Welcome to {AGENT_NAME}! You are chatting with our virtual Support Agent. \
         How can I help you today?"
    )
}

#[cfg(test)]
mod tests {
    use super::{greeting, system_prompt, system_prompt_with_context, AGENT_NAME};

    #[test]
    fn base_prompt_has_no_context_block() {
        assert!(!system_prompt().contains("CONTEXT"));
    }

    #[test]
    fn retrieval_prompt_embeds_the_context_block() {
        let prompt = system_prompt_with_context("- Standard shipping takes 3-5 days.");
        assert!(prompt.contains("CONTEXT"));
        assert!(prompt.contains("Standard shipping takes 3-5 days."));
        assert!(prompt.starts_with(system_prompt()));
    }

    #[test]
    fn greeting_names_the_agent() {
        let greeting = greeting();
        assert!(greeting.contains(AGENT_NAME));
        assert!(greeting.contains("Support Agent"));
    }
}
