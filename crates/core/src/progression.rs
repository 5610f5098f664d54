//! Turns the completion endpoint's structured reply into a persistence
//! decision for the conversation's linked issue.
//!
//! The decision itself is deterministic and store-free: callers feed it the
//! link state of the conversation plus the parsed reply, and apply the
//! returned action inside their own transaction.

use serde::Deserialize;

use crate::domain::customer::CustomerId;
use crate::domain::issue::{
    Issue, IssueId, IssueStatus, IssueType, UrgencyLevel, MAX_DESCRIPTION_CHARS,
};
use crate::errors::DomainError;

/// Structured payload the completion endpoint is constrained to produce on
/// every turn. All issue fields are optional; `assistant_reply` is mandatory
/// and enforced non-empty by the completion gateway before this type reaches
/// the decision step.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct StructuredReply {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub issue_type: Option<IssueType>,
    #[serde(default)]
    pub urgency: Option<UrgencyLevel>,
    #[serde(default)]
    pub status: Option<IssueStatus>,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub create_issue: bool,
    #[serde(default)]
    pub assistant_reply: String,
}

impl StructuredReply {
    /// The status the turn settles on: the reply's status, or the in-progress
    /// default when the model left it unset.
    pub fn settled_status(&self) -> IssueStatus {
        self.status.unwrap_or_default()
    }
}

/// Field values for a brand-new issue, with defaults already applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewIssue {
    pub description: String,
    pub issue_type: IssueType,
    pub urgency: UrgencyLevel,
    pub status: IssueStatus,
    pub order_number: Option<String>,
}

impl NewIssue {
    pub fn into_issue(self, customer_id: CustomerId) -> Issue {
        Issue {
            id: IssueId::generate(),
            customer_id,
            description: self.description,
            issue_type: self.issue_type,
            urgency: self.urgency,
            status: self.status,
            order_number: self.order_number,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Partial patch for an existing issue. Absent fields are left untouched,
/// never cleared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssuePatch {
    pub description: Option<String>,
    pub issue_type: Option<IssueType>,
    pub urgency: Option<UrgencyLevel>,
    pub status: Option<IssueStatus>,
    pub order_number: Option<String>,
}

impl IssuePatch {
    pub fn apply(&self, issue: &mut Issue) {
        if let Some(description) = &self.description {
            issue.description = description.clone();
        }
        if let Some(issue_type) = self.issue_type {
            issue.issue_type = issue_type;
        }
        if let Some(urgency) = self.urgency {
            issue.urgency = urgency;
        }
        if let Some(status) = self.status {
            issue.status = status;
        }
        if let Some(order_number) = &self.order_number {
            issue.order_number = Some(order_number.clone());
        }
    }
}

/// Outcome of the progression decision table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IssueAction {
    /// Persist a new issue and link it to the conversation.
    Create(NewIssue),
    /// Patch the issue already linked to the conversation.
    Update(IssuePatch),
    /// The turn was conversational only; touch nothing.
    Conversational,
}

/// Observability classification of a turn's settled status. Has no further
/// behavioral effect: conversations stay open for more turns regardless.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusDisposition {
    ManualReview,
    Completed,
    Ongoing,
}

impl StatusDisposition {
    pub fn of(status: IssueStatus) -> Self {
        match status {
            IssueStatus::RequiresManualReview => Self::ManualReview,
            IssueStatus::Resolved | IssueStatus::Closed => Self::Completed,
            IssueStatus::InProgress => Self::Ongoing,
        }
    }
}

/// Evaluate the decision table for one turn.
///
/// `has_linked_issue` is the conversation's link state *before* this turn.
/// Creation requires both a description and an issue type; missing either is
/// a validation failure and the caller must not mutate the store.
pub fn decide(
    has_linked_issue: bool,
    reply: &StructuredReply,
) -> Result<IssueAction, DomainError> {
    if !reply.create_issue {
        return Ok(IssueAction::Conversational);
    }

    if let Some(description) = &reply.description {
        let got = description.chars().count();
        if got > MAX_DESCRIPTION_CHARS {
            return Err(DomainError::DescriptionTooLong { max: MAX_DESCRIPTION_CHARS, got });
        }
    }

    if has_linked_issue {
        // Blank strings from the model are noise, not a request to clear.
        return Ok(IssueAction::Update(IssuePatch {
            description: reply.description.clone().filter(|value| !value.trim().is_empty()),
            issue_type: reply.issue_type,
            urgency: reply.urgency,
            status: reply.status,
            order_number: reply.order_number.clone().filter(|value| !value.trim().is_empty()),
        }));
    }

    let description = match &reply.description {
        Some(description) if !description.trim().is_empty() => description.clone(),
        _ => return Err(DomainError::MissingIssueFields),
    };
    let issue_type = reply.issue_type.ok_or(DomainError::MissingIssueFields)?;

    Ok(IssueAction::Create(NewIssue {
        description,
        issue_type,
        urgency: reply.urgency.unwrap_or_default(),
        status: reply.status.unwrap_or_default(),
        order_number: reply.order_number.clone(),
    }))
}
