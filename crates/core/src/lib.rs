pub mod config;
pub mod domain;
pub mod errors;
pub mod progression;
pub mod prompts;

pub use domain::conversation::{Conversation, ConversationId, Role, Turn, TurnId};
pub use domain::customer::{Customer, CustomerId};
pub use domain::issue::{Issue, IssueId, IssueStatus, IssueType, UrgencyLevel};
pub use errors::{ApplicationError, DomainError};
pub use progression::{
    decide, IssueAction, IssuePatch, NewIssue, StatusDisposition, StructuredReply,
};
