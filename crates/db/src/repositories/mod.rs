use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod conversation;
pub mod customer;
pub mod issue;
pub mod locks;

pub use conversation::SqlConversationRepository;
pub use customer::SqlCustomerRepository;
pub use issue::SqlIssueRepository;
pub use locks::ConversationLocks;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` is missing")]
    MissingRow { entity: &'static str, id: String },
}

impl RepositoryError {
    pub fn missing(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::MissingRow { entity, id: id.to_string() }
    }

    /// True when the underlying failure is a SQLite UNIQUE constraint trip,
    /// e.g. two concurrent logins racing to insert the same email.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db_error)) => {
                db_error.message().contains("UNIQUE constraint failed")
            }
            _ => false,
        }
    }
}

impl From<RepositoryError> for careline_core::ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::MissingRow { entity, id } => Self::NotFound { entity, id },
            other => Self::Persistence(other.to_string()),
        }
    }
}

pub(crate) fn decode_uuid(column: &'static str, raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw)
        .map_err(|_| RepositoryError::Decode(format!("column `{column}` holds malformed uuid `{raw}`")))
}

pub(crate) fn decode_timestamp(
    column: &'static str,
    raw: &str,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|_| {
            RepositoryError::Decode(format!("column `{column}` holds malformed timestamp `{raw}`"))
        })
}
