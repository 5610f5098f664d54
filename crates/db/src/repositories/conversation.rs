use careline_core::progression::IssueAction;
use careline_core::{
    Conversation, ConversationId, CustomerId, Issue, IssueId, Role, Turn, TurnId,
};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{decode_timestamp, decode_uuid, issue, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Creates a conversation and seeds its opening pair (the hidden system
    /// grounding turn, then the visible assistant greeting) in one
    /// transaction. Every conversation starts with exactly these two turns.
    pub async fn create_with_opening(
        &self,
        customer_id: CustomerId,
        system_text: &str,
        greeting_text: &str,
    ) -> Result<Conversation, RepositoryError> {
        let conversation = Conversation::new(customer_id);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO conversation (id, customer_id, issue_id, created_at)
             VALUES (?, ?, NULL, ?)",
        )
        .bind(conversation.id.to_string())
        .bind(conversation.customer_id.to_string())
        .bind(conversation.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        insert_turn_in_tx(&mut tx, conversation.id, Role::System, system_text).await?;
        insert_turn_in_tx(&mut tx, conversation.id, Role::Assistant, greeting_text).await?;
        tx.commit().await?;

        Ok(conversation)
    }

    pub async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, issue_id, created_at FROM conversation WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| conversation_from_row(&row)).transpose()
    }

    /// All turns of the conversation in insertion order.
    pub async fn turns(&self, id: &ConversationId) -> Result<Vec<Turn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, text, position, created_at
             FROM turn WHERE conversation_id = ? ORDER BY position",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(turn_from_row).collect()
    }

    /// Appends one immutable turn. Fails with a missing-row error when the
    /// conversation does not exist.
    pub async fn append_turn(
        &self,
        id: &ConversationId,
        role: Role,
        text: &str,
    ) -> Result<Turn, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        ensure_conversation_in_tx(&mut tx, id).await?;
        let turn = insert_turn_in_tx(&mut tx, *id, role, text).await?;
        tx.commit().await?;

        Ok(turn)
    }

    /// Commits one full chat exchange atomically: the user turn, the issue
    /// action decided for this turn (create + link, patch, or nothing), and
    /// the assistant turn. Nothing is visible to readers until all of it is.
    ///
    /// Returns the issue as persisted by this exchange, when one was touched.
    pub async fn commit_exchange(
        &self,
        conversation: &Conversation,
        user_text: &str,
        action: &IssueAction,
        assistant_text: &str,
    ) -> Result<Option<Issue>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        ensure_conversation_in_tx(&mut tx, &conversation.id).await?;
        insert_turn_in_tx(&mut tx, conversation.id, Role::User, user_text).await?;

        let touched_issue = match action {
            IssueAction::Create(new_issue) => {
                let issue = new_issue.clone().into_issue(conversation.customer_id);
                issue::insert_in_tx(&mut tx, &issue).await?;
                sqlx::query("UPDATE conversation SET issue_id = ? WHERE id = ?")
                    .bind(issue.id.to_string())
                    .bind(conversation.id.to_string())
                    .execute(&mut *tx)
                    .await?;
                Some(issue)
            }
            IssueAction::Update(patch) => {
                let issue_id = conversation
                    .issue_id
                    .ok_or_else(|| RepositoryError::missing("issue link", conversation.id))?;
                let mut issue = issue::find_in_tx(&mut tx, &issue_id)
                    .await?
                    .ok_or_else(|| RepositoryError::missing("issue", issue_id))?;
                patch.apply(&mut issue);
                issue::update_in_tx(&mut tx, &issue).await?;
                Some(issue)
            }
            IssueAction::Conversational => None,
        };

        insert_turn_in_tx(&mut tx, conversation.id, Role::Assistant, assistant_text).await?;
        tx.commit().await?;

        Ok(touched_issue)
    }
}

async fn ensure_conversation_in_tx(
    conn: &mut SqliteConnection,
    id: &ConversationId,
) -> Result<(), RepositoryError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM conversation WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    match exists {
        Some(_) => Ok(()),
        None => Err(RepositoryError::missing("conversation", id)),
    }
}

async fn insert_turn_in_tx(
    conn: &mut SqliteConnection,
    conversation_id: ConversationId,
    role: Role,
    text: &str,
) -> Result<Turn, RepositoryError> {
    let position: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM turn WHERE conversation_id = ?",
    )
    .bind(conversation_id.to_string())
    .fetch_one(&mut *conn)
    .await?;

    let turn = Turn {
        id: TurnId::generate(),
        conversation_id,
        role,
        text: text.to_owned(),
        position,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO turn (id, conversation_id, role, text, position, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(turn.id.to_string())
    .bind(turn.conversation_id.to_string())
    .bind(turn.role.as_str())
    .bind(&turn.text)
    .bind(turn.position)
    .bind(turn.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(turn)
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation, RepositoryError> {
    let issue_id: Option<String> = row.get("issue_id");

    Ok(Conversation {
        id: ConversationId(decode_uuid("conversation.id", &row.get::<String, _>("id"))?),
        customer_id: CustomerId(decode_uuid(
            "conversation.customer_id",
            &row.get::<String, _>("customer_id"),
        )?),
        issue_id: issue_id
            .map(|raw| decode_uuid("conversation.issue_id", &raw).map(IssueId))
            .transpose()?,
        created_at: decode_timestamp(
            "conversation.created_at",
            &row.get::<String, _>("created_at"),
        )?,
    })
}

fn turn_from_row(row: &SqliteRow) -> Result<Turn, RepositoryError> {
    let role_raw: String = row.get("role");

    Ok(Turn {
        id: TurnId(decode_uuid("turn.id", &row.get::<String, _>("id"))?),
        conversation_id: ConversationId(decode_uuid(
            "turn.conversation_id",
            &row.get::<String, _>("conversation_id"),
        )?),
        role: Role::parse(&role_raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role_raw}`")))?,
        text: row.get("text"),
        position: row.get("position"),
        created_at: decode_timestamp("turn.created_at", &row.get::<String, _>("created_at"))?,
    })
}
