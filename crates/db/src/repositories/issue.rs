use careline_core::{CustomerId, Issue, IssueId, IssueStatus, IssueType, UrgencyLevel};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{decode_timestamp, decode_uuid, RepositoryError};
use crate::DbPool;

pub struct SqlIssueRepository {
    pool: DbPool,
}

impl SqlIssueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &IssueId) -> Result<Option<Issue>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, description, issue_type, urgency, status, order_number, created_at
             FROM issue WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| issue_from_row(&row)).transpose()
    }
}

pub(crate) async fn insert_in_tx(
    conn: &mut SqliteConnection,
    issue: &Issue,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO issue (id, customer_id, description, issue_type, urgency, status, order_number, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(issue.id.to_string())
    .bind(issue.customer_id.to_string())
    .bind(&issue.description)
    .bind(issue.issue_type.as_str())
    .bind(issue.urgency.as_str())
    .bind(issue.status.as_str())
    .bind(issue.order_number.as_deref())
    .bind(issue.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub(crate) async fn find_in_tx(
    conn: &mut SqliteConnection,
    id: &IssueId,
) -> Result<Option<Issue>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, customer_id, description, issue_type, urgency, status, order_number, created_at
         FROM issue WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(|row| issue_from_row(&row)).transpose()
}

pub(crate) async fn update_in_tx(
    conn: &mut SqliteConnection,
    issue: &Issue,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE issue
         SET description = ?, issue_type = ?, urgency = ?, status = ?, order_number = ?
         WHERE id = ?",
    )
    .bind(&issue.description)
    .bind(issue.issue_type.as_str())
    .bind(issue.urgency.as_str())
    .bind(issue.status.as_str())
    .bind(issue.order_number.as_deref())
    .bind(issue.id.to_string())
    .execute(conn)
    .await?;

    Ok(())
}

pub(crate) fn issue_from_row(row: &SqliteRow) -> Result<Issue, RepositoryError> {
    let issue_type_raw: String = row.get("issue_type");
    let urgency_raw: String = row.get("urgency");
    let status_raw: String = row.get("status");

    Ok(Issue {
        id: IssueId(decode_uuid("issue.id", &row.get::<String, _>("id"))?),
        customer_id: CustomerId(decode_uuid(
            "issue.customer_id",
            &row.get::<String, _>("customer_id"),
        )?),
        description: row.get("description"),
        issue_type: IssueType::parse(&issue_type_raw).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown issue_type `{issue_type_raw}`"))
        })?,
        urgency: UrgencyLevel::parse(&urgency_raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown urgency `{urgency_raw}`")))?,
        status: IssueStatus::parse(&status_raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_raw}`")))?,
        order_number: row.get("order_number"),
        created_at: decode_timestamp("issue.created_at", &row.get::<String, _>("created_at"))?,
    })
}
