use careline_core::{Customer, CustomerId};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{decode_timestamp, decode_uuid, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, customer: &Customer) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO customer (id, name, email, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(customer.id.to_string())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(customer.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(
        &self,
        id: &CustomerId,
    ) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, email, created_at FROM customer WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| customer_from_row(&row)).transpose()
    }

    /// Exact, case-sensitive match: the email is the login key and is never
    /// normalized.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, email, created_at FROM customer WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| customer_from_row(&row)).transpose()
    }

    /// Removes the customer and, via schema cascades, their conversations,
    /// turns, and issues. Returns false when the id was unknown.
    pub async fn delete(&self, id: &CustomerId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM customer WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn customer_from_row(row: &SqliteRow) -> Result<Customer, RepositoryError> {
    Ok(Customer {
        id: CustomerId(decode_uuid("customer.id", &row.get::<String, _>("id"))?),
        name: row.get("name"),
        email: row.get("email"),
        created_at: decode_timestamp("customer.created_at", &row.get::<String, _>("created_at"))?,
    })
}

#[cfg(test)]
mod tests {
    use careline_core::progression::{IssueAction, NewIssue};
    use careline_core::{Customer, CustomerId, IssueStatus, IssueType, UrgencyLevel};

    use crate::repositories::{SqlConversationRepository, SqlCustomerRepository};
    use crate::{connect_with_settings, migrations};

    async fn pool() -> crate::DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let repo = SqlCustomerRepository::new(pool().await);
        let customer = Customer::new("John Doe", "john@example.com");

        repo.insert(&customer).await.expect("insert");

        let by_id = repo.find_by_id(&customer.id).await.expect("find by id");
        assert_eq!(by_id.as_ref(), Some(&customer));

        let by_email = repo.find_by_email("john@example.com").await.expect("find by email");
        assert_eq!(by_email, Some(customer));
    }

    #[tokio::test]
    async fn email_lookup_is_case_sensitive() {
        let repo = SqlCustomerRepository::new(pool().await);
        repo.insert(&Customer::new("John Doe", "John@Example.com")).await.expect("insert");

        let miss = repo.find_by_email("john@example.com").await.expect("lookup");
        assert_eq!(miss, None);
    }

    #[tokio::test]
    async fn duplicate_email_trips_the_unique_constraint() {
        let repo = SqlCustomerRepository::new(pool().await);
        repo.insert(&Customer::new("First", "shared@example.com")).await.expect("insert");

        let error = repo
            .insert(&Customer::new("Second", "shared@example.com"))
            .await
            .expect_err("duplicate email must fail");
        assert!(error.is_unique_violation());
    }

    #[tokio::test]
    async fn unknown_id_deletes_nothing() {
        let repo = SqlCustomerRepository::new(pool().await);
        let deleted = repo.delete(&CustomerId::generate()).await.expect("delete");
        assert!(!deleted);
    }

    #[tokio::test]
    async fn deleting_a_customer_cascades_to_conversations_and_issues() {
        let pool = pool().await;
        let customers = SqlCustomerRepository::new(pool.clone());
        let conversations = SqlConversationRepository::new(pool.clone());

        let customer = Customer::new("Jane Smith", "jane@example.com");
        customers.insert(&customer).await.expect("insert customer");

        let conversation = conversations
            .create_with_opening(customer.id, "grounding", "greeting")
            .await
            .expect("create conversation");
        conversations
            .commit_exchange(
                &conversation,
                "my parcel never arrived",
                &IssueAction::Create(NewIssue {
                    description: "Parcel missing since Tuesday".to_owned(),
                    issue_type: IssueType::Delivery,
                    urgency: UrgencyLevel::Medium,
                    status: IssueStatus::InProgress,
                    order_number: None,
                }),
                "I have logged that for you.",
            )
            .await
            .expect("commit exchange");

        assert!(customers.delete(&customer.id).await.expect("delete"));

        for (table, label) in
            [("conversation", "conversations"), ("turn", "turns"), ("issue", "issues")]
        {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&pool)
                .await
                .expect("count");
            assert_eq!(count, 0, "expected no {label} after customer deletion");
        }
    }

    #[tokio::test]
    async fn deleting_a_conversation_keeps_the_linked_issue() {
        let pool = pool().await;
        let customers = SqlCustomerRepository::new(pool.clone());
        let conversations = SqlConversationRepository::new(pool.clone());

        let customer = Customer::new("Ada", "ada@example.com");
        customers.insert(&customer).await.expect("insert customer");

        let conversation = conversations
            .create_with_opening(customer.id, "grounding", "greeting")
            .await
            .expect("create conversation");
        conversations
            .commit_exchange(
                &conversation,
                "wrong item in the box",
                &IssueAction::Create(NewIssue {
                    description: "Received the wrong item".to_owned(),
                    issue_type: IssueType::Product,
                    urgency: UrgencyLevel::Medium,
                    status: IssueStatus::InProgress,
                    order_number: Some("12345".to_owned()),
                }),
                "Logged, sorry about that.",
            )
            .await
            .expect("commit exchange");

        sqlx::query("DELETE FROM conversation WHERE id = ?")
            .bind(conversation.id.to_string())
            .execute(&pool)
            .await
            .expect("delete conversation");

        let issue_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM issue")
            .fetch_one(&pool)
            .await
            .expect("count issues");
        assert_eq!(issue_count, 1, "issues are durable records and must survive");
    }
}
