use chat_models::{Message, MessageId, PseudonymId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use validator::Validate;

use crate::error::{StoreError, StoreResult};
use crate::storage::inserted_row;
use crate::validation::NewMessage;

/// Default message ordering: newest first, later insert wins a timestamp tie.
pub(crate) const NEWEST_FIRST: &str = "m.created_at DESC, m.id DESC";

#[derive(Debug, FromRow)]
pub(crate) struct MessageRow {
    id: i64,
    pseudonym_id: i64,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            pseudonym_id: row.pseudonym_id,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct Messages {
    pool: SqlitePool,
}

impl Messages {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores a message authored by `pseudonym_id`, stamped with the current time.
    pub async fn post(&self, pseudonym_id: PseudonymId, content: &str) -> StoreResult<Message> {
        let input = NewMessage {
            content: content.to_string(),
        };
        input.validate()?;

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (pseudonym_id, content, created_at)
            VALUES (?, ?, ?)
            RETURNING id, pseudonym_id, content, created_at
            "#,
        )
        .bind(pseudonym_id)
        .bind(&input.content)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;
        let row = inserted_row(rows)?;

        tracing::debug!(
            component = "messages",
            message_id = row.id,
            pseudonym_id,
            "message posted"
        );
        Ok(row.into())
    }

    pub async fn get(&self, id: MessageId) -> StoreResult<Message> {
        sqlx::query_as::<_, MessageRow>(
            "SELECT id, pseudonym_id, content, created_at FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Message::from)
        .ok_or_else(|| StoreError::not_found("message", id))
    }

    pub async fn by_author(&self, pseudonym_id: PseudonymId) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT m.id, m.pseudonym_id, m.content, m.created_at
            FROM messages m
            WHERE m.pseudonym_id = ?
            ORDER BY {NEWEST_FIRST}
            "#
        ))
        .bind(pseudonym_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Deletes the message and drops it from every chat.
    pub async fn delete(&self, id: MessageId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chat_messages WHERE message_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("message", id));
        }

        tx.commit().await?;
        Ok(())
    }
}
