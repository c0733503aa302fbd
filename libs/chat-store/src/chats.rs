use chat_models::{Chat, ChatId, Message, MessageId, Pseudonym, PseudonymId};
use sqlx::SqlitePool;

use crate::error::{StoreError, StoreResult};
use crate::messages::{MessageRow, NEWEST_FIRST};
use crate::storage::inserted_row;

const LAST_MESSAGES: i64 = 10;

#[derive(Clone)]
pub struct Chats {
    pool: SqlitePool,
}

impl Chats {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self) -> StoreResult<Chat> {
        let ids = sqlx::query_scalar::<_, i64>("INSERT INTO chats DEFAULT VALUES RETURNING id")
            .fetch_all(&self.pool)
            .await?;
        let id = inserted_row(ids)?;

        tracing::info!(component = "chats", chat_id = id, "chat created");
        Ok(Chat { id })
    }

    pub async fn get(&self, id: ChatId) -> StoreResult<Chat> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM chats WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|id| Chat { id })
            .ok_or_else(|| StoreError::not_found("chat", id))
    }

    pub async fn add_participant(
        &self,
        chat_id: ChatId,
        pseudonym_id: PseudonymId,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO chat_participants (chat_id, pseudonym_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(chat_id)
        .bind(pseudonym_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_participant(
        &self,
        chat_id: ChatId,
        pseudonym_id: PseudonymId,
    ) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM chat_participants WHERE chat_id = ? AND pseudonym_id = ?")
                .bind(chat_id)
                .bind(pseudonym_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn participants(&self, chat_id: ChatId) -> StoreResult<Vec<Pseudonym>> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT p.id, p.body
            FROM chat_participants cp
            JOIN pseudonyms p ON p.id = cp.pseudonym_id
            WHERE cp.chat_id = ?
            ORDER BY p.id
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, body)| Pseudonym { id, body })
            .collect())
    }

    /// Chats `pseudonym_id` takes part in.
    pub async fn chats_for(&self, pseudonym_id: PseudonymId) -> StoreResult<Vec<Chat>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT chat_id FROM chat_participants WHERE pseudonym_id = ? ORDER BY chat_id",
        )
        .bind(pseudonym_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(|id| Chat { id }).collect())
    }

    /// Attaches an existing message to the chat. Attaching twice is a no-op.
    pub async fn add_message(&self, chat_id: ChatId, message_id: MessageId) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO chat_messages (chat_id, message_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(chat_id)
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every message of the chat, newest first.
    pub async fn messages(&self, chat_id: ChatId) -> StoreResult<Vec<Message>> {
        self.fetch_messages(chat_id, None).await
    }

    /// The newest `limit` messages of the chat, newest first.
    pub async fn recent_messages(&self, chat_id: ChatId, limit: i64) -> StoreResult<Vec<Message>> {
        if limit < 0 {
            return Err(StoreError::InvalidInput(format!(
                "message limit must not be negative, got {limit}"
            )));
        }
        self.fetch_messages(chat_id, Some(limit)).await
    }

    pub async fn get_last_10_messages(&self, chat_id: ChatId) -> StoreResult<Vec<Message>> {
        self.recent_messages(chat_id, LAST_MESSAGES).await
    }

    async fn fetch_messages(
        &self,
        chat_id: ChatId,
        limit: Option<i64>,
    ) -> StoreResult<Vec<Message>> {
        // SQLite treats a negative LIMIT as unbounded
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT m.id, m.pseudonym_id, m.content, m.created_at
            FROM chat_messages cm
            JOIN messages m ON m.id = cm.message_id
            WHERE cm.chat_id = ?
            ORDER BY {NEWEST_FIRST}
            LIMIT ?
            "#
        ))
        .bind(chat_id)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Deletes the chat and its participant and message links. Messages stay.
    pub async fn delete(&self, id: ChatId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chat_participants WHERE chat_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chat_messages WHERE chat_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("chat", id));
        }

        tx.commit().await?;
        tracing::info!(component = "chats", chat_id = id, "chat deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{cleanup, temp_store};

    #[tokio::test]
    async fn last_10_messages_are_newest_first() {
        let (store, db_path) = temp_store("chats-last-10").await;
        let author = store.pseudonyms().create("owl").await.expect("author");
        let messages = store.messages();
        let chats = store.chats();

        let chat = chats.create().await.expect("chat");
        let mut posted = Vec::new();
        for i in 0..15 {
            let message = messages
                .post(author.id, &format!("message {i}"))
                .await
                .expect("post");
            chats.add_message(chat.id, message.id).await.expect("link");
            posted.push(message);
        }

        let last = chats.get_last_10_messages(chat.id).await.expect("last 10");
        let expected: Vec<Message> = posted.iter().rev().take(10).cloned().collect();
        assert_eq!(last.len(), 10);
        assert_eq!(last, expected);
        assert_eq!(last[0].content, "message 14");
        assert!(last.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        assert_eq!(chats.messages(chat.id).await.expect("all").len(), 15);

        cleanup(store, db_path).await;
    }

    #[tokio::test]
    async fn recent_messages_are_scoped_to_the_chat() {
        let (store, db_path) = temp_store("chats-scoped").await;
        let author = store.pseudonyms().create("owl").await.expect("author");
        let messages = store.messages();
        let chats = store.chats();

        let busy = chats.create().await.expect("busy chat");
        let quiet = chats.create().await.expect("quiet chat");
        let only = messages.post(author.id, "hello quiet").await.expect("post");
        chats.add_message(quiet.id, only.id).await.expect("link quiet");
        for i in 0..3 {
            let m = messages.post(author.id, &format!("busy {i}")).await.expect("post");
            chats.add_message(busy.id, m.id).await.expect("link busy");
        }
        chats.add_message(quiet.id, only.id).await.expect("relink");

        assert_eq!(chats.get_last_10_messages(quiet.id).await.expect("quiet"), vec![only]);
        assert_eq!(chats.recent_messages(busy.id, 2).await.expect("busy").len(), 2);
        assert!(chats.recent_messages(busy.id, 0).await.expect("none").is_empty());
        assert!(matches!(
            chats.recent_messages(busy.id, -1).await,
            Err(StoreError::InvalidInput(_))
        ));

        let empty = chats.create().await.expect("empty chat");
        assert!(chats.get_last_10_messages(empty.id).await.expect("empty").is_empty());

        cleanup(store, db_path).await;
    }

    #[tokio::test]
    async fn participants_and_delete() {
        let (store, db_path) = temp_store("chats-participants").await;
        let pseudonyms = store.pseudonyms();
        let chats = store.chats();
        let messages = store.messages();

        let owl = pseudonyms.create("owl").await.expect("owl");
        let fox = pseudonyms.create("fox").await.expect("fox");
        let chat = chats.create().await.expect("chat");
        assert_eq!(chats.get(chat.id).await.expect("get"), chat);
        assert_eq!(chat.to_string(), chat.id.to_string());

        chats.add_participant(chat.id, owl.id).await.expect("owl joins");
        chats.add_participant(chat.id, fox.id).await.expect("fox joins");
        chats.add_participant(chat.id, fox.id).await.expect("fox joins twice");
        assert_eq!(
            chats.participants(chat.id).await.expect("participants"),
            vec![owl.clone(), fox.clone()]
        );
        assert_eq!(chats.chats_for(fox.id).await.expect("fox's chats"), vec![chat.clone()]);

        assert!(chats.remove_participant(chat.id, fox.id).await.expect("fox leaves"));
        assert!(chats.chats_for(fox.id).await.expect("fox's chats").is_empty());

        let kept = messages.post(owl.id, "still here").await.expect("post");
        chats.add_message(chat.id, kept.id).await.expect("link");
        chats.delete(chat.id).await.expect("delete chat");

        assert!(matches!(
            chats.get(chat.id).await,
            Err(StoreError::NotFound { entity: "chat", .. })
        ));
        assert_eq!(messages.get(kept.id).await.expect("message survives"), kept);

        cleanup(store, db_path).await;
    }
}
