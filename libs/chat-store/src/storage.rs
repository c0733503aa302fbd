use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use crate::accounts::AccountManager;
use crate::chats::Chats;
use crate::config::StoreConfig;
use crate::contacts::Contacts;
use crate::error::{StoreError, StoreResult};
use crate::messages::Messages;
use crate::password::Argon2Hasher;
use crate::pseudonyms::Pseudonyms;
use crate::validation::UnicodeNormalizer;

// Association tables carry no ON DELETE actions; owners are removed by
// explicit multi-step deletes inside a transaction.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        is_staff INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        is_superuser INTEGER NOT NULL DEFAULT 0,
        last_login TEXT,
        date_joined TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pseudonyms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        body TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS account_pseudonyms (
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        pseudonym_id INTEGER NOT NULL REFERENCES pseudonyms(id),
        PRIMARY KEY (account_id, pseudonym_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contacts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        pseudonym_id INTEGER NOT NULL REFERENCES pseudonyms(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contact_friends (
        low_id INTEGER NOT NULL REFERENCES contacts(id),
        high_id INTEGER NOT NULL REFERENCES contacts(id),
        PRIMARY KEY (low_id, high_id),
        CHECK (low_id < high_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        pseudonym_id INTEGER NOT NULL REFERENCES pseudonyms(id),
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_messages_author_time ON messages(pseudonym_id, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS chats (
        id INTEGER PRIMARY KEY AUTOINCREMENT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_participants (
        chat_id INTEGER NOT NULL REFERENCES chats(id),
        pseudonym_id INTEGER NOT NULL REFERENCES pseudonyms(id),
        PRIMARY KEY (chat_id, pseudonym_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        chat_id INTEGER NOT NULL REFERENCES chats(id),
        message_id INTEGER NOT NULL REFERENCES messages(id),
        PRIMARY KEY (chat_id, message_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chat_messages_message ON chat_messages(message_id)",
];

/// Takes the row of an `INSERT ... RETURNING` read with `fetch_all`.
///
/// SQLite commits an autocommit insert only once its statement has been
/// stepped to completion, so `fetch_one` would hand the connection back to
/// the pool with the write still pending.
pub(crate) fn inserted_row<T>(rows: Vec<T>) -> StoreResult<T> {
    rows.into_iter()
        .next()
        .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
}

/// Handle to the chat database. Cheap to clone.
#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    /// Opens (creating if needed) the database file at `db_path`.
    pub async fn open(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Config(format!("cannot create {parent:?}: {e}")))?;
        }

        let options = SqliteConnectOptions::new().filename(db_path);
        Self::with_options(options, StoreConfig::default().max_connections).await
    }

    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        if !config.database_url.starts_with("sqlite:") {
            return Err(StoreError::Config(format!(
                "database url {:?} is not a sqlite: url",
                config.database_url
            )));
        }
        let options = SqliteConnectOptions::from_str(&config.database_url).map_err(|e| {
            StoreError::Config(format!("invalid database url {:?}: {e}", config.database_url))
        })?;
        Self::with_options(options, config.max_connections).await
    }

    async fn with_options(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> StoreResult<Self> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        tracing::info!(component = "storage", max_connections, "chat store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Account manager wired to Argon2 hashing and NFKC normalization.
    pub fn accounts(&self) -> AccountManager {
        AccountManager::new(
            self.pool.clone(),
            Arc::new(Argon2Hasher::default()),
            Arc::new(UnicodeNormalizer),
        )
    }

    pub fn pseudonyms(&self) -> Pseudonyms {
        Pseudonyms::new(self.pool.clone())
    }

    pub fn contacts(&self) -> Contacts {
        Contacts::new(self.pool.clone())
    }

    pub fn messages(&self) -> Messages {
        Messages::new(self.pool.clone())
    }

    pub fn chats(&self) -> Chats {
        Chats::new(self.pool.clone())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let (store, db_path) = temp_store("chat-store-schema").await;
        store.init_schema().await.expect("second schema init");

        let reopened = ChatStore::open(&db_path).await.expect("reopen store");
        let tables = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_one(reopened.pool())
        .await
        .expect("count tables");
        assert_eq!(tables, 9);

        reopened.close().await;
        cleanup(store, db_path).await;
    }

    #[tokio::test]
    async fn connect_accepts_config_url() {
        let db_path = temp_db_path("chat-store-connect");
        let config = StoreConfig::at_path(&db_path);
        let store = ChatStore::connect(&config).await.expect("connect via url");

        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM accounts")
            .fetch_one(store.pool())
            .await
            .expect("query accounts");
        assert_eq!(count, 0);

        cleanup(store, db_path).await;
    }

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        for url in ["postgres://localhost/chat", "sqlite://chat.db?mode=sideways"] {
            let config = StoreConfig {
                database_url: url.to_string(),
                ..StoreConfig::default()
            };
            let err = ChatStore::connect(&config)
                .await
                .err()
                .expect("malformed url must be rejected");
            assert!(matches!(err, StoreError::Config(_)), "{url}: {err:?}");
        }
    }

    #[tokio::test]
    async fn inserted_rows_are_visible_to_the_next_read() {
        let (store, db_path) = temp_store("chat-store-read-after-write").await;
        let accounts = store.accounts();
        let pseudonyms = store.pseudonyms();
        let contacts = store.contacts();
        let messages = store.messages();
        let chats = store.chats();

        for i in 0..60 {
            let account = accounts
                .create_account(Some(&format!("user{i}")), None, Default::default())
                .await
                .expect("create account");
            let found = accounts
                .get_by_username(&account.username)
                .await
                .expect("read account")
                .expect("account is visible");
            assert_eq!(found.id, account.id);

            let pseudonym = pseudonyms.create(&format!("nick {i}")).await.expect("pseudonym");
            assert_eq!(pseudonyms.get(pseudonym.id).await.expect("read pseudonym"), pseudonym);

            let contact = contacts.create(pseudonym.id).await.expect("contact");
            assert_eq!(contacts.get(contact.id).await.expect("read contact"), contact);

            let message = messages.post(pseudonym.id, &format!("hello {i}")).await.expect("post");
            assert_eq!(messages.get(message.id).await.expect("read message"), message);

            let chat = chats.create().await.expect("chat");
            assert_eq!(chats.get(chat.id).await.expect("read chat"), chat);
        }

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(store.pool())
            .await
            .expect("count messages");
        assert_eq!(total, 60);

        cleanup(store, db_path).await;
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let (store, db_path) = temp_store("chat-store-fk").await;

        let err = sqlx::query(
            "INSERT INTO messages (pseudonym_id, content, created_at) VALUES (999, 'x', ?)",
        )
        .bind(chrono::Utc::now())
        .execute(store.pool())
        .await
        .expect_err("dangling author must be rejected");
        assert!(matches!(err, sqlx::Error::Database(_)));

        cleanup(store, db_path).await;
    }
}
