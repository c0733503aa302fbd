use chat_models::{Account, AccountId, Pseudonym, PseudonymId};
use sqlx::{FromRow, SqlitePool};
use validator::Validate;

use crate::accounts::{AccountRow, ACCOUNT_COLUMNS};
use crate::error::{StoreError, StoreResult};
use crate::storage::inserted_row;
use crate::validation::NewPseudonym;

#[derive(Debug, FromRow)]
struct PseudonymRow {
    id: i64,
    body: String,
}

impl From<PseudonymRow> for Pseudonym {
    fn from(row: PseudonymRow) -> Self {
        Pseudonym {
            id: row.id,
            body: row.body,
        }
    }
}

#[derive(Clone)]
pub struct Pseudonyms {
    pool: SqlitePool,
}

impl Pseudonyms {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, body: &str) -> StoreResult<Pseudonym> {
        let input = NewPseudonym {
            body: body.to_string(),
        };
        input.validate()?;

        let rows = sqlx::query_as::<_, PseudonymRow>(
            "INSERT INTO pseudonyms (body) VALUES (?) RETURNING id, body",
        )
        .bind(&input.body)
        .fetch_all(&self.pool)
        .await?;
        let row = inserted_row(rows)?;

        tracing::info!(component = "pseudonyms", pseudonym_id = row.id, "pseudonym created");
        Ok(row.into())
    }

    pub async fn get(&self, id: PseudonymId) -> StoreResult<Pseudonym> {
        sqlx::query_as::<_, PseudonymRow>("SELECT id, body FROM pseudonyms WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Pseudonym::from)
            .ok_or_else(|| StoreError::not_found("pseudonym", id))
    }

    /// Links an account to the pseudonym. Linking twice is a no-op.
    pub async fn link_account(
        &self,
        pseudonym_id: PseudonymId,
        account_id: AccountId,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO account_pseudonyms (account_id, pseudonym_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(account_id)
        .bind(pseudonym_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn unlink_account(
        &self,
        pseudonym_id: PseudonymId,
        account_id: AccountId,
    ) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM account_pseudonyms WHERE account_id = ? AND pseudonym_id = ?")
                .bind(account_id)
                .bind(pseudonym_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn for_account(&self, account_id: AccountId) -> StoreResult<Vec<Pseudonym>> {
        let rows = sqlx::query_as::<_, PseudonymRow>(
            r#"
            SELECT p.id, p.body
            FROM pseudonyms p
            JOIN account_pseudonyms ap ON ap.pseudonym_id = p.id
            WHERE ap.account_id = ?
            ORDER BY p.id
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Pseudonym::from).collect())
    }

    pub async fn accounts_of(&self, pseudonym_id: PseudonymId) -> StoreResult<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            JOIN account_pseudonyms ap ON ap.account_id = accounts.id
            WHERE ap.pseudonym_id = ?
            ORDER BY accounts.id
            "#
        ))
        .bind(pseudonym_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Account::from).collect())
    }

    /// Deletes the pseudonym together with the messages and contacts it owns,
    /// and every association row that points at any of them.
    pub async fn delete(&self, id: PseudonymId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM contact_friends
            WHERE low_id IN (SELECT id FROM contacts WHERE pseudonym_id = ?1)
               OR high_id IN (SELECT id FROM contacts WHERE pseudonym_id = ?1)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let contacts = sqlx::query("DELETE FROM contacts WHERE pseudonym_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            "DELETE FROM chat_messages WHERE message_id IN (SELECT id FROM messages WHERE pseudonym_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let messages = sqlx::query("DELETE FROM messages WHERE pseudonym_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM chat_participants WHERE pseudonym_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM account_pseudonyms WHERE pseudonym_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM pseudonyms WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("pseudonym", id));
        }

        tx.commit().await?;
        tracing::info!(
            component = "pseudonyms",
            pseudonym_id = id,
            contacts,
            messages,
            "pseudonym deleted"
        );
        Ok(())
    }
}
