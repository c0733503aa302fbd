use chat_models::{Contact, ContactId, PseudonymId};
use sqlx::{FromRow, SqlitePool};

use crate::error::{StoreError, StoreResult};
use crate::storage::inserted_row;

#[derive(Debug, FromRow)]
struct ContactRow {
    id: i64,
    pseudonym_id: i64,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Contact {
            id: row.id,
            pseudonym_id: row.pseudonym_id,
        }
    }
}

// Friendship is symmetric; each pair is stored once, smaller id first.
fn friend_pair(a: ContactId, b: ContactId) -> StoreResult<(ContactId, ContactId)> {
    if a == b {
        return Err(StoreError::InvalidInput(
            "a contact cannot befriend itself".to_string(),
        ));
    }
    Ok((a.min(b), a.max(b)))
}

#[derive(Clone)]
pub struct Contacts {
    pool: SqlitePool,
}

impl Contacts {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, pseudonym_id: PseudonymId) -> StoreResult<Contact> {
        let rows = sqlx::query_as::<_, ContactRow>(
            "INSERT INTO contacts (pseudonym_id) VALUES (?) RETURNING id, pseudonym_id",
        )
        .bind(pseudonym_id)
        .fetch_all(&self.pool)
        .await?;
        let row = inserted_row(rows)?;

        tracing::info!(
            component = "contacts",
            contact_id = row.id,
            pseudonym_id,
            "contact created"
        );
        Ok(row.into())
    }

    pub async fn get(&self, id: ContactId) -> StoreResult<Contact> {
        sqlx::query_as::<_, ContactRow>("SELECT id, pseudonym_id FROM contacts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Contact::from)
            .ok_or_else(|| StoreError::not_found("contact", id))
    }

    /// Display label of a contact: the body of its owning pseudonym.
    pub async fn display(&self, id: ContactId) -> StoreResult<String> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.body
            FROM contacts c
            JOIN pseudonyms p ON p.id = c.pseudonym_id
            WHERE c.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("contact", id))
    }

    /// Makes `a` and `b` friends of each other. Returns false if they already were.
    pub async fn add_friend(&self, a: ContactId, b: ContactId) -> StoreResult<bool> {
        let (low, high) = friend_pair(a, b)?;
        let result = sqlx::query(
            "INSERT INTO contact_friends (low_id, high_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(low)
        .bind(high)
        .execute(&self.pool)
        .await?;

        let added = result.rows_affected() > 0;
        if added {
            tracing::debug!(component = "contacts", low, high, "friendship added");
        }
        Ok(added)
    }

    pub async fn remove_friend(&self, a: ContactId, b: ContactId) -> StoreResult<bool> {
        let (low, high) = friend_pair(a, b)?;
        let result = sqlx::query("DELETE FROM contact_friends WHERE low_id = ? AND high_id = ?")
            .bind(low)
            .bind(high)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn friends_of(&self, id: ContactId) -> StoreResult<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT c.id, c.pseudonym_id
            FROM contact_friends f
            JOIN contacts c ON c.id = CASE WHEN f.low_id = ?1 THEN f.high_id ELSE f.low_id END
            WHERE f.low_id = ?1 OR f.high_id = ?1
            ORDER BY c.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Contact::from).collect())
    }

    pub async fn for_pseudonym(&self, pseudonym_id: PseudonymId) -> StoreResult<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(
            "SELECT id, pseudonym_id FROM contacts WHERE pseudonym_id = ? ORDER BY id",
        )
        .bind(pseudonym_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Contact::from).collect())
    }

    pub async fn delete(&self, id: ContactId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM contact_friends WHERE low_id = ?1 OR high_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("contact", id));
        }

        tx.commit().await?;
        tracing::info!(component = "contacts", contact_id = id, "contact deleted");
        Ok(())
    }
}
