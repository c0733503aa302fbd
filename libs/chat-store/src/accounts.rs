//! Account provisioning and credential management.
//!
//! [`AccountManager`] is built from an explicit pool, hasher and normalizer.
//! The only failures it raises itself are input errors; duplicate usernames
//! are rejected by the `UNIQUE` constraint on insert.

use std::sync::Arc;

use chat_models::{Account, AccountId, Credential};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{FromRow, SqlitePool};

use crate::error::{StoreError, StoreResult};
use crate::storage::inserted_row;
use crate::password::{
    check_credential, decode_credential, encode_credential, make_credential, CredentialHasher,
};
use crate::validation::{clean_username, UsernameNormalizer};

pub(crate) const ACCOUNT_COLUMNS: &str =
    "id, username, password, is_staff, is_active, is_superuser, last_login, date_joined";

#[derive(Debug, FromRow)]
pub(crate) struct AccountRow {
    id: i64,
    username: String,
    password: String,
    is_staff: bool,
    is_active: bool,
    is_superuser: bool,
    last_login: Option<DateTime<Utc>>,
    date_joined: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            username: row.username,
            credential: decode_credential(row.password),
            is_staff: row.is_staff,
            is_active: row.is_active,
            is_superuser: row.is_superuser,
            last_login: row.last_login,
            date_joined: row.date_joined,
        }
    }
}

/// Optional account attributes supplied by the caller. Unset fields receive
/// defaults only after caller values are in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct AccountFields {
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_active: Option<bool>,
}

impl AccountFields {
    pub fn staff(mut self, value: bool) -> Self {
        self.is_staff = Some(value);
        self
    }

    pub fn superuser(mut self, value: bool) -> Self {
        self.is_superuser = Some(value);
        self
    }

    pub fn active(mut self, value: bool) -> Self {
        self.is_active = Some(value);
        self
    }

    fn with_defaults(self, is_staff: bool, is_superuser: bool) -> Self {
        Self {
            is_staff: self.is_staff.or(Some(is_staff)),
            is_superuser: self.is_superuser.or(Some(is_superuser)),
            is_active: self.is_active,
        }
    }
}

/// Fully resolved insert; built once, never mutated.
struct NewAccount {
    username: String,
    credential: Credential,
    is_staff: bool,
    is_active: bool,
    is_superuser: bool,
    date_joined: DateTime<Utc>,
}

impl NewAccount {
    fn new(username: String, credential: Credential, fields: AccountFields) -> Self {
        Self {
            username,
            credential,
            is_staff: fields.is_staff.unwrap_or(false),
            is_active: fields.is_active.unwrap_or(true),
            is_superuser: fields.is_superuser.unwrap_or(false),
            date_joined: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct AccountManager {
    pool: SqlitePool,
    hasher: Arc<dyn CredentialHasher>,
    normalizer: Arc<dyn UsernameNormalizer>,
}

impl AccountManager {
    pub fn new(
        pool: SqlitePool,
        hasher: Arc<dyn CredentialHasher>,
        normalizer: Arc<dyn UsernameNormalizer>,
    ) -> Self {
        Self {
            pool,
            hasher,
            normalizer,
        }
    }

    /// Normalizes `username`, hashes `password` (or marks the account as
    /// password-less) and inserts the account.
    pub async fn create_account(
        &self,
        username: Option<&str>,
        password: Option<&str>,
        fields: AccountFields,
    ) -> StoreResult<Account> {
        let username = clean_username(self.normalizer.as_ref(), username)?;
        let credential = make_credential(self.hasher.as_ref(), password)?;
        let record = NewAccount::new(username, credential, fields);

        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO accounts (username, password, is_staff, is_active, is_superuser, date_joined)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(&record.username)
        .bind(encode_credential(&record.credential))
        .bind(record.is_staff)
        .bind(record.is_active)
        .bind(record.is_superuser)
        .bind(record.date_joined)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            StoreError::from_insert(e, format!("a user with username {:?}", record.username))
        })?;

        let account = Account::from(inserted_row(rows)?);
        tracing::info!(
            component = "accounts",
            account_id = account.id,
            username = %account.username,
            is_staff = account.is_staff,
            is_superuser = account.is_superuser,
            usable_password = account.has_usable_password(),
            "account created"
        );
        Ok(account)
    }

    /// Regular account. Staff and superuser default to false unless `fields`
    /// sets them.
    pub async fn create_user(
        &self,
        username: Option<&str>,
        password: Option<&str>,
        fields: AccountFields,
    ) -> StoreResult<Account> {
        self.create_account(username, password, fields.with_defaults(false, false))
            .await
    }

    /// Staff and superuser flags are always true here, whatever `fields` says.
    pub async fn create_superuser(
        &self,
        username: Option<&str>,
        password: Option<&str>,
        fields: AccountFields,
    ) -> StoreResult<Account> {
        let fields = fields.staff(true).superuser(true);
        self.create_account(username, password, fields).await
    }

    pub async fn get(&self, id: AccountId) -> StoreResult<Account> {
        sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Account::from)
        .ok_or_else(|| StoreError::not_found("account", id))
    }

    /// Looks an account up by the normalized form of `raw`.
    pub async fn get_by_username(&self, raw: &str) -> StoreResult<Option<Account>> {
        let username = self.normalizer.normalize(raw);
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = ?"
        ))
        .bind(&username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Account::from))
    }

    pub fn check_password(&self, account: &Account, password: &str) -> bool {
        check_credential(self.hasher.as_ref(), &account.credential, password)
    }

    /// Returns the account when it exists, is active and `password` matches.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> StoreResult<Option<Account>> {
        let Some(account) = self.get_by_username(username).await? else {
            return Ok(None);
        };

        if !account.is_active || !self.check_password(&account, password) {
            tracing::debug!(
                component = "accounts",
                account_id = account.id,
                "authentication rejected"
            );
            return Ok(None);
        }
        Ok(Some(account))
    }

    /// Replaces the stored credential. `None` or an empty password makes it unusable.
    pub async fn set_password(&self, id: AccountId, password: Option<&str>) -> StoreResult<()> {
        let credential = make_credential(self.hasher.as_ref(), password)?;
        let result = sqlx::query("UPDATE accounts SET password = ? WHERE id = ?")
            .bind(encode_credential(&credential))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("account", id));
        }
        tracing::info!(
            component = "accounts",
            account_id = id,
            usable_password = credential.is_usable(),
            "password changed"
        );
        Ok(())
    }

    pub async fn set_unusable_password(&self, id: AccountId) -> StoreResult<()> {
        self.set_password(id, None).await
    }

    pub async fn record_login(&self, id: AccountId) -> StoreResult<DateTime<Utc>> {
        let now = Utc::now();
        let result = sqlx::query("UPDATE accounts SET last_login = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("account", id));
        }
        Ok(now)
    }

    /// Deactivates (or reactivates) an account without deleting it.
    pub async fn set_active(&self, id: AccountId, active: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE accounts SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("account", id));
        }
        tracing::info!(
            component = "accounts",
            account_id = id,
            active,
            "account activation changed"
        );
        Ok(())
    }

    /// Deletes the account and its pseudonym links. Pseudonyms stay.
    pub async fn delete(&self, id: AccountId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM account_pseudonyms WHERE account_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("account", id));
        }

        tx.commit().await?;
        tracing::info!(component = "accounts", account_id = id, "account deleted");
        Ok(())
    }
}
