//! Record types shared by the chat store and its callers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type AccountId = i64;
pub type PseudonymId = i64;
pub type ContactId = i64;
pub type MessageId = i64;
pub type ChatId = i64;

/// Longest username accepted, counted in characters after normalization.
pub const USERNAME_MAX_LEN: usize = 150;
/// Longest pseudonym label accepted.
pub const PSEUDONYM_MAX_LEN: usize = 150;

/// Password state of an account. An account holds exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "hash", rename_all = "snake_case")]
pub enum Credential {
    /// Encoded salted hash of a real password.
    Hashed(String),
    /// The account cannot authenticate with a password.
    Unusable,
}

impl Credential {
    pub fn is_usable(&self) -> bool {
        matches!(self, Credential::Hashed(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    #[serde(skip_serializing)]
    pub credential: Credential,
    pub is_staff: bool,
    pub is_active: bool,
    pub is_superuser: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

impl Account {
    pub fn has_usable_password(&self) -> bool {
        self.credential.is_usable()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// Account fields safe to hand to other users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountPublic {
    pub id: AccountId,
    pub username: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<Account> for AccountPublic {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            is_active: account.is_active,
            last_login: account.last_login,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pseudonym {
    pub id: PseudonymId,
    pub body: String,
}

impl fmt::Display for Pseudonym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body)
    }
}

/// A pseudonym's address-book entry. Friends are other contacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub pseudonym_id: PseudonymId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub pseudonym_id: PseudonymId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

impl fmt::Display for Chat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
