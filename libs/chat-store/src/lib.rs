//! SQLite persistence for chat accounts, pseudonyms, contacts, messages and chats.

pub mod accounts;
pub mod chats;
pub mod config;
pub mod contacts;
pub mod error;
pub mod messages;
pub mod password;
pub mod pseudonyms;
pub mod storage;
pub mod validation;

pub use accounts::{AccountFields, AccountManager};
pub use chats::Chats;
pub use config::StoreConfig;
pub use contacts::Contacts;
pub use error::{StoreError, StoreResult};
pub use messages::Messages;
pub use password::{Argon2Hasher, CredentialHasher};
pub use pseudonyms::Pseudonyms;
pub use storage::ChatStore;
pub use validation::{UnicodeNormalizer, UsernameNormalizer};
