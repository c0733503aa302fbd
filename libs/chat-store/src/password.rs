use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
#[cfg(test)]
use argon2::{Algorithm, Params, Version};
use chat_models::Credential;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Stored passwords starting with this prefix can never authenticate.
/// PHC hash strings always start with `$`.
pub const UNUSABLE_PASSWORD_PREFIX: char = '!';

/// One-way salted hashing of account passwords.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> StoreResult<String>;
    fn verify(&self, password: &str, encoded: &str) -> bool;
}

/// Argon2id hasher producing PHC strings.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            argon2: argon2_instance(),
        }
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> StoreResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| StoreError::PasswordHash)
    }

    fn verify(&self, password: &str, encoded: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(encoded) else {
            return false;
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

// Full-strength parameters outside of tests; cheap ones keep the test suite fast.
fn argon2_instance() -> Argon2<'static> {
    #[cfg(test)]
    {
        let params = Params::new(1024, 1, 1, None).expect("valid Argon2 params for tests");
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    #[cfg(not(test))]
    {
        Argon2::default()
    }
}

/// Hashes `password` when present and non-empty; otherwise the unusable state.
pub fn make_credential(
    hasher: &dyn CredentialHasher,
    password: Option<&str>,
) -> StoreResult<Credential> {
    match password {
        Some(raw) if !raw.is_empty() => Ok(Credential::Hashed(hasher.hash(raw)?)),
        _ => Ok(Credential::Unusable),
    }
}

pub fn check_credential(
    hasher: &dyn CredentialHasher,
    credential: &Credential,
    password: &str,
) -> bool {
    match credential {
        Credential::Hashed(encoded) => hasher.verify(password, encoded),
        Credential::Unusable => false,
    }
}

/// Column value for a credential. Each unusable marker carries a random
/// suffix so no two accounts share one.
pub(crate) fn encode_credential(credential: &Credential) -> String {
    match credential {
        Credential::Hashed(encoded) => encoded.clone(),
        Credential::Unusable => format!("{UNUSABLE_PASSWORD_PREFIX}{}", Uuid::new_v4().simple()),
    }
}

pub(crate) fn decode_credential(stored: String) -> Credential {
    if stored.is_empty() || stored.starts_with(UNUSABLE_PASSWORD_PREFIX) {
        Credential::Unusable
    } else {
        Credential::Hashed(stored)
    }
}
