use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("already exists: {0}")]
    UniquenessViolation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("password hash error")]
    PasswordHash,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Maps a unique-constraint rejection to `UniquenessViolation`, passing
    /// every other database error through unchanged.
    pub(crate) fn from_insert(err: sqlx::Error, what: impl Into<String>) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return StoreError::UniquenessViolation(what.into());
            }
        }
        StoreError::Database(err)
    }

    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        StoreError::NotFound { entity, id }
    }
}

impl From<validator::ValidationErrors> for StoreError {
    fn from(value: validator::ValidationErrors) -> Self {
        StoreError::InvalidInput(value.to_string())
    }
}
