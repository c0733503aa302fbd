use chat_models::USERNAME_MAX_LEN;
use unicode_normalization::UnicodeNormalization;
use validator::{Validate, ValidationError};

use crate::error::{StoreError, StoreResult};

/// Canonicalizes raw usernames so visually equivalent strings collide.
pub trait UsernameNormalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> String;
}

/// NFKC compatibility normalization.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeNormalizer;

impl UsernameNormalizer for UnicodeNormalizer {
    fn normalize(&self, raw: &str) -> String {
        normalize_username(raw)
    }
}

pub fn normalize_username(value: &str) -> String {
    value.nfkc().collect()
}

pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len == 0 || len > USERNAME_MAX_LEN {
        return Err(ValidationError::new("username_length"));
    }

    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '@' | '.' | '+' | '-'))
    {
        return Err(ValidationError::new("username_chars"));
    }

    Ok(())
}

pub fn validate_label(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("label_blank"));
    }
    Ok(())
}

pub fn validate_message_content(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("message_content_blank"));
    }
    Ok(())
}

/// Normalizes `raw` and checks the result is a storable username.
pub(crate) fn clean_username(
    normalizer: &dyn UsernameNormalizer,
    raw: Option<&str>,
) -> StoreResult<String> {
    let raw = raw.unwrap_or_default();
    if raw.trim().is_empty() {
        return Err(StoreError::InvalidInput("username must be set".to_string()));
    }

    let username = normalizer.normalize(raw);
    if username.trim().is_empty() {
        return Err(StoreError::InvalidInput("username must be set".to_string()));
    }

    validate_username(&username).map_err(|e| {
        StoreError::InvalidInput(format!("username {username:?} rejected: {}", e.code))
    })?;
    Ok(username)
}

#[derive(Debug, Validate)]
pub(crate) struct NewPseudonym {
    #[validate(length(min = 1, max = 150), custom(function = "validate_label"))]
    pub body: String,
}

#[derive(Debug, Validate)]
pub(crate) struct NewMessage {
    #[validate(custom(function = "validate_message_content"))]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_models::PSEUDONYM_MAX_LEN;

    #[test]
    fn username_validation_allows_expected_chars() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("bob.the+builder@home-1").is_ok());
        assert!(validate_username("łukasz").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("bad!name").is_err());
        assert!(validate_username(&"a".repeat(USERNAME_MAX_LEN + 1)).is_err());
        assert!(validate_username(&"a".repeat(USERNAME_MAX_LEN)).is_ok());
    }

    #[test]
    fn normalization_folds_compatibility_forms() {
        // fullwidth letters and the "fi" ligature
        assert_eq!(normalize_username("ＡＢＣ"), "ABC");
        assert_eq!(normalize_username("\u{FB01}nn"), "finn");
        let once = normalize_username("Å");
        assert_eq!(normalize_username(&once), once);
    }

    #[test]
    fn clean_username_rejects_missing_and_blank() {
        let normalizer = UnicodeNormalizer;
        assert!(matches!(
            clean_username(&normalizer, None),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            clean_username(&normalizer, Some("")),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            clean_username(&normalizer, Some("   ")),
            Err(StoreError::InvalidInput(_))
        ));
        assert_eq!(
            clean_username(&normalizer, Some("ｂｏｂ")).expect("valid username"),
            "bob"
        );
    }

    #[test]
    fn pseudonym_and_message_inputs_reject_blank() {
        let pseudonym = |body: &str| NewPseudonym {
            body: body.to_string(),
        };
        assert!(pseudonym("owl").validate().is_ok());
        assert!(pseudonym("  ").validate().is_err());
        assert!(pseudonym(&"x".repeat(PSEUDONYM_MAX_LEN + 1))
            .validate()
            .is_err());

        let message = |content: &str| NewMessage {
            content: content.to_string(),
        };
        assert!(message("hello").validate().is_ok());
        assert!(message("\n\t").validate().is_err());
    }
}
