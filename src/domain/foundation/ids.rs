//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// Unique identifier for a user account.
///
/// User ids are issued by the identity provider and are opaque to this
/// service; they are validated for shape only (non-empty, bounded length).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

/// Maximum accepted length for an identity-provider uid.
const MAX_USER_ID_LEN: usize = 128;

impl UserId {
    /// Creates a UserId, validating shape.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the value is empty, overlong, or
    /// contains whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::empty_field("user_id"));
        }
        if value.len() > MAX_USER_ID_LEN {
            return Err(ValidationError::invalid_format(
                "user_id",
                format!("exceeds {} characters", MAX_USER_ID_LEN),
            ));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(ValidationError::invalid_format(
                "user_id",
                "must not contain whitespace",
            ));
        }
        Ok(Self(value))
    }

    /// Returns the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
