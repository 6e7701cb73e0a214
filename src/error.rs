//! Error types for the store.

use std::fmt;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the store.
///
/// Every mutating operation either succeeds completely or returns one of these
/// variants with caches and storage left as they were. Callers branch on the
/// variant (or the `is_*` helpers), never on the message text.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// An entity or payload failed validation.
    ///
    /// Raised for duplicate ids, negative monetary fields, malformed
    /// registration data, an empty cart at checkout, an admin trying to
    /// purchase, or a withdrawal larger than the balance.
    ValidationError(String),

    /// A user with this email is already registered.
    DuplicateEmail(String),

    /// The referenced entity does not exist.
    NotFound(String),

    /// The operation needs a logged-in customer and there is none.
    Unauthenticated(String),

    /// Login failed: no account uses this email.
    AccountNotFound(String),

    /// Login failed: the account exists but the password is wrong.
    IncorrectPassword,

    /// A stored record could not be turned back into an entity.
    ///
    /// **Recovery:** the owning repository wipes its partition and re-seeds.
    CorruptedData(String),

    /// Converting an entity to JSON failed.
    SerializationError(String),

    /// Converting JSON to an entity failed.
    DeserializationError(String),

    /// The durable storage rejected a read or write.
    StorageError(String),

    /// A seed fixture could not be loaded. Fatal to initialization.
    FixtureError(String),

    /// The repository was used before `initialize()` completed.
    NotInitialized(String),

    /// Invalid configuration value.
    ConfigError(String),
}

impl Error {
    /// True for errors caused by the caller's input rather than the system.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::ValidationError(_) | Error::DuplicateEmail(_) | Error::IncorrectPassword
        )
    }

    /// True for errors about a missing entity, account or session.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::AccountNotFound(_) | Error::Unauthenticated(_)
        )
    }

    /// True when stored data could not be parsed.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::CorruptedData(_) | Error::DeserializationError(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::DuplicateEmail(email) => {
                write!(f, "An account with the email {} already exists", email)
            }
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Unauthenticated(msg) => write!(f, "Not logged in: {}", msg),
            Error::AccountNotFound(email) => {
                write!(f, "No account exists with the email {}", email)
            }
            Error::IncorrectPassword => write!(f, "Your password is incorrect. Please try again."),
            Error::CorruptedData(msg) => write!(f, "Corrupted data: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Error::FixtureError(msg) => write!(f, "Fixture error: {}", msg),
            Error::NotInitialized(msg) => write!(f, "Not initialized: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::StorageError(e.to_string())
        } else if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::StorageError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ValidationError("Test".to_string());
        assert_eq!(err.to_string(), "Validation error: Test");
    }

    #[test]
    fn test_login_errors_are_distinct() {
        let missing = Error::AccountNotFound("a@b.co".to_string());
        let wrong = Error::IncorrectPassword;

        assert_ne!(missing.to_string(), wrong.to_string());
        assert!(missing.is_not_found());
        assert!(wrong.is_validation());
    }

    #[test]
    fn test_from_serde_json_syntax_error() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(err.is_corruption());
    }
}
