//! Error types for the chat subsystem.

use thiserror::Error;

/// Chat subsystem error type.
///
/// Authorization deliberately carries no detail: a session that does not
/// exist and a session owned by someone else produce the same denied
/// outcome, so callers cannot probe for foreign session ids.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing or empty required input.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Caller is not the owner of the requested session, or it is absent.
    #[error("not authorized for the requested session")]
    Authorization,
    /// Unique-constraint violation on create (duplicate identity fields).
    #[error("conflict: {0}")]
    Conflict(String),
    /// Persistence layer failure; never retried by the core.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Conflict(err.to_string())
            }
            _ => Self::Storage(err.to_string()),
        }
    }
}

impl From<tokio_rusqlite::Error> for ChatError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(inner) => Self::from(inner),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_maps_to_conflict() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed: users.username".to_string()),
        );
        assert!(matches!(ChatError::from(err), ChatError::Conflict(_)));
    }

    #[test]
    fn test_other_sqlite_errors_map_to_storage() {
        let err = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(ChatError::from(err), ChatError::Storage(_)));
    }

    #[test]
    fn test_authorization_message_leaks_nothing() {
        let msg = ChatError::Authorization.to_string();
        assert!(!msg.contains("exist"));
        assert!(!msg.contains("owner"));
    }
}
