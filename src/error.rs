use thiserror::Error;

/// Failure kinds shared by the repository, the usecase and the HTTP layer.
///
/// The set is closed: callers match on it exhaustively instead of comparing
/// error identities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,

    #[error("version mismatch")]
    VersionMismatch,

    #[error("username already exists")]
    UsernameAlreadyExists,

    #[error("email already exists")]
    EmailAlreadyExists,

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type UserResult<T> = Result<T, UserError>;

impl From<sqlx::Error> for UserError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                if let Some(kind) = unique_violation(db.constraint(), db.message()) {
                    return kind;
                }
            }
        }
        UserError::Storage(err.to_string())
    }
}

/// Maps a unique-constraint violation to the domain error for the column it
/// guards. The constraint name wins over the driver message when present.
pub(crate) fn unique_violation(constraint: Option<&str>, message: &str) -> Option<UserError> {
    let source = constraint.unwrap_or(message);
    if source.contains("username") {
        Some(UserError::UsernameAlreadyExists)
    } else if source.contains("email") {
        Some(UserError::EmailAlreadyExists)
    } else {
        None
    }
}
