use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Auth expired for account")]
    AuthExpired,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Reply generation failed: {0}")]
    Generation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Result of an operation that may have succeeded only by falling back to a
/// safe default. Callers that need to tell the two cases apart match on the
/// variant; callers that don't call `into_inner`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The operation produced a genuine answer.
    Value(T),
    /// The operation failed and resolved to a safe default.
    Degraded(T),
}

impl<T> Outcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            Outcome::Value(v) | Outcome::Degraded(v) => v,
        }
    }

    pub fn as_inner(&self) -> &T {
        match self {
            Outcome::Value(v) | Outcome::Degraded(v) => v,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded(_))
    }
}
