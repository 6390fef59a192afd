use thiserror::Error;

/// Errors for db stuff.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Malformed row: expected at least {expected} columns, found {found}")]
    MalformedRow { expected: usize, found: usize },
}
