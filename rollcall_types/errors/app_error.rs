use thiserror::Error;

use super::ApplicationError;

/// Errors for app logic (queries, transaction outcomes).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("At least one user id is required")]
    EmptyUserIds,

    #[error("Transaction rolled back: {source}")]
    TransactionRolledBack { source: Box<ApplicationError> },

    #[error("Rollback failed ({rollback}) after: {cause}")]
    RollbackFailed {
        cause: Box<ApplicationError>,
        rollback: Box<ApplicationError>,
    },
}
