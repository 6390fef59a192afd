use thiserror::Error;

pub mod app_error;
pub mod db_error;

pub use app_error::AppError;
pub use db_error::DbError;

pub type Result<T, E = ApplicationError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    App(#[from] AppError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}
