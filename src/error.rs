use thiserror::Error;

/// Failure kinds the store and merge layers report. Lower-level sled errors
/// only ever cross the boundary wrapped in `Storage`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
