use sea_orm::DbErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PingTaskError {
    #[error("Database error: {0}")]
    Storage(#[from] DbErr),
    /// The due-check passed but the claim on the round could not be persisted.
    #[error("Failed to claim ping round: {0}")]
    ClaimWrite(#[source] DbErr),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T, E = PingTaskError> = std::result::Result<T, E>;
